//! Convolutional backbone producing embeddings at four scales.

use burn::{
    nn::{
        conv::Conv2d,
        pool::{AvgPool2d, AvgPool2dConfig},
    },
    prelude::*,
};

use super::modules::{pointwise, ConvBlock, ConvBlockConfig};

/// Features extracted by the [`Backbone`].
#[derive(Debug, Clone)]
pub struct BackboneOutput<B: Backend> {
    /// Features at 1/2 of the input resolution.
    pub embeddings_2: Tensor<B, 4>,
    /// Features at 1/4 of the input resolution.
    pub embeddings_4: Tensor<B, 4>,
    /// Features at 1/8 of the input resolution.
    pub embeddings_8: Tensor<B, 4>,
    /// All scales pooled to 1/16 and fused.
    pub embeddings_merged: Tensor<B, 4>,
}

/// Four strided stages followed by a multi-scale merge at 1/16.
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    stages: Vec<ConvBlock<B>>,
    pool_2: AvgPool2d,
    pool_4: AvgPool2d,
    pool_8: AvgPool2d,
    merge: Conv2d<B>,
}

impl<B: Backend> Backbone<B> {
    pub fn new(embedding_channels: usize, device: &B::Device) -> Self {
        let stages = (0..4)
            .map(|stage| {
                let in_channels = if stage == 0 { 3 } else { embedding_channels };
                ConvBlockConfig::new(in_channels, embedding_channels)
                    .with_stride(2)
                    .init(device)
            })
            .collect();

        let pool = |factor: usize| {
            AvgPool2dConfig::new([factor, factor])
                .with_strides([factor, factor])
                .init()
        };

        Self {
            stages,
            pool_2: pool(8),
            pool_4: pool(4),
            pool_8: pool(2),
            merge: pointwise(embedding_channels * 4, embedding_channels, device),
        }
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> BackboneOutput<B> {
        let mut features = Vec::with_capacity(self.stages.len());
        let mut x = images;
        for stage in &self.stages {
            x = stage.forward(x);
            features.push(x.clone());
        }

        let embeddings_2 = features[0].clone();
        let embeddings_4 = features[1].clone();
        let embeddings_8 = features[2].clone();
        let embeddings_16 = features[3].clone();

        let merged = Tensor::cat(
            vec![
                self.pool_2.forward(embeddings_2.clone()),
                self.pool_4.forward(embeddings_4.clone()),
                self.pool_8.forward(embeddings_8.clone()),
                embeddings_16,
            ],
            1,
        );

        BackboneOutput {
            embeddings_2,
            embeddings_4,
            embeddings_8,
            embeddings_merged: self.merge.forward(merged),
        }
    }
}
