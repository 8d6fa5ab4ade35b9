//! Mask refiners upsampling coarse masks from 1/16 to 1/2 of the input size.

use burn::{
    nn::conv::Conv2d,
    prelude::*,
    tensor::{
        activation::sigmoid,
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

use super::modules::{pointwise, ConvBlock, ConvBlockConfig};
use crate::training::ModelOutput;

// Burn's ndarray backend only implements the nearest interpolation backward pass.
fn upsample<B: Backend>(x: Tensor<B, 4>, size: [usize; 2]) -> Tensor<B, 4> {
    let [_, _, height, width] = x.dims();
    if [height, width] == size {
        return x;
    }
    interpolate(x, size, InterpolateOptions::new(InterpolateMode::Nearest))
}

/// Refiner for a single class.
#[derive(Module, Debug)]
pub struct MaskRefiner<B: Backend> {
    fuse_16: ConvBlock<B>,
    fuse_8: ConvBlock<B>,
    fuse_4: ConvBlock<B>,
    fuse_2: ConvBlock<B>,
    mask: Conv2d<B>,
}

impl<B: Backend> MaskRefiner<B> {
    fn new(embedding_channels: usize, mask_embedding_channels: usize, device: &B::Device) -> Self {
        let r = mask_embedding_channels;
        let e = embedding_channels;
        Self {
            fuse_16: ConvBlockConfig::new(1 + r + e, r).init(device),
            fuse_8: ConvBlockConfig::new(r + e, r).init(device),
            fuse_4: ConvBlockConfig::new(r + e, r).init(device),
            fuse_2: ConvBlockConfig::new(r + e, r).init(device),
            mask: pointwise(r, 1, device),
        }
    }

    fn forward(
        &self,
        mask: Tensor<B, 4>,
        mask_embedding: Tensor<B, 4>,
        output: &ModelOutput<B>,
        target_size: [usize; 2],
    ) -> Tensor<B, 4> {
        let x = self.fuse_16.forward(Tensor::cat(
            vec![mask, mask_embedding, output.embeddings_merged.clone()],
            1,
        ));
        let x = self.fuse_with(&self.fuse_8, x, output.embeddings_8.clone());
        let x = self.fuse_with(&self.fuse_4, x, output.embeddings_4.clone());
        let x = self.fuse_with(&self.fuse_2, x, output.embeddings_2.clone());

        upsample(sigmoid(self.mask.forward(x)), target_size)
    }

    fn fuse_with(
        &self,
        block: &ConvBlock<B>,
        x: Tensor<B, 4>,
        embeddings: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [_, _, height, width] = embeddings.dims();
        let x = upsample(x, [height, width]);
        block.forward(Tensor::cat(vec![x, embeddings], 1))
    }
}

/// One [`MaskRefiner`] per class.
#[derive(Module, Debug)]
pub struct MaskRefiners<B: Backend> {
    refiners: Vec<MaskRefiner<B>>,
    mask_embedding_channels: usize,
}

impl<B: Backend> MaskRefiners<B> {
    pub fn new(
        num_classes: usize,
        embedding_channels: usize,
        mask_embedding_channels: usize,
        device: &B::Device,
    ) -> Self {
        let refiners = (0..num_classes)
            .map(|_| MaskRefiner::new(embedding_channels, mask_embedding_channels, device))
            .collect();
        Self {
            refiners,
            mask_embedding_channels,
        }
    }

    /// Returns refined masks with shape `[B, C, H / 2, W / 2]` where `H` and `W`
    /// come from `input_size` (`[B, 3, H, W]`).
    pub fn forward(&self, input_size: [usize; 4], output: &ModelOutput<B>) -> Tensor<B, 4> {
        let [_, _, height, width] = input_size;
        let target_size = [height / 2, width / 2];
        let r = self.mask_embedding_channels;

        let refined = self
            .refiners
            .iter()
            .enumerate()
            .map(|(class_index, refiner)| {
                let mask = output.predicted_masks.clone().narrow(1, class_index, 1);
                let embedding = output.mask_embeddings.clone().narrow(1, class_index * r, r);
                refiner.forward(mask, embedding, output, target_size)
            })
            .collect();

        Tensor::cat(refined, 1)
    }
}
