//! Per-class coarse mask detectors operating at 1/16 resolution.

use burn::{nn::conv::Conv2d, prelude::*, tensor::activation::sigmoid};

use super::modules::{pointwise, ConvBlock, ConvBlockConfig};

/// Detector for a single class.
#[derive(Module, Debug)]
pub struct MaskDetector<B: Backend> {
    embedding: ConvBlock<B>,
    mask: Conv2d<B>,
}

impl<B: Backend> MaskDetector<B> {
    fn new(
        embedding_channels: usize,
        mask_embedding_channels: usize,
        kernel_size: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            embedding: ConvBlockConfig::new(embedding_channels, mask_embedding_channels)
                .with_kernel_size(kernel_size)
                .init(device),
            mask: pointwise(mask_embedding_channels, 1, device),
        }
    }

    /// Returns `(mask [B, 1, h, w], embedding [B, R, h, w])`.
    fn forward(&self, embeddings_merged: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let embedding = self.embedding.forward(embeddings_merged);
        let mask = sigmoid(self.mask.forward(embedding.clone()));
        (mask, embedding)
    }
}

/// One [`MaskDetector`] per class.
#[derive(Module, Debug)]
pub struct MaskDetectors<B: Backend> {
    detectors: Vec<MaskDetector<B>>,
}

impl<B: Backend> MaskDetectors<B> {
    pub fn new(
        num_classes: usize,
        embedding_channels: usize,
        mask_embedding_channels: usize,
        kernel_size: usize,
        device: &B::Device,
    ) -> Self {
        let detectors = (0..num_classes)
            .map(|_| {
                MaskDetector::new(
                    embedding_channels,
                    mask_embedding_channels,
                    kernel_size,
                    device,
                )
            })
            .collect();
        Self { detectors }
    }

    /// Returns `(predicted_masks [B, C, h, w], mask_embeddings [B, C * R, h, w])`.
    ///
    /// Class `c` owns channels `c * R .. (c + 1) * R` of the mask embeddings.
    pub fn forward(&self, embeddings_merged: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let (masks, embeddings): (Vec<_>, Vec<_>) = self
            .detectors
            .iter()
            .map(|detector| detector.forward(embeddings_merged.clone()))
            .unzip();

        (Tensor::cat(masks, 1), Tensor::cat(embeddings, 1))
    }
}
