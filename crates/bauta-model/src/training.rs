//! Training data structures for Bauta.
//!
//! Batch and model output types live in the model crate so that the dataset,
//! loss and trainer crates can all share them without depending on each other.

use burn::{prelude::*, tensor::backend::Backend};

/// A batch of preprocessed samples.
#[derive(Debug, Clone)]
pub struct BautaBatch<B: Backend> {
    /// Input images with shape `[B, 3, H, W]` and values in `[0, 1]`.
    pub images: Tensor<B, 4>,
    /// Binary target masks with shape `[B, C, H, W]`, one channel per class.
    pub masks: Tensor<B, 4>,
    /// Class presence with shape `[B, C]`: 1 when the class has any foreground pixel.
    pub presence: Tensor<B, 2>,
    /// Per-class bounding boxes `[left, top, right, bottom]` in pixels with
    /// shape `[B, C, 4]`; all zeros for absent classes.
    pub bounding_boxes: Tensor<B, 3>,
}

impl<B: Backend> BautaBatch<B> {
    /// Get the batch size.
    pub fn batch_size(&self) -> usize {
        self.images.dims()[0]
    }

    /// Moves every tensor of the batch to `device`.
    pub fn to_device(self, device: &B::Device) -> Self {
        Self {
            images: self.images.to_device(device),
            masks: self.masks.to_device(device),
            presence: self.presence.to_device(device),
            bounding_boxes: self.bounding_boxes.to_device(device),
        }
    }
}

/// The six tensors produced by a segmentation model's forward pass.
#[derive(Debug, Clone)]
pub struct ModelOutput<B: Backend> {
    /// Coarse per-class mask probabilities, `[B, C, H / 16, W / 16]`.
    pub predicted_masks: Tensor<B, 4>,
    /// Per-class mask embeddings at 1/16 resolution.
    pub mask_embeddings: Tensor<B, 4>,
    /// Backbone embeddings of every scale fused at 1/16 resolution.
    pub embeddings_merged: Tensor<B, 4>,
    /// Backbone embeddings at 1/2 resolution.
    pub embeddings_2: Tensor<B, 4>,
    /// Backbone embeddings at 1/4 resolution.
    pub embeddings_4: Tensor<B, 4>,
    /// Backbone embeddings at 1/8 resolution.
    pub embeddings_8: Tensor<B, 4>,
}

/// A network that can be trained by the Bauta training loop.
pub trait SegmentationModel<B: Backend> {
    /// Runs the shared backbone and the coarse mask detectors.
    fn forward(&self, images: Tensor<B, 4>) -> ModelOutput<B>;

    /// Predicts class presence probabilities `[B, C]`.
    fn classify(&self, predicted_masks: Tensor<B, 4>, embeddings_merged: Tensor<B, 4>)
        -> Tensor<B, 2>;

    /// Predicts refined masks `[B, C, H / 2, W / 2]` for an input of `input_size`.
    fn refine(&self, input_size: [usize; 4], output: &ModelOutput<B>) -> Tensor<B, 4>;

    /// Number of classes predicted by every head.
    fn num_classes(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use burn::{backend::ndarray::NdArray, tensor::Distribution};

    use super::*;

    type TestBackend = NdArray<f32>;

    #[test]
    fn batch_size_reads_leading_dimension() {
        let device = Default::default();

        let batch = BautaBatch::<TestBackend> {
            images: Tensor::random([4, 3, 32, 32], Distribution::Default, &device),
            masks: Tensor::zeros([4, 2, 32, 32], &device),
            presence: Tensor::zeros([4, 2], &device),
            bounding_boxes: Tensor::zeros([4, 2, 4], &device),
        };

        assert_eq!(batch.batch_size(), 4);
        let batch = batch.to_device(&device);
        assert_eq!(batch.masks.dims(), [4, 2, 32, 32]);
    }
}
