//! Per-class presence classifiers.

use burn::{nn::conv::Conv2d, prelude::*, tensor::activation::sigmoid};

use super::modules::pointwise;

/// Predicts whether each class is present anywhere in the image.
///
/// Each class scores every location from its coarse mask and the merged
/// embeddings; the strongest location decides the presence probability.
#[derive(Module, Debug)]
pub struct Classifiers<B: Backend> {
    scorers: Vec<Conv2d<B>>,
}

impl<B: Backend> Classifiers<B> {
    pub fn new(num_classes: usize, embedding_channels: usize, device: &B::Device) -> Self {
        let scorers = (0..num_classes)
            .map(|_| pointwise(embedding_channels + 1, 1, device))
            .collect();
        Self { scorers }
    }

    /// Returns presence probabilities with shape `[B, C]`.
    pub fn forward(
        &self,
        predicted_masks: Tensor<B, 4>,
        embeddings_merged: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch_size, _, height, width] = predicted_masks.dims();

        let scores = self
            .scorers
            .iter()
            .enumerate()
            .map(|(class_index, scorer)| {
                let mask = predicted_masks.clone().narrow(1, class_index, 1);
                let input = Tensor::cat(vec![mask, embeddings_merged.clone()], 1);
                scorer
                    .forward(input)
                    .reshape([batch_size, 1, height * width])
                    .max_dim(2)
                    .reshape([batch_size, 1])
            })
            .collect();

        sigmoid(Tensor::cat(scores, 1))
    }
}
