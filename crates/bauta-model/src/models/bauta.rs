//! # Bauta Model
//!
//! The network combines a small convolutional backbone with three kinds of
//! per-class heads:
//!
//! - mask detectors predicting coarse masks at 1/16 of the input resolution,
//! - classifiers predicting whether each class is present at all,
//! - mask refiners upsampling the coarse masks to 1/2 of the input resolution
//!   with help from the intermediate backbone embeddings.

use burn::prelude::*;

use super::{Backbone, Classifiers, MaskDetectors, MaskRefiners};
use crate::{
    config::ModelConfig,
    error::{BautaError, BautaResult},
    training::{ModelOutput, SegmentationModel},
};

/// The Bauta instance-segmentation network.
#[derive(Module, Debug)]
pub struct Bauta<B: Backend> {
    backbone: Backbone<B>,
    mask_detectors: MaskDetectors<B>,
    classifiers: Classifiers<B>,
    mask_refiners: MaskRefiners<B>,
    num_classes: usize,
}

impl<B: Backend> Bauta<B> {
    pub(crate) fn new(config: &ModelConfig, device: &B::Device) -> Self {
        Self {
            backbone: Backbone::new(config.embedding_channels, device),
            mask_detectors: MaskDetectors::new(
                config.num_classes,
                config.embedding_channels,
                config.mask_embedding_channels,
                config.mask_detector_kernel,
                device,
            ),
            classifiers: Classifiers::new(config.num_classes, config.embedding_channels, device),
            mask_refiners: MaskRefiners::new(
                config.num_classes,
                config.embedding_channels,
                config.mask_embedding_channels,
                device,
            ),
            num_classes: config.num_classes,
        }
    }

    /// Checks that an image batch can be processed by the network.
    ///
    /// # Errors
    ///
    /// Returns [`BautaError::InvalidInputShape`] unless the input has 3 channels
    /// and a height and width divisible by 16.
    pub fn check_input(&self, input_size: [usize; 4]) -> BautaResult<()> {
        let [_, channels, height, width] = input_size;
        let stride = ModelConfig::OUTPUT_STRIDE;
        if channels != 3 || height % stride != 0 || width % stride != 0 || height == 0 || width == 0
        {
            return Err(BautaError::InvalidInputShape {
                expected: format!("[B, 3, H, W] with H and W non-zero multiples of {stride}"),
                actual: format!("{input_size:?}"),
            });
        }
        Ok(())
    }
}

impl<B: Backend> SegmentationModel<B> for Bauta<B> {
    fn forward(&self, images: Tensor<B, 4>) -> ModelOutput<B> {
        let features = self.backbone.forward(images);
        let (predicted_masks, mask_embeddings) = self
            .mask_detectors
            .forward(features.embeddings_merged.clone());

        ModelOutput {
            predicted_masks,
            mask_embeddings,
            embeddings_merged: features.embeddings_merged,
            embeddings_2: features.embeddings_2,
            embeddings_4: features.embeddings_4,
            embeddings_8: features.embeddings_8,
        }
    }

    fn classify(
        &self,
        predicted_masks: Tensor<B, 4>,
        embeddings_merged: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        self.classifiers.forward(predicted_masks, embeddings_merged)
    }

    fn refine(&self, input_size: [usize; 4], output: &ModelOutput<B>) -> Tensor<B, 4> {
        self.mask_refiners.forward(input_size, output)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use burn::{backend::NdArray, tensor::Distribution};

    use super::*;

    type TestBackend = NdArray<f32>;

    fn tiny_model(num_classes: usize) -> Bauta<TestBackend> {
        ModelConfig::new(num_classes)
            .with_embedding_channels(4)
            .with_mask_embedding_channels(3)
            .with_mask_detector_kernel(3)
            .init(&Default::default())
            .expect("valid configuration")
    }

    #[test]
    fn forward_produces_six_outputs_with_expected_shapes() {
        let device = Default::default();
        let model = tiny_model(2);
        let images =
            Tensor::<TestBackend, 4>::random([1, 3, 32, 64], Distribution::Default, &device);

        let output = model.forward(images);

        assert_eq!(output.predicted_masks.dims(), [1, 2, 2, 4]);
        assert_eq!(output.mask_embeddings.dims(), [1, 6, 2, 4]);
        assert_eq!(output.embeddings_merged.dims(), [1, 4, 2, 4]);
        assert_eq!(output.embeddings_2.dims(), [1, 4, 16, 32]);
        assert_eq!(output.embeddings_4.dims(), [1, 4, 8, 16]);
        assert_eq!(output.embeddings_8.dims(), [1, 4, 4, 8]);
    }

    #[test]
    fn heads_produce_probabilities() {
        let device = Default::default();
        let model = tiny_model(3);
        let images =
            Tensor::<TestBackend, 4>::random([2, 3, 32, 32], Distribution::Default, &device);
        let input_size = images.dims();

        let output = model.forward(images);
        let presence = model.classify(
            output.predicted_masks.clone(),
            output.embeddings_merged.clone(),
        );
        let refined = model.refine(input_size, &output);

        assert_eq!(presence.dims(), [2, 3]);
        assert_eq!(refined.dims(), [2, 3, 16, 16]);

        let values = refined.into_data().to_vec::<f32>().expect("f32 data");
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
        let values = presence.into_data().to_vec::<f32>().expect("f32 data");
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn check_input_rejects_sizes_not_divisible_by_stride() {
        let model = tiny_model(1);

        assert!(model.check_input([1, 3, 32, 48]).is_ok());
        assert!(matches!(
            model.check_input([1, 3, 30, 32]),
            Err(BautaError::InvalidInputShape { .. })
        ));
        assert!(model.check_input([1, 1, 32, 32]).is_err());
    }

    #[test]
    fn num_classes_matches_configuration() {
        assert_eq!(tiny_model(4).num_classes(), 4);
    }
}
