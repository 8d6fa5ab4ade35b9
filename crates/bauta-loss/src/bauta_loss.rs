//! Three-headed Bauta training loss.
//!
//! Combines the focal losses of the coarse mask head, the presence
//! classifiers and the mask refiners:
//!
//! ```text
//! mask       = focal(predicted_masks, avg_pool_16(target))
//! classifier = focal(presence_predictions, any(target > 0)) * 0.1
//! refiner    = focal(refined_masks, avg_pool_2(target))
//! total      = mask + classifier + refiner
//! ```

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    nn::pool::{AvgPool2d, AvgPool2dConfig},
    tensor::{backend::Backend, cast::ToElement, Tensor},
};

use crate::focal::{FocalLoss, FocalLossConfig};

/// Configuration for the three-headed [`BautaLoss`].
#[derive(Config, Debug)]
pub struct BautaLossConfig {
    /// Focal loss shared by all three heads.
    #[config(default = "FocalLossConfig::new()")]
    pub focal: FocalLossConfig,

    /// Weight applied to the classifier loss. Default: 0.1
    #[config(default = 0.1)]
    pub classifier_weight: f64,

    /// Downsampling between the target mask and the coarse predicted masks. Default: 16
    #[config(default = 16)]
    pub mask_scale: usize,

    /// Downsampling between the target mask and the refined masks. Default: 2
    #[config(default = 2)]
    pub refiner_scale: usize,

    /// Leave the refiner loss out of the total so only the coarse heads learn.
    #[config(default = false)]
    pub mask_only: bool,
}

impl BautaLossConfig {
    /// Initialize the [`BautaLoss`].
    pub fn init(&self) -> BautaLoss {
        self.assertions();

        let pool = |scale: usize| {
            AvgPool2dConfig::new([scale, scale])
                .with_strides([scale, scale])
                .init()
        };

        BautaLoss {
            focal: self.focal.init(),
            mask_pool: pool(self.mask_scale),
            refiner_pool: pool(self.refiner_scale),
            classifier_weight: self.classifier_weight,
            mask_only: self.mask_only,
        }
    }

    fn assertions(&self) {
        assert!(
            self.classifier_weight >= 0.0,
            "Classifier weight for BautaLoss must be non-negative, got {}",
            self.classifier_weight
        );
        assert!(
            self.mask_scale > 0 && self.refiner_scale > 0,
            "Scales for BautaLoss must be positive, got mask_scale={} refiner_scale={}",
            self.mask_scale,
            self.refiner_scale
        );
    }
}

/// The four loss values of one batch, as tensors.
#[derive(Debug, Clone)]
pub struct LossBreakdown<B: Backend> {
    /// Objective to back-propagate.
    pub total: Tensor<B, 1>,
    /// Coarse mask loss.
    pub mask: Tensor<B, 1>,
    /// Classifier loss, already weighted.
    pub classifier: Tensor<B, 1>,
    /// Refined mask loss.
    pub refiner: Tensor<B, 1>,
}

impl<B: Backend> LossBreakdown<B> {
    /// Reads the four losses back as plain numbers.
    pub fn values(&self) -> LossValues {
        let read = |tensor: &Tensor<B, 1>| tensor.clone().into_scalar().to_f64();
        LossValues {
            total: read(&self.total),
            mask: read(&self.mask),
            classifier: read(&self.classifier),
            refiner: read(&self.refiner),
        }
    }
}

/// The four loss values of one batch, or their averages over many batches.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossValues {
    /// Sum of the heads that are trained.
    pub total: f64,
    /// Coarse mask loss at 1/16 resolution.
    pub mask: f64,
    /// Presence classifier loss, already weighted.
    pub classifier: f64,
    /// Refined mask loss at 1/2 resolution.
    pub refiner: f64,
}

/// Three-headed focal loss used to train Bauta.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct BautaLoss {
    focal: FocalLoss,
    mask_pool: AvgPool2d,
    refiner_pool: AvgPool2d,
    /// Weight applied to the classifier loss.
    pub classifier_weight: f64,
    /// Whether the refiner loss is left out of the total.
    pub mask_only: bool,
}

impl Default for BautaLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for BautaLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("classifier_weight", &self.classifier_weight)
            .add("mask_only", &self.mask_only)
            .optional()
    }
}

impl BautaLoss {
    /// Create a new loss with default configuration.
    pub fn new() -> Self {
        BautaLossConfig::new().init()
    }

    /// Computes the three head losses and their total.
    ///
    /// # Shapes
    ///
    /// - predicted_masks: `[B, C, H / 16, W / 16]`
    /// - presence_predictions: `[B, C]`
    /// - refined_masks: `[B, C, H / 2, W / 2]`
    /// - target_masks: `[B, C, H, W]`
    pub fn forward<B: Backend>(
        &self,
        predicted_masks: Tensor<B, 4>,
        presence_predictions: Tensor<B, 2>,
        refined_masks: Tensor<B, 4>,
        target_masks: Tensor<B, 4>,
    ) -> LossBreakdown<B> {
        let mask = self.focal.forward(
            predicted_masks,
            self.mask_pool.forward(target_masks.clone()),
        );

        let classifier = self
            .focal
            .forward(presence_predictions, Self::presence_targets(target_masks.clone()))
            .mul_scalar(self.classifier_weight);

        let refiner = self
            .focal
            .forward(refined_masks, self.refiner_pool.forward(target_masks));

        let total = if self.mask_only {
            mask.clone() + classifier.clone()
        } else {
            mask.clone() + refiner.clone() + classifier.clone()
        };

        LossBreakdown {
            total,
            mask,
            classifier,
            refiner,
        }
    }

    /// Binary presence targets `[B, C]`: 1 where the class has any pixel above 0.
    pub fn presence_targets<B: Backend>(target_masks: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, num_classes, height, width] = target_masks.dims();
        target_masks
            .reshape([batch_size, num_classes, height * width])
            .sum_dim(2)
            .reshape([batch_size, num_classes])
            .greater_elem(0.0)
            .float()
    }
}
