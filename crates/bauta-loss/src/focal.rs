//! Focal loss for binary masks.
//!
//! For a predicted probability `p` and a binary target `t` the loss is:
//!
//! ```text
//! q    = p * t + (p - 1) * (t - 1)      probability assigned to the true label
//! loss = -ln(clamp(q, min, max)) * |1 - q|
//! ```
//!
//! The modulating factor `|1 - q|` is detached from the graph, so confident
//! correct predictions contribute almost nothing while hard pixels dominate
//! the gradient.

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    nn::loss::Reduction,
    tensor::{backend::Backend, Tensor},
};

/// Configuration for creating a [Focal loss](FocalLoss).
#[derive(Config, Debug)]
pub struct FocalLossConfig {
    /// Lower clamp applied before the logarithm. Default: 0.001
    #[config(default = 0.001)]
    pub min_probability: f64,

    /// Upper clamp applied before the logarithm. Default: 1.0
    #[config(default = 1.0)]
    pub max_probability: f64,
}

impl FocalLossConfig {
    /// Initialize [Focal loss](FocalLoss).
    pub fn init(&self) -> FocalLoss {
        self.assertions();
        FocalLoss {
            min_probability: self.min_probability,
            max_probability: self.max_probability,
        }
    }

    fn assertions(&self) {
        assert!(
            self.min_probability > 0.0,
            "Minimum probability for FocalLoss must be positive, got {}",
            self.min_probability
        );
        assert!(
            self.min_probability < self.max_probability && self.max_probability <= 1.0,
            "Maximum probability for FocalLoss must be in ({}, 1.0], got {}",
            self.min_probability,
            self.max_probability
        );
    }
}

/// Focal loss for class-imbalanced binary masks.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct FocalLoss {
    /// Lower clamp applied before the logarithm.
    pub min_probability: f64,
    /// Upper clamp applied before the logarithm.
    pub max_probability: f64,
}

impl Default for FocalLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for FocalLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("min_probability", &self.min_probability)
            .add("max_probability", &self.max_probability)
            .optional()
    }
}

impl FocalLoss {
    /// Create a new focal loss with default configuration.
    pub fn new() -> Self {
        FocalLossConfig::new().init()
    }

    /// Compute the mean focal loss.
    ///
    /// # Shapes
    ///
    /// - predictions: `[...dims]` probabilities in `[0, 1]`
    /// - targets: `[...dims]` binary values (same shape as predictions)
    /// - output: `[1]`
    pub fn forward<const D: usize, B: Backend>(
        &self,
        predictions: Tensor<B, D>,
        targets: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        self.forward_with_reduction(predictions, targets, Reduction::Mean)
    }

    /// Compute the focal loss with an explicit reduction.
    pub fn forward_with_reduction<const D: usize, B: Backend>(
        &self,
        predictions: Tensor<B, D>,
        targets: Tensor<B, D>,
        reduction: Reduction,
    ) -> Tensor<B, 1> {
        let loss = self.forward_no_reduction(predictions, targets);
        match reduction {
            Reduction::Mean | Reduction::Auto => loss.mean(),
            Reduction::Sum => loss.sum(),
        }
    }

    /// Compute the element-wise focal loss.
    ///
    /// # Shapes
    ///
    /// - predictions: `[...dims]`
    /// - targets: `[...dims]`
    /// - output: `[...dims]`
    pub fn forward_no_reduction<const D: usize, B: Backend>(
        &self,
        predictions: Tensor<B, D>,
        targets: Tensor<B, D>,
    ) -> Tensor<B, D> {
        self.assertions(&predictions, &targets);

        let foreground = predictions.clone() * targets.clone();
        let background = predictions.sub_scalar(1.0) * targets.sub_scalar(1.0);
        let probabilities = foreground + background;

        let modulating_factor = probabilities.clone().neg().add_scalar(1.0).abs().detach();
        let log_likelihood = probabilities
            .clamp(self.min_probability, self.max_probability)
            .log()
            .neg();

        log_likelihood * modulating_factor
    }

    fn assertions<const D: usize, B: Backend>(
        &self,
        predictions: &Tensor<B, D>,
        targets: &Tensor<B, D>,
    ) {
        let pred_dims = predictions.dims();
        let target_dims = targets.dims();
        assert_eq!(
            pred_dims, target_dims,
            "Shape of predictions ({pred_dims:?}) must match targets ({target_dims:?})"
        );
    }
}
