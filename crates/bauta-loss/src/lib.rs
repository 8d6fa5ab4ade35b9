//! Loss functions for Bauta training.
//!
//! - **[`FocalLoss`]**: focal loss for class-imbalanced binary masks, with
//!   `forward` (mean), `forward_with_reduction` and `forward_no_reduction`
//!   following Burn's loss conventions.
//! - **[`BautaLoss`]**: the three-headed objective combining coarse mask,
//!   presence classifier and refined mask focal losses into one scalar.

mod bauta_loss;
mod focal;

pub use bauta_loss::{BautaLoss, BautaLossConfig, LossBreakdown, LossValues};
pub use focal::{FocalLoss, FocalLossConfig};

#[cfg(test)]
mod tests {
    use burn::backend::{Autodiff, NdArray};

    pub type TestBackend = NdArray;

    pub type TestAutodiffBackend = Autodiff<TestBackend>;
}
