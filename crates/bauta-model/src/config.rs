//! Configuration for the Bauta network.

use burn::prelude::*;

use crate::{
    error::{BautaError, BautaResult},
    models::Bauta,
};

/// Main configuration for the Bauta model.
///
/// The defaults reproduce the recipe the trainer uses when a model is reset:
/// 32 embedding channels, a 5x5 mask detector kernel and 15 channels per
/// class in the mask embeddings.
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Number of object classes, one mask channel per class.
    pub num_classes: usize,
    /// Channels produced by every backbone stage and by the embedding merge.
    #[config(default = 32)]
    pub embedding_channels: usize,
    /// Kernel size of the per-class mask detectors. Must be odd.
    #[config(default = 5)]
    pub mask_detector_kernel: usize,
    /// Channels of each class's mask embedding, also used inside the refiners.
    #[config(default = 15)]
    pub mask_embedding_channels: usize,
}

impl ModelConfig {
    /// Total downsampling between the input and the coarse predicted masks.
    pub const OUTPUT_STRIDE: usize = 16;

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BautaError::InvalidConfiguration`] when a size is zero or the
    /// mask detector kernel is even.
    pub fn validate(&self) -> BautaResult<()> {
        if self.num_classes == 0 {
            return Err(BautaError::InvalidConfiguration {
                reason: "num_classes must be greater than 0".to_string(),
            });
        }
        if self.embedding_channels == 0 || self.mask_embedding_channels == 0 {
            return Err(BautaError::InvalidConfiguration {
                reason: format!(
                    "channel counts must be greater than 0, got embedding_channels={} mask_embedding_channels={}",
                    self.embedding_channels, self.mask_embedding_channels
                ),
            });
        }
        if self.mask_detector_kernel % 2 == 0 {
            return Err(BautaError::InvalidConfiguration {
                reason: format!(
                    "mask_detector_kernel must be odd, got {}",
                    self.mask_detector_kernel
                ),
            });
        }
        Ok(())
    }

    /// Initializes a [`Bauta`] model on the given device.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn init<B: Backend>(&self, device: &B::Device) -> BautaResult<Bauta<B>> {
        self.validate()?;
        Ok(Bauta::new(self, device))
    }
}
