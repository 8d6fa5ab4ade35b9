//! Command line arguments of `bauta train`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::config::Config;
use clap::Args;

use crate::training::TrainingConfig;

/// Arguments of the training subcommand.
///
/// Values given on the command line override those of `--config`; anything
/// left unset falls back to the file, then to the defaults.
#[derive(Args, Debug, Default)]
pub struct TrainArgs {
    /// Training configuration file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Data path holding config.json, dataset/ and models/ [default: current directory]
    #[arg(long)]
    pub data_path: Option<String>,

    /// Dump batches and predictions as PNG files under <data_path>/visual_logging/
    #[arg(long)]
    pub visual_logging: bool,

    /// Reset model (start from scratch)
    #[arg(long)]
    pub reset_model: bool,

    /// Number of epochs [default: 10000]
    #[arg(long)]
    pub num_epochs: Option<usize>,

    /// Batch size [default: 16]
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Learning rate [default: 0.0001]
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Momentum [default: 0.9]
    #[arg(long)]
    pub momentum: Option<f64>,

    /// Only learn coarse masks and classes, suitable for initial training
    #[arg(long)]
    pub only_mask: bool,

    /// Randomly crop training samples (up to 10% per border)
    #[arg(long)]
    pub random_crop: bool,

    /// GPU index [default: 0]
    #[arg(long)]
    pub gpu: Option<usize>,

    /// Maximum number of test samples used for evaluation
    #[arg(long)]
    pub test_samples: Option<usize>,
}

impl TrainArgs {
    /// Merges the arguments with the configuration file, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be loaded or the
    /// resulting configuration is invalid.
    pub fn resolve(self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::load(path).with_context(|| {
                format!("failed to load training configuration {}", path.display())
            })?,
            None => TrainingConfig::new(".".to_string()),
        };

        if let Some(data_path) = self.data_path {
            config.data_path = data_path;
        }
        config.visual_logging |= self.visual_logging;
        config.reset_model |= self.reset_model;
        config.only_mask |= self.only_mask;
        config.random_crop |= self.random_crop;
        if let Some(num_epochs) = self.num_epochs {
            config.num_epochs = num_epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.learning_rate = learning_rate;
        }
        if let Some(momentum) = self.momentum {
            config.momentum = momentum;
        }
        if let Some(gpu) = self.gpu {
            config.gpu = gpu;
        }
        if self.test_samples.is_some() {
            config.test_samples = self.test_samples;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_flags() {
        let config = TrainArgs::default().resolve().unwrap();

        assert_eq!(config.data_path, ".");
        assert_eq!(config.num_epochs, 10000);
        assert_eq!(config.batch_size, 16);
        assert!(!config.only_mask);
    }

    #[test]
    fn flags_override_the_configuration_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training.json");
        TrainingConfig::new("from_file".to_string())
            .with_batch_size(4)
            .with_num_epochs(3)
            .save(&path)
            .unwrap();

        let args = TrainArgs {
            config: Some(path),
            batch_size: Some(8),
            only_mask: true,
            random_crop: true,
            test_samples: Some(10),
            ..TrainArgs::default()
        };
        let config = args.resolve().unwrap();

        assert_eq!(config.data_path, "from_file");
        assert_eq!(config.num_epochs, 3);
        assert_eq!(config.batch_size, 8);
        assert!(config.only_mask);
        assert!(config.random_crop);
        assert_eq!(config.test_samples, Some(10));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let args = TrainArgs {
            batch_size: Some(0),
            ..TrainArgs::default()
        };

        assert!(args.resolve().is_err());
    }
}
