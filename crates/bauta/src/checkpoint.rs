//! Checkpoint storage and best-model tracking.
//!
//! Checkpoints live under `<data_path>/models/`. Each one is a Burn record
//! (`<name>.mpk`) next to the [`ModelConfig`] that built it
//! (`<name>.json`), so a model can be rebuilt without the dataset.

use std::{
    fs,
    path::{Path, PathBuf},
};

use bauta_model::{Bauta, ModelConfig};
use burn::{
    config::Config,
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};
use serde::{Deserialize, Serialize};

use crate::error::{TrainingError, TrainingResult};

/// Named model files under `<data_path>/models/`.
#[derive(Debug, Clone)]
pub struct Environment {
    models_dir: PathBuf,
}

impl Environment {
    /// Name of the best model checkpoint.
    pub const BEST_MODEL_FILE: &'static str = "best_model";
    /// File holding the evaluation history of the current run.
    pub const HISTORY_FILE: &'static str = "test_loss_history.json";

    pub fn new(data_path: impl AsRef<Path>) -> Self {
        Self {
            models_dir: data_path.as_ref().join("models"),
        }
    }

    /// Name of the backup saved at the end of `epoch` (1-based).
    pub fn backup_file(epoch: usize) -> String {
        format!("{epoch}.backup")
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Path of the record file of checkpoint `name`.
    pub fn model_path(&self, name: &str) -> PathBuf {
        // The recorder replaces the last extension, so "1.backup" keeps its suffix.
        self.models_dir.join(format!("{name}.mpk"))
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(format!("{name}.json"))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.model_path(name).is_file()
    }

    /// Saves `model` and its configuration as checkpoint `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or a file cannot
    /// be written.
    pub fn save_model<B: Backend>(
        &self,
        model: &Bauta<B>,
        config: &ModelConfig,
        name: &str,
    ) -> TrainingResult<PathBuf> {
        fs::create_dir_all(&self.models_dir).map_err(|e| TrainingError::File {
            path: self.models_dir.clone(),
            reason: e.to_string(),
        })?;

        let config_path = self.config_path(name);
        config.save(&config_path).map_err(|e| TrainingError::File {
            path: config_path,
            reason: e.to_string(),
        })?;

        let path = self.model_path(name);
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(path.clone(), &recorder)
            .map_err(|source| TrainingError::Recorder {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), "checkpoint saved");
        Ok(path)
    }

    /// Loads checkpoint `name` onto `device`.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::CheckpointNotFound`] if the record is missing,
    /// or an error if the configuration or record cannot be read.
    pub fn load_model<B: Backend>(
        &self,
        name: &str,
        device: &B::Device,
    ) -> TrainingResult<(Bauta<B>, ModelConfig)> {
        let path = self.model_path(name);
        if !path.is_file() {
            return Err(TrainingError::CheckpointNotFound { path });
        }

        let config_path = self.config_path(name);
        let config = ModelConfig::load(&config_path).map_err(|e| TrainingError::File {
            path: config_path,
            reason: e.to_string(),
        })?;

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let model = config
            .init::<B>(device)?
            .load_file(path.clone(), &recorder, device)
            .map_err(|source| TrainingError::Recorder { path, source })?;

        Ok((model, config))
    }

    /// Writes the evaluation history as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_history(&self, history: &TestLossHistory) -> TrainingResult<()> {
        let path = self.models_dir.join(Self::HISTORY_FILE);
        let to_error = |reason: String| TrainingError::File {
            path: path.clone(),
            reason,
        };
        fs::create_dir_all(&self.models_dir).map_err(|e| to_error(e.to_string()))?;
        let json = serde_json::to_string_pretty(history).map_err(|e| to_error(e.to_string()))?;
        fs::write(&path, json).map_err(|e| to_error(e.to_string()))
    }
}

/// Total-loss averages of every evaluation pass, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestLossHistory {
    pub total_losses: Vec<f64>,
}

/// Relative change between the best and the current loss, in percent.
///
/// Positive when `current` is lower than `best`.
pub fn improvement_change(best: f64, current: f64) -> f64 {
    100.0 * (best - current) / current
}

/// Result of comparing an evaluation loss with the best one so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Improvement {
    /// `current` beat `previous` and is now the best loss.
    Improved {
        previous: f64,
        current: f64,
        change: f64,
    },
    /// `current` did not beat `best`, which is unchanged.
    NotImproved { best: f64, current: f64, change: f64 },
}

impl Improvement {
    pub const fn is_improved(&self) -> bool {
        matches!(self, Self::Improved { .. })
    }
}

/// Best evaluation loss of the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImprovementTracker {
    best: f64,
}

impl ImprovementTracker {
    /// Starts tracking from the baseline loss.
    pub const fn new(initial: f64) -> Self {
        Self { best: initial }
    }

    pub const fn best(&self) -> f64 {
        self.best
    }

    /// Compares `current` with the best loss, replacing it only when strictly lower.
    pub fn observe(&mut self, current: f64) -> Improvement {
        let change = improvement_change(self.best, current);
        if current < self.best {
            let previous = self.best;
            self.best = current;
            Improvement::Improved {
                previous,
                current,
                change,
            }
        } else {
            Improvement::NotImproved {
                best: self.best,
                current,
                change,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bauta_model::SegmentationModel;
    use burn::{
        backend::NdArray,
        tensor::{Distribution, Tensor, Tolerance},
    };

    use super::*;

    type TestBackend = NdArray;

    #[test]
    fn lower_loss_is_an_improvement() {
        let mut tracker = ImprovementTracker::new(0.5);

        let result = tracker.observe(0.4);

        assert!(result.is_improved());
        assert_eq!(tracker.best(), 0.4);
        let Improvement::Improved { change, .. } = result else {
            unreachable!()
        };
        assert!((change - 25.0).abs() < 1e-9);
    }

    #[test]
    fn higher_loss_keeps_the_best() {
        let mut tracker = ImprovementTracker::new(0.5);

        let result = tracker.observe(0.6);

        assert!(!result.is_improved());
        assert_eq!(tracker.best(), 0.5);
        assert!((improvement_change(0.5, 0.6) + 16.666_666).abs() < 1e-4);
    }

    #[test]
    fn equal_loss_is_not_an_improvement() {
        let mut tracker = ImprovementTracker::new(0.5);

        assert!(!tracker.observe(0.5).is_improved());
    }

    #[test]
    fn backup_names_keep_their_suffix() {
        let environment = Environment::new("/data");

        assert_eq!(Environment::backup_file(3), "3.backup");
        assert_eq!(
            environment.model_path(&Environment::backup_file(3)),
            PathBuf::from("/data/models/3.backup.mpk")
        );
    }

    #[test]
    fn saved_model_loads_with_identical_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let environment = Environment::new(dir.path());
        let device = Default::default();
        let config = ModelConfig::new(2)
            .with_embedding_channels(4)
            .with_mask_embedding_channels(3)
            .with_mask_detector_kernel(3);
        let model = config.init::<TestBackend>(&device).unwrap();

        environment
            .save_model(&model, &config, Environment::BEST_MODEL_FILE)
            .unwrap();
        assert!(environment.exists(Environment::BEST_MODEL_FILE));

        let (loaded, loaded_config) = environment
            .load_model::<TestBackend>(Environment::BEST_MODEL_FILE, &device)
            .unwrap();
        assert_eq!(loaded_config.num_classes, 2);
        assert_eq!(loaded_config.embedding_channels, 4);

        let images =
            Tensor::<TestBackend, 4>::random([1, 3, 32, 32], Distribution::Default, &device);
        let expected = model.forward(images.clone()).predicted_masks.into_data();
        let actual = loaded.forward(images).predicted_masks.into_data();
        actual.assert_approx_eq::<f32>(&expected, Tolerance::default());
    }

    #[test]
    fn missing_checkpoint_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let environment = Environment::new(dir.path());

        let result = environment.load_model::<TestBackend>("missing", &Default::default());

        assert!(matches!(
            result,
            Err(TrainingError::CheckpointNotFound { .. })
        ));
    }

    #[test]
    fn history_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let environment = Environment::new(dir.path());
        let history = TestLossHistory {
            total_losses: vec![0.5, 0.25],
        };

        environment.save_history(&history).unwrap();

        let json = fs::read_to_string(environment.models_dir().join(Environment::HISTORY_FILE))
            .unwrap();
        let parsed: TestLossHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, history);
    }
}
