//! Error types for the training loop.

use std::path::PathBuf;

use bauta_model::BautaError;
use bauta_train::DatasetError;
use burn::record::RecorderError;
use thiserror::Error;

/// Errors raised while training or evaluating a Bauta model.
#[derive(Error, Debug)]
pub enum TrainingError {
    /// An evaluation pass produced no batch to average over.
    #[error("Evaluation ran over an empty validation set")]
    EmptyValidationSet,

    /// The requested checkpoint does not exist.
    #[error("Checkpoint not found: {path}")]
    CheckpointNotFound { path: PathBuf },

    /// Saving or loading a checkpoint failed.
    #[error("Failed to record checkpoint {path}: {source}")]
    Recorder {
        path: PathBuf,
        #[source]
        source: RecorderError,
    },

    /// Reading or writing a configuration or history file failed.
    #[error("Failed to access {path}: {reason}")]
    File { path: PathBuf, reason: String },

    /// Writing a visual logging image failed.
    #[error("Failed to write visual log {path}")]
    VisualLog {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The training configuration is not usable.
    #[error("Invalid training configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Model(#[from] BautaError),
}

/// A specialized `Result` type for training operations.
pub type TrainingResult<T> = Result<T, TrainingError>;
