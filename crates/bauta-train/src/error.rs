//! Error types specific to the bauta-train crate.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for dataset operations in bauta-train.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// The dataset configuration file is missing.
    #[error("Dataset configuration not found: {path}")]
    ConfigurationNotFound {
        /// The expected `config.json` path.
        path: PathBuf,
    },

    /// The dataset configuration could not be parsed.
    #[error("Failed to load dataset configuration {path}: {reason}")]
    ConfigurationInvalid {
        /// The configuration file path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The split directory (`dataset/train` or `dataset/test`) is missing.
    #[error("Dataset split directory not found: {path}")]
    SplitDirectoryNotFound {
        /// The expected split directory.
        path: PathBuf,
    },

    /// Walking the split directory failed.
    #[error("Failed to read directory: {path}")]
    DirectoryReadFailed {
        /// The directory being walked.
        path: PathBuf,
        /// The underlying walk error.
        #[source]
        source: walkdir::Error,
    },

    /// No sample directory with an input image was found.
    #[error("No samples found in: {path}")]
    NoSamples {
        /// The split directory that was scanned.
        path: PathBuf,
    },

    /// Opening or decoding an image file failed.
    #[error("Failed to open image: {path}")]
    ImageOpenFailed {
        /// The image file path.
        path: PathBuf,
        /// The underlying image error.
        #[source]
        source: image::ImageError,
    },

    /// A sample could not be loaded while iterating a data loader.
    #[error("Failed to load sample {sample}: {reason}")]
    SampleLoadFailed {
        /// The sample directory.
        sample: PathBuf,
        /// The rendered loading error.
        reason: String,
    },
}

/// A specialized `Result` type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;
