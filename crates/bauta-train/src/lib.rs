//! Data pipeline for Bauta training.
//!
//! - [`DatasetConfiguration`]: classes and image size read from `config.json`.
//! - [`SegmentationDataset`]: samples of one split, decoded, augmented and
//!   resized on access.
//! - [`SegmentationBatcher`]: stacks items into a [`bauta_model::BautaBatch`],
//!   deriving class presence and bounding boxes.
//! - [`ChunkedDataset`]: groups consecutive samples so that each loader item
//!   is a whole batch.

pub mod augmentation;
pub mod bounding_box;
pub mod chunks;
pub mod config;
pub mod dataset;
pub mod error;

pub use augmentation::{AugmentationConfig, AugmentationMethod, ImageAugmentor};
pub use bounding_box::BoundingBox;
pub use chunks::ChunkedDataset;
pub use config::DatasetConfiguration;
pub use dataset::{
    LoadedBatch, SampleFailure, SampleOutcome, SegmentationBatcher, SegmentationDataset,
    SegmentationItem, INPUT_IMAGE_FILE,
};
pub use error::{DatasetError, DatasetResult};

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    pub type TestBackend = NdArray;
}
