//! # Bauta model
//!
//! Burn implementation of the Bauta instance-segmentation network.
//!
//! ## Modules
//!
//! - `config`: the [`ModelConfig`] used to build a [`Bauta`] model.
//! - `error`: the [`BautaError`] enum.
//! - `models`: backbone, mask detectors, classifiers and mask refiners.
//! - `training`: batch and output types plus the [`SegmentationModel`] trait
//!   that the training loop is written against.

mod config;
mod error;
mod models;

pub mod training;

#[doc(inline)]
pub use config::ModelConfig;
#[doc(inline)]
pub use error::{BautaError, BautaResult};
#[doc(inline)]
pub use models::{Bauta, BautaRecord};
#[doc(inline)]
pub use training::{BautaBatch, ModelOutput, SegmentationModel};
