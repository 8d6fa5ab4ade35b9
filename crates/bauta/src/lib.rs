//! Bauta: training of an instance-segmentation network.
//!
//! This crate ties the model, loss and dataset crates together into the
//! training loop and the `bauta` command line tool.

pub mod backend;
pub mod checkpoint;
pub mod cli;
pub mod error;
pub mod evaluation;
pub mod training;
pub mod visual;

#[doc(inline)]
pub use bauta_loss as loss;
#[doc(inline)]
pub use bauta_model as model;
#[doc(inline)]
pub use bauta_train as train;
pub use error::{TrainingError, TrainingResult};
pub use training::{run_training, Trainer, TrainingConfig};
