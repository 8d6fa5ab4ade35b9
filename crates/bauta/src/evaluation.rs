//! Averaging of evaluation losses and the choice of the value that drives
//! checkpointing.

use bauta_loss::LossValues;
use burn::config::Config;

use crate::error::{TrainingError, TrainingResult};

/// Which evaluation average decides whether the model improved.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum SelectionMetric {
    /// Average refined mask loss.
    Refiner,
    /// Average total loss.
    Total,
}

impl SelectionMetric {
    /// Picks the selected average out of `averages`.
    pub const fn select(&self, averages: &LossValues) -> f64 {
        match self {
            Self::Refiner => averages.refiner,
            Self::Total => averages.total,
        }
    }
}

/// Running sum of the four losses over one evaluation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct LossAccumulator {
    sum: LossValues,
    iterations: usize,
}

impl LossAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the losses of one batch.
    pub fn add(&mut self, values: LossValues) {
        self.sum.total += values.total;
        self.sum.mask += values.mask;
        self.sum.classifier += values.classifier;
        self.sum.refiner += values.refiner;
        self.iterations += 1;
    }

    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    /// Per-batch mean of every loss.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::EmptyValidationSet`] when no batch was added.
    pub fn average(&self) -> TrainingResult<LossValues> {
        if self.iterations == 0 {
            return Err(TrainingError::EmptyValidationSet);
        }
        let n = self.iterations as f64;
        Ok(LossValues {
            total: self.sum.total / n,
            mask: self.sum.mask / n,
            classifier: self.sum.classifier / n,
            refiner: self.sum.refiner / n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(total: f64, mask: f64, classifier: f64, refiner: f64) -> LossValues {
        LossValues {
            total,
            mask,
            classifier,
            refiner,
        }
    }

    #[test]
    fn average_is_the_arithmetic_mean_per_batch() {
        let mut accumulator = LossAccumulator::new();
        accumulator.add(values(1.0, 0.5, 0.1, 0.4));
        accumulator.add(values(2.0, 1.0, 0.2, 0.8));
        accumulator.add(values(3.0, 1.5, 0.3, 1.2));

        let average = accumulator.average().unwrap();

        assert_eq!(accumulator.iterations(), 3);
        assert!((average.total - 2.0).abs() < 1e-12);
        assert!((average.mask - 1.0).abs() < 1e-12);
        assert!((average.classifier - 0.2).abs() < 1e-12);
        assert!((average.refiner - 0.8).abs() < 1e-12);
    }

    #[test]
    fn empty_pass_is_an_error() {
        let accumulator = LossAccumulator::new();

        assert!(matches!(
            accumulator.average(),
            Err(TrainingError::EmptyValidationSet)
        ));
    }

    #[test]
    fn selection_metric_picks_the_configured_average() {
        let averages = values(1.5, 0.5, 0.2, 0.8);

        assert_eq!(SelectionMetric::Refiner.select(&averages), 0.8);
        assert_eq!(SelectionMetric::Total.select(&averages), 1.5);
    }
}
