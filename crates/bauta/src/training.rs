//! The Bauta training loop.
//!
//! [`Trainer::train`] loads or initializes a model, measures the baseline
//! evaluation loss and then, epoch after epoch, optimizes the three-headed
//! loss with Nesterov SGD. The model is evaluated every
//! `validation_interval` batches and at the end of each epoch, and saved as
//! the best model whenever the evaluation loss improves.

use std::sync::Arc;

use anyhow::{Context, Result};
use bauta_loss::{BautaLoss, BautaLossConfig, LossBreakdown, LossValues};
use bauta_model::{Bauta, BautaBatch, ModelConfig, SegmentationModel};
use bauta_train::{
    AugmentationMethod, ChunkedDataset, DatasetConfiguration, DatasetError, LoadedBatch,
    SegmentationBatcher, SegmentationDataset,
};
use burn::{
    backend::Autodiff,
    config::Config,
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{momentum::MomentumConfig, GradientsParams, Optimizer, SgdConfig},
    tensor::{backend::Backend, Tensor},
};

use crate::{
    backend::{create_device, get_backend_name, SelectedBackend},
    checkpoint::{Environment, Improvement, ImprovementTracker, TestLossHistory},
    error::{TrainingError, TrainingResult},
    evaluation::{LossAccumulator, SelectionMetric},
    visual::VisualLogger,
};

/// Training configuration for Bauta.
///
/// Loaded from a JSON file via [`TrainingConfig::load`]; command line flags
/// override the file values.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Directory holding `config.json`, `dataset/` and `models/`.
    pub data_path: String,

    /// Dump batches and predictions as PNG files under `visual_logging/`.
    #[config(default = false)]
    pub visual_logging: bool,

    /// Start from a freshly initialized model instead of the best checkpoint.
    #[config(default = false)]
    pub reset_model: bool,

    #[config(default = 10000)]
    pub num_epochs: usize,

    #[config(default = 16)]
    pub batch_size: usize,

    #[config(default = 1e-4)]
    pub learning_rate: f64,

    /// Nesterov momentum of the SGD optimizer.
    #[config(default = 0.9)]
    pub momentum: f64,

    /// Train only the coarse mask and classifier heads.
    #[config(default = false)]
    pub only_mask: bool,

    /// Index of the GPU to train on.
    #[config(default = 0)]
    pub gpu: usize,

    /// Cap on the number of evaluation samples.
    #[config(default = "None")]
    pub test_samples: Option<usize>,

    /// Evaluate every this many training batches, besides every epoch end.
    #[config(default = 1000)]
    pub validation_interval: usize,

    /// Evaluation average compared to decide whether the model improved.
    #[config(default = "SelectionMetric::Refiner")]
    pub selection_metric: SelectionMetric,

    /// Seed of the training augmentations.
    #[config(default = 42)]
    pub seed: u64,

    /// Randomly crop training samples after the horizontal flip.
    #[config(default = false)]
    pub random_crop: bool,
}

impl TrainingConfig {
    /// Checks that every count and rate is usable.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::InvalidConfiguration`] naming the first bad value.
    pub fn validate(&self) -> TrainingResult<()> {
        let invalid = |reason: String| Err(TrainingError::InvalidConfiguration { reason });
        if self.num_epochs == 0 {
            return invalid("num_epochs must be greater than 0".to_string());
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be greater than 0".to_string());
        }
        if self.validation_interval == 0 {
            return invalid("validation_interval must be greater than 0".to_string());
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return invalid(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            ));
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return invalid(format!("momentum must be in [0, 1), got {}", self.momentum));
        }
        Ok(())
    }

    /// Augmentations applied to training samples.
    pub fn augmentation_methods(&self) -> Vec<AugmentationMethod> {
        let mut methods = vec![AugmentationMethod::Flip];
        if self.random_crop {
            methods.push(AugmentationMethod::Crop);
        }
        methods
    }
}

/// Data loader workers: visual logging needs a single-threaded loader.
pub const fn workers(visual_logging: bool) -> usize {
    if visual_logging {
        0
    } else {
        6
    }
}

/// Losses of one batch together with the predictions they were computed on.
#[derive(Debug, Clone)]
pub struct LossComputation<B: Backend> {
    pub losses: LossBreakdown<B>,
    /// Coarse masks `[B, C, H / 16, W / 16]`.
    pub predicted_masks: Tensor<B, 4>,
    /// Refined masks `[B, C, H / 2, W / 2]`.
    pub refined_masks: Tensor<B, 4>,
}

/// Runs `model` on `batch` and computes the three-headed loss.
pub fn compute_loss<B: Backend, M: SegmentationModel<B>>(
    model: &M,
    loss: &BautaLoss,
    batch: &BautaBatch<B>,
) -> LossComputation<B> {
    let input_size = batch.images.dims();
    let output = model.forward(batch.images.clone());
    let presence = model.classify(
        output.predicted_masks.clone(),
        output.embeddings_merged.clone(),
    );
    let refined_masks = model.refine(input_size, &output);

    let losses = loss.forward(
        output.predicted_masks.clone(),
        presence,
        refined_masks.clone(),
        batch.masks.clone(),
    );

    LossComputation {
        losses,
        predicted_masks: output.predicted_masks,
        refined_masks,
    }
}

fn log_test_loss(averages: &LossValues) {
    tracing::info!(
        total = averages.total,
        classifier = averages.classifier,
        mask = averages.mask,
        refiner = averages.refiner,
        "Test Loss -- Total Loss: {:.4} -- Classifier Loss: {:.4} -- Mask Loss: {:.4} -- Refined Mask Loss: {:.4}",
        averages.total,
        averages.classifier,
        averages.mask,
        averages.refiner,
    );
}

/// Drives training and evaluation of a [`Bauta`] model on backend `B`.
///
/// Gradients are computed on `Autodiff<B>`; evaluation runs the inner model
/// on `B` directly.
pub struct Trainer<B: Backend> {
    config: TrainingConfig,
    classes: Vec<String>,
    model_config: ModelConfig,
    environment: Environment,
    loss: BautaLoss,
    device: B::Device,
    visual: Option<VisualLogger>,
    test_loss_history: Vec<f64>,
}

impl<B: Backend> Trainer<B> {
    /// Prepares a trainer for the dataset under `config.data_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the dataset
    /// configuration cannot be read or the visual logging directory cannot be
    /// created.
    pub fn new(config: TrainingConfig, device: B::Device) -> TrainingResult<Self> {
        config.validate()?;
        let dataset_config = DatasetConfiguration::from_data_path(&config.data_path)?;
        let model_config = ModelConfig::new(dataset_config.num_classes());
        let visual = if config.visual_logging {
            Some(VisualLogger::new(
                &config.data_path,
                dataset_config.classes.clone(),
            )?)
        } else {
            None
        };

        Ok(Self {
            environment: Environment::new(&config.data_path),
            loss: BautaLossConfig::new()
                .with_mask_only(config.only_mask)
                .init(),
            classes: dataset_config.classes,
            model_config,
            device,
            visual,
            test_loss_history: Vec::new(),
            config,
        })
    }

    /// Replaces the architecture used when the model is reset.
    pub fn with_model_config(mut self, model_config: ModelConfig) -> Self {
        self.model_config = model_config;
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Total-loss average of every evaluation pass so far.
    pub fn test_loss_history(&self) -> &[f64] {
        &self.test_loss_history
    }

    /// Loads the best model, or initializes a new one when `reset_model` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint is missing or unreadable, or the
    /// model predicts a different number of classes than the dataset has.
    pub fn load_model(&mut self) -> TrainingResult<Bauta<Autodiff<B>>> {
        let model = if self.config.reset_model {
            self.model_config.init::<Autodiff<B>>(&self.device)?
        } else {
            let (model, model_config) = self
                .environment
                .load_model::<Autodiff<B>>(Environment::BEST_MODEL_FILE, &self.device)?;
            self.model_config = model_config;
            model
        };

        if self.model_config.num_classes != self.classes.len() {
            return Err(TrainingError::InvalidConfiguration {
                reason: format!(
                    "model predicts {} classes but the dataset has {}",
                    self.model_config.num_classes,
                    self.classes.len()
                ),
            });
        }

        tracing::info!("{model}");
        Ok(model)
    }

    /// Loader yielding one batch per chunk of `batch_size` consecutive samples.
    fn data_loader<BD: Backend>(
        &self,
        dataset: SegmentationDataset,
        device: BD::Device,
    ) -> Arc<dyn DataLoader<BD, LoadedBatch<BD>>> {
        let builder = DataLoaderBuilder::new(SegmentationBatcher::<BD>::new())
            .batch_size(1)
            .set_device(device);
        let num_workers = workers(self.config.visual_logging);
        let builder = if num_workers > 0 {
            builder.num_workers(num_workers)
        } else {
            builder
        };
        builder.build(ChunkedDataset::new(dataset, self.config.batch_size))
    }

    fn log_dataset<BD: Backend>(&self, batch: &BautaBatch<BD>) -> TrainingResult<()> {
        if let Some(visual) = &self.visual {
            visual.log_images("input", batch.images.clone())?;
            visual.log_masks("target", batch.masks.clone())?;
        }
        Ok(())
    }

    fn log_predictions<BD: Backend>(&mut self, step: &LossComputation<BD>) -> TrainingResult<()> {
        if let Some(visual) = &mut self.visual {
            visual.log_masks("predicted masks", step.predicted_masks.clone())?;
            visual.log_masks("refined masks", step.refined_masks.clone())?;
            visual.next_step();
        }
        Ok(())
    }

    /// Evaluates `model` over the whole test split.
    ///
    /// Logs the four averages, appends the total average to the history and
    /// returns the average chosen by the selection metric.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::EmptyValidationSet`] when no batch could be
    /// loaded, or an error if the dataset cannot be opened or a sample cannot
    /// be loaded.
    pub fn test_loss(&mut self, model: &Bauta<B>) -> TrainingResult<f64> {
        let dataset = SegmentationDataset::new(
            false,
            &self.config.data_path,
            self.config.visual_logging,
            self.config.test_samples,
            self.config.seed,
        )?;
        let loader = self.data_loader::<B>(dataset, self.device.clone());

        let mut accumulator = LossAccumulator::new();
        for batch in loader.iter() {
            let batch = batch.map_err(DatasetError::from)?;
            model.check_input(batch.images.dims())?;
            self.log_dataset(&batch)?;
            let step = compute_loss(model, &self.loss, &batch);
            self.log_predictions(&step)?;
            accumulator.add(step.losses.values());
        }

        let averages = accumulator.average()?;
        log_test_loss(&averages);
        self.test_loss_history.push(averages.total);
        self.environment.save_history(&TestLossHistory {
            total_losses: self.test_loss_history.clone(),
        })?;

        Ok(self.config.selection_metric.select(&averages))
    }

    /// Evaluates `model` and saves it as the best model if it improved.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluation or saving fails.
    pub fn test_and_save_if_improved(
        &mut self,
        model: &Bauta<Autodiff<B>>,
        tracker: &mut ImprovementTracker,
    ) -> TrainingResult<Improvement> {
        let current = self.test_loss(&model.valid())?;
        let improvement = tracker.observe(current);

        match improvement {
            Improvement::Improved {
                previous,
                current,
                change,
            } => {
                tracing::info!(
                    previous,
                    current,
                    change,
                    "Model Improved. Previous Best Test Loss {previous:.4} | Current Best Test Loss {current:.4} | Improvement Change: {change:.4} %"
                );
                tracing::info!("Saving model...");
                self.environment
                    .save_model(model, &self.model_config, Environment::BEST_MODEL_FILE)?;
                tracing::info!("...model saved");
            }
            Improvement::NotImproved {
                best,
                current,
                change,
            } => {
                tracing::info!(
                    best,
                    current,
                    change,
                    "Model did *NOT* Improve. Current Best Test Loss {best:.4} | Current Test Loss {current:.4} | Improvement Change: {change:.4} %"
                );
            }
        }

        Ok(improvement)
    }

    /// Runs the full training loop and returns the final model.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded, a dataset cannot be
    /// opened, a sample cannot be loaded, an evaluation pass is empty or a
    /// checkpoint cannot be saved.
    pub fn train(&mut self) -> TrainingResult<Bauta<Autodiff<B>>> {
        let mut model = self.load_model()?;

        let initial = self.test_loss(&model.valid())?;
        tracing::info!(initial, "Initial Test Loss {initial:.4}");
        let mut tracker = ImprovementTracker::new(initial);

        let mut optim = SgdConfig::new()
            .with_momentum(Some(
                MomentumConfig::new()
                    .with_momentum(self.config.momentum)
                    .with_dampening(0.0)
                    .with_nesterov(true),
            ))
            .init();

        let num_epochs = self.config.num_epochs;
        for epoch in 0..num_epochs {
            tracing::info!(epoch, "Epoch {epoch}");

            let dataset = SegmentationDataset::new(
                true,
                &self.config.data_path,
                self.config.visual_logging,
                None,
                self.config.seed.wrapping_add(epoch as u64),
            )?
            .with_augmentation_methods(self.config.augmentation_methods());
            let loader = self.data_loader::<Autodiff<B>>(dataset, self.device.clone());
            let iterations = loader.num_items();

            for (index, batch) in loader.iter().enumerate() {
                let batch = batch.map_err(DatasetError::from)?;
                model.check_input(batch.images.dims())?;
                self.log_dataset(&batch)?;

                let step = compute_loss(&model, &self.loss, &batch);
                self.log_predictions(&step)?;
                let values = step.losses.values();

                let grads = GradientsParams::from_grads(step.losses.total.backward(), &model);
                model = optim.step(self.config.learning_rate, model, grads);

                tracing::info!(
                    epoch = epoch + 1,
                    iteration = index + 1,
                    total = values.total,
                    classifier = values.classifier,
                    mask = values.mask,
                    refiner = values.refiner,
                    "Epoch [{}/{num_epochs}] -- Iter [{}/{iterations}] -- Total Loss: {:.4} -- Classifier Loss: {:.4} -- Mask Loss: {:.4} -- Refined Mask Loss: {:.4}",
                    epoch + 1,
                    index + 1,
                    values.total,
                    values.classifier,
                    values.mask,
                    values.refiner,
                );

                if (index + 1) % self.config.validation_interval == 0 {
                    self.test_and_save_if_improved(&model, &mut tracker)?;
                }
            }

            self.environment.save_model(
                &model,
                &self.model_config,
                &Environment::backup_file(epoch + 1),
            )?;
            self.test_and_save_if_improved(&model, &mut tracker)?;
        }

        Ok(model)
    }
}

/// Trains on the compile-time selected backend.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or training fails.
pub fn run_training(config: TrainingConfig) -> Result<()> {
    tracing::info!(
        data_path = %config.data_path,
        learning_rate = config.learning_rate,
        momentum = config.momentum,
        batch_size = config.batch_size,
        epochs = config.num_epochs,
        only_mask = config.only_mask,
        "configuration loaded",
    );

    let device = create_device(config.gpu);
    tracing::info!(backend = get_backend_name(), ?device, "starting training on backend");

    let mut trainer = Trainer::<SelectedBackend>::new(config, device)
        .context("failed to prepare training")?;
    trainer.train().context("training failed")?;

    tracing::info!("training completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use burn::{backend::NdArray, tensor::Distribution};

    use super::*;

    type TestBackend = NdArray;

    fn tiny_model_config(num_classes: usize) -> ModelConfig {
        ModelConfig::new(num_classes)
            .with_embedding_channels(4)
            .with_mask_embedding_channels(3)
            .with_mask_detector_kernel(3)
    }

    fn random_batch(device: &<TestBackend as Backend>::Device) -> BautaBatch<TestBackend> {
        BautaBatch {
            images: Tensor::random([2, 3, 32, 32], Distribution::Default, device),
            masks: Tensor::random([2, 2, 32, 32], Distribution::Bernoulli(0.3), device),
            presence: Tensor::ones([2, 2], device),
            bounding_boxes: Tensor::zeros([2, 2, 4], device),
        }
    }

    #[test]
    fn workers_follow_visual_logging() {
        assert_eq!(workers(true), 0);
        assert_eq!(workers(false), 6);
    }

    #[test]
    fn default_configuration_matches_the_recipe() {
        let config = TrainingConfig::new("data".to_string());

        assert_eq!(config.num_epochs, 10000);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.learning_rate, 1e-4);
        assert_eq!(config.momentum, 0.9);
        assert_eq!(config.gpu, 0);
        assert_eq!(config.validation_interval, 1000);
        assert_eq!(config.selection_metric, SelectionMetric::Refiner);
        assert!(config.test_samples.is_none());
        assert!(config.validate().is_ok());
        assert_eq!(config.augmentation_methods(), vec![AugmentationMethod::Flip]);
    }

    #[test]
    fn random_crop_follows_the_flip() {
        let config = TrainingConfig::new("data".to_string()).with_random_crop(true);

        assert_eq!(
            config.augmentation_methods(),
            vec![AugmentationMethod::Flip, AugmentationMethod::Crop]
        );
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let config = TrainingConfig::new("data".to_string()).with_batch_size(0);
        assert!(config.validate().is_err());

        let config = TrainingConfig::new("data".to_string()).with_momentum(1.0);
        assert!(config.validate().is_err());

        let config = TrainingConfig::new("data".to_string()).with_learning_rate(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn compute_loss_total_is_sum_of_heads() {
        let device = Default::default();
        let model = tiny_model_config(2).init::<TestBackend>(&device).unwrap();
        let batch = random_batch(&device);

        let step = compute_loss(&model, &BautaLoss::new(), &batch);
        let values = step.losses.values();

        assert_eq!(step.predicted_masks.dims(), [2, 2, 2, 2]);
        assert_eq!(step.refined_masks.dims(), [2, 2, 16, 16]);
        assert!(values.mask > 0.0 && values.refiner > 0.0 && values.classifier > 0.0);
        assert!((values.total - (values.mask + values.refiner + values.classifier)).abs() < 1e-5);
    }

    #[test]
    fn optimizer_step_lowers_the_loss_on_a_fixed_batch() {
        let device = Default::default();
        let mut model = tiny_model_config(2)
            .init::<Autodiff<TestBackend>>(&device)
            .unwrap();
        let loss = BautaLoss::new();
        let batch = BautaBatch::<Autodiff<TestBackend>> {
            images: Tensor::random([2, 3, 32, 32], Distribution::Default, &device),
            masks: Tensor::zeros([2, 2, 32, 32], &device),
            presence: Tensor::zeros([2, 2], &device),
            bounding_boxes: Tensor::zeros([2, 2, 4], &device),
        };
        let mut optim = SgdConfig::new()
            .with_momentum(Some(
                MomentumConfig::new()
                    .with_momentum(0.9)
                    .with_dampening(0.0)
                    .with_nesterov(true),
            ))
            .init();

        let first = compute_loss(&model, &loss, &batch).losses.values().total;
        for _ in 0..5 {
            let step = compute_loss(&model, &loss, &batch);
            let grads = GradientsParams::from_grads(step.losses.total.backward(), &model);
            model = optim.step(0.05, model, grads);
        }
        let last = compute_loss(&model, &loss, &batch).losses.values().total;

        assert!(last < first, "loss did not decrease: {first} -> {last}");
    }
}
