//! Dataset implementation for Bauta training and evaluation.
//!
//! Samples live in one directory each:
//!
//! ```text
//! <data_path>/dataset/<split>/<sample>/input.png
//! <data_path>/dataset/<split>/<sample>/<class>.png
//! ```
//!
//! A missing class mask means the class is absent from the sample. Following
//! Burn's convention the dataset returns raw data and the batcher creates the
//! tensors.

use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
};

use bauta_model::BautaBatch;
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{backend::Backend, Tensor, TensorData},
};
use image::{DynamicImage, GrayImage};
use walkdir::WalkDir;

use crate::{
    augmentation::{AugmentationConfig, AugmentationMethod, ImageAugmentor},
    bounding_box::BoundingBox,
    config::DatasetConfiguration,
    error::{DatasetError, DatasetResult},
};

/// File name of the input image inside a sample directory.
pub const INPUT_IMAGE_FILE: &str = "input.png";

/// A single preprocessed sample.
#[derive(Debug, Clone)]
pub struct SegmentationItem {
    /// RGB image data `[H, W, 3]` in `[0, 1]`.
    pub image: Vec<f32>,
    /// Binary masks `[C, H, W]`, one channel per class.
    pub masks: Vec<f32>,
    /// Number of mask channels.
    pub num_classes: usize,
    pub height: usize,
    pub width: usize,
}

/// A sample that failed to load.
///
/// Data loader items must be `Clone`, so the error is kept rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFailure {
    /// The sample directory.
    pub sample: PathBuf,
    /// The loading error and its causes.
    pub reason: String,
}

impl SampleFailure {
    fn new(sample: &Path, error: &DatasetError) -> Self {
        let mut reason = error.to_string();
        let mut source = std::error::Error::source(error);
        while let Some(cause) = source {
            reason.push_str(": ");
            reason.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            sample: sample.to_path_buf(),
            reason,
        }
    }
}

impl From<SampleFailure> for DatasetError {
    fn from(failure: SampleFailure) -> Self {
        Self::SampleLoadFailed {
            sample: failure.sample,
            reason: failure.reason,
        }
    }
}

/// Outcome of loading one sample.
pub type SampleOutcome = Result<SegmentationItem, SampleFailure>;

/// A batch, or the first of its samples that failed to load.
pub type LoadedBatch<B> = Result<BautaBatch<B>, SampleFailure>;

/// Batcher converting [`SegmentationItem`]s into a [`BautaBatch`].
///
/// Besides stacking images and masks it derives, per class, the presence
/// flag and the bounding box of the mask. As a [`Batcher`] it consumes
/// chunks of sample outcomes (see [`ChunkedDataset`](crate::ChunkedDataset))
/// and flattens them into one batch.
#[derive(Clone, Default)]
pub struct SegmentationBatcher<B: Backend> {
    _phantom: PhantomData<B>,
}

impl<B: Backend> SegmentationBatcher<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }

    /// Stacks loaded items into a batch on `device`.
    pub fn stack(&self, items: Vec<SegmentationItem>, device: &B::Device) -> BautaBatch<B> {
        let batch_size = items.len();

        let mut images = Vec::with_capacity(batch_size);
        let mut masks = Vec::with_capacity(batch_size);
        let mut presence = Vec::with_capacity(batch_size);
        let mut bounding_boxes = Vec::with_capacity(batch_size);

        for item in items {
            let (height, width, num_classes) = (item.height, item.width, item.num_classes);

            for class_mask in item.masks.chunks_exact(height * width) {
                let bbox = BoundingBox::from_mask(class_mask, height, width);
                presence.push(if bbox.is_some() { 1.0_f32 } else { 0.0 });
                bounding_boxes.extend(bbox.unwrap_or_default().to_array());
            }

            let image = Tensor::<B, 3>::from_data(
                TensorData::new(item.image, [height, width, 3]),
                device,
            )
            .permute([2, 0, 1]); // HWC to CHW
            let mask = Tensor::<B, 3>::from_data(
                TensorData::new(item.masks, [num_classes, height, width]),
                device,
            );

            images.push(image);
            masks.push(mask);
        }

        let images = Tensor::stack(images, 0);
        let masks: Tensor<B, 4> = Tensor::stack(masks, 0);
        let num_classes = masks.dims()[1];

        BautaBatch {
            images,
            masks,
            presence: Tensor::from_data(
                TensorData::new(presence, [batch_size, num_classes]),
                device,
            ),
            bounding_boxes: Tensor::from_data(
                TensorData::new(bounding_boxes, [batch_size, num_classes, 4]),
                device,
            ),
        }
    }
}

impl<B: Backend> Batcher<B, Vec<SampleOutcome>, LoadedBatch<B>> for SegmentationBatcher<B> {
    fn batch(&self, chunks: Vec<Vec<SampleOutcome>>, device: &B::Device) -> LoadedBatch<B> {
        let items = chunks
            .into_iter()
            .flatten()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.stack(items, device))
    }
}

/// Bauta dataset over one split of a data path.
#[derive(Debug)]
pub struct SegmentationDataset {
    samples: Vec<PathBuf>,
    classes: Vec<String>,
    is_train: bool,
    visual_logging: bool,
    augmentor: ImageAugmentor,
}

impl SegmentationDataset {
    /// Opens the train (`is_train`) or test split of `data_path`.
    ///
    /// Sample directories are visited in name order and capped to
    /// `max_samples` when given. `seed` drives the training augmentations.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset configuration is invalid, the split
    /// directory is missing or holds no sample.
    pub fn new(
        is_train: bool,
        data_path: impl AsRef<Path>,
        visual_logging: bool,
        max_samples: Option<usize>,
        seed: u64,
    ) -> DatasetResult<Self> {
        let data_path = data_path.as_ref();
        let config = DatasetConfiguration::from_data_path(data_path)?;
        let split_dir = Self::split_dir(data_path, is_train);

        let mut samples = Self::collect_samples(&split_dir)?;
        if let Some(max_samples) = max_samples {
            samples.truncate(max_samples);
        }
        if samples.is_empty() {
            return Err(DatasetError::NoSamples { path: split_dir });
        }

        let split = if is_train { "train" } else { "test" };
        tracing::debug!(
            split,
            samples = samples.len(),
            path = %split_dir.display(),
            "dataset opened",
        );

        let image_size = config.image_size as u32;
        Ok(Self {
            samples,
            classes: config.classes,
            is_train,
            visual_logging,
            augmentor: ImageAugmentor::new(AugmentationConfig::new(image_size, seed)),
        })
    }

    /// Replaces the augmentations applied to training samples.
    pub fn with_augmentation_methods(mut self, methods: Vec<AugmentationMethod>) -> Self {
        let config = self.augmentor.config().clone().with_methods(methods);
        self.augmentor = ImageAugmentor::new(config);
        self
    }

    /// `<data_path>/dataset/train` or `<data_path>/dataset/test`.
    pub fn split_dir(data_path: &Path, is_train: bool) -> PathBuf {
        let split = if is_train { "train" } else { "test" };
        data_path.join("dataset").join(split)
    }

    fn collect_samples(split_dir: &Path) -> DatasetResult<Vec<PathBuf>> {
        if !split_dir.is_dir() {
            return Err(DatasetError::SplitDirectoryNotFound {
                path: split_dir.to_path_buf(),
            });
        }

        let mut samples = Vec::new();
        for entry in WalkDir::new(split_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|source| DatasetError::DirectoryReadFailed {
                path: split_dir.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            if entry.path().join(INPUT_IMAGE_FILE).is_file() {
                samples.push(entry.into_path());
            } else {
                tracing::warn!(sample = %entry.path().display(), "sample without input image skipped");
            }
        }
        Ok(samples)
    }

    /// Class names in mask channel order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub const fn is_train(&self) -> bool {
        self.is_train
    }

    /// Loads, augments and converts one sample.
    ///
    /// # Errors
    ///
    /// Returns an error if the input image or a class mask cannot be decoded.
    pub fn load(&self, index: usize) -> DatasetResult<Option<SegmentationItem>> {
        let Some(sample_dir) = self.samples.get(index) else {
            return Ok(None);
        };

        let image = open_image(&sample_dir.join(INPUT_IMAGE_FILE))?;
        let masks = self
            .classes
            .iter()
            .map(|class| {
                let path = sample_dir.join(format!("{class}.png"));
                if path.is_file() {
                    open_image(&path)
                } else {
                    Ok(DynamicImage::ImageLuma8(GrayImage::new(
                        image.width(),
                        image.height(),
                    )))
                }
            })
            .collect::<DatasetResult<Vec<_>>>()?;

        let (image, masks) = self.augmentor.augment(image, masks, self.is_train, index);

        if self.visual_logging {
            tracing::debug!(index, sample = %sample_dir.display(), "sample loaded");
        }

        let height = image.height() as usize;
        let width = image.width() as usize;
        let masks = masks
            .into_iter()
            .flat_map(|mask| {
                mask.to_luma32f()
                    .into_raw()
                    .into_iter()
                    .map(|v| if v > 0.5 { 1.0 } else { 0.0 })
            })
            .collect();

        Ok(Some(SegmentationItem {
            image: image.to_rgb32f().into_raw(),
            masks,
            num_classes: self.classes.len(),
            height,
            width,
        }))
    }
}

fn open_image(path: &Path) -> DatasetResult<DynamicImage> {
    image::open(path).map_err(|source| DatasetError::ImageOpenFailed {
        path: path.to_path_buf(),
        source,
    })
}

impl Dataset<SampleOutcome> for SegmentationDataset {
    fn get(&self, index: usize) -> Option<SampleOutcome> {
        let sample = self.samples.get(index)?;
        self.load(index)
            .map_err(|error| {
                tracing::error!(index, error = %error, "failed to load sample");
                SampleFailure::new(sample, &error)
            })
            .transpose()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
