//! Visual logging: batches dumped as PNG files.
//!
//! Files are written to `<data_path>/visual_logging/` as
//! `<step>_<title>_<item>_<class>.png`, where `step` counts logged batches.

use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::tensor::{backend::Backend, Tensor};
use image::{GrayImage, RgbImage};

use crate::error::{TrainingError, TrainingResult};

/// Writes images and masks of training batches to disk.
#[derive(Debug, Clone)]
pub struct VisualLogger {
    dir: PathBuf,
    classes: Vec<String>,
    step: usize,
}

impl VisualLogger {
    /// Name of the directory created inside the data path.
    pub const DIR_NAME: &'static str = "visual_logging";

    /// Creates `<data_path>/visual_logging/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(data_path: impl AsRef<Path>, classes: Vec<String>) -> TrainingResult<Self> {
        let dir = data_path.as_ref().join(Self::DIR_NAME);
        fs::create_dir_all(&dir).map_err(|e| TrainingError::File {
            path: dir.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            dir,
            classes,
            step: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Moves on to the next batch; later files get a new step prefix.
    pub fn next_step(&mut self) {
        self.step += 1;
    }

    /// Writes every item of an image batch `[B, 3, H, W]` as an RGB PNG.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be written.
    pub fn log_images<B: Backend>(&self, title: &str, images: Tensor<B, 4>) -> TrainingResult<()> {
        let [batch_size, _, height, width] = images.dims();
        let pixels = to_bytes(images.permute([0, 2, 3, 1]));
        let item_len = height * width * 3;

        for (index, chunk) in pixels.chunks_exact(item_len).take(batch_size).enumerate() {
            let path = self.file_path(title, index, "input");
            if let Some(image) = RgbImage::from_raw(width as u32, height as u32, chunk.to_vec()) {
                image
                    .save(&path)
                    .map_err(|source| TrainingError::VisualLog { path, source })?;
            }
        }
        Ok(())
    }

    /// Writes every class channel of every item of a mask batch `[B, C, H, W]`
    /// as a grayscale PNG.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be written.
    pub fn log_masks<B: Backend>(&self, title: &str, masks: Tensor<B, 4>) -> TrainingResult<()> {
        let [_, num_classes, height, width] = masks.dims();
        let pixels = to_bytes(masks);

        for (channel, chunk) in pixels.chunks_exact(height * width).enumerate() {
            let (index, class) = (channel / num_classes, channel % num_classes);
            let class = self
                .classes
                .get(class)
                .map_or_else(|| class.to_string(), Clone::clone);
            let path = self.file_path(title, index, &class);
            if let Some(image) = GrayImage::from_raw(width as u32, height as u32, chunk.to_vec()) {
                image
                    .save(&path)
                    .map_err(|source| TrainingError::VisualLog { path, source })?;
            }
        }
        Ok(())
    }

    fn file_path(&self, title: &str, index: usize, class: &str) -> PathBuf {
        let title = title.replace(' ', "_");
        self.dir
            .join(format!("{:06}_{title}_{index}_{class}.png", self.step))
    }
}

/// Values in `[0, 1]` scaled to bytes, in tensor order.
fn to_bytes<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<u8> {
    tensor
        .clamp(0.0, 1.0)
        .mul_scalar(255.0)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .unwrap_or_default()
        .into_iter()
        .map(|v| v.round() as u8)
        .collect()
}

#[cfg(test)]
mod tests {
    use burn::{backend::NdArray, tensor::Tensor};

    use super::*;

    type TestBackend = NdArray;

    #[test]
    fn writes_one_png_per_item_and_class() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let logger =
            VisualLogger::new(dir.path(), vec!["cat".to_string(), "dog".to_string()]).unwrap();

        let masks = Tensor::<TestBackend, 4>::ones([2, 2, 4, 4], &device);
        logger.log_masks("target mask", masks).unwrap();

        for (index, class) in [(0, "cat"), (0, "dog"), (1, "cat"), (1, "dog")] {
            let path = logger
                .dir()
                .join(format!("000000_target_mask_{index}_{class}.png"));
            let image = image::open(&path).unwrap().to_luma8();
            assert_eq!(image.dimensions(), (4, 4));
            assert!(image.pixels().all(|p| p[0] == 255));
        }
    }

    #[test]
    fn writes_rgb_inputs_under_the_next_step() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let mut logger = VisualLogger::new(dir.path(), vec!["cat".to_string()]).unwrap();
        logger.next_step();

        let images = Tensor::<TestBackend, 4>::zeros([1, 3, 8, 6], &device);
        logger.log_images("batch", images).unwrap();

        let image = image::open(logger.dir().join("000001_batch_0_input.png")).unwrap();
        assert_eq!((image.width(), image.height()), (6, 8));
    }
}
