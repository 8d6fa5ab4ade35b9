//! Data augmentation for Bauta samples.
//!
//! A sample is one RGB image and one mask per class. Every geometric
//! augmentation is applied identically to the image and all of its masks.
//!
//! Implemented augmentations:
//! 1. Horizontal flip - 50% probability
//! 2. Random crop - up to 10% border on each side
//!
//! Validation samples are only resized.

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Data augmentation configuration parameters.
#[derive(Debug, Clone)]
pub struct AugmentationConfig {
    /// Augmentations applied to training samples, in order.
    pub enabled_methods: Vec<AugmentationMethod>,
    /// Side of the square output images and masks.
    pub target_size: u32,
    /// Base seed; each sample mixes its index into it.
    pub seed: u64,
}

/// Available data augmentation methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AugmentationMethod {
    /// Horizontal flip (50% probability)
    Flip,
    /// Random crop (10% border)
    Crop,
}

impl AugmentationConfig {
    /// Flip-only augmentation producing `target_size` square samples.
    pub fn new(target_size: u32, seed: u64) -> Self {
        Self {
            enabled_methods: vec![AugmentationMethod::Flip],
            target_size,
            seed,
        }
    }

    /// Replaces the enabled augmentations.
    pub fn with_methods(mut self, methods: Vec<AugmentationMethod>) -> Self {
        self.enabled_methods = methods;
        self
    }
}

/// Applies the configured augmentations to image/mask samples.
#[derive(Debug, Clone)]
pub struct ImageAugmentor {
    config: AugmentationConfig,
}

impl ImageAugmentor {
    pub const fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Deterministic RNG for one sample and one augmentation step.
    fn create_rng(&self, index: usize, step: u64) -> StdRng {
        let seed = self
            .config
            .seed
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add((index as u64) << 8)
            .wrapping_add(step);
        StdRng::seed_from_u64(seed)
    }

    /// Augments (training only) and resizes an image and its class masks.
    ///
    /// # Arguments
    /// * `image` - Input image
    /// * `masks` - One mask per class, same size as the image
    /// * `is_training` - Validation samples are only resized
    /// * `index` - Sample index, mixed into the seed
    pub fn augment(
        &self,
        mut image: DynamicImage,
        mut masks: Vec<DynamicImage>,
        is_training: bool,
        index: usize,
    ) -> (DynamicImage, Vec<DynamicImage>) {
        if is_training {
            for (step, method) in self.config.enabled_methods.iter().enumerate() {
                let mut rng = self.create_rng(index, step as u64);
                (image, masks) = match method {
                    AugmentationMethod::Flip => Self::apply_horizontal_flip(&mut rng, image, masks),
                    AugmentationMethod::Crop => Self::apply_random_crop(&mut rng, image, masks),
                };
            }
        }
        self.resize(image, masks)
    }

    fn resize(
        &self,
        image: DynamicImage,
        masks: Vec<DynamicImage>,
    ) -> (DynamicImage, Vec<DynamicImage>) {
        let size = self.config.target_size;
        let image = image.resize_exact(size, size, FilterType::Lanczos3);
        let masks = masks
            .into_iter()
            .map(|mask| mask.resize_exact(size, size, FilterType::Nearest))
            .collect();
        (image, masks)
    }

    fn apply_horizontal_flip(
        rng: &mut StdRng,
        image: DynamicImage,
        masks: Vec<DynamicImage>,
    ) -> (DynamicImage, Vec<DynamicImage>) {
        if rng.random_bool(0.5) {
            (image.fliph(), masks.iter().map(DynamicImage::fliph).collect())
        } else {
            (image, masks)
        }
    }

    fn apply_random_crop(
        rng: &mut StdRng,
        image: DynamicImage,
        masks: Vec<DynamicImage>,
    ) -> (DynamicImage, Vec<DynamicImage>) {
        let (width, height) = image.dimensions();
        let border_x = width / 10;
        let border_y = height / 10;
        if border_x == 0 || border_y == 0 {
            return (image, masks);
        }

        let crop_width = rng.random_range(width - 2 * border_x..=width);
        let crop_height = rng.random_range(height - 2 * border_y..=height);
        let crop_x = rng.random_range(0..=width - crop_width);
        let crop_y = rng.random_range(0..=height - crop_height);

        let image = image.crop_imm(crop_x, crop_y, crop_width, crop_height);
        let masks = masks
            .iter()
            .map(|mask| mask.crop_imm(crop_x, crop_y, crop_width, crop_height))
            .collect();
        (image, masks)
    }
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Luma, Rgb};

    use super::*;

    fn sample(width: u32, height: u32) -> (DynamicImage, Vec<DynamicImage>) {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([x as u8 * 10, y as u8 * 10, 128])
        }));
        // Foreground in the left half only.
        let mask = DynamicImage::ImageLuma8(ImageBuffer::from_fn(width, height, |x, _| {
            Luma([if x < width / 2 { 255 } else { 0 }])
        }));
        (image, vec![mask.clone(), mask])
    }

    #[test]
    fn validation_samples_are_only_resized() {
        let augmentor = ImageAugmentor::new(AugmentationConfig::new(32, 7));
        let (image, masks) = sample(20, 10);

        let (image, masks) = augmentor.augment(image, masks, false, 0);

        assert_eq!(image.dimensions(), (32, 32));
        assert_eq!(masks.len(), 2);
        assert!(masks.iter().all(|mask| mask.dimensions() == (32, 32)));
        // Not flipped: the left column is still foreground.
        assert_eq!(masks[0].to_luma8().get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn augmentation_is_deterministic_per_seed_and_index() {
        let config = AugmentationConfig::new(16, 42)
            .with_methods(vec![AugmentationMethod::Flip, AugmentationMethod::Crop]);
        let augmentor = ImageAugmentor::new(config);

        let (image, masks) = sample(16, 16);
        let first = augmentor.augment(image.clone(), masks.clone(), true, 3);
        let second = augmentor.augment(image, masks, true, 3);

        assert_eq!(first.0.to_rgb8().into_raw(), second.0.to_rgb8().into_raw());
        assert_eq!(
            first.1[0].to_luma8().into_raw(),
            second.1[0].to_luma8().into_raw()
        );
    }

    #[test]
    fn flip_moves_image_and_every_mask_together() {
        let augmentor = ImageAugmentor::new(AugmentationConfig::new(8, 0));

        // Over a handful of indices both outcomes of the coin occur.
        let mut seen_flipped = false;
        let mut seen_unflipped = false;
        for index in 0..32 {
            let (image, masks) = sample(8, 8);
            let (image, masks) = augmentor.augment(image, masks, true, index);
            let flipped = masks[0].to_luma8().get_pixel(0, 0)[0] == 0;
            assert_eq!(masks[0].to_luma8(), masks[1].to_luma8());
            // The red channel grows with x, so it shrinks along x after a flip.
            let rgb = image.to_rgb8();
            assert_eq!(rgb.get_pixel(0, 0)[0] > rgb.get_pixel(7, 0)[0], flipped);
            seen_flipped |= flipped;
            seen_unflipped |= !flipped;
        }
        assert!(seen_flipped && seen_unflipped);
    }
}
