//! Dataset configuration stored next to the data as `config.json`.

use std::path::Path;

use bauta_model::ModelConfig;
use burn::config::Config;

use crate::error::{DatasetError, DatasetResult};

/// Classes and image size of a Bauta dataset.
///
/// ```json
/// {"classes": ["cat", "dog"], "image_size": 256}
/// ```
#[derive(Config, Debug)]
pub struct DatasetConfiguration {
    /// Class names, in mask channel order.
    pub classes: Vec<String>,
    /// Side of the square images fed to the network. Must be a multiple of 16.
    #[config(default = 512)]
    pub image_size: usize,
}

impl DatasetConfiguration {
    /// Name of the configuration file inside the data path.
    pub const FILE_NAME: &'static str = "config.json";

    /// Loads and validates `<data_path>/config.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, lists no
    /// classes or has an image size that is not a positive multiple of 16.
    pub fn from_data_path(data_path: impl AsRef<Path>) -> DatasetResult<Self> {
        let path = data_path.as_ref().join(Self::FILE_NAME);
        if !path.is_file() {
            return Err(DatasetError::ConfigurationNotFound { path });
        }

        let config = Self::load(&path).map_err(|e| DatasetError::ConfigurationInvalid {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        if config.classes.is_empty() {
            return Err(DatasetError::ConfigurationInvalid {
                path,
                reason: "at least one class is required".to_string(),
            });
        }
        let stride = ModelConfig::OUTPUT_STRIDE;
        if config.image_size == 0 || config.image_size % stride != 0 {
            return Err(DatasetError::ConfigurationInvalid {
                path,
                reason: format!(
                    "image_size must be a positive multiple of {stride}, got {}",
                    config.image_size
                ),
            });
        }

        Ok(config)
    }

    /// Number of classes, i.e. mask channels.
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write_config(contents: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DatasetConfiguration::FILE_NAME), contents).unwrap();
        dir
    }

    #[test]
    fn loads_classes_and_image_size() {
        let dir = write_config(r#"{"classes": ["cat", "dog"], "image_size": 64}"#);

        let config = DatasetConfiguration::from_data_path(dir.path()).unwrap();

        assert_eq!(config.classes, vec!["cat".to_string(), "dog".to_string()]);
        assert_eq!(config.image_size, 64);
        assert_eq!(config.num_classes(), 2);
    }

    #[test]
    fn image_size_defaults_to_512() {
        let dir = write_config(r#"{"classes": ["cat"]}"#);

        let config = DatasetConfiguration::from_data_path(dir.path()).unwrap();

        assert_eq!(config.image_size, 512);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();

        let result = DatasetConfiguration::from_data_path(dir.path());

        assert!(matches!(
            result,
            Err(DatasetError::ConfigurationNotFound { .. })
        ));
    }

    #[test]
    fn rejects_image_size_not_divisible_by_16() {
        let dir = write_config(r#"{"classes": ["cat"], "image_size": 100}"#);

        let result = DatasetConfiguration::from_data_path(dir.path());

        assert!(matches!(
            result,
            Err(DatasetError::ConfigurationInvalid { .. })
        ));
    }

    #[test]
    fn rejects_empty_class_list() {
        let dir = write_config(r#"{"classes": []}"#);

        assert!(DatasetConfiguration::from_data_path(dir.path()).is_err());
    }
}
