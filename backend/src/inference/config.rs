use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum PreprocessingConfigError {
    #[error("Failed to read preprocessing config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse preprocessing config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid preprocessing config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreprocessingConfig {
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub normalization: NormalizationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageConfig {
    /// `[width, height]`
    pub size: Vec<u32>,
    pub channels: u32,
    pub layout: TensorLayout,
    pub resize_method: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    Nhwc,
    Nchw,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizationConfig {
    pub scale: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    pub activation: OutputActivation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    Probabilities,
    Logits,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            size: vec![224, 224],
            channels: 3,
            layout: TensorLayout::Nhwc,
            resize_method: "triangle".to_string(),
        }
    }
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self { scale: 255.0 }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            activation: OutputActivation::Probabilities,
        }
    }
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            image: ImageConfig::default(),
            normalization: NormalizationConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl PreprocessingConfig {
    pub fn load(path: &Path) -> Result<Self, PreprocessingConfigError> {
        let config_str = std::fs::read_to_string(path)?;
        Self::parse(&config_str)
    }

    pub fn load_or_default(path: &Path) -> Result<Self, PreprocessingConfigError> {
        if !path.exists() {
            log::warn!(
                "Preprocessing config {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn parse(config_str: &str) -> Result<Self, PreprocessingConfigError> {
        let config: PreprocessingConfig = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PreprocessingConfigError> {
        if self.image.size.len() != 2 || self.image.size.contains(&0) {
            return Err(PreprocessingConfigError::Invalid(format!(
                "image.size must be [width, height], got {:?}",
                self.image.size
            )));
        }
        if self.image.channels != 3 {
            return Err(PreprocessingConfigError::Invalid(format!(
                "only 3-channel RGB input is supported, got {}",
                self.image.channels
            )));
        }
        if self.normalization.scale <= 0.0 {
            return Err(PreprocessingConfigError::Invalid(
                "normalization.scale must be positive".to_string(),
            ));
        }
        self.filter()?;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.image.size[0]
    }

    pub fn height(&self) -> u32 {
        self.image.size[1]
    }

    pub fn filter(&self) -> Result<FilterType, PreprocessingConfigError> {
        match self.image.resize_method.to_ascii_lowercase().as_str() {
            "nearest" => Ok(FilterType::Nearest),
            "triangle" | "bilinear" => Ok(FilterType::Triangle),
            "catmullrom" | "bicubic" => Ok(FilterType::CatmullRom),
            "gaussian" => Ok(FilterType::Gaussian),
            "lanczos3" => Ok(FilterType::Lanczos3),
            other => Err(PreprocessingConfigError::Invalid(format!(
                "unknown resize_method {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = PreprocessingConfig::parse(
            r#"
image:
  size: [128, 96]
  channels: 3
  layout: nchw
  resize_method: nearest
normalization:
  scale: 255.0
output:
  activation: logits
"#,
        )
        .unwrap();
        assert_eq!(config.width(), 128);
        assert_eq!(config.height(), 96);
        assert_eq!(config.image.layout, TensorLayout::Nchw);
        assert_eq!(config.output.activation, OutputActivation::Logits);
        assert_eq!(config.filter().unwrap(), FilterType::Nearest);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config = PreprocessingConfig::parse("{}\n").unwrap();
        assert_eq!(config, PreprocessingConfig::default());
        assert_eq!(config.width(), 224);
        assert_eq!(config.image.layout, TensorLayout::Nhwc);
    }

    #[test]
    fn rejects_bad_size_and_filter() {
        let bad_size = PreprocessingConfig::parse(
            "image:\n  size: [224]\n  channels: 3\n  layout: nhwc\n  resize_method: nearest\n",
        );
        assert!(matches!(bad_size, Err(PreprocessingConfigError::Invalid(_))));

        let bad_filter = PreprocessingConfig::parse(
            "image:\n  size: [224, 224]\n  channels: 3\n  layout: nhwc\n  resize_method: sinc\n",
        );
        assert!(matches!(bad_filter, Err(PreprocessingConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config =
            PreprocessingConfig::load_or_default(Path::new("/nonexistent/preprocessing.yaml"))
                .unwrap();
        assert_eq!(config, PreprocessingConfig::default());
    }
}
