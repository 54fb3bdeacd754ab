//! Application Configuration
//!
//! Runner options stored in TOML format. Every field has a default, so a
//! config file only needs the values it changes.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the annotated output image
pub const DEFAULT_OUTPUT_PATH: &str = "output_ocr.png";
/// Default location of the profiler sink
pub const DEFAULT_PROFILE_PATH: &str = "/deploee-tmp/profile.bin";
/// Default number of discarded warm-up passes
pub const DEFAULT_WARMUP_ITERATIONS: u32 = 20;

/// Runner settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Pipeline sequencing and output
    pub pipeline: PipelineConfig,
    /// Profiling sink
    pub profiler: ProfilerConfig,
    /// ONNX Runtime session options
    pub session: SessionConfig,
    /// Text detector post-processing
    pub detector: DetectorConfig,
    /// Text recognizer pre/post-processing
    pub recognizer: RecognizerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Discarded detect+recognize passes before the final one
    pub warmup_iterations: u32,
    /// Where the annotated image is written
    pub output_path: PathBuf,
    /// RGB color of the drawn polygons
    pub polygon_color: [u8; 3],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            warmup_iterations: DEFAULT_WARMUP_ITERATIONS,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            polygon_color: [0, 255, 0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Attach a profiler to the execution context
    pub enabled: bool,
    /// Sink file, truncated on every run
    pub output_path: PathBuf,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_path: PathBuf::from(DEFAULT_PROFILE_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Intra-op thread count
    pub intra_threads: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { intra_threads: 4 }
    }
}

/// DBNet post-processing thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Longest side of the resized input
    pub limit_side_len: u32,
    /// Binarization threshold on the probability map
    pub thresh: f32,
    /// Minimum mean probability inside a box
    pub box_thresh: f32,
    /// Outward expansion ratio applied to each box
    pub unclip_ratio: f32,
    /// Maximum contours considered per image
    pub max_candidates: usize,
    /// Minimum short side of a box, in map pixels
    pub min_size: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            limit_side_len: 960,
            thresh: 0.3,
            box_thresh: 0.6,
            unclip_ratio: 1.5,
            max_candidates: 1000,
            min_size: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Input height expected by the model
    pub image_height: u32,
    /// Maximum input width
    pub max_width: u32,
    /// Character dictionary; defaults to `dict.txt` beside the model
    pub dictionary: Option<PathBuf>,
    /// Append a space token to the dictionary
    pub use_space_char: bool,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            image_height: 48,
            max_width: 320,
            dictionary: None,
            use_space_char: true,
        }
    }
}

impl RecognizerConfig {
    fn validate(&self) -> Result<()> {
        if self.image_height == 0 {
            anyhow::bail!("recognizer.image_height must be greater than 0");
        }
        if self.max_width == 0 {
            anyhow::bail!("recognizer.max_width must be greater than 0");
        }
        Ok(())
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    config.recognizer.validate()?;
    Ok(config)
}

/// `config.toml` in the platform configuration directory
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "text-ocr", "text-ocr")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
