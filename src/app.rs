//! Application Coordinator
//!
//! Resolves configuration and drives the pipeline from start to finish.

use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{self, AppConfig};
use crate::error::OcrError;
use crate::pipeline::{InferencePipeline, RunRequest};

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub warmup_iterations: Option<u32>,
    pub output_path: Option<PathBuf>,
    pub profile_path: Option<PathBuf>,
    pub no_profile: bool,
}

impl Overrides {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(n) = self.warmup_iterations {
            config.pipeline.warmup_iterations = n;
        }
        if let Some(path) = &self.output_path {
            config.pipeline.output_path = path.clone();
        }
        if let Some(path) = &self.profile_path {
            config.profiler.output_path = path.clone();
        }
        if self.no_profile {
            config.profiler.enabled = false;
        }
    }
}

/// Load configuration from an explicit file, the platform default, or defaults
///
/// An explicit file must load. A broken default file is skipped with a warning.
pub fn resolve_config(explicit: Option<&Path>) -> Result<AppConfig, OcrError> {
    if let Some(path) = explicit {
        let config = config::load_config(path).map_err(|e| OcrError::Config {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Some(path) = config::default_config_path() {
        if path.exists() {
            match config::load_config(&path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    return Ok(config);
                }
                Err(e) => warn!("Ignoring {:?}: {:#}", path, e),
            }
        }
    }

    info!("Using default configuration");
    Ok(AppConfig::default())
}

/// Initialize, warm up, run the final pass, report to `out` and persist
pub fn run<W: Write>(request: &RunRequest, config: &AppConfig, out: &mut W) -> Result<PathBuf, OcrError> {
    let mut pipeline = InferencePipeline::initialize(request, config)?;
    let (width, height) = pipeline.image().dimensions();
    info!("Processing {:?} ({}x{})", request.image, width, height);

    pipeline.run_warmup(config.pipeline.warmup_iterations)?;
    let output = pipeline.run_final()?;
    pipeline.render(&output, out)?;
    pipeline.persist()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config = AppConfig::default();
        let overrides = Overrides {
            warmup_iterations: Some(0),
            output_path: Some(PathBuf::from("out/annotated.png")),
            profile_path: Some(PathBuf::from("profile.jsonl")),
            no_profile: true,
        };

        overrides.apply(&mut config);

        assert_eq!(config.pipeline.warmup_iterations, 0);
        assert_eq!(config.pipeline.output_path, PathBuf::from("out/annotated.png"));
        assert_eq!(config.profiler.output_path, PathBuf::from("profile.jsonl"));
        assert!(!config.profiler.enabled);
    }

    #[test]
    fn test_empty_overrides_keep_config() {
        let mut config = AppConfig::default();
        Overrides::default().apply(&mut config);
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_resolve_explicit_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nwarmup_iterations = 5").unwrap();

        let config = resolve_config(Some(file.path())).unwrap();
        assert_eq!(config.pipeline.warmup_iterations, 5);
        assert_eq!(config.detector, AppConfig::default().detector);
    }

    #[test]
    fn test_resolve_missing_explicit_config() {
        let err = resolve_config(Some(Path::new("/nonexistent/text-ocr.toml"))).unwrap_err();
        assert!(matches!(err, OcrError::Config { .. }));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_resolve_config_with_invalid_recognizer_size() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[recognizer]\nmax_width = 0").unwrap();

        let err = resolve_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, OcrError::Config { .. }));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_run_stops_at_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.pipeline.output_path = dir.path().join("output_ocr.png");
        config.profiler.enabled = false;

        let request = RunRequest {
            device: "cpu".to_string(),
            detector_model: dir.path().join("det.onnx"),
            recognizer_model: dir.path().join("rec.onnx"),
            image: dir.path().join("missing.png"),
        };
        let mut out = Vec::new();
        let err = run(&request, &config, &mut out).unwrap_err();

        assert!(matches!(err, OcrError::ImageLoad { .. }));
        assert!(out.is_empty());
        assert!(!config.pipeline.output_path.exists());
    }
}
