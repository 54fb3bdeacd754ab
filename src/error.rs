//! Error taxonomy for the OCR runner
//!
//! Every failure is fatal at this layer. Each variant maps to a process exit code.

use std::path::PathBuf;

/// Boxed source error carried by the fatal variants
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which model a load or inference failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Detector,
    Recognizer,
}

impl std::fmt::Display for ModelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelRole::Detector => f.write_str("text detector"),
            ModelRole::Recognizer => f.write_str("text recognizer"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    /// Wrong number of positional arguments
    #[error("{0}")]
    Usage(String),

    #[error("failed to load configuration from {path:?}")]
    Config {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("failed to load image: {}", path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: Option<BoxError>,
    },

    #[error("unsupported device: {0}")]
    Device(String),

    #[error("failed to load {role} model from {}", path.display())]
    ModelLoad {
        role: ModelRole,
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("{role} inference failed")]
    Inference {
        role: ModelRole,
        #[source]
        source: BoxError,
    },

    #[error("failed to write report")]
    Report(#[source] std::io::Error),

    #[error("failed to write image: {}", path.display())]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
}

impl OcrError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            OcrError::Usage(_) | OcrError::ImageLoad { .. } => 1,
            OcrError::Device(_) | OcrError::ModelLoad { .. } => 2,
            OcrError::Inference { .. } => 3,
            OcrError::ImageWrite { .. } | OcrError::Report(_) => 4,
            OcrError::Config { .. } => 5,
        }
    }

    pub(crate) fn inference(role: ModelRole, source: impl Into<BoxError>) -> Self {
        OcrError::Inference {
            role,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(OcrError::Usage("usage".into()).exit_code(), 1);
        let load = OcrError::ImageLoad {
            path: PathBuf::from("missing.png"),
            source: None,
        };
        assert_eq!(load.exit_code(), 1);
        assert_eq!(OcrError::Device("npu".into()).exit_code(), 2);
        let infer = OcrError::inference(ModelRole::Detector, anyhow::anyhow!("boom"));
        assert_eq!(infer.exit_code(), 3);
    }

    #[test]
    fn test_image_load_message() {
        let err = OcrError::ImageLoad {
            path: PathBuf::from("demo/text.jpg"),
            source: None,
        };
        assert_eq!(err.to_string(), "failed to load image: demo/text.jpg");
    }

    #[test]
    fn test_inference_keeps_source_chain() {
        let err = OcrError::inference(ModelRole::Recognizer, anyhow::anyhow!("shape mismatch"));
        let chain = format!("{:#}", anyhow::Error::from(err));
        assert_eq!(chain, "text recognizer inference failed: shape mismatch");
    }
}
