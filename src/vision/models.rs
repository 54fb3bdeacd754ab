//! Model loading for ONNX Runtime
//!
//! Resolves model paths (single `.onnx` files or exported model directories)
//! and builds sessions for the device held by the execution context.

use anyhow::{Context, Result};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, DirectMLExecutionProvider,
    ExecutionProviderDispatch, TensorRTExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session};
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::ModelRole;
use crate::runtime::{Device, DeviceKind};

/// Candidate model file names inside an exported model directory
const COMMON_MODEL_FILES: &[&str] = &["end2end.onnx", "model.onnx", "inference.onnx"];
const DICTIONARY_FILE: &str = "dict.txt";

impl ModelRole {
    fn model_filename(&self) -> &'static str {
        match self {
            ModelRole::Detector => "det.onnx",
            ModelRole::Recognizer => "rec.onnx",
        }
    }
}

/// Files that make up one model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFiles {
    /// ONNX graph
    pub model: PathBuf,
    /// Directory searched for side files such as the dictionary
    pub dir: PathBuf,
}

impl ModelFiles {
    /// Resolve a model path given on the command line
    pub fn resolve(path: &Path, role: ModelRole) -> Result<Self> {
        if path.is_file() {
            let dir = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            return Ok(Self {
                model: path.to_path_buf(),
                dir,
            });
        }

        if path.is_dir() {
            let model = COMMON_MODEL_FILES
                .iter()
                .copied()
                .chain(std::iter::once(role.model_filename()))
                .map(|name| path.join(name))
                .find(|candidate| candidate.is_file())
                .with_context(|| format!("No ONNX model found in {:?}", path))?;
            return Ok(Self {
                model,
                dir: path.to_path_buf(),
            });
        }

        anyhow::bail!("Model path {:?} does not exist", path)
    }

    /// Dictionary beside the model, if present
    pub fn dictionary(&self) -> Option<PathBuf> {
        let path = self.dir.join(DICTIONARY_FILE);
        path.is_file().then_some(path)
    }
}

/// ONNX Runtime session wrapper
pub struct OnnxSession {
    session: Session,
}

impl OnnxSession {
    /// Create a session for `model_path` on the given device
    ///
    /// If the device's execution provider cannot be registered the session
    /// falls back to CPU.
    pub fn new(model_path: &Path, device: Device, config: &SessionConfig) -> Result<Self> {
        info!("Loading ONNX model from {:?} on {}", model_path, device);

        let session_builder = base_builder(config)?;
        let session_builder = match execution_provider(device) {
            Some(provider) => match session_builder.with_execution_providers([provider]) {
                Ok(builder) => {
                    info!("{} acceleration enabled", device);
                    builder
                }
                Err(e) => {
                    warn!("{} not available, using {}: {}", device, Device::cpu(), e);
                    base_builder(config)?
                }
            },
            None => session_builder,
        };

        let session = session_builder
            .commit_from_file(model_path)
            .context("Failed to load ONNX model")?;

        let input_names: Vec<String> = session
            .inputs
            .iter()
            .map(|input| input.name.clone())
            .collect();

        let output_names: Vec<String> = session
            .outputs
            .iter()
            .map(|output| output.name.clone())
            .collect();

        info!(
            "Model loaded. Inputs: {:?}, Outputs: {:?}",
            input_names, output_names
        );

        Ok(Self { session })
    }

    /// Run a single NCHW f32 input and return the first output as (shape, data)
    pub fn run(&mut self, shape: [usize; 4], data: Vec<f32>) -> Result<(Vec<i64>, Vec<f32>)> {
        let input = Tensor::from_array((shape, data.into_boxed_slice()))
            .context("Failed to create input tensor")?;

        let outputs = self
            .session
            .run(ort::inputs![input])
            .context("ONNX inference failed")?;

        let (out_shape, out_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract output tensor")?;

        let out_shape: Vec<i64> = out_shape.iter().copied().collect();
        debug!("Inference output shape {:?}", out_shape);

        Ok((out_shape, out_data.to_vec()))
    }
}

fn base_builder(config: &SessionConfig) -> Result<SessionBuilder> {
    Ok(Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(config.intra_threads)?)
}

fn execution_provider(device: Device) -> Option<ExecutionProviderDispatch> {
    let provider = match device.kind {
        DeviceKind::Cpu => return None,
        DeviceKind::Cuda => CUDAExecutionProvider::default()
            .with_device_id(device.index)
            .build(),
        DeviceKind::TensorRt => TensorRTExecutionProvider::default()
            .with_device_id(device.index)
            .build(),
        DeviceKind::CoreMl => CoreMLExecutionProvider::default().build(),
        DeviceKind::DirectMl => DirectMLExecutionProvider::default()
            .with_device_id(device.index)
            .build(),
    };
    Some(provider.error_on_failure())
}
