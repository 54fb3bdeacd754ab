//! Execution Context
//!
//! Bundles the target device and an optional profiling sink. One context is
//! shared read-only by the detector and the recognizer for their whole lifetime.

pub mod profiler;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::OcrError;

pub use profiler::{ProfileScope, Profiler};

/// Execution provider family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Cuda,
    TensorRt,
    CoreMl,
    DirectMl,
}

impl DeviceKind {
    fn name(&self) -> &'static str {
        match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Cuda => "cuda",
            DeviceKind::TensorRt => "tensorrt",
            DeviceKind::CoreMl => "coreml",
            DeviceKind::DirectMl => "directml",
        }
    }
}

/// Target device, parsed from strings like `cpu`, `cuda` or `cuda:1`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Device {
    pub kind: DeviceKind,
    pub index: i32,
}

impl Device {
    pub fn cpu() -> Self {
        Self {
            kind: DeviceKind::Cpu,
            index: 0,
        }
    }
}

impl FromStr for Device {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let (name, index) = match lowered.split_once(':') {
            Some((name, index)) => {
                let index = index
                    .parse::<i32>()
                    .ok()
                    .filter(|i| *i >= 0)
                    .ok_or_else(|| OcrError::Device(s.to_string()))?;
                (name, index)
            }
            None => (lowered.as_str(), 0),
        };

        let kind = match name {
            "cpu" => DeviceKind::Cpu,
            "cuda" | "gpu" => DeviceKind::Cuda,
            "tensorrt" | "trt" => DeviceKind::TensorRt,
            "coreml" => DeviceKind::CoreMl,
            "directml" | "dml" => DeviceKind::DirectMl,
            _ => return Err(OcrError::Device(s.to_string())),
        };

        Ok(Self { kind, index })
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.name(), self.index)
    }
}

/// Shared execution context for the detector and recognizer
#[derive(Debug)]
pub struct ExecutionContext {
    device: Device,
    profiler: Option<Profiler>,
}

impl ExecutionContext {
    pub fn new(device: Device) -> Self {
        info!("Created execution context on {}", device);
        Self {
            device,
            profiler: None,
        }
    }

    /// Attach a profiler writing to `path`
    ///
    /// A sink that cannot be created leaves the context unprofiled.
    pub fn with_profiler(mut self, path: &Path) -> Self {
        match Profiler::create(path, &self.device) {
            Ok(profiler) => {
                info!("Profiling to {:?}", path);
                self.profiler = Some(profiler);
            }
            Err(e) => warn!("Profiling disabled, cannot open {:?}: {:#}", path, e),
        }
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Start a timed scope; the event is recorded when the guard drops
    pub fn scope(&self, name: &'static str) -> Option<ProfileScope<'_>> {
        self.profiler.as_ref().map(|p| p.scope(name))
    }
}
