//! Inference pipeline
//!
//! Sequences detection, recognition, rendering and persistence over a single
//! image buffer. Detector and recognizer are created once and reused for every
//! warm-up and final pass.

use image::{Rgb, RgbImage};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

use crate::codec;
use crate::config::{AppConfig, PipelineConfig};
use crate::error::{ModelRole, OcrError};
use crate::overlay::{draw_closed_polygon, write_region_report};
use crate::runtime::{Device, ExecutionContext};
use crate::vision::{
    CtcTextRecognizer, DbTextDetector, ModelFiles, TextDetection, TextDetector, TextRecognition,
    TextRecognizer,
};

/// Inputs taken from the command line
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub device: String,
    pub detector_model: PathBuf,
    pub recognizer_model: PathBuf,
    pub image: PathBuf,
}

/// Index-aligned output of one detect + recognize pair
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    pub detections: Vec<TextDetection>,
    pub recognitions: Vec<TextRecognition>,
}

impl OcrOutput {
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

pub struct InferencePipeline<D, R> {
    image: RgbImage,
    detector: D,
    recognizer: R,
    config: PipelineConfig,
}

impl InferencePipeline<DbTextDetector, CtcTextRecognizer> {
    /// Load the image, create the shared context and both ONNX models
    ///
    /// The image is decoded first so an unreadable input never reaches model
    /// construction.
    pub fn initialize(request: &RunRequest, config: &AppConfig) -> Result<Self, OcrError> {
        let image = codec::load_image(&request.image)?;

        let device: Device = request.device.parse()?;
        let mut context = ExecutionContext::new(device);
        if config.profiler.enabled {
            context = context.with_profiler(&config.profiler.output_path);
        }
        let context = context.into_shared();

        let model_load = |role: ModelRole, path: PathBuf| {
            move |source: anyhow::Error| OcrError::ModelLoad {
                role,
                path,
                source: source.into(),
            }
        };

        let detector = ModelFiles::resolve(&request.detector_model, ModelRole::Detector)
            .and_then(|files| {
                DbTextDetector::new(
                    &files,
                    context.clone(),
                    &config.session,
                    config.detector.clone(),
                )
            })
            .map_err(model_load(ModelRole::Detector, request.detector_model.clone()))?;

        let recognizer = ModelFiles::resolve(&request.recognizer_model, ModelRole::Recognizer)
            .and_then(|files| {
                CtcTextRecognizer::new(
                    &files,
                    context.clone(),
                    &config.session,
                    config.recognizer.clone(),
                )
            })
            .map_err(model_load(ModelRole::Recognizer, request.recognizer_model.clone()))?;

        Ok(Self::new(image, detector, recognizer, config.pipeline.clone()))
    }
}

impl<D: TextDetector, R: TextRecognizer> InferencePipeline<D, R> {
    pub fn new(image: RgbImage, detector: D, recognizer: R, config: PipelineConfig) -> Self {
        Self {
            image,
            detector,
            recognizer,
            config,
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Run `iterations` discarded detect + recognize passes
    pub fn run_warmup(&mut self, iterations: u32) -> Result<(), OcrError> {
        let start = Instant::now();
        for i in 0..iterations {
            let output = self.infer()?;
            debug!("Warm-up pass {} found {} regions", i + 1, output.len());
        }
        info!("Warm-up finished: {} passes in {:?}", iterations, start.elapsed());
        Ok(())
    }

    /// One fresh detect + recognize pass whose results are kept
    pub fn run_final(&mut self) -> Result<OcrOutput, OcrError> {
        let start = Instant::now();
        let output = self.infer()?;
        info!(
            "Final pass found {} regions in {:?}",
            output.len(),
            start.elapsed()
        );
        Ok(output)
    }

    fn infer(&mut self) -> Result<OcrOutput, OcrError> {
        let detections = self
            .detector
            .detect(&self.image)
            .map_err(|e| OcrError::inference(ModelRole::Detector, e))?;

        let recognitions = self
            .recognizer
            .recognize(&self.image, &detections)
            .map_err(|e| OcrError::inference(ModelRole::Recognizer, e))?;

        if recognitions.len() != detections.len() {
            return Err(OcrError::inference(
                ModelRole::Recognizer,
                format!(
                    "returned {} results for {} regions",
                    recognitions.len(),
                    detections.len()
                ),
            ));
        }

        Ok(OcrOutput {
            detections,
            recognitions,
        })
    }

    /// Report each region to `out` and draw its outline, in index order
    pub fn render<W: Write>(&mut self, output: &OcrOutput, out: &mut W) -> Result<(), OcrError> {
        let color = Rgb(self.config.polygon_color);

        for (i, (det, rec)) in output
            .detections
            .iter()
            .zip(&output.recognitions)
            .enumerate()
        {
            write_region_report(out, i, &rec.text, &det.polygon).map_err(OcrError::Report)?;
            draw_closed_polygon(&mut self.image, &det.polygon, color);
        }
        out.flush().map_err(OcrError::Report)?;

        debug!("Rendered {} regions", output.len());
        Ok(())
    }

    /// Write the (possibly annotated) image to the configured output path
    pub fn persist(&self) -> Result<PathBuf, OcrError> {
        let path = self.config.output_path.clone();
        codec::save_image(&self.image, &path)?;
        info!("Saved annotated image to {:?}", path);
        Ok(path)
    }
}
