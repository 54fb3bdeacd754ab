//! Text detection module
//!
//! DBNet-style detector: the model predicts a per-pixel text probability map,
//! which is binarized, traced into contours and reduced to rotated boxes.

use anyhow::{Context, Result};
use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::{arc_length, contour_area, min_area_rect};
use ndarray::ArrayView2;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::geometry::{contains_point, expand_rect, short_side};
use super::models::{ModelFiles, OnnxSession};
use super::preprocess::{into_input, preprocess_for_detection};
use super::{polygon_bounds, Point, TextDetection, TextDetector};
use crate::config::{DetectorConfig, SessionConfig};
use crate::runtime::ExecutionContext;

/// Text detector backed by an ONNX DBNet model
pub struct DbTextDetector {
    session: OnnxSession,
    context: Arc<ExecutionContext>,
    config: DetectorConfig,
}

impl DbTextDetector {
    pub fn new(
        files: &ModelFiles,
        context: Arc<ExecutionContext>,
        session_config: &SessionConfig,
        config: DetectorConfig,
    ) -> Result<Self> {
        let session = OnnxSession::new(&files.model, context.device(), session_config)?;
        info!("Text detector ready ({:?})", files.model);

        Ok(Self {
            session,
            context,
            config,
        })
    }
}

impl TextDetector for DbTextDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<TextDetection>> {
        let _scope = self.context.scope("TextDetector");
        let start = Instant::now();

        let (shape, data) = into_input(preprocess_for_detection(image, self.config.limit_side_len));
        let (out_shape, out) = self.session.run(shape, data)?;

        let (map_h, map_w) = probability_map_dims(&out_shape)?;
        let prob = ArrayView2::from_shape((map_h, map_w), &out[..map_h * map_w])
            .context("Probability map does not match its shape")?;

        let detections = boxes_from_probability_map(&prob, &self.config, image.dimensions());

        debug!(
            "Text detection complete in {:?}: {} regions",
            start.elapsed(),
            detections.len()
        );
        Ok(detections)
    }
}

/// Height and width of the probability map from `[N, 1, H, W]` or `[N, H, W]`
fn probability_map_dims(shape: &[i64]) -> Result<(usize, usize)> {
    let dims = match shape {
        [_, 1, h, w] | [_, h, w] => (*h, *w),
        _ => anyhow::bail!("Unexpected detection output shape {:?}", shape),
    };
    if dims.0 <= 0 || dims.1 <= 0 {
        anyhow::bail!("Empty detection output shape {:?}", shape);
    }
    Ok((dims.0 as usize, dims.1 as usize))
}

/// Reduce a probability map to scored boxes in destination image coordinates
pub fn boxes_from_probability_map(
    prob: &ArrayView2<f32>,
    config: &DetectorConfig,
    (dest_width, dest_height): (u32, u32),
) -> Vec<TextDetection> {
    let (height, width) = prob.dim();
    if height == 0 || width == 0 {
        return vec![];
    }
    let width_scale = dest_width as f32 / width as f32;
    let height_scale = dest_height as f32 / height as f32;

    let bitmap = GrayImage::from_fn(width as u32, height as u32, |x, y| {
        if prob[[y as usize, x as usize]] > config.thresh {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    let contours = find_contours::<i32>(&bitmap);
    let mut detections = Vec::new();

    for contour in contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .take(config.max_candidates)
    {
        if contour.points.is_empty() {
            continue;
        }

        // Corners come back as top-left, top-right, bottom-right, bottom-left
        let pixel_rect = min_area_rect(&contour.points);
        let rect: [Point; 4] = pixel_rect.map(|p| (p.x as f32, p.y as f32));
        if short_side(&rect) < config.min_size {
            continue;
        }

        let score = box_score(prob, &rect);
        if score < config.box_thresh {
            continue;
        }

        let perimeter = arc_length(&pixel_rect, true) as f32;
        if perimeter <= f32::EPSILON {
            continue;
        }
        let delta = contour_area(&pixel_rect) as f32 * config.unclip_ratio / perimeter;
        let expanded = expand_rect(&rect, delta);
        if short_side(&expanded) < config.min_size + 2.0 {
            continue;
        }

        let scaled = expanded.map(|(x, y)| {
            (
                (x * width_scale).round().clamp(0.0, dest_width as f32),
                (y * height_scale).round().clamp(0.0, dest_height as f32),
            )
        });

        detections.push(TextDetection {
            polygon: scaled.to_vec(),
            score,
        });
    }

    detections
}

/// Mean probability of the map pixels inside the box
fn box_score(prob: &ArrayView2<f32>, rect: &[Point; 4]) -> f32 {
    let (height, width) = prob.dim();
    let Some((min_x, min_y, max_x, max_y)) = polygon_bounds(rect) else {
        return 0.0;
    };

    let x0 = min_x.floor().clamp(0.0, (width - 1) as f32) as usize;
    let x1 = max_x.ceil().clamp(0.0, (width - 1) as f32) as usize;
    let y0 = min_y.floor().clamp(0.0, (height - 1) as f32) as usize;
    let y1 = max_y.ceil().clamp(0.0, (height - 1) as f32) as usize;

    let mut sum = 0.0f32;
    let mut count = 0usize;
    for y in y0..=y1 {
        for x in x0..=x1 {
            // Pixel centres lying on the box edge are counted as inside
            let inside = contains_point(rect, (x as f32, y as f32))
                || contains_point(rect, (x as f32 + 0.01, y as f32 + 0.01));
            if inside {
                sum += prob[[y, x]];
                count += 1;
            }
        }
    }

    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}
