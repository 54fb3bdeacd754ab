//! Vision/OCR Layer
//!
//! Text detection and recognition behind two capability traits. The ONNX
//! Runtime backend implements them with DBNet-style detection and
//! CTC-decoded recognition models.

pub mod detection;
pub mod geometry;
pub mod models;
pub mod preprocess;
pub mod recognition;

use anyhow::Result;
use image::RgbImage;

pub use detection::DbTextDetector;
pub use models::ModelFiles;
pub use recognition::CtcTextRecognizer;

/// A point in image pixel coordinates
pub type Point = (f32, f32);

/// Ordered polygon outline
pub type Polygon = Vec<Point>;

/// Detected text region
#[derive(Debug, Clone, PartialEq)]
pub struct TextDetection {
    /// Region outline, clockwise from top-left for detector output
    pub polygon: Polygon,
    /// Detection confidence (0.0 - 1.0)
    pub score: f32,
}

/// Recognized text for one region
#[derive(Debug, Clone, PartialEq)]
pub struct TextRecognition {
    pub text: String,
    /// Mean per-character confidence (0.0 - 1.0)
    pub score: f32,
}

/// Finds text regions in an image
pub trait TextDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<TextDetection>>;
}

/// Reads the text inside detected regions
///
/// Must return exactly one result per input region, in the same order.
pub trait TextRecognizer {
    fn recognize(&mut self, image: &RgbImage, regions: &[TextDetection]) -> Result<Vec<TextRecognition>>;
}

/// Axis-aligned bounds of a polygon as (min_x, min_y, max_x, max_y)
pub fn polygon_bounds(polygon: &[Point]) -> Option<(f32, f32, f32, f32)> {
    if polygon.is_empty() {
        return None;
    }

    let min_x = polygon.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let min_y = polygon.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    let max_x = polygon.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
    let max_y = polygon.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

    Some((min_x, min_y, max_x, max_y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_bounds() {
        let polygon = vec![(3.0, 4.0), (10.5, 2.0), (9.0, 8.25), (1.0, 7.0)];
        assert_eq!(polygon_bounds(&polygon), Some((1.0, 2.0, 10.5, 8.25)));
        assert_eq!(polygon_bounds(&[]), None);
    }
}
