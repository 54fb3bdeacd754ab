//! Result Presentation Layer
//!
//! Writes the per-region text report and draws region outlines onto the image.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use std::io::{self, Write};

use crate::vision::Point;

/// Write one report block: `box[i]: text` then every point to two decimals
pub fn write_region_report<W: Write>(out: &mut W, index: usize, text: &str, polygon: &[Point]) -> io::Result<()> {
    writeln!(out, "box[{}]: {}", index, text)?;
    for (x, y) in polygon {
        write!(out, "x: {:.2}, y: {:.2}, ", x, y)?;
    }
    writeln!(out)
}

/// Draw a closed outline through the polygon's points
///
/// Coordinates are truncated toward zero; anything outside the image is clipped.
pub fn draw_closed_polygon(image: &mut RgbImage, polygon: &[Point], color: Rgb<u8>) {
    let pixels: Vec<(f32, f32)> = polygon
        .iter()
        .map(|&(x, y)| ((x as i32) as f32, (y as i32) as f32))
        .collect();

    match pixels.as_slice() {
        [] => {}
        [only] => draw_line_segment_mut(image, *only, *only, color),
        _ => {
            for (i, &start) in pixels.iter().enumerate() {
                let end = pixels[(i + 1) % pixels.len()];
                draw_line_segment_mut(image, start, end, color);
            }
        }
    }
}
