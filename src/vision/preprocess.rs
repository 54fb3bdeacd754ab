//! Image preprocessing for OCR models
//!
//! Handles image resizing, normalization, and tensor conversion for the
//! detection and recognition models.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{s, Array3, Array4};

/// ImageNet statistics used by DBNet detectors
pub const DET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const DET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Recognition models map [0, 255] -> [-1, 1]
pub const REC_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
pub const REC_STD: [f32; 3] = [0.5, 0.5, 0.5];

/// Convert an RGB image to an HWC f32 array in 0-1
pub fn rgb_to_f32(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut rgb = Array3::<f32>::zeros((height as usize, width as usize, 3));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            rgb[[y as usize, x as usize, c]] = pixel.0[c] as f32 / 255.0;
        }
    }

    rgb
}

/// Normalize image with mean and std
pub fn normalize(image: &Array3<f32>, mean: &[f32; 3], std: &[f32; 3]) -> Array3<f32> {
    let (h, w, _) = image.dim();
    let mut normalized = Array3::<f32>::zeros((h, w, 3));

    for y in 0..h {
        for x in 0..w {
            for c in 0..3 {
                normalized[[y, x, c]] = (image[[y, x, c]] - mean[c]) / std[c];
            }
        }
    }

    normalized
}

/// Convert HWC image to NCHW tensor (batch size 1)
pub fn hwc_to_nchw(image: &Array3<f32>) -> Array4<f32> {
    let (h, w, c) = image.dim();
    let mut tensor = Array4::<f32>::zeros((1, c, h, w));

    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                tensor[[0, ch, y, x]] = image[[y, x, ch]];
            }
        }
    }

    tensor
}

/// Resized dimensions for detection: longest side limited to `limit_side_len`,
/// each side rounded to a multiple of 32 (the model's stride)
pub fn detection_size(width: u32, height: u32, limit_side_len: u32) -> (u32, u32) {
    let longest = width.max(height) as f32;
    let ratio = if longest > limit_side_len as f32 {
        limit_side_len as f32 / longest
    } else {
        1.0
    };

    let round32 = |v: f32| (((v / 32.0).round() as u32) * 32).max(32);
    (round32(width as f32 * ratio), round32(height as f32 * ratio))
}

/// Full preprocessing pipeline for detection
pub fn preprocess_for_detection(image: &RgbImage, limit_side_len: u32) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let (new_w, new_h) = detection_size(width, height, limit_side_len);

    // 1. Resize to a stride-aligned size
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    // 2. Normalize
    let normalized = normalize(&rgb_to_f32(&resized), &DET_MEAN, &DET_STD);

    // 3. Convert to NCHW tensor
    hwc_to_nchw(&normalized)
}

/// Full preprocessing pipeline for recognition
///
/// The crop is scaled to `target_height` keeping its aspect ratio (width capped
/// at `max_width`) and right-padded with zeros to `max_width`.
pub fn preprocess_for_recognition(crop: &RgbImage, target_height: u32, max_width: u32) -> Array4<f32> {
    let (width, height) = crop.dimensions();
    let ratio = width as f32 / height.max(1) as f32;
    let resized_w = ((target_height as f32 * ratio).ceil() as u32).clamp(1, max_width);

    let resized = imageops::resize(crop, resized_w, target_height, FilterType::Triangle);
    let normalized = normalize(&rgb_to_f32(&resized), &REC_MEAN, &REC_STD);

    let mut tensor = Array4::<f32>::zeros((1, 3, target_height as usize, max_width as usize));
    tensor
        .slice_mut(s![.., .., .., ..resized_w as usize])
        .assign(&hwc_to_nchw(&normalized));
    tensor
}

/// Flatten a standard-layout tensor into (shape, data) for the session
pub fn into_input(tensor: Array4<f32>) -> ([usize; 4], Vec<f32>) {
    let (n, c, h, w) = tensor.dim();
    let data = if tensor.is_standard_layout() {
        let (data, _offset) = tensor.into_raw_vec_and_offset();
        data
    } else {
        tensor.iter().copied().collect()
    };
    ([n, c, h, w], data)
}
