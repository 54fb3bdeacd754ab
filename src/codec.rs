//! Image decode/encode
//!
//! Thin wrapper over the `image` crate that maps failures onto the runner's
//! error taxonomy.

use image::RgbImage;
use std::path::Path;
use tracing::debug;

use crate::error::OcrError;

/// Decode an image file into an RGB buffer
///
/// A file that decodes to zero pixels is treated the same as an undecodable one.
pub fn load_image(path: &Path) -> Result<RgbImage, OcrError> {
    let decoded = image::open(path).map_err(|e| OcrError::ImageLoad {
        path: path.to_path_buf(),
        source: Some(e.into()),
    })?;

    let rgb = decoded.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(OcrError::ImageLoad {
            path: path.to_path_buf(),
            source: None,
        });
    }

    debug!("Decoded {:?} ({}x{})", path, rgb.width(), rgb.height());
    Ok(rgb)
}

/// Encode and write an RGB buffer, overwriting any existing file
///
/// The format is chosen from the file extension.
pub fn save_image(image: &RgbImage, path: &Path) -> Result<(), OcrError> {
    image.save(path).map_err(|e| OcrError::ImageWrite {
        path: path.to_path_buf(),
        source: e.into(),
    })?;

    debug!("Wrote {}x{} image to {:?}", image.width(), image.height(), path);
    Ok(())
}
