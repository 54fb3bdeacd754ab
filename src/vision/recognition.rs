//! Text recognition module
//!
//! Crops each detected region upright, runs a CTC-trained recognition model
//! on it and greedily decodes the per-step class scores into text.

use anyhow::{Context, Result};
use image::imageops;
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::geometry::distance;
use super::models::{ModelFiles, OnnxSession};
use super::preprocess::{into_input, preprocess_for_recognition};
use super::{polygon_bounds, Point, TextDetection, TextRecognition, TextRecognizer};
use crate::config::{RecognizerConfig, SessionConfig};
use crate::runtime::ExecutionContext;

/// Crops taller than this ratio are treated as vertical text
const VERTICAL_RATIO: f32 = 1.5;

/// Character set of a recognition model; class `k` maps to token `k - 1`
#[derive(Debug, Clone, PartialEq)]
pub struct CharDictionary {
    tokens: Vec<String>,
}

impl CharDictionary {
    /// Load one token per line, skipping empty lines
    pub fn load(path: &Path, use_space_char: bool) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dictionary {:?}", path))?;

        let mut tokens: Vec<String> = content
            .lines()
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        if tokens.is_empty() {
            anyhow::bail!("Dictionary {:?} is empty", path);
        }
        if use_space_char {
            tokens.push(" ".to_string());
        }

        Ok(Self { tokens })
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    fn token(&self, class: usize) -> Option<&str> {
        class
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(String::as_str)
    }
}

/// Text recognizer backed by an ONNX CRNN/SVTR model with CTC output
pub struct CtcTextRecognizer {
    session: OnnxSession,
    context: Arc<ExecutionContext>,
    dictionary: CharDictionary,
    config: RecognizerConfig,
}

impl CtcTextRecognizer {
    pub fn new(
        files: &ModelFiles,
        context: Arc<ExecutionContext>,
        session_config: &SessionConfig,
        config: RecognizerConfig,
    ) -> Result<Self> {
        let dict_path = config
            .dictionary
            .clone()
            .or_else(|| files.dictionary())
            .with_context(|| format!("No dictionary configured or found in {:?}", files.dir))?;
        let dictionary = CharDictionary::load(&dict_path, config.use_space_char)?;

        let session = OnnxSession::new(&files.model, context.device(), session_config)?;
        info!(
            "Text recognizer ready ({:?}, {} tokens)",
            files.model,
            dictionary.token_count()
        );

        Ok(Self {
            session,
            context,
            dictionary,
            config,
        })
    }

    fn recognize_crop(&mut self, crop: &RgbImage) -> Result<TextRecognition> {
        let tensor = preprocess_for_recognition(crop, self.config.image_height, self.config.max_width);
        let (shape, data) = into_input(tensor);
        let (out_shape, out) = self.session.run(shape, data)?;

        let (seq_len, classes, layout_ntc) =
            output_layout(&out_shape, self.dictionary.token_count() + 1)?;

        if classes != self.dictionary.token_count() + 1 {
            warn!(
                "Recognition model has {} classes but dictionary has {} tokens",
                classes,
                self.dictionary.token_count()
            );
        }

        Ok(ctc_greedy_decode(&out, seq_len, classes, layout_ntc, &self.dictionary))
    }
}

impl TextRecognizer for CtcTextRecognizer {
    fn recognize(&mut self, image: &RgbImage, regions: &[TextDetection]) -> Result<Vec<TextRecognition>> {
        let context = Arc::clone(&self.context);
        let _scope = context.scope("TextRecognizer");
        let start = Instant::now();

        let mut results = Vec::with_capacity(regions.len());
        for region in regions {
            let result = match crop_region(image, &region.polygon) {
                Some(crop) => self.recognize_crop(&crop)?,
                None => TextRecognition {
                    text: String::new(),
                    score: 0.0,
                },
            };
            results.push(result);
        }

        debug!(
            "Text recognition complete in {:?}: {} regions",
            start.elapsed(),
            results.len()
        );
        Ok(results)
    }
}

/// Sequence length, class count and whether the output is `[N, T, C]`
///
/// The class axis is the one matching the dictionary size plus blank. When
/// neither axis matches, the larger one is taken as the class axis.
fn output_layout(shape: &[i64], expected_classes: usize) -> Result<(usize, usize, bool)> {
    let (d1, d2) = match shape {
        [_, d1, d2] if *d1 > 0 && *d2 > 0 => (*d1 as usize, *d2 as usize),
        _ => anyhow::bail!("Unexpected recognition output shape {:?}", shape),
    };

    let layout_ntc = if d2 == expected_classes {
        true
    } else if d1 == expected_classes {
        false
    } else {
        d2 > d1
    };

    Ok(if layout_ntc { (d1, d2, true) } else { (d2, d1, false) })
}

/// Greedy CTC decoding: argmax per step, drop blanks (class 0) and repeats
///
/// Returns the text and the mean probability of the emitted characters.
pub fn ctc_greedy_decode(
    data: &[f32],
    seq_len: usize,
    classes: usize,
    layout_ntc: bool,
    dictionary: &CharDictionary,
) -> TextRecognition {
    let mut text = String::new();
    let mut probs: Vec<f32> = Vec::new();
    let mut prev: Option<usize> = None;

    for t in 0..seq_len {
        let mut max_idx = 0usize;
        let mut max_val = f32::MIN;
        for c in 0..classes {
            let idx = if layout_ntc {
                t * classes + c
            } else {
                c * seq_len + t
            };
            let val = data.get(idx).copied().unwrap_or(f32::MIN);
            if val > max_val {
                max_val = val;
                max_idx = c;
            }
        }

        if max_idx != 0 && prev != Some(max_idx) {
            if let Some(token) = dictionary.token(max_idx) {
                text.push_str(token);
                probs.push(max_val);
            }
        }
        prev = Some(max_idx);
    }

    let score = if probs.is_empty() {
        0.0
    } else {
        probs.iter().sum::<f32>() / probs.len() as f32
    };

    TextRecognition { text, score }
}

/// Cut a region out of the image as an upright rectangle
///
/// Quadrilaterals are perspective-corrected; other polygons use their
/// axis-aligned bounds. Returns `None` for regions with no area.
pub fn crop_region(image: &RgbImage, polygon: &[Point]) -> Option<RgbImage> {
    let crop = match polygon {
        [p0, p1, p2, p3] => warp_quad(image, [*p0, *p1, *p2, *p3])
            .or_else(|| crop_bounds(image, polygon))?,
        _ => crop_bounds(image, polygon)?,
    };

    let (w, h) = crop.dimensions();
    if h as f32 / w as f32 >= VERTICAL_RATIO {
        Some(imageops::rotate270(&crop))
    } else {
        Some(crop)
    }
}

fn warp_quad(image: &RgbImage, quad: [Point; 4]) -> Option<RgbImage> {
    let width = distance(quad[0], quad[1]).max(distance(quad[3], quad[2])) as u32;
    let height = distance(quad[0], quad[3]).max(distance(quad[1], quad[2])) as u32;
    if width == 0 || height == 0 {
        return None;
    }

    let (w, h) = (width as f32, height as f32);
    let projection = Projection::from_control_points(quad, [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)])?;

    let mut out = RgbImage::new(width, height);
    warp_into(image, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut out);
    Some(out)
}

fn crop_bounds(image: &RgbImage, polygon: &[Point]) -> Option<RgbImage> {
    let (min_x, min_y, max_x, max_y) = polygon_bounds(polygon)?;
    let (img_w, img_h) = image.dimensions();

    let x0 = (min_x.max(0.0) as u32).min(img_w);
    let y0 = (min_y.max(0.0) as u32).min(img_h);
    let x1 = (max_x.max(0.0).ceil() as u32).min(img_w);
    let y1 = (max_y.max(0.0).ceil() as u32).min(img_h);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some(imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn dict(chars: &str) -> CharDictionary {
        CharDictionary {
            tokens: chars.chars().map(|c| c.to_string()).collect(),
        }
    }

    /// Build an NTC score matrix from the argmax class of each step
    fn one_hot(steps: &[usize], classes: usize) -> Vec<f32> {
        let mut data = vec![0.0; steps.len() * classes];
        for (t, &c) in steps.iter().enumerate() {
            data[t * classes + c] = 0.9;
        }
        data
    }

    #[test]
    fn test_ctc_collapses_repeats_and_blanks() {
        let dictionary = dict("HI");
        // H H _ I I _ I  ->  "HII"
        let data = one_hot(&[1, 1, 0, 2, 2, 0, 2], 3);

        let result = ctc_greedy_decode(&data, 7, 3, true, &dictionary);
        assert_eq!(result.text, "HII");
        assert!((result.score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_ctc_nct_layout() {
        let dictionary = dict("ab");
        let ntc = one_hot(&[1, 0, 2], 3);
        // Transpose [T, C] -> [C, T]
        let mut nct = vec![0.0; ntc.len()];
        for t in 0..3 {
            for c in 0..3 {
                nct[c * 3 + t] = ntc[t * 3 + c];
            }
        }

        let result = ctc_greedy_decode(&nct, 3, 3, false, &dictionary);
        assert_eq!(result.text, "ab");
    }

    #[test]
    fn test_ctc_all_blank() {
        let result = ctc_greedy_decode(&one_hot(&[0, 0, 0], 3), 3, 3, true, &dict("ab"));
        assert_eq!(result.text, "");
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_output_layout_follows_dictionary_size() {
        // 36 characters + blank; CRNN at stride 4 over a 320 px crop gives T = 80
        assert_eq!(output_layout(&[1, 80, 37], 37).unwrap(), (80, 37, true));
        assert_eq!(output_layout(&[1, 37, 80], 37).unwrap(), (80, 37, false));
        // Large dictionaries, T < C
        assert_eq!(output_layout(&[1, 40, 6625], 6625).unwrap(), (40, 6625, true));
    }

    #[test]
    fn test_output_layout_without_matching_axis() {
        assert_eq!(output_layout(&[1, 40, 100], 7).unwrap(), (40, 100, true));
        assert_eq!(output_layout(&[1, 100, 40], 7).unwrap(), (40, 100, false));
        assert!(output_layout(&[1, 0, 40], 7).is_err());
        assert!(output_layout(&[80, 37], 37).is_err());
    }

    #[test]
    fn test_decode_long_sequence_short_alphabet() {
        let dictionary = dict("0123456789abcdefghijklmnopqrstuvwxyz");
        let (h, i) = (18, 19);
        let mut steps = vec![0; 80];
        steps[5] = h;
        steps[6] = h;
        steps[20] = i;

        let data = one_hot(&steps, 37);
        let (seq_len, classes, layout_ntc) =
            output_layout(&[1, 80, 37], dictionary.token_count() + 1).unwrap();
        let result = ctc_greedy_decode(&data, seq_len, classes, layout_ntc, &dictionary);

        assert_eq!(result.text, "hi");
    }

    #[test]
    fn test_load_dictionary() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "a\r\nb\n\nc\n").unwrap();

        let with_space = CharDictionary::load(file.path(), true).unwrap();
        assert_eq!(with_space.token_count(), 4);
        assert_eq!(with_space.token(1), Some("a"));
        assert_eq!(with_space.token(3), Some("c"));
        assert_eq!(with_space.token(4), Some(" "));
        assert_eq!(with_space.token(0), None);

        let without_space = CharDictionary::load(file.path(), false).unwrap();
        assert_eq!(without_space.token_count(), 3);
    }

    #[test]
    fn test_load_empty_dictionary() {
        let file = NamedTempFile::new().unwrap();
        assert!(CharDictionary::load(file.path(), true).is_err());
    }

    #[test]
    fn test_crop_axis_aligned_quad() {
        let mut img = RgbImage::new(40, 20);
        for y in 5..15 {
            for x in 10..30 {
                img.put_pixel(x, y, Rgb([200, 100, 50]));
            }
        }

        let quad = vec![(10.0, 5.0), (30.0, 5.0), (30.0, 15.0), (10.0, 15.0)];
        let crop = crop_region(&img, &quad).unwrap();

        assert_eq!(crop.dimensions(), (20, 10));
        assert_eq!(crop.get_pixel(10, 5), &Rgb([200, 100, 50]));
    }

    #[test]
    fn test_crop_tall_region_is_rotated() {
        let img = RgbImage::new(40, 40);
        let quad = vec![(10.0, 0.0), (20.0, 0.0), (20.0, 30.0), (10.0, 30.0)];

        let crop = crop_region(&img, &quad).unwrap();
        assert_eq!(crop.dimensions(), (30, 10));
    }

    #[test]
    fn test_crop_non_quad_uses_bounds() {
        let img = RgbImage::new(40, 40);
        let polygon = vec![(5.0, 5.0), (25.0, 5.0), (30.0, 10.0), (25.0, 15.0), (5.0, 15.0)];

        let crop = crop_region(&img, &polygon).unwrap();
        assert_eq!(crop.dimensions(), (25, 10));
    }

    #[test]
    fn test_crop_degenerate_region() {
        let img = RgbImage::new(40, 40);
        assert!(crop_region(&img, &[(5.0, 5.0), (5.0, 5.0), (5.0, 5.0), (5.0, 5.0)]).is_none());
        assert!(crop_region(&img, &[]).is_none());
    }
}
