//! Person segmentation model and the mask statistics derived from it.
//!
//! The model emits a foreground probability map at its fixed resolution; the
//! map is resampled back to frame size and binarized at 0.5. Everything the
//! aggregator needs (coverage, background whiteness, top margin) is computed
//! from that binary mask.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SEG_INPUT_SIZE: usize = 256;
const FOREGROUND_THRESHOLD: f32 = 0.5;
const WHITE_CHANNEL_MIN: u8 = 245;

#[derive(Error, Debug)]
pub enum SegmenterError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Binary subject/background mask at frame resolution.
pub struct ForegroundMask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl ForegroundMask {
    /// Wrap a row-major boolean buffer. `data.len()` must equal
    /// `width * height`.
    pub fn new(width: u32, height: u32, data: Vec<bool>) -> Self {
        assert_eq!(data.len(), (width * height) as usize);
        Self { width, height, data }
    }

    /// Binarize a probability map, bilinearly resampled to `width`×`height`.
    pub fn from_probabilities(
        probabilities: &[f32],
        map_width: usize,
        map_height: usize,
        width: u32,
        height: u32,
    ) -> Self {
        let mut data = vec![false; (width * height) as usize];

        for y in 0..height as usize {
            let src_y = (y as f32 + 0.5) * map_height as f32 / height as f32 - 0.5;
            let y0 = (src_y.floor() as i32).clamp(0, map_height as i32 - 1) as usize;
            let y1 = (y0 + 1).min(map_height - 1);
            let fy = (src_y - y0 as f32).clamp(0.0, 1.0);

            for x in 0..width as usize {
                let src_x = (x as f32 + 0.5) * map_width as f32 / width as f32 - 0.5;
                let x0 = (src_x.floor() as i32).clamp(0, map_width as i32 - 1) as usize;
                let x1 = (x0 + 1).min(map_width - 1);
                let fx = (src_x - x0 as f32).clamp(0.0, 1.0);

                let tl = probabilities[y0 * map_width + x0];
                let tr = probabilities[y0 * map_width + x1];
                let bl = probabilities[y1 * map_width + x0];
                let br = probabilities[y1 * map_width + x1];

                let p = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                data[y * width as usize + x] = p > FOREGROUND_THRESHOLD;
            }
        }

        Self { width, height, data }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.data[(y * self.width + x) as usize]
    }

    /// Index of the topmost row containing any subject pixel.
    pub fn top_foreground_row(&self) -> Option<u32> {
        (0..self.height).find(|&y| (0..self.width).any(|x| self.is_foreground(x, y)))
    }
}

/// Mask-derived numbers the aggregator compares against thresholds.
#[derive(Debug, Clone, Copy)]
pub struct MaskStats {
    /// Fraction of frame pixels classified as subject.
    pub coverage: f32,
    /// Fraction of background pixels with all three channels near-white.
    /// Zero when the mask leaves no background at all.
    pub background_white_ratio: f32,
    /// Whether the subject stays strictly below the top edge.
    pub head_has_margin: bool,
}

impl MaskStats {
    pub fn compute(mask: &ForegroundMask, image: &RgbImage) -> Self {
        debug_assert_eq!((mask.width(), mask.height()), image.dimensions());

        let total = (mask.width() * mask.height()) as f32;
        let mut foreground = 0u64;
        let mut background = 0u64;
        let mut white_background = 0u64;

        for (x, y, pixel) in image.enumerate_pixels() {
            if mask.is_foreground(x, y) {
                foreground += 1;
            } else {
                background += 1;
                if pixel.0.iter().all(|&c| c >= WHITE_CHANNEL_MIN) {
                    white_background += 1;
                }
            }
        }

        let background_white_ratio = if background > 0 {
            white_background as f32 / background as f32
        } else {
            0.0
        };

        Self {
            coverage: foreground as f32 / total,
            background_white_ratio,
            head_has_margin: mask.top_foreground_row().is_some_and(|row| row >= 1),
        }
    }
}

/// Background-subtracted copy of the frame: subject pixels kept, background
/// black.
pub fn cut_out(image: &RgbImage, mask: &ForegroundMask) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        if mask.is_foreground(x, y) {
            out.put_pixel(x, y, *pixel);
        }
    }
    out
}

pub struct Segmenter {
    session: Session,
}

impl Segmenter {
    /// Load the segmentation model from the given path.
    pub fn load(model_path: &str) -> Result<Self, SegmenterError> {
        if !Path::new(model_path).exists() {
            return Err(SegmenterError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = model_path, "loaded segmentation model");
        Ok(Self { session })
    }

    /// Segment the frame into a binary subject mask at frame resolution.
    pub fn mask(&mut self, image: &RgbImage) -> Result<ForegroundMask, SegmenterError> {
        let input = preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, probabilities) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| SegmenterError::InferenceFailed(format!("mask tensor: {e}")))?;

        let expected = SEG_INPUT_SIZE * SEG_INPUT_SIZE;
        if probabilities.len() != expected {
            return Err(SegmenterError::InferenceFailed(format!(
                "expected a {SEG_INPUT_SIZE}x{SEG_INPUT_SIZE} probability map, got {} values",
                probabilities.len()
            )));
        }

        Ok(ForegroundMask::from_probabilities(
            probabilities,
            SEG_INPUT_SIZE,
            SEG_INPUT_SIZE,
            image.width(),
            image.height(),
        ))
    }
}

/// Normalize the frame into the fixed-size NCHW segmentation input.
fn preprocess(image: &RgbImage) -> Array4<f32> {
    let size = SEG_INPUT_SIZE;
    let resized = imageops::resize(image, size as u32, size as u32, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] = f32::from(pixel.0[channel]) / 255.0;
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Mask with a filled foreground rectangle, everything else background.
    fn rect_mask(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> ForegroundMask {
        let mut data = vec![false; (width * height) as usize];
        for y in y0..y1 {
            for x in x0..x1 {
                data[(y * width + x) as usize] = true;
            }
        }
        ForegroundMask::new(width, height, data)
    }

    #[test]
    fn test_coverage_ratio() {
        let mask = rect_mask(10, 10, 0, 0, 5, 10);
        let image = RgbImage::new(10, 10);
        let stats = MaskStats::compute(&mask, &image);
        assert!((stats.coverage - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_white_background_accepted() {
        let mask = rect_mask(10, 10, 2, 2, 8, 8);
        let image = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
        let stats = MaskStats::compute(&mask, &image);
        assert!((stats.background_white_ratio - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_black_background_rejected() {
        let mask = rect_mask(10, 10, 2, 2, 8, 8);
        let image = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        let stats = MaskStats::compute(&mask, &image);
        assert!(stats.background_white_ratio.abs() < 1e-6);
    }

    #[test]
    fn test_whiteness_requires_all_channels() {
        // Bright yellow background: R and G near-white, B dark.
        let mask = rect_mask(10, 10, 2, 2, 8, 8);
        let image = RgbImage::from_pixel(10, 10, Rgb([250, 250, 40]));
        let stats = MaskStats::compute(&mask, &image);
        assert!(stats.background_white_ratio.abs() < 1e-6);
    }

    #[test]
    fn test_full_frame_mask_has_no_background() {
        let mask = rect_mask(10, 10, 0, 0, 10, 10);
        let image = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
        let stats = MaskStats::compute(&mask, &image);
        // No background pixels at all: never accepted as white.
        assert_eq!(stats.background_white_ratio, 0.0);
        assert!((stats.coverage - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_head_margin_present() {
        let mask = rect_mask(10, 10, 3, 2, 7, 10);
        let image = RgbImage::new(10, 10);
        assert!(MaskStats::compute(&mask, &image).head_has_margin);
    }

    #[test]
    fn test_head_margin_missing_when_touching_top() {
        let mask = rect_mask(10, 10, 3, 0, 7, 10);
        let image = RgbImage::new(10, 10);
        assert!(!MaskStats::compute(&mask, &image).head_has_margin);
    }

    #[test]
    fn test_head_margin_missing_for_empty_mask() {
        let mask = rect_mask(10, 10, 0, 0, 0, 0);
        let image = RgbImage::new(10, 10);
        let stats = MaskStats::compute(&mask, &image);
        assert!(!stats.head_has_margin);
        assert_eq!(stats.coverage, 0.0);
    }

    #[test]
    fn test_top_foreground_row() {
        let mask = rect_mask(8, 8, 2, 3, 6, 6);
        assert_eq!(mask.top_foreground_row(), Some(3));

        let empty = rect_mask(8, 8, 0, 0, 0, 0);
        assert_eq!(empty.top_foreground_row(), None);
    }

    #[test]
    fn test_cut_out_blacks_background() {
        let mask = rect_mask(4, 4, 0, 0, 2, 4);
        let image = RgbImage::from_pixel(4, 4, Rgb([200, 150, 100]));
        let cut = cut_out(&image, &mask);

        assert_eq!(cut.get_pixel(0, 0).0, [200, 150, 100]);
        assert_eq!(cut.get_pixel(3, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_from_probabilities_same_size() {
        let probs = vec![0.9, 0.1, 0.1, 0.9];
        let mask = ForegroundMask::from_probabilities(&probs, 2, 2, 2, 2);
        assert!(mask.is_foreground(0, 0));
        assert!(!mask.is_foreground(1, 0));
        assert!(!mask.is_foreground(0, 1));
        assert!(mask.is_foreground(1, 1));
    }

    #[test]
    fn test_from_probabilities_upsamples() {
        // Left half foreground, right half background, upsampled 2x.
        let probs = vec![1.0, 0.0, 1.0, 0.0];
        let mask = ForegroundMask::from_probabilities(&probs, 2, 2, 4, 4);
        assert!(mask.is_foreground(0, 0));
        assert!(mask.is_foreground(0, 3));
        assert!(!mask.is_foreground(3, 0));
        assert!(!mask.is_foreground(3, 3));
    }

    #[test]
    fn test_preprocess_shape() {
        let image = RgbImage::from_pixel(33, 47, Rgb([128, 128, 128]));
        let tensor = preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, SEG_INPUT_SIZE, SEG_INPUT_SIZE]);
    }
}
