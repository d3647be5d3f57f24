//! Pixel-statistics quality checks: blur, contrast, exposure and shadows.
//!
//! All checks read a BT.601 luma plane derived from the RGB buffer and reduce
//! it to a single ratio or variance compared against a fixed threshold. They
//! are independent of each other and of the model-backed checks.

use image::RgbImage;

use crate::types::{CheckResult, ContrastMode, Thresholds};

const HISTOGRAM_BUCKETS: usize = 256;
const LOWER_PERCENTILE: f32 = 0.05;
const UPPER_PERCENTILE: f32 = 0.95;
const OVEREXPOSED_INTENSITY: u8 = 245;
const SHADOW_INTENSITY: u8 = 50;

/// BT.601 luma plane of an RGB image, row-major.
pub(crate) fn grayscale(image: &RgbImage) -> Vec<u8> {
    image
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            (0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b))
                .round()
                .clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// Sharpness check via the variance of the 3×3 Laplacian.
pub fn check_blur(image: &RgbImage, thresholds: &Thresholds) -> CheckResult {
    let gray = grayscale(image);
    let variance = laplacian_variance(&gray, image.width() as usize, image.height() as usize);
    tracing::debug!(variance, "blur check");
    if variance < thresholds.blur_min_variance {
        CheckResult::fail("Image is blurry")
    } else {
        CheckResult::pass("Image is clear")
    }
}

/// Variance of the 4-connected Laplacian over interior pixels.
///
/// Images smaller than 3×3 have no interior and score 0 (maximally blurry).
fn laplacian_variance(gray: &[u8], width: usize, height: usize) -> f64 {
    if width < 3 || height < 3 {
        return 0.0;
    }

    let count = ((width - 2) * (height - 2)) as f64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = f64::from(gray[y * width + x]);
            let response = f64::from(gray[y * width + x - 1])
                + f64::from(gray[y * width + x + 1])
                + f64::from(gray[(y - 1) * width + x])
                + f64::from(gray[(y + 1) * width + x])
                - 4.0 * center;
            sum += response;
            sum_sq += response * response;
        }
    }

    let mean = sum / count;
    sum_sq / count - mean * mean
}

/// Whichever exposure/contrast variant the thresholds select.
pub fn check_contrast(image: &RgbImage, thresholds: &Thresholds) -> CheckResult {
    match thresholds.contrast_mode {
        ContrastMode::Overexposure => check_overexposure(image, thresholds),
        ContrastMode::PercentileSpread => check_contrast_spread(image, thresholds),
    }
}

/// Contrast via the 5th–95th percentile spread of the intensity histogram.
pub fn check_contrast_spread(image: &RgbImage, thresholds: &Thresholds) -> CheckResult {
    let gray = grayscale(image);
    let mut histogram = [0u32; HISTOGRAM_BUCKETS];
    for &v in &gray {
        histogram[v as usize] += 1;
    }

    // First bucket index at which the cumulative histogram reaches each
    // percentile of the total pixel count.
    let total = gray.len() as f32;
    let lower_target = LOWER_PERCENTILE * total;
    let upper_target = UPPER_PERCENTILE * total;

    let mut cumulative = 0.0f32;
    let mut lower_idx = 0usize;
    let mut upper_idx = HISTOGRAM_BUCKETS - 1;
    let mut lower_found = false;
    for (bucket, &count) in histogram.iter().enumerate() {
        cumulative += count as f32;
        if !lower_found && cumulative >= lower_target {
            lower_idx = bucket;
            lower_found = true;
        }
        if cumulative >= upper_target {
            upper_idx = bucket;
            break;
        }
    }

    let spread = upper_idx.saturating_sub(lower_idx) as f32 / 255.0;
    tracing::debug!(spread, lower_idx, upper_idx, "contrast spread check");

    if spread < thresholds.contrast_min_spread {
        CheckResult::fail("Low contrast detected")
    } else if spread > thresholds.contrast_max_spread {
        CheckResult::fail("High contrast detected")
    } else {
        CheckResult::pass("Contrast is acceptable")
    }
}

/// Exposure via the fraction of near-saturated pixels.
pub fn check_overexposure(image: &RgbImage, thresholds: &Thresholds) -> CheckResult {
    let gray = grayscale(image);
    let bright = gray.iter().filter(|&&v| v > OVEREXPOSED_INTENSITY).count();
    let ratio = bright as f32 / gray.len() as f32;
    tracing::debug!(ratio, "overexposure check");

    if ratio > thresholds.overexposure_max_ratio {
        CheckResult::fail("Image is overexposed")
    } else {
        CheckResult::pass("Exposure is acceptable")
    }
}

/// Shadow check via the fraction of dark pixels.
pub fn check_shadows(image: &RgbImage, thresholds: &Thresholds) -> CheckResult {
    let gray = grayscale(image);
    let dark = gray.iter().filter(|&&v| v < SHADOW_INTENSITY).count();
    let ratio = dark as f32 / gray.len() as f32;
    tracing::debug!(ratio, "shadow check");

    if ratio > thresholds.shadow_max_ratio {
        CheckResult::fail("Shadows detected on the face or background")
    } else {
        CheckResult::pass("No significant shadows detected")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn uniform(width: u32, height: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([value, value, value]))
    }

    #[test]
    fn test_grayscale_weights() {
        let red = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        // 0.299 * 255 ≈ 76
        assert_eq!(grayscale(&red)[0], 76);

        let white = uniform(1, 1, 255);
        assert_eq!(grayscale(&white)[0], 255);
    }

    #[test]
    fn test_blur_fails_on_flat_image() {
        let image = uniform(64, 64, 128);
        let result = check_blur(&image, &Thresholds::default());
        assert!(!result.passed);
        assert_eq!(result.message, "Image is blurry");
    }

    #[test]
    fn test_blur_passes_on_checkerboard() {
        let image = RgbImage::from_fn(64, 64, |x, y| {
            let v = if (x + y) % 2 == 0 { 0 } else { 255 };
            Rgb([v, v, v])
        });
        let result = check_blur(&image, &Thresholds::default());
        assert!(result.passed, "checkerboard should be maximally sharp");
    }

    #[test]
    fn test_laplacian_variance_tiny_image() {
        assert_eq!(laplacian_variance(&[0, 255, 0, 255], 2, 2), 0.0);
    }

    #[test]
    fn test_contrast_spread_low_on_flat_image() {
        let image = uniform(32, 32, 128);
        let result = check_contrast_spread(&image, &Thresholds::default());
        assert!(!result.passed);
        assert_eq!(result.message, "Low contrast detected");
    }

    #[test]
    fn test_contrast_spread_high_on_bimodal_image() {
        let image = RgbImage::from_fn(32, 32, |x, _| {
            let v = if x < 16 { 0 } else { 255 };
            Rgb([v, v, v])
        });
        let result = check_contrast_spread(&image, &Thresholds::default());
        assert!(!result.passed);
        assert_eq!(result.message, "High contrast detected");
    }

    #[test]
    fn test_contrast_spread_accepts_moderate_ramp() {
        // Intensities spread evenly across [100, 200): spread ≈ 0.37.
        let image = RgbImage::from_fn(100, 10, |x, _| {
            let v = 100 + x as u8;
            Rgb([v, v, v])
        });
        let result = check_contrast_spread(&image, &Thresholds::default());
        assert!(result.passed, "moderate spread should pass: {}", result.message);
    }

    #[test]
    fn test_overexposure_fails_on_white_image() {
        let image = uniform(32, 32, 255);
        let result = check_overexposure(&image, &Thresholds::default());
        assert!(!result.passed);
        assert_eq!(result.message, "Image is overexposed");
    }

    #[test]
    fn test_overexposure_passes_on_gray_image() {
        let image = uniform(32, 32, 128);
        assert!(check_overexposure(&image, &Thresholds::default()).passed);
    }

    #[test]
    fn test_shadows_fail_on_black_image() {
        let image = uniform(32, 32, 0);
        let result = check_shadows(&image, &Thresholds::default());
        assert!(!result.passed);
        assert_eq!(result.message, "Shadows detected on the face or background");
    }

    #[test]
    fn test_shadows_pass_on_bright_image() {
        let image = uniform(32, 32, 200);
        assert!(check_shadows(&image, &Thresholds::default()).passed);
    }

    #[test]
    fn test_contrast_mode_dispatch() {
        // All-white: overexposure fails, but the spread variant reports low
        // contrast rather than overexposure.
        let image = uniform(16, 16, 255);

        let overexposure = Thresholds {
            contrast_mode: ContrastMode::Overexposure,
            ..Thresholds::default()
        };
        assert_eq!(
            check_contrast(&image, &overexposure).message,
            "Image is overexposed"
        );

        let spread = Thresholds {
            contrast_mode: ContrastMode::PercentileSpread,
            ..Thresholds::default()
        };
        assert_eq!(
            check_contrast(&image, &spread).message,
            "Low contrast detected"
        );
    }
}
