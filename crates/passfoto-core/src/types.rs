use serde::Serialize;
use thiserror::Error;

/// Outcome of one validation check: pass/fail plus the operator-facing message.
///
/// Checks never abort the pipeline; every check produces one of these and the
/// aggregator combines them.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
}

impl CheckResult {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

/// Which exposure/contrast variant gates the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContrastMode {
    /// Bright-pixel ratio: fail when too many pixels are near saturation.
    #[default]
    Overexposure,
    /// 5th–95th percentile histogram spread.
    PercentileSpread,
}

#[derive(Debug, Error)]
#[error("unknown contrast mode: {0:?} (expected \"overexposure\" or \"spread\")")]
pub struct UnknownContrastMode(String);

impl std::str::FromStr for ContrastMode {
    type Err = UnknownContrastMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overexposure" => Ok(Self::Overexposure),
            "spread" | "percentile" => Ok(Self::PercentileSpread),
            _ => Err(UnknownContrastMode(s.to_string())),
        }
    }
}

/// Every numeric knob of the pipeline in one place.
#[derive(Debug, Clone)]
pub struct Thresholds {
    /// Minimum Laplacian variance for a sharp image.
    pub blur_min_variance: f64,
    /// Which exposure/contrast check gates the verdict.
    pub contrast_mode: ContrastMode,
    /// Lower bound on the 5th–95th percentile spread (normalized to [0, 1]).
    pub contrast_min_spread: f32,
    /// Upper bound on the 5th–95th percentile spread.
    pub contrast_max_spread: f32,
    /// Maximum tolerated fraction of near-saturated pixels.
    pub overexposure_max_ratio: f32,
    /// Maximum tolerated fraction of dark (shadow) pixels.
    pub shadow_max_ratio: f32,
    /// Face detector confidence floor.
    pub min_detection_confidence: f32,
    /// Face-mesh presence-score floor; below this the mesh counts as absent.
    pub min_mesh_confidence: f32,
    /// Maximum eye-line tilt in radians.
    pub max_head_tilt_rad: f32,
    /// Maximum normalized vertical lip gap.
    pub max_mouth_gap: f32,
    /// Segmentation coverage window (fraction of frame that is subject).
    pub coverage_min: f32,
    pub coverage_max: f32,
    /// Minimum fraction of background pixels that must be near-white.
    pub background_white_min_ratio: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            blur_min_variance: 100.0,
            contrast_mode: ContrastMode::default(),
            contrast_min_spread: 0.15,
            contrast_max_spread: 0.85,
            overexposure_max_ratio: 0.6,
            shadow_max_ratio: 0.1,
            min_detection_confidence: 0.75,
            min_mesh_confidence: 0.75,
            max_head_tilt_rad: 0.1,
            max_mouth_gap: 0.05,
            coverage_min: 0.50,
            coverage_max: 0.85,
            background_white_min_ratio: 0.9,
        }
    }
}

/// Aggregate verdict for one photo. Built once per request, never mutated.
///
/// `hex_image` carries the background-subtracted JPEG and `face_mesh_hex` the
/// landmark-annotated JPEG, both hex-encoded for embedding in JSON.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub message: String,
    pub is_valid: bool,
    pub is_background_accepted: bool,
    pub head_validation: String,
    pub blur_status: String,
    pub contrast_status: String,
    pub shadow_status: String,
    pub face_status: String,
    pub head_margin: bool,
    pub mask_coverage: f32,
    pub hex_image: String,
    pub face_mesh_hex: Option<String>,
}
