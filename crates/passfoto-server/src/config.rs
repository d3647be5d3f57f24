use passfoto_core::{ContrastMode, Thresholds};
use std::path::PathBuf;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:7070";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Service configuration, loaded from `PASSFOTO_*` environment variables.
pub struct Config {
    /// Socket address the HTTP server binds to.
    pub listen_addr: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Root directory for batch valid/invalid sorting; each batch request
    /// writes into its own subdirectory underneath.
    pub output_dir: PathBuf,
    /// Upper bound on a multipart upload body.
    pub max_upload_bytes: usize,
    /// Pipeline thresholds; defaults with env overrides.
    pub thresholds: Thresholds,
}

impl Config {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Thresholds::default();
        let thresholds = Thresholds {
            min_detection_confidence: env_f32(
                "PASSFOTO_MIN_DETECTION_CONFIDENCE",
                defaults.min_detection_confidence,
            ),
            coverage_min: env_f32("PASSFOTO_COVERAGE_MIN", defaults.coverage_min),
            coverage_max: env_f32("PASSFOTO_COVERAGE_MAX", defaults.coverage_max),
            contrast_mode: std::env::var("PASSFOTO_CONTRAST_MODE")
                .ok()
                .and_then(|v| v.parse::<ContrastMode>().ok())
                .unwrap_or(defaults.contrast_mode),
            ..defaults
        };

        Self {
            listen_addr: std::env::var("PASSFOTO_LISTEN_ADDR")
                .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string()),
            model_dir: std::env::var("PASSFOTO_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models")),
            output_dir: std::env::var("PASSFOTO_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("sorted")),
            max_upload_bytes: env_usize("PASSFOTO_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            thresholds,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parsers_fall_back_on_missing() {
        assert_eq!(env_f32("PASSFOTO_TEST_UNSET_F32", 0.42), 0.42);
        assert_eq!(env_usize("PASSFOTO_TEST_UNSET_USIZE", 7), 7);
    }

    #[test]
    fn test_env_parsers_fall_back_on_garbage() {
        std::env::set_var("PASSFOTO_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_f32("PASSFOTO_TEST_GARBAGE", 1.5), 1.5);
        assert_eq!(env_usize("PASSFOTO_TEST_GARBAGE", 3), 3);
        std::env::remove_var("PASSFOTO_TEST_GARBAGE");
    }
}
