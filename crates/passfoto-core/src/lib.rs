//! passfoto-core — passport-style portrait validation pipeline.
//!
//! Runs a fixed set of checks over one decoded frame: pixel-statistics
//! quality checks plus ONNX-backed face detection, face-mesh landmarking and
//! person segmentation, folded into a single aggregate verdict.

pub mod detector;
pub mod encode;
pub mod facemesh;
pub mod pipeline;
pub mod quality;
pub mod segmentation;
pub mod types;

pub use pipeline::{is_image_filename, validate, ModelBundle, PipelineError};
pub use types::{CheckResult, ContrastMode, Thresholds, ValidationReport};
