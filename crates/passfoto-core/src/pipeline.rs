//! The aggregator: runs every check over one frame and folds the outcomes
//! into a [`ValidationReport`].
//!
//! Checks are independent and all of them always run; a failing check is data,
//! not an error. Only model or encoding faults abort the pipeline.

use image::RgbImage;
use std::path::Path;
use thiserror::Error;

use crate::detector::{check_face_count, DetectorError, FaceDetector};
use crate::encode;
use crate::facemesh::{annotate, check_head, FaceMesh, MeshError};
use crate::quality::{check_blur, check_contrast, check_shadows};
use crate::segmentation::{cut_out, MaskStats, Segmenter, SegmenterError};
use crate::types::{CheckResult, Thresholds, ValidationReport};

/// Model files expected inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_500m.onnx";
pub const FACE_MESH_MODEL_FILE: &str = "face_mesh.onnx";
pub const SEGMENTATION_MODEL_FILE: &str = "selfie_segmentation.onnx";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("face mesh: {0}")]
    Mesh(#[from] MeshError),
    #[error("segmentation: {0}")]
    Segmenter(#[from] SegmenterError),
    #[error("image encode: {0}")]
    Encode(#[from] image::ImageError),
}

/// The three loaded model sessions the pipeline runs against.
pub struct ModelBundle {
    pub detector: FaceDetector,
    pub mesh: FaceMesh,
    pub segmenter: Segmenter,
}

impl ModelBundle {
    /// Load all three models from a directory using the standard file names.
    pub fn load_from_dir(model_dir: &Path) -> Result<Self, PipelineError> {
        let path = |file: &str| model_dir.join(file).to_string_lossy().into_owned();
        Ok(Self {
            detector: FaceDetector::load(&path(DETECTOR_MODEL_FILE))?,
            mesh: FaceMesh::load(&path(FACE_MESH_MODEL_FILE))?,
            segmenter: Segmenter::load(&path(SEGMENTATION_MODEL_FILE))?,
        })
    }
}

/// Filenames eligible for batch validation.
pub fn is_image_filename(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".png") || lower.ends_with(".jpg") || lower.ends_with(".jpeg")
}

/// Run every check over the frame and build the aggregate verdict.
pub fn validate(
    models: &mut ModelBundle,
    image: &RgbImage,
    thresholds: &Thresholds,
) -> Result<ValidationReport, PipelineError> {
    let faces = models
        .detector
        .detect(image, thresholds.min_detection_confidence)?;
    let face_check = check_face_count(&faces);

    let mask = models.segmenter.mask(image)?;
    let stats = MaskStats::compute(&mask, image);
    let coverage_ok =
        stats.coverage >= thresholds.coverage_min && stats.coverage <= thresholds.coverage_max;
    let background_ok = stats.background_white_ratio >= thresholds.background_white_min_ratio;

    let blur = check_blur(image, thresholds);
    let contrast = check_contrast(image, thresholds);
    let shadows = check_shadows(image, thresholds);

    let mesh = models.mesh.landmarks(image, thresholds.min_mesh_confidence)?;
    let head = check_head(mesh.as_ref(), thresholds);
    let face_mesh_hex = match &mesh {
        Some(mesh) => Some(encode::jpeg_hex(&annotate(image, mesh))?),
        None => None,
    };

    let hex_image = encode::jpeg_hex(&cut_out(image, &mask))?;

    let is_valid = overall_valid(
        &face_check,
        stats.head_has_margin,
        background_ok,
        &head,
        &contrast,
        coverage_ok,
    );

    tracing::info!(
        is_valid,
        faces = faces.len(),
        coverage = stats.coverage,
        background_white = stats.background_white_ratio,
        head_margin = stats.head_has_margin,
        head = %head.message,
        blur = %blur.message,
        contrast = %contrast.message,
        "validation complete"
    );

    Ok(ValidationReport {
        message: "Image processed successfully".into(),
        is_valid,
        is_background_accepted: background_ok,
        head_validation: head.message,
        blur_status: blur.message,
        contrast_status: contrast.message,
        shadow_status: shadows.message,
        face_status: face_check.message,
        head_margin: stats.head_has_margin,
        mask_coverage: stats.coverage,
        hex_image,
        face_mesh_hex,
    })
}

/// The verdict AND. Blur and shadow results are carried in the report but do
/// not gate it.
fn overall_valid(
    face: &CheckResult,
    head_margin: bool,
    background_ok: bool,
    head: &CheckResult,
    contrast: &CheckResult,
    coverage_ok: bool,
) -> bool {
    face.passed && head_margin && background_ok && head.passed && contrast.passed && coverage_ok
}
