//! Dense face-landmark model plus the head orientation and expression checks.
//!
//! The mesh model consumes the full frame resized to its fixed input and emits
//! 468 landmarks with a face-presence score. Geometry checks run on normalized
//! coordinates; the annotated render is produced for the diagnostic response.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

use crate::types::{CheckResult, Thresholds};

const MESH_INPUT_SIZE: usize = 192;
const MESH_LANDMARK_COUNT: usize = 468;
const MESH_VALUES_PER_LANDMARK: usize = 3;

/// Mesh indices used by the geometry checks.
const LEFT_EYE: usize = 33;
const RIGHT_EYE: usize = 133;
const UPPER_LIP: usize = 13;
const LOWER_LIP: usize = 14;

const MESH_DOT_COLOR: Rgb<u8> = Rgb([0, 200, 90]);
const MESH_KEY_COLOR: Rgb<u8> = Rgb([230, 50, 50]);

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// One mesh landmark, normalized to [0, 1] over the full frame.
#[derive(Debug, Clone, Copy)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

/// A full 468-point face mesh. `points` always holds exactly
/// [`MESH_LANDMARK_COUNT`] entries.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub points: Vec<Landmark>,
    pub confidence: f32,
}

pub struct FaceMesh {
    session: Session,
    has_score_output: bool,
}

impl FaceMesh {
    /// Load the face-mesh model from the given path.
    pub fn load(model_path: &str) -> Result<Self, MeshError> {
        if !Path::new(model_path).exists() {
            return Err(MeshError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let num_outputs = session.outputs().len();
        tracing::info!(path = model_path, outputs = num_outputs, "loaded face mesh model");

        Ok(Self {
            session,
            // Exports without a score tensor are treated as always-confident.
            has_score_output: num_outputs >= 2,
        })
    }

    /// Run the mesh over the frame. Returns `None` when the model's
    /// face-presence score falls below `min_confidence`.
    pub fn landmarks(
        &mut self,
        image: &RgbImage,
        min_confidence: f32,
    ) -> Result<Option<Mesh>, MeshError> {
        let input = preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| MeshError::InferenceFailed(format!("landmark tensor: {e}")))?;

        let expected = MESH_LANDMARK_COUNT * MESH_VALUES_PER_LANDMARK;
        if raw.len() != expected {
            return Err(MeshError::InferenceFailed(format!(
                "expected {expected} landmark values, got {}",
                raw.len()
            )));
        }

        let confidence = if self.has_score_output {
            let (_, score) = outputs[1]
                .try_extract_tensor::<f32>()
                .map_err(|e| MeshError::InferenceFailed(format!("score tensor: {e}")))?;
            score.first().copied().unwrap_or(0.0)
        } else {
            1.0
        };

        if confidence < min_confidence {
            tracing::debug!(confidence, "face mesh below confidence floor");
            return Ok(None);
        }

        // Model coordinates are in input pixels; normalize over the frame.
        let points = (0..MESH_LANDMARK_COUNT)
            .map(|i| Landmark {
                x: raw[i * MESH_VALUES_PER_LANDMARK] / MESH_INPUT_SIZE as f32,
                y: raw[i * MESH_VALUES_PER_LANDMARK + 1] / MESH_INPUT_SIZE as f32,
            })
            .collect();

        Ok(Some(Mesh { points, confidence }))
    }
}

/// Eye-line tilt in radians, signed.
pub fn head_tilt(mesh: &Mesh) -> f32 {
    let left = mesh.points[LEFT_EYE];
    let right = mesh.points[RIGHT_EYE];
    (right.y - left.y).atan2(right.x - left.x)
}

/// Normalized vertical gap between the upper and lower lip.
pub fn mouth_gap(mesh: &Mesh) -> f32 {
    (mesh.points[UPPER_LIP].y - mesh.points[LOWER_LIP].y).abs()
}

/// Head orientation and expression rule over an optional mesh.
pub fn check_head(mesh: Option<&Mesh>, thresholds: &Thresholds) -> CheckResult {
    let Some(mesh) = mesh else {
        return CheckResult::fail("No face landmarks detected");
    };

    let tilt = head_tilt(mesh);
    let gap = mouth_gap(mesh);
    tracing::debug!(tilt, gap, confidence = mesh.confidence, "head check");

    if tilt.abs() > thresholds.max_head_tilt_rad {
        CheckResult::fail("Head is tilted")
    } else if gap > thresholds.max_mouth_gap {
        CheckResult::fail("Mouth is open")
    } else {
        CheckResult::pass("Face is valid")
    }
}

/// Copy of the frame with the mesh drawn on it: every landmark as a dot, the
/// four check landmarks highlighted.
pub fn annotate(image: &RgbImage, mesh: &Mesh) -> RgbImage {
    let mut canvas = image.clone();
    let (width, height) = canvas.dimensions();

    for point in &mesh.points {
        let cx = (point.x * width as f32).round() as i32;
        let cy = (point.y * height as f32).round() as i32;
        draw_filled_circle_mut(&mut canvas, (cx, cy), 1, MESH_DOT_COLOR);
    }

    for idx in [LEFT_EYE, RIGHT_EYE, UPPER_LIP, LOWER_LIP] {
        let point = mesh.points[idx];
        let cx = (point.x * width as f32).round() as i32;
        let cy = (point.y * height as f32).round() as i32;
        draw_filled_circle_mut(&mut canvas, (cx, cy), 2, MESH_KEY_COLOR);
    }

    canvas
}

/// Normalize the frame into the fixed-size NCHW mesh input.
fn preprocess(image: &RgbImage) -> Array4<f32> {
    let size = MESH_INPUT_SIZE;
    let resized = imageops::resize(image, size as u32, size as u32, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] = f32::from(pixel.0[channel]) / 255.0;
        }
    }
    tensor
}
