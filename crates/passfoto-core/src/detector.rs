//! SCRFD-style face detector via ONNX Runtime.
//!
//! Anchor-free detection over three stride levels with NMS post-processing.
//! The pipeline only consumes the surviving box count and geometry; landmark
//! work is done by the separate face-mesh model.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

use crate::types::CheckResult;

const DETECTOR_INPUT_SIZE: usize = 640;
const DETECTOR_MEAN: f32 = 127.5;
const DETECTOR_STD: f32 = 128.0;
const DETECTOR_NMS_IOU: f32 = 0.4;
const DETECTOR_STRIDES: [usize; 3] = [8, 16, 32];
const DETECTOR_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A detected face in source-image coordinates, corner form.
#[derive(Debug, Clone)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
}

impl FaceBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// Mapping from letterboxed input space back to source coordinates.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputs = (usize, usize);

pub struct FaceDetector {
    session: Session,
    /// Per-stride output indices for strides [8, 16, 32], discovered by
    /// tensor name at load time with a positional fallback.
    stride_outputs: [StrideOutputs; 3],
}

impl FaceDetector {
    /// Load the detection model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(path = model_path, outputs = ?output_names, "loaded face detection model");

        // Score and bbox tensors for each of the three strides. The model also
        // exports five-point keypoint tensors; those are never read.
        if output_names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "detector requires score and bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }

        let stride_outputs = map_stride_outputs(&output_names);
        tracing::debug!(?stride_outputs, "detector output tensor mapping");

        Ok(Self {
            session,
            stride_outputs,
        })
    }

    /// Detect faces with at least `min_confidence` score, best first.
    pub fn detect(
        &mut self,
        image: &RgbImage,
        min_confidence: f32,
    ) -> Result<Vec<FaceBox>, DetectorError> {
        let (input, letterbox) = preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in DETECTOR_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_outputs[slot];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            decode_stride(
                scores,
                bboxes,
                stride,
                &letterbox,
                min_confidence,
                &mut candidates,
            );
        }

        let mut faces = nms(candidates, DETECTOR_NMS_IOU);
        faces.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        tracing::debug!(count = faces.len(), "face detection complete");
        Ok(faces)
    }
}

/// Exactly-one-face rule with the wire messages the verdict carries.
pub fn check_face_count(faces: &[FaceBox]) -> CheckResult {
    match faces.len() {
        0 => CheckResult::fail("no_face_in_image"),
        1 => CheckResult::pass("single_face_in_image"),
        _ => CheckResult::fail("multiple_faces_in_image"),
    }
}

/// Letterbox-resize into a normalized NCHW tensor.
///
/// The zero-initialized tensor doubles as the padding: a 127.5 pad pixel
/// normalizes to exactly 0.
fn preprocess(image: &RgbImage) -> (Array4<f32>, Letterbox) {
    let (width, height) = image.dimensions();
    let input = DETECTOR_INPUT_SIZE as f32;

    let scale = (input / width as f32).min(input / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).max(1);
    let new_h = ((height as f32 * scale).round() as u32).max(1);
    let pad_x = (input - new_w as f32) / 2.0;
    let pad_y = (input - new_h as f32) / 2.0;

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let mut tensor =
        Array4::<f32>::zeros((1, 3, DETECTOR_INPUT_SIZE, DETECTOR_INPUT_SIZE));
    let x0 = pad_x.floor() as usize;
    let y0 = pad_y.floor() as usize;
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, channel, y0 + y as usize, x0 + x as usize]] =
                (f32::from(pixel.0[channel]) - DETECTOR_MEAN) / DETECTOR_STD;
        }
    }

    (tensor, Letterbox { scale, pad_x, pad_y })
}

/// Locate score/bbox output tensors by name ("score_8", "bbox_16", ...),
/// falling back to the standard positional export order
/// [scores 8/16/32, bboxes 8/16/32, kps 8/16/32].
fn map_stride_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named = DETECTOR_STRIDES
        .iter()
        .all(|&s| find("score", s).is_some() && find("bbox", s).is_some());

    if named {
        std::array::from_fn(|i| {
            let stride = DETECTOR_STRIDES[i];
            (find("score", stride).unwrap(), find("bbox", stride).unwrap())
        })
    } else {
        tracing::info!(?names, "detector output names not recognized, using positional mapping");
        [(0, 3), (1, 4), (2, 5)]
    }
}

/// Decode one stride level's anchors into source-space boxes.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
    out: &mut Vec<FaceBox>,
) {
    let grid = DETECTOR_INPUT_SIZE / stride;
    let num_anchors = grid * grid * DETECTOR_ANCHORS_PER_CELL;

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score < threshold {
            continue;
        }

        let cell = idx / DETECTOR_ANCHORS_PER_CELL;
        let anchor_cx = (cell % grid) as f32 * stride as f32;
        let anchor_cy = (cell / grid) as f32 * stride as f32;

        // Box offsets are distances from the anchor center, in stride units.
        let off = idx * 4;
        if off + 3 >= bboxes.len() {
            continue;
        }
        let x1 = anchor_cx - bboxes[off] * stride as f32;
        let y1 = anchor_cy - bboxes[off + 1] * stride as f32;
        let x2 = anchor_cx + bboxes[off + 2] * stride as f32;
        let y2 = anchor_cy + bboxes[off + 3] * stride as f32;

        out.push(FaceBox {
            x1: (x1 - letterbox.pad_x) / letterbox.scale,
            y1: (y1 - letterbox.pad_y) / letterbox.scale,
            x2: (x2 - letterbox.pad_x) / letterbox.scale,
            y2: (y2 - letterbox.pad_y) / letterbox.scale,
            score,
        });
    }
}

/// Greedy non-maximum suppression.
fn nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Intersection-over-union of two corner-form boxes.
fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = inter_w * inter_h;

    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
