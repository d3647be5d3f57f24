//! HTTP surface: single-image validation, batch ZIP validation, liveness.

use axum::extract::multipart::{Multipart, MultipartError};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use passfoto_core::{is_image_filename, ValidationReport};

use crate::engine::EngineHandle;

pub struct AppState {
    pub engine: EngineHandle,
    pub output_dir: PathBuf,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("uploaded file is not an image")]
    NotAnImage,
    #[error("uploaded file is not a zip archive")]
    NotAZip,
    #[error("multipart upload carries no file field")]
    MissingFile,
    #[error("multipart: {0}")]
    Multipart(#[from] MultipartError),
    #[error("image decode: {0}")]
    Decode(#[from] image::ImageError),
    #[error("zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("validation engine: {0}")]
    Engine(#[from] crate::engine::EngineError),
}

impl ApiError {
    /// Client faults are 400; anything unexpected surfaces as 500.
    fn status(&self) -> StatusCode {
        match self {
            Self::NotAnImage | Self::NotAZip | Self::MissingFile | Self::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Decode(_) | Self::Zip(_) | Self::Io(_) | Self::Engine(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct BatchEntry {
    pub filename: String,
    pub valid: bool,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchEntry>,
}

/// Build the service router.
pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/validate", post(validate_image))
        .route("/validate/batch", post(validate_batch))
        .route("/health", get(|| async { "ok" }))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// `POST /validate` — multipart `file` field with an `image/*` content type.
async fn validate_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ValidationReport>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        // Reject before touching any pixels.
        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(ApiError::NotAnImage);
        }

        let bytes = field.bytes().await?;
        tracing::debug!(size = bytes.len(), content_type, "image upload received");

        let image = image::load_from_memory(&bytes)?.to_rgb8();
        let report = state.engine.validate(image).await?;
        return Ok(Json(report));
    }

    Err(ApiError::MissingFile)
}

/// `POST /validate/batch` — multipart `.zip` upload; every contained image is
/// validated and sorted into this request's own valid/invalid directories.
async fn validate_batch(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<BatchResponse>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if !filename.to_ascii_lowercase().ends_with(".zip") {
            return Err(ApiError::NotAZip);
        }

        let bytes = field.bytes().await?;
        tracing::info!(archive = %filename, size = bytes.len(), "batch upload received");

        // Each request sorts into its own subdirectory, so concurrent batches
        // never interleave writes.
        let request_dir = state.output_dir.join(Uuid::new_v4().to_string());
        let results = run_batch(&state.engine, &bytes, &request_dir).await?;
        return Ok(Json(BatchResponse { results }));
    }

    Err(ApiError::MissingFile)
}

async fn run_batch(
    engine: &EngineHandle,
    archive_bytes: &[u8],
    request_dir: &Path,
) -> Result<Vec<BatchEntry>, ApiError> {
    let mut results = Vec::new();

    for (filename, data) in read_image_entries(archive_bytes)? {
        // A corrupt entry is an invalid photo, not a failed batch.
        let valid = match image::load_from_memory(&data) {
            Ok(decoded) => engine.validate(decoded.to_rgb8()).await?.is_valid,
            Err(e) => {
                tracing::warn!(entry = %filename, error = %e, "batch entry failed to decode");
                false
            }
        };

        write_sorted(request_dir, &filename, valid, &data)?;
        results.push(BatchEntry { filename, valid });
    }

    tracing::info!(
        entries = results.len(),
        valid = results.iter().filter(|r| r.valid).count(),
        dir = %request_dir.display(),
        "batch sorted"
    );
    Ok(results)
}

/// Extract the image entries of a ZIP archive as (filename, bytes) pairs,
/// skipping directories and non-image entries.
fn read_image_entries(archive_bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>, ApiError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(archive_bytes))?;
    let mut entries = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if !entry.is_file() {
            continue;
        }
        let Some(filename) = entry_filename(entry.name()) else {
            continue;
        };
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        entries.push((filename, data));
    }

    Ok(entries)
}

/// Copy one classified entry into the request's valid/ or invalid/ bucket.
fn write_sorted(
    request_dir: &Path,
    filename: &str,
    valid: bool,
    data: &[u8],
) -> std::io::Result<()> {
    let bucket = request_dir.join(if valid { "valid" } else { "invalid" });
    std::fs::create_dir_all(&bucket)?;
    std::fs::write(bucket.join(filename), data)
}

/// Flatten a ZIP entry path to its final image filename; directories and
/// non-image entries yield `None`.
fn entry_filename(entry_name: &str) -> Option<String> {
    let name = Path::new(entry_name).file_name()?.to_string_lossy().into_owned();
    is_image_filename(&name).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_read_image_entries_filters_and_flattens() {
        let archive = build_zip(&[
            ("photos/one.jpg", b"aaa"),
            ("two.png", b"bbb"),
            ("notes.txt", b"ccc"),
        ]);

        let entries = read_image_entries(&archive).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ("one.jpg".to_string(), b"aaa".to_vec()));
        assert_eq!(entries[1], ("two.png".to_string(), b"bbb".to_vec()));
    }

    #[test]
    fn test_read_image_entries_rejects_garbage() {
        assert!(read_image_entries(b"not a zip archive").is_err());
    }

    #[test]
    fn test_write_sorted_buckets() {
        let dir = tempfile::tempdir().unwrap();
        write_sorted(dir.path(), "good.jpg", true, b"g").unwrap();
        write_sorted(dir.path(), "bad.jpg", false, b"b").unwrap();

        assert_eq!(std::fs::read(dir.path().join("valid/good.jpg")).unwrap(), b"g");
        assert_eq!(std::fs::read(dir.path().join("invalid/bad.jpg")).unwrap(), b"b");
    }

    #[test]
    fn test_entry_filename_flattens_paths() {
        assert_eq!(
            entry_filename("batch/photos/person.jpg"),
            Some("person.jpg".to_string())
        );
        assert_eq!(entry_filename("scan.PNG"), Some("scan.PNG".to_string()));
    }

    #[test]
    fn test_entry_filename_skips_non_images() {
        assert_eq!(entry_filename("readme.txt"), None);
        assert_eq!(entry_filename("nested/inner.zip"), None);
    }

    #[test]
    fn test_entry_filename_skips_traversal_components() {
        // Only the final component survives; no parent traversal in writes.
        assert_eq!(
            entry_filename("../../escape.jpg"),
            Some("escape.jpg".to_string())
        );
    }

    #[test]
    fn test_client_faults_map_to_400() {
        assert_eq!(ApiError::NotAnImage.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotAZip.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::MissingFile.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_internal_faults_map_to_500() {
        let decode = ApiError::Decode(image::ImageError::IoError(std::io::Error::other("x")));
        assert_eq!(decode.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let io = ApiError::Io(std::io::Error::other("x"));
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_body_shape() {
        let body = json!({ "error": ApiError::NotAnImage.to_string() });
        assert_eq!(body["error"], "uploaded file is not an image");
    }
}
