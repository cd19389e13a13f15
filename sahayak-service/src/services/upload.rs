//! Size-capped reading of multipart image uploads.

use axum::extract::multipart::{Field, MultipartError};
use axum::http::StatusCode;
use service_core::error::AppError;

/// Headroom allowed on top of the file cap for multipart framing and form fields.
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Whether a declared content type names an image.
pub fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .trim()
        .to_ascii_lowercase()
        .starts_with("image/")
}

pub fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(anyhow::anyhow!("Failed to read multipart body: {}", err))
    }
}

/// Read an image field chunk by chunk, failing as soon as `cap` is exceeded.
pub async fn read_image_field(mut field: Field<'_>, cap: usize) -> Result<UploadedFile, AppError> {
    if !is_image_content_type(field.content_type().unwrap_or_default()) {
        return Err(AppError::invalid_field("file", "File must be an image"));
    }
    let file_name = field.file_name().map(str::to_string);

    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if bytes.len() + chunk.len() > cap {
            tracing::warn!(
                file_name = ?file_name,
                limit = cap,
                "Rejected oversized upload"
            );
            return Err(AppError::PayloadTooLarge(format!(
                "File exceeds the maximum upload size of {} bytes",
                cap
            )));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(UploadedFile { file_name, bytes })
}
