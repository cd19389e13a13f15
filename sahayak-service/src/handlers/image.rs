use crate::dtos::{
    parse_grade_levels, AnalyzeImageQuery, ImageAnalysisResponse, ImageMetadata, ImageRequest,
    ValidatedRequest, DEFAULT_GRADE_LEVELS_PARAM,
};
use crate::handlers::{timestamp, track};
use crate::prompts::{self, SYSTEM_VISION};
use crate::services::image::{DecodedImage, ImageDecoder, ImageError};
use crate::services::metrics::record_upload_bytes;
use crate::services::providers::{GenerationRequest, InlineImage};
use crate::services::upload::{multipart_error, read_image_field, UploadedFile};
use crate::startup::AppState;
use axum::{
    extract::multipart::MultipartRejection,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Multipart, Query, State},
    Json,
};
use service_core::error::AppError;

/// Multipart form fields understood by `POST /analyze-image`.
const FILE_FIELD: &str = "file";
const GRADE_LEVELS_FIELD: &str = "grade_levels";
const PROMPT_FIELD: &str = "prompt";

pub async fn analyze_image(
    State(state): State<AppState>,
    query: Result<Query<AnalyzeImageQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImageAnalysisResponse>, AppError> {
    track("analyze_image", analyze_upload(&state, query, multipart).await).map(Json)
}

async fn analyze_upload(
    state: &AppState,
    query: Result<Query<AnalyzeImageQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ImageAnalysisResponse, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(anyhow::anyhow!(e.body_text())))?;
    let mut multipart =
        multipart.map_err(|e| AppError::BadRequest(anyhow::anyhow!(e.body_text())))?;

    let mut upload: Option<UploadedFile> = None;
    let mut form_grades: Option<String> = None;
    let mut prompt: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FILE_FIELD) => {
                upload = Some(read_image_field(field, state.image_decoder.max_bytes()).await?);
            }
            Some(GRADE_LEVELS_FIELD) => {
                form_grades = Some(field.text().await.map_err(multipart_error)?);
            }
            Some(PROMPT_FIELD) => {
                let text = field.text().await.map_err(multipart_error)?;
                prompt = Some(text.trim().to_string()).filter(|p| !p.is_empty());
            }
            _ => {}
        }
    }

    // A form field takes precedence over the query string.
    let raw_grades = form_grades
        .or(query.grade_levels)
        .unwrap_or_else(|| DEFAULT_GRADE_LEVELS_PARAM.to_string());
    let grade_levels = parse_grade_levels(&raw_grades)?;

    let UploadedFile {
        file_name, bytes
    } = upload.ok_or_else(|| AppError::invalid_field(FILE_FIELD, "An image file is required"))?;
    let file_size = bytes.len();

    let prepared = decode(state.image_decoder, FILE_FIELD, move |decoder| {
        decoder.decode_bytes(bytes)
    })
    .await?;
    record_upload_bytes("multipart", file_size);

    let analysis = analyze(state, prepared, prompt.as_deref(), &grade_levels).await?;

    Ok(ImageAnalysisResponse {
        analysis,
        metadata: ImageMetadata {
            grade_levels,
            file_name,
            file_size,
            timestamp: timestamp(),
        },
    })
}

pub async fn analyze_image_base64(
    State(state): State<AppState>,
    payload: Result<Json<ImageRequest>, JsonRejection>,
) -> Result<Json<ImageAnalysisResponse>, AppError> {
    track("analyze_image_base64", analyze_encoded(&state, payload).await).map(Json)
}

async fn analyze_encoded(
    state: &AppState,
    payload: Result<Json<ImageRequest>, JsonRejection>,
) -> Result<ImageAnalysisResponse, AppError> {
    let Json(request) = payload?;
    let request = request.into_validated()?;
    let ImageRequest {
        image_data,
        prompt,
        grade_levels,
    } = request;

    let prepared = decode(state.image_decoder, "image_data", move |decoder| {
        decoder.decode_base64(&image_data)
    })
    .await?;
    let file_size = prepared.0.byte_len();
    record_upload_bytes("base64", file_size);

    let analysis = analyze(state, prepared, prompt.as_deref(), &grade_levels).await?;

    Ok(ImageAnalysisResponse {
        analysis,
        metadata: ImageMetadata {
            grade_levels,
            file_name: None,
            file_size,
            timestamp: timestamp(),
        },
    })
}

/// Decode and prepare an image on the blocking pool.
async fn decode<F>(
    decoder: ImageDecoder,
    field: &'static str,
    op: F,
) -> Result<(DecodedImage, InlineImage), AppError>
where
    F: FnOnce(ImageDecoder) -> Result<DecodedImage, ImageError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let image = op(decoder)?;
        let inline = image.to_inline()?;
        Ok::<_, ImageError>((image, inline))
    })
    .await
    .map_err(|e| AppError::InternalError(anyhow::anyhow!("Image decoding task failed: {}", e)))?
    .map_err(|e| e.into_app_error(field))
}

async fn analyze(
    state: &AppState,
    (image, inline): (DecodedImage, InlineImage),
    prompt: Option<&str>,
    grade_levels: &[i32],
) -> Result<String, AppError> {
    tracing::debug!(
        width = image.width(),
        height = image.height(),
        resized = image.was_resized(),
        mime_type = %inline.mime_type,
        "Prepared image for analysis"
    );

    let request = GenerationRequest::new(prompts::compose_image_analysis(prompt, grade_levels))
        .with_system_instruction(SYSTEM_VISION.text())
        .with_image(inline);

    Ok(state.gateway.generate(&request).await?.text)
}
