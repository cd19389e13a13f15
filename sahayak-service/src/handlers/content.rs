use crate::dtos::{
    ContentMetadata, ContentRequest, ContentResponse, QuickMathMetadata, QuickMathQuery,
    QuickMathResponse, ValidatedRequest, DEFAULT_LOCATION,
};
use crate::handlers::{timestamp, track};
use crate::prompts::{self, SYSTEM_ASSISTANT};
use crate::services::providers::GenerationRequest;
use crate::startup::AppState;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;

const QUICK_MATH_SUBJECT: &str = "mathematics";

pub async fn generate_content(
    State(state): State<AppState>,
    payload: Result<Json<ContentRequest>, JsonRejection>,
) -> Result<Json<ContentResponse>, AppError> {
    track("generate_content", content_from_body(&state, payload).await).map(Json)
}

async fn content_from_body(
    state: &AppState,
    payload: Result<Json<ContentRequest>, JsonRejection>,
) -> Result<ContentResponse, AppError> {
    let Json(request) = payload?;
    let request = request.into_validated()?;
    generate(state, request).await
}

pub async fn quick_math_problem(
    State(state): State<AppState>,
    query: Result<Query<QuickMathQuery>, QueryRejection>,
) -> Result<Json<QuickMathResponse>, AppError> {
    track("quick_math_problem", quick_math(&state, query).await).map(Json)
}

async fn quick_math(
    state: &AppState,
    query: Result<Query<QuickMathQuery>, QueryRejection>,
) -> Result<QuickMathResponse, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(anyhow::anyhow!(e.body_text())))?;
    let query = query.into_validated()?;

    // Quick problems go through the regular content pipeline.
    let request = ContentRequest {
        prompt: prompts::compose_quick_math(&query),
        grade_levels: vec![query.grade],
        subject: QUICK_MATH_SUBJECT.to_string(),
        location: DEFAULT_LOCATION.to_string(),
        max_tokens: None,
    };
    let content = generate(state, request).await?;

    Ok(QuickMathResponse {
        problem: content.content,
        metadata: QuickMathMetadata {
            grade: query.grade,
            topic: query.topic,
            timestamp: timestamp(),
        },
    })
}

async fn generate(state: &AppState, request: ContentRequest) -> Result<ContentResponse, AppError> {
    let generation_request = GenerationRequest::new(prompts::compose_content(&request))
        .with_system_instruction(SYSTEM_ASSISTANT.text())
        .with_max_tokens(request.max_tokens);

    let generation = state.gateway.generate(&generation_request).await?;

    Ok(ContentResponse {
        content: generation.text,
        metadata: ContentMetadata {
            grade_levels: request.grade_levels,
            subject: request.subject,
            location: request.location,
            timestamp: timestamp(),
        },
    })
}
