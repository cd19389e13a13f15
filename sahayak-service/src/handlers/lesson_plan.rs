use crate::dtos::{LessonPlanMetadata, LessonPlanRequest, LessonPlanResponse, ValidatedRequest};
use crate::handlers::{timestamp, track};
use crate::prompts::{self, SYSTEM_ASSISTANT};
use crate::services::providers::GenerationRequest;
use crate::startup::AppState;
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use service_core::error::AppError;

pub async fn create_lesson_plan(
    State(state): State<AppState>,
    payload: Result<Json<LessonPlanRequest>, JsonRejection>,
) -> Result<Json<LessonPlanResponse>, AppError> {
    track("create_lesson_plan", lesson_plan(&state, payload).await).map(Json)
}

async fn lesson_plan(
    state: &AppState,
    payload: Result<Json<LessonPlanRequest>, JsonRejection>,
) -> Result<LessonPlanResponse, AppError> {
    let Json(request) = payload?;
    let request = request.into_validated()?;

    let generation_request = GenerationRequest::new(prompts::compose_lesson_plan(&request))
        .with_system_instruction(SYSTEM_ASSISTANT.text());
    let generation = state.gateway.generate(&generation_request).await?;

    Ok(LessonPlanResponse {
        lesson_plan: generation.text,
        metadata: LessonPlanMetadata {
            topic: request.topic,
            grade_levels: request.grade_levels,
            duration: request.duration_minutes,
            location: request.location,
            timestamp: timestamp(),
        },
    })
}
