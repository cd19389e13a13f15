use crate::dtos::{HealthResponse, ServiceInfo};
use crate::handlers::timestamp;
use crate::startup::AppState;
use axum::{extract::State, Json};

pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "Sahayak API - AI Teaching Assistant for Multi-Grade Classrooms",
        version: env!("CARGO_PKG_VERSION"),
        problem_statement: "Empowering teachers in multi-grade classrooms",
    })
}

/// Liveness plus whether the model client is ready. Never calls upstream.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        api_initialized: state.gateway.is_initialized(),
        timestamp: timestamp(),
    })
}
