//! HTTP handlers for the Sahayak service.

pub mod app;
pub mod content;
pub mod image;
pub mod lesson_plan;
pub mod metrics;

pub use app::{health_check, root};
pub use content::{generate_content, quick_math_problem};
pub use image::{analyze_image, analyze_image_base64};
pub use lesson_plan::create_lesson_plan;
pub use metrics::metrics;

use crate::services::metrics::record_request;
use service_core::error::AppError;

pub(crate) fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn outcome_label(err: &AppError) -> &'static str {
    match err {
        AppError::ValidationError(_) | AppError::BadRequest(_) => "invalid",
        AppError::PayloadTooLarge(_) => "too_large",
        AppError::UpstreamError(_) => "upstream_error",
        AppError::ConfigError(_) => "not_configured",
        AppError::ServiceUnavailable(_) => "unavailable",
        AppError::InternalError(_) => "error",
    }
}

/// Count the outcome of a generation endpoint and log failures.
pub(crate) fn track<T>(endpoint: &'static str, result: Result<T, AppError>) -> Result<T, AppError> {
    match &result {
        Ok(_) => record_request(endpoint, "success"),
        Err(err) => {
            let outcome = outcome_label(err);
            record_request(endpoint, outcome);
            if err.status_code().is_server_error() {
                tracing::error!(endpoint, outcome, error = %err, "Request failed");
            } else {
                tracing::info!(endpoint, outcome, error = %err, "Request rejected");
            }
        }
    }
    result
}
