//! Request and response bodies for the HTTP facade.
//!
//! Every request type implements [`ValidatedRequest`]: string fields are
//! trimmed first, then the `validator` rules run. Failures carry the name of
//! the offending field and are rejected before any upstream call.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors};

pub const MIN_GRADE: i32 = 1;
pub const MAX_GRADE: i32 = 12;

/// Grades assumed when a request does not name any.
pub const DEFAULT_GRADE_LEVELS: [i32; 3] = [4, 5, 6];

/// Query/form default for the upload endpoint.
pub const DEFAULT_GRADE_LEVELS_PARAM: &str = "4,5,6";

pub const DEFAULT_SUBJECT: &str = "general";
pub const DEFAULT_LOCATION: &str = "rural India";
pub const DEFAULT_RESOURCES: &str = "blackboard, chalk, local materials";
pub const DEFAULT_DURATION_MINUTES: i64 = 45;

/// Normalize-then-validate contract shared by all request bodies.
pub trait ValidatedRequest: Validate + Sized {
    /// Trim free-text fields in place.
    fn normalize(&mut self);

    fn into_validated(mut self) -> Result<Self, ValidationErrors> {
        self.normalize();
        self.validate()?;
        Ok(self)
    }
}

fn default_grade_levels() -> Vec<i32> {
    DEFAULT_GRADE_LEVELS.to_vec()
}

fn default_subject() -> String {
    DEFAULT_SUBJECT.to_string()
}

fn default_location() -> String {
    DEFAULT_LOCATION.to_string()
}

fn default_resources() -> String {
    DEFAULT_RESOURCES.to_string()
}

fn default_duration_minutes() -> i64 {
    DEFAULT_DURATION_MINUTES
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

fn grade_error(message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut error = ValidationError::new("grade_levels");
    error.message = Some(message.into());
    error
}

/// Grade lists must be non-empty with every grade in `[1, 12]`.
pub fn validate_grade_levels(grades: &[i32]) -> Result<(), ValidationError> {
    if grades.is_empty() {
        return Err(grade_error("at least one grade level is required"));
    }
    if let Some(bad) = grades
        .iter()
        .find(|g| !(MIN_GRADE..=MAX_GRADE).contains(*g))
    {
        let mut error = grade_error(format!(
            "grade {} is outside the supported range {}-{}",
            bad, MIN_GRADE, MAX_GRADE
        ));
        error.add_param(Cow::from("value"), bad);
        return Err(error);
    }
    Ok(())
}

/// Parse a comma-separated grade list such as `"4,5,6"`.
pub fn parse_grade_levels(raw: &str) -> Result<Vec<i32>, ValidationErrors> {
    let wrap = |error: ValidationError| {
        let mut errors = ValidationErrors::new();
        errors.add("grade_levels", error);
        errors
    };

    let grades = raw
        .split(',')
        .map(str::trim)
        .map(|part| {
            if part.is_empty() {
                return Err(wrap(grade_error("grade list contains an empty entry")));
            }
            part.parse::<i32>()
                .map_err(|_| wrap(grade_error(format!("'{}' is not a whole number", part))))
        })
        .collect::<Result<Vec<_>, _>>()?;

    validate_grade_levels(&grades).map_err(wrap)?;
    Ok(grades)
}

/// Free-text content generation for a multi-grade class.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ContentRequest {
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub prompt: String,

    #[serde(default = "default_grade_levels")]
    #[validate(custom(function = "validate_grade_levels"))]
    pub grade_levels: Vec<i32>,

    #[serde(default = "default_subject")]
    #[validate(length(min = 1, message = "subject must not be empty"))]
    pub subject: String,

    #[serde(default = "default_location")]
    #[validate(length(min = 1, message = "location must not be empty"))]
    pub location: String,

    /// Upper bound on generated tokens, forwarded to the model.
    #[serde(default)]
    #[validate(range(min = 1, max = 8192, message = "max_tokens must be between 1 and 8192"))]
    pub max_tokens: Option<u32>,
}

impl ValidatedRequest for ContentRequest {
    fn normalize(&mut self) {
        trim_in_place(&mut self.prompt);
        trim_in_place(&mut self.subject);
        trim_in_place(&mut self.location);
    }
}

/// Image analysis with an inline base64 payload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ImageRequest {
    /// Base64 image, optionally prefixed with a `data:<mime>;base64,` marker.
    #[validate(length(min = 1, message = "image_data must not be empty"))]
    pub image_data: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "prompt must not be empty when given"))]
    pub prompt: Option<String>,

    #[serde(default = "default_grade_levels")]
    #[validate(custom(function = "validate_grade_levels"))]
    pub grade_levels: Vec<i32>,
}

impl ValidatedRequest for ImageRequest {
    fn normalize(&mut self) {
        trim_in_place(&mut self.image_data);
        if let Some(prompt) = self.prompt.as_mut() {
            trim_in_place(prompt);
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LessonPlanRequest {
    #[validate(length(min = 1, message = "topic must not be empty"))]
    pub topic: String,

    #[validate(custom(function = "validate_grade_levels"))]
    pub grade_levels: Vec<i32>,

    #[serde(default = "default_duration_minutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub duration_minutes: i64,

    #[serde(default = "default_resources")]
    #[validate(length(min = 1, message = "resources must not be empty"))]
    pub resources: String,

    #[serde(default = "default_location")]
    #[validate(length(min = 1, message = "location must not be empty"))]
    pub location: String,
}

impl ValidatedRequest for LessonPlanRequest {
    fn normalize(&mut self) {
        trim_in_place(&mut self.topic);
        trim_in_place(&mut self.resources);
        trim_in_place(&mut self.location);
    }
}

fn default_quick_grade() -> i32 {
    5
}

fn default_quick_topic() -> String {
    "addition".to_string()
}

/// Query parameters of `POST /quick-math-problem`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuickMathQuery {
    #[serde(default = "default_quick_grade")]
    #[validate(range(min = 1, max = 12, message = "grade must be between 1 and 12"))]
    pub grade: i32,

    #[serde(default = "default_quick_topic")]
    #[validate(length(min = 1, message = "topic must not be empty"))]
    pub topic: String,
}

impl ValidatedRequest for QuickMathQuery {
    fn normalize(&mut self) {
        trim_in_place(&mut self.topic);
    }
}

/// Query parameters of `POST /analyze-image`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeImageQuery {
    pub grade_levels: Option<String>,
}

// Responses

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub message: &'static str,
    pub version: &'static str,
    pub problem_statement: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub api_initialized: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ContentMetadata {
    pub grade_levels: Vec<i32>,
    pub subject: String,
    pub location: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ContentResponse {
    pub content: String,
    pub metadata: ContentMetadata,
}

#[derive(Debug, Serialize)]
pub struct ImageMetadata {
    pub grade_levels: Vec<i32>,
    pub file_name: Option<String>,
    pub file_size: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ImageAnalysisResponse {
    pub analysis: String,
    pub metadata: ImageMetadata,
}

#[derive(Debug, Serialize)]
pub struct LessonPlanMetadata {
    pub topic: String,
    pub grade_levels: Vec<i32>,
    pub duration: i64,
    pub location: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct LessonPlanResponse {
    pub lesson_plan: String,
    pub metadata: LessonPlanMetadata,
}

#[derive(Debug, Serialize)]
pub struct QuickMathMetadata {
    pub grade: i32,
    pub topic: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct QuickMathResponse {
    pub problem: String,
    pub metadata: QuickMathMetadata,
}
