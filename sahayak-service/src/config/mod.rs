use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable holding the Gemini credential.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Upload cap for image analysis (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Images larger than this on either side are downscaled before upload.
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct SahayakConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub gemini: GeminiSettings,
    pub retry: RetrySettings,
    pub limits: LimitSettings,
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiSettings {
    /// Absent credentials are tolerated at startup; generation endpoints
    /// report a configuration error until one is supplied.
    pub api_key: Option<Secret<String>>,
    pub api_base: String,
    /// Model for text-only requests.
    pub text_model: String,
    /// Model for requests carrying an image.
    pub vision_model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per generation, including the first.
    pub max_attempts: u32,
    /// Backoff unit; waits are 1, 2, 4, ... units.
    pub backoff_unit_ms: u64,
    pub attempt_timeout_secs: u64,
}

impl RetrySettings {
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit_ms: 1000,
            attempt_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitSettings {
    pub max_upload_bytes: usize,
    pub max_image_dimension: u32,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_image_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl SahayakConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";

        Ok(SahayakConfig {
            common: common_config,
            gemini: GeminiSettings {
                api_key: get_optional_env(API_KEY_ENV).map(Secret::new),
                api_base: get_env("GEMINI_API_BASE", Some(DEFAULT_GEMINI_API_BASE), is_prod)?,
                text_model: get_env("GEMINI_TEXT_MODEL", Some(DEFAULT_MODEL), is_prod)?,
                vision_model: get_env("GEMINI_VISION_MODEL", Some(DEFAULT_MODEL), is_prod)?,
            },
            retry: RetrySettings {
                max_attempts: get_parsed_env("GENAI_MAX_ATTEMPTS", 3)?,
                backoff_unit_ms: get_parsed_env("GENAI_BACKOFF_UNIT_MS", 1000)?,
                attempt_timeout_secs: get_parsed_env("GENAI_ATTEMPT_TIMEOUT_SECS", 30)?,
            },
            limits: LimitSettings {
                max_upload_bytes: get_parsed_env("UPLOAD_MAX_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
                max_image_dimension: get_parsed_env(
                    "IMAGE_MAX_DIMENSION",
                    DEFAULT_MAX_IMAGE_DIMENSION,
                )?,
            },
            telemetry: TelemetrySettings {
                log_level: get_env("LOG_LEVEL", Some("info"), false)?,
                otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            },
        })
    }

    /// Configuration for in-process use (tests, tools): no credential, default limits.
    pub fn local(api_base: &str) -> Self {
        SahayakConfig {
            common: core_config::Config::default(),
            gemini: GeminiSettings {
                api_key: None,
                api_base: api_base.to_string(),
                text_model: DEFAULT_MODEL.to_string(),
                vision_model: DEFAULT_MODEL.to_string(),
            },
            retry: RetrySettings::default(),
            limits: LimitSettings::default(),
            telemetry: TelemetrySettings {
                log_level: "info".to_string(),
                otlp_endpoint: None,
            },
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn get_parsed_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e))
        }),
        Err(_) => Ok(default),
    }
}
