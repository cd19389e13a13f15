#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use image::{DynamicImage, ImageFormat, RgbImage};
use sahayak_service::config::SahayakConfig;
use sahayak_service::services::providers::mock::MockTextProvider;
use sahayak_service::services::{CredentialSource, GatewaySettings, ModelGateway};
use sahayak_service::startup::{build_router, AppState};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const BOUNDARY: &str = "sahayak-test-boundary";

/// Local configuration with a 1ms backoff unit so retry tests stay fast.
pub fn test_config() -> SahayakConfig {
    let mut config = SahayakConfig::local("http://127.0.0.1:9");
    config.retry.backoff_unit_ms = 1;
    config
}

pub struct TestApp {
    pub router: Router,
    pub provider: Arc<MockTextProvider>,
    pub gateway: Arc<ModelGateway>,
}

impl TestApp {
    /// Router backed by an already-initialised gateway around `provider`.
    pub fn with_provider(provider: MockTextProvider) -> Self {
        let config = test_config();
        let provider = Arc::new(provider);
        let gateway = Arc::new(ModelGateway::with_provider(
            provider.clone(),
            GatewaySettings::from_config(&config),
        ));
        Self::from_parts(config, gateway, provider)
    }

    pub fn new() -> Self {
        Self::with_provider(MockTextProvider::new())
    }

    /// Router whose gateway has no credential at all.
    pub fn without_credential() -> Self {
        let config = test_config();
        let gateway = Arc::new(ModelGateway::new(
            CredentialSource::Fixed(None),
            GatewaySettings::from_config(&config),
        ));
        Self::from_parts(config, gateway, Arc::new(MockTextProvider::new()))
    }

    fn from_parts(
        config: SahayakConfig,
        gateway: Arc<ModelGateway>,
        provider: Arc<MockTextProvider>,
    ) -> Self {
        let router = build_router(AppState::new(config, gateway.clone()));
        Self {
            router,
            provider,
            gateway,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(json_request(uri, body)).await
    }
}

pub fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// One part of a multipart form.
pub enum Part<'a> {
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

pub fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File {
                name,
                file_name,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, file_name, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}",
                        name, value
                    )
                    .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    image_bytes(width, height, ImageFormat::Png)
}

pub fn image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
        .write_to(&mut buffer, format)
        .unwrap();
    buffer.into_inner()
}
