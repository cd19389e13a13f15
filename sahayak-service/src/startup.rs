use crate::config::SahayakConfig;
use crate::handlers;
use crate::services::upload::MULTIPART_OVERHEAD_BYTES;
use crate::services::{ImageDecoder, ModelGateway};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::tracing::{make_request_span, request_id_middleware};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: SahayakConfig,
    pub gateway: Arc<ModelGateway>,
    pub image_decoder: ImageDecoder,
}

impl AppState {
    pub fn new(config: SahayakConfig, gateway: Arc<ModelGateway>) -> Self {
        let image_decoder = ImageDecoder::new(
            config.limits.max_upload_bytes,
            config.limits.max_image_dimension,
        );
        Self {
            config,
            gateway,
            image_decoder,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let max_upload = state.config.limits.max_upload_bytes;
    let multipart_limit = max_upload.saturating_add(MULTIPART_OVERHEAD_BYTES);
    // base64 inflates the payload by 4/3.
    let base64_limit = max_upload
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route("/generate-content", post(handlers::generate_content))
        .route(
            "/analyze-image",
            post(handlers::analyze_image).layer(DefaultBodyLimit::max(multipart_limit)),
        )
        .route(
            "/analyze-image/base64",
            post(handlers::analyze_image_base64).layer(DefaultBodyLimit::max(base64_limit)),
        )
        .route("/create-lesson-plan", post(handlers::create_lesson_plan))
        .route("/quick-math-problem", post(handlers::quick_math_problem))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    pub async fn build(config: SahayakConfig) -> Result<Self, AppError> {
        let gateway = Arc::new(ModelGateway::from_config(&config));

        // A missing key is not fatal; generation endpoints report it until it is set.
        if let Err(e) = gateway.ensure_initialized().await {
            tracing::warn!(error = %e, "Model client not initialized at startup");
        }

        let api_initialized = gateway.is_initialized();
        let app = build_router(AppState::new(config.clone(), gateway));

        let addr: SocketAddr = config.common.address().parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Invalid listen address {}: {}",
                config.common.address(),
                e
            ))
        })?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            api_initialized,
            "Sahayak service listening"
        );

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
