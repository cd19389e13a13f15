use sahayak_service::config::SahayakConfig;
use sahayak_service::services::init_metrics;
use sahayak_service::startup::Application;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize metrics registry (must be before any metrics are recorded)
    init_metrics();

    let config = SahayakConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        "sahayak-service",
        &config.telemetry.log_level,
        config.telemetry.otlp_endpoint.as_deref(),
    );

    let application = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    application.run_until_stopped().await?;

    tracing::info!("Sahayak service stopped");
    Ok(())
}
