// Main entry point - Dependency wiring and dashboard startup
use std::sync::Arc;

use plantomio_telemetry::application::live_dashboard::{DashboardCommand, LiveDashboard};
use plantomio_telemetry::application::telemetry_client::TelemetryClient;
use plantomio_telemetry::infrastructure::config::load_settings;
use plantomio_telemetry::infrastructure::http_source::HttpTelemetrySource;
use plantomio_telemetry::presentation::tracing_renderer::TracingRenderer;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("plantomio_telemetry=info")),
        )
        .init();

    // Load configuration
    let settings = load_settings()?;
    tracing::info!(
        backend = %settings.backend.base_url,
        device = %settings.dashboard.device,
        minutes = settings.dashboard.range_minutes.minutes(),
        "Loaded configuration"
    );

    // Create source (infrastructure layer)
    let source = Arc::new(HttpTelemetrySource::new(
        &settings.backend.base_url,
        settings.request_timeout(),
    )?);

    // Create client and scheduler (application layer)
    let client = TelemetryClient::new(settings.client_options());
    let renderer = TracingRenderer::new(settings.client_options().tank);
    let dashboard = LiveDashboard::new(source, client, renderer, settings.dashboard_options());

    let (commands_tx, commands_rx) = mpsc::channel(8);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        let _ = commands_tx.send(DashboardCommand::Stop).await;
    });

    let renderer = dashboard.run(commands_rx).await;
    tracing::info!(frames = renderer.frames(), "Dashboard stopped");

    Ok(())
}
