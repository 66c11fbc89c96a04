use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use avatar_render_jobs::app_state::AppState;
use avatar_render_jobs::config::AppConfig;
use avatar_render_jobs::{routes, store};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing avatar-render-jobs server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe();

    tracing::info!(backend = ?config.store_backend, "Initializing job store");
    let job_store = store::from_config(&config).expect("Failed to initialize job store");
    // A store that is down at start-up is not fatal: submissions still run and
    // status falls back to the artifact directory until it comes back.
    if let Err(e) = job_store.health_check().await {
        tracing::warn!(error = %e, "Job store unreachable at start-up, running degraded");
    }

    tracing::info!(
        mode = ?config.renderer_mode,
        program = %config.renderer_program,
        output_dir = %config.output_dir.display(),
        "Configuring renderer"
    );

    let bind_addr = config.bind_addr.clone();
    let max_upload = config.max_upload_bytes;
    let state = AppState::build(config, job_store)
        .await
        .expect("Failed to prepare output directories");

    let app = routes::router(state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(max_upload));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
