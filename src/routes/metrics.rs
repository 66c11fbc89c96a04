use axum::extract::State;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for the render job metrics.
pub fn describe() {
    metrics::describe_counter!(
        "render_jobs_submitted_total",
        "Render jobs accepted by the generate endpoint"
    );
    metrics::describe_counter!(
        "render_jobs_completed_total",
        "Render jobs that produced an artifact"
    );
    metrics::describe_counter!("render_jobs_failed_total", "Render jobs that ended in failure");
    metrics::describe_histogram!(
        "render_job_seconds",
        metrics::Unit::Seconds,
        "Wall-clock time from render start to terminal state"
    );
    metrics::describe_gauge!("render_jobs_active", "Renders currently being supervised");
}

/// GET /metrics: Prometheus text exposition.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> String {
    handle.render()
}
