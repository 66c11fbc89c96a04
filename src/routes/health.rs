use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::app_state::AppState;
use crate::config::RendererMode;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub job_store: ComponentHealth,
    pub renderer: ComponentHealth,
    pub output_dir: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ComponentHealth {
    fn ok(latency_ms: Option<u64>, detail: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            latency_ms,
            detail: Some(detail.into()),
        }
    }

    fn error(detail: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            latency_ms: None,
            detail: Some(detail.into()),
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// GET /health: job store, renderer and output directory status.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store = state.registry.store();
    let start = std::time::Instant::now();
    let store_check = match store.health_check().await {
        Ok(()) => ComponentHealth::ok(Some(start.elapsed().as_millis() as u64), store.backend()),
        Err(e) => ComponentHealth::error(e.to_string()),
    };

    let settings = state.registry.supervisor().settings();
    let renderer_check = match settings.mode {
        RendererMode::Simulated => ComponentHealth::ok(None, "simulated"),
        RendererMode::Process => match resolve_program(&settings.program) {
            Some(path) => ComponentHealth::ok(None, path.display().to_string()),
            None => ComponentHealth::error(format!("'{}' not found", settings.program)),
        },
    };

    let output_root = state.registry.artifacts().output_root();
    let output_check = match tokio::fs::metadata(output_root).await {
        Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => {
            ComponentHealth::ok(None, output_root.display().to_string())
        }
        Ok(_) => ComponentHealth::error(format!(
            "{} is not a writable directory",
            output_root.display()
        )),
        Err(e) => ComponentHealth::error(e.to_string()),
    };

    let all_healthy = store_check.is_ok() && renderer_check.is_ok() && output_check.is_ok();
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            job_store: store_check,
            renderer: renderer_check,
            output_dir: output_check,
        },
    };

    (status_code, Json(response))
}

/// Locate the renderer executable: a path is checked as given, a bare name is
/// searched on `PATH`.
fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|path| path.is_file())
    })
}
