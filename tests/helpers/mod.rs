//! Test helpers: an in-process server driven over real HTTP.

use avatar_render_jobs::app_state::AppState;
use avatar_render_jobs::config::{AppConfig, RendererMode};
use avatar_render_jobs::models::generation::GenerateResponse;
use avatar_render_jobs::models::job::{JobStatus, JobView};
use avatar_render_jobs::routes;
use avatar_render_jobs::store::MemoryJobStore;
use reqwest::multipart;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::time::sleep;
use uuid::Uuid;

/// Smallest byte prefix `image::guess_format` recognises as PNG.
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    pub root: TempDir,
}

/// Start a server backed by the memory store that launches `sim_renderer`.
/// `renderer_args` are placed before the per-job flags.
pub async fn spawn_server(renderer_args: &[&str]) -> TestServer {
    let root = tempfile::tempdir().expect("Failed to create temp dir");

    let mut config = AppConfig::local(root.path());
    config.renderer_mode = RendererMode::Process;
    config.renderer_program = env!("CARGO_BIN_EXE_sim_renderer").to_string();
    config.renderer_args = ["--step-ms", "10"]
        .iter()
        .chain(renderer_args)
        .map(|a| a.to_string())
        .collect();
    config.render_timeout_secs = 30;

    let state = AppState::build(config, Arc::new(MemoryJobStore::new()))
        .await
        .expect("Failed to build app state");
    let app = routes::router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server error");
    });

    TestServer {
        base_url: format!("http://{addr}"),
        client: reqwest::Client::new(),
        root,
    }
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a generation form.
    pub async fn generate(&self, form: multipart::Form) -> reqwest::Response {
        self.client
            .post(self.url("/api/v1/generate"))
            .multipart(form)
            .send()
            .await
            .expect("Generate request failed")
    }

    /// Submit and expect acceptance.
    pub async fn submit(&self, form: multipart::Form) -> GenerateResponse {
        let response = self.generate(form).await;
        assert_eq!(response.status(), 200, "submission rejected");
        response.json().await.expect("Invalid generate response")
    }

    pub async fn status(&self, id: Uuid) -> reqwest::Response {
        self.client
            .get(self.url(&format!("/api/v1/jobs/{id}")))
            .send()
            .await
            .expect("Status request failed")
    }

    /// Poll until the job reaches a terminal state.
    pub async fn wait_for_terminal(&self, id: Uuid) -> JobView {
        for _ in 0..300 {
            let response = self.status(id).await;
            if response.status() == 200 {
                let view: JobView = response.json().await.expect("Invalid status response");
                if view.status.is_terminal() {
                    return view;
                }
            }
            sleep(Duration::from_millis(50)).await;
        }
        panic!("job {id} did not finish in time");
    }
}

/// The "Hello world" request used across scenarios.
pub fn hello_form() -> multipart::Form {
    multipart::Form::new()
        .text("text", "Hello world")
        .text("language", "English")
        .text("duration", "20")
}

pub fn assert_completed(view: &JobView) {
    assert_eq!(view.status, JobStatus::Completed, "job failed: {:?}", view.error);
    assert_eq!(view.progress, 100.0);
    assert_eq!(
        view.artifact_url.as_deref(),
        Some(format!("/api/v1/jobs/{}/download", view.job_id).as_str())
    );
}
