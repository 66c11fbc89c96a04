use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Which job store backend to run.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

/// How render jobs are executed.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RendererMode {
    /// Launch `renderer_program` as a child process.
    Process,
    /// Emit the render phases from an in-process task and write a placeholder
    /// artifact. For development machines without the model.
    Simulated,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackend,

    /// Redis connection string, used when `store_backend` is `redis`.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Seconds a job record survives in Redis after its last update.
    #[serde(default = "default_job_ttl_secs")]
    pub job_ttl_secs: u64,

    /// Root directory for finished artifacts (`<job-id>.mp4`).
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Scratch directory for uploaded reference images.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// JSON record of the current training profile.
    #[serde(default = "default_profile_path")]
    pub profile_path: PathBuf,

    #[serde(default = "default_renderer_mode")]
    pub renderer_mode: RendererMode,

    /// Executable launched for each job.
    #[serde(default = "default_renderer_program")]
    pub renderer_program: String,

    /// Leading arguments placed before the per-job flags (comma separated).
    #[serde(default = "default_renderer_args")]
    pub renderer_args: Vec<String>,

    /// Working directory of the renderer process.
    #[serde(default)]
    pub renderer_workdir: Option<PathBuf>,

    /// Wall-clock limit for one render before the child is killed.
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,

    /// Delay between phases in simulated mode.
    #[serde(default = "default_simulated_step_ms")]
    pub simulated_step_ms: u64,

    #[serde(default = "default_render_seed")]
    pub render_seed: u64,

    /// Largest accepted request body (the reference image dominates).
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Redis
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

fn default_job_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_profile_path() -> PathBuf {
    PathBuf::from("training_profile.json")
}

fn default_renderer_mode() -> RendererMode {
    RendererMode::Process
}

fn default_renderer_program() -> String {
    "python".to_string()
}

fn default_renderer_args() -> Vec<String> {
    vec!["-m".to_string(), "ltx_pipelines.ti2vid_two_stages".to_string()]
}

fn default_render_timeout_secs() -> u64 {
    30 * 60
}

fn default_simulated_step_ms() -> u64 {
    1000
}

fn default_render_seed() -> u64 {
    42
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    /// Configuration for tests and local tooling: in-memory store, simulated
    /// renderer, everything rooted under `root`.
    pub fn local(root: &std::path::Path) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            store_backend: StoreBackend::Memory,
            redis_url: default_redis_url(),
            job_ttl_secs: default_job_ttl_secs(),
            output_dir: root.join("outputs"),
            temp_dir: root.join("temp"),
            profile_path: root.join("training_profile.json"),
            renderer_mode: RendererMode::Simulated,
            renderer_program: default_renderer_program(),
            renderer_args: Vec::new(),
            renderer_workdir: None,
            render_timeout_secs: 60,
            simulated_step_ms: 10,
            render_seed: default_render_seed(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}
