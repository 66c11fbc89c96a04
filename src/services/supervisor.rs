//! Execution of a single render job.
//!
//! A [`Supervisor`] takes a queued job, launches the renderer, watches its
//! output for phase markers, and writes exactly one terminal state. It is the
//! only writer of a job between `Queued` and that terminal state.

use chrono::Utc;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{AppConfig, RendererMode};
use crate::models::job::{artifact_url, AvatarMode, Job, JobPatch, JobView};
use crate::services::artifacts::{ArtifactStore, ScratchFile};
use crate::services::invocation::RenderInvocation;
use crate::services::progress;
use crate::store::SharedJobStore;

/// Lines printed by the simulated renderer, one per step.
const SIMULATED_PHASES: &[&str] = &[
    "Loading checkpoint",
    "Stage 1: Generating video latents",
    "Stage 2: Upscaling 2x",
];

/// How the renderer is launched, derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub mode: RendererMode,
    pub program: String,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub timeout: Duration,
    pub simulated_step: Duration,
    pub seed: u64,
}

impl RendererSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            mode: config.renderer_mode,
            program: config.renderer_program.clone(),
            args: config.renderer_args.clone(),
            workdir: config.renderer_workdir.clone(),
            timeout: config.render_timeout(),
            simulated_step: Duration::from_millis(config.simulated_step_ms),
            seed: config.render_seed,
        }
    }
}

/// How a render ended, as far as the process is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderExit {
    Code(i32),
    Signal,
}

impl From<ExitStatus> for RenderExit {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => RenderExit::Code(code),
            None => RenderExit::Signal,
        }
    }
}

/// A launched render: merged output lines plus the task resolving its exit.
struct RunningRender {
    pid: Option<u32>,
    lines: mpsc::Receiver<String>,
    exit: JoinHandle<Result<RenderExit, RenderError>>,
}

pub struct Supervisor {
    store: SharedJobStore,
    artifacts: Arc<ArtifactStore>,
    settings: RendererSettings,
    events: broadcast::Sender<JobView>,
}

impl Supervisor {
    pub fn new(
        store: SharedJobStore,
        artifacts: Arc<ArtifactStore>,
        settings: RendererSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            store,
            artifacts,
            settings,
            events,
        }
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    /// Every state change a supervisor records, in order per job. Slow
    /// receivers may miss events.
    ///
    /// No route consumes this; it exists for tests and for in-process
    /// observers that want progress without polling the store.
    pub fn subscribe(&self) -> broadcast::Receiver<JobView> {
        self.events.subscribe()
    }

    /// Drive `job` to a terminal state and return it.
    ///
    /// `image` is the job's uploaded reference image. It is deleted when this
    /// returns, on every path.
    pub async fn run(&self, job: Job, image: Option<ScratchFile>) -> Job {
        let started = Instant::now();
        let job_id = job.id;
        let mut job = job;
        metrics::gauge!("render_jobs_active").increment(1.0);

        tracing::info!(
            job_id = %job_id,
            mode = ?self.settings.mode,
            avatar_mode = %job.request.avatar_mode,
            "Starting render job"
        );

        let outcome = self.execute(&mut job, image.as_ref()).await;
        drop(image);

        match outcome {
            Ok(()) => {
                self.record(&mut job, JobPatch::completed(artifact_url(job_id)))
                    .await;
                metrics::counter!("render_jobs_completed_total").increment(1);
                tracing::info!(
                    job_id = %job_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Render job completed"
                );
            }
            Err(e) => {
                self.discard_artifact(job_id).await;
                self.record(&mut job, JobPatch::failed(e.to_string())).await;
                metrics::counter!("render_jobs_failed_total").increment(1);
                tracing::warn!(
                    job_id = %job_id,
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Render job failed"
                );
            }
        }

        metrics::gauge!("render_jobs_active").decrement(1.0);
        metrics::histogram!("render_job_seconds").record(started.elapsed().as_secs_f64());
        job
    }

    /// Remove whatever a failed render left at the artifact path. Status falls
    /// back to the output directory once the record is gone, so a partial file
    /// would otherwise read as a completed job.
    async fn discard_artifact(&self, job_id: Uuid) {
        match self.artifacts.delete(job_id).await {
            Ok(true) => tracing::debug!(job_id = %job_id, "Removed output of failed render"),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to remove partial output");
            }
        }
    }

    /// Fail a job that never reached the renderer, e.g. because its inputs
    /// could not be prepared.
    pub async fn fail_unstarted(&self, mut job: Job, cause: String) -> Job {
        self.record(&mut job, JobPatch::failed(cause)).await;
        metrics::counter!("render_jobs_failed_total").increment(1);
        job
    }

    async fn execute(&self, job: &mut Job, image: Option<&ScratchFile>) -> Result<(), RenderError> {
        self.record(job, JobPatch::processing(progress::ACCEPTED)).await;

        if job.request.avatar_mode == AvatarMode::Image && image.is_none() {
            return Err(RenderError::Input(
                "image mode selected but no reference image is available".to_string(),
            ));
        }

        let invocation = RenderInvocation::compose(
            &job.request,
            image.map(ScratchFile::path),
            self.artifacts.path_for(job.id),
            self.settings.seed,
        );

        let mut render = match self.settings.mode {
            RendererMode::Process => self.spawn_process(&invocation)?,
            RendererMode::Simulated => self.spawn_simulated(&invocation),
        };

        if let Some(pid) = render.pid {
            tracing::debug!(job_id = %job.id, pid, "Renderer launched");
            self.record(job, JobPatch::worker_pid(pid)).await;
        }

        let limit = self.settings.timeout;
        let exit = match tokio::time::timeout(limit, self.monitor(job, &mut render)).await {
            Ok(exit) => exit?,
            Err(_) => {
                // Dropping the child inside the task kills it (kill_on_drop).
                // Wait for the cancelled task so the child is gone before the
                // caller cleans up its output.
                render.exit.abort();
                let _ = (&mut render.exit).await;
                return Err(RenderError::Timeout(limit.as_secs()));
            }
        };

        match exit {
            RenderExit::Code(0) => {}
            RenderExit::Code(code) => return Err(RenderError::ExitCode(code)),
            RenderExit::Signal => return Err(RenderError::Signal),
        }

        if !self.artifacts.exists(job.id).await {
            return Err(RenderError::ArtifactMissing);
        }
        Ok(())
    }

    /// Consume renderer output until it closes, then wait for the exit.
    async fn monitor(
        &self,
        job: &mut Job,
        render: &mut RunningRender,
    ) -> Result<RenderExit, RenderError> {
        while let Some(line) = render.lines.recv().await {
            tracing::debug!(job_id = %job.id, line = %line, "renderer output");
            if let Some(floor) = progress::advance(job.progress, &line) {
                self.record(job, JobPatch::processing(floor)).await;
            }
        }

        (&mut render.exit)
            .await
            .map_err(|e| RenderError::Join(e.to_string()))?
    }

    fn spawn_process(&self, invocation: &RenderInvocation) -> Result<RunningRender, RenderError> {
        let mut cmd = Command::new(&self.settings.program);
        cmd.args(&self.settings.args)
            .args(invocation.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.settings.workdir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(RenderError::Spawn)?;
        let pid = child.id();

        // stdout and stderr are merged into one line stream.
        let (tx, lines) = mpsc::channel(256);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        let exit = tokio::spawn(async move {
            child
                .wait()
                .await
                .map(RenderExit::from)
                .map_err(RenderError::Io)
        });

        Ok(RunningRender { pid, lines, exit })
    }

    fn spawn_simulated(&self, invocation: &RenderInvocation) -> RunningRender {
        let (tx, lines) = mpsc::channel(16);
        let step = self.settings.simulated_step;
        let output_path = invocation.output_path.clone();
        let num_frames = invocation.num_frames;

        let exit = tokio::spawn(async move {
            for phase in SIMULATED_PHASES {
                tokio::time::sleep(step).await;
                let _ = tx.send(phase.to_string()).await;
            }
            let placeholder = format!("simulated render: {num_frames} frames\n");
            tokio::fs::write(&output_path, placeholder)
                .await
                .map_err(RenderError::Io)?;
            Ok(RenderExit::Code(0))
        });

        RunningRender {
            pid: None,
            lines,
            exit,
        }
    }

    /// Apply `patch` to the local copy, publish it, and persist it.
    ///
    /// Persistence is best effort: failures are logged and the run goes on. If
    /// the record vanished from the store (expired, or the initial write was
    /// lost) the full local copy is written back.
    async fn record(&self, job: &mut Job, patch: JobPatch) {
        if !job.apply(patch.clone(), Utc::now()) {
            return;
        }
        let _ = self.events.send(JobView::from(&*job));

        match self.store.update(job.id, patch).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::debug!(job_id = %job.id, "Job record missing, rewriting");
                if let Err(e) = self.store.put(job).await {
                    tracing::warn!(job_id = %job.id, error = %e, "Failed to persist job state");
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Failed to persist job state");
            }
        }
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Stopped reading renderer output");
                break;
            }
        }
    }
}

/// Why a render ended in `Failed`. The `Display` text becomes the job's error.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("invalid render input: {0}")]
    Input(String),

    #[error("failed to launch renderer: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("renderer I/O error: {0}")]
    Io(#[source] std::io::Error),

    #[error("renderer exited with code {0}")]
    ExitCode(i32),

    #[error("renderer was terminated by a signal")]
    Signal,

    #[error("renderer exited successfully but artifact is missing")]
    ArtifactMissing,

    #[error("render timed out after {0} s")]
    Timeout(u64),

    #[error("render task aborted: {0}")]
    Join(String),
}
