use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::artifacts::{ArtifactError, ArtifactStore};
use crate::services::registry::JobRegistry;
use crate::services::supervisor::{RendererSettings, Supervisor};
use crate::services::workspace::Workspace;
use crate::store::SharedJobStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<JobRegistry>,
    pub workspace: Arc<Workspace>,
}

impl AppState {
    /// Wire the services around `store`, creating the output and scratch
    /// directories if needed.
    pub async fn build(config: AppConfig, store: SharedJobStore) -> Result<Self, ArtifactError> {
        let artifacts = Arc::new(ArtifactStore::open(&config.output_dir, &config.temp_dir).await?);
        let supervisor = Arc::new(Supervisor::new(
            Arc::clone(&store),
            Arc::clone(&artifacts),
            RendererSettings::from_config(&config),
        ));
        let registry = Arc::new(JobRegistry::new(
            Arc::clone(&store),
            Arc::clone(&artifacts),
            supervisor,
        ));
        let workspace = Arc::new(Workspace::new(store, artifacts, config.profile_path.clone()));

        Ok(Self {
            config: Arc::new(config),
            registry,
            workspace,
        })
    }
}
