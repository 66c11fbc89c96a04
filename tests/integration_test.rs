use avatar_render_jobs::{
    app_state::AppState,
    config::{AppConfig, StoreBackend},
    models::job::{AvatarMode, GenerationRequest, JobStatus, Resolution},
    services::registry::RegistryError,
    store,
};
use std::time::Duration;

fn hello_request() -> GenerationRequest {
    GenerationRequest {
        text: "Hello world".to_string(),
        language: "English".to_string(),
        resolution: Resolution::Base512,
        duration: 20,
        image_strength: 1.0,
        avatar_mode: AvatarMode::Default,
        image_name: None,
    }
}

/// Integration test: full job lifecycle against a real Redis.
///
/// Submits through the registry with the simulated renderer, follows the
/// progress events to completion, then checks the persisted record, the
/// listing and deletion.
///
/// Note: requires a running Redis reachable at `REDIS_URL`.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_redis_backed_lifecycle() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = AppConfig::local(dir.path());
    config.store_backend = StoreBackend::Redis;
    config.redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/15".to_string());
    config.job_ttl_secs = 120;

    let job_store = store::from_config(&config).expect("Failed to build Redis store");
    job_store.health_check().await.expect("Redis is not reachable");

    let state = AppState::build(config, job_store.clone())
        .await
        .expect("Failed to build app state");
    let mut events = state.registry.supervisor().subscribe();

    let job = state
        .registry
        .submit(hello_request(), None)
        .await
        .expect("Submission rejected");
    assert_eq!(job.status, JobStatus::Queued);

    // 1. Progress only moves forward and passes every phase
    let mut seen = Vec::new();
    let final_view = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let view = events.recv().await.expect("Event stream closed");
            if view.job_id != job.id {
                continue;
            }
            seen.push(view.progress);
            if view.status.is_terminal() {
                return view;
            }
        }
    })
    .await
    .expect("Job did not finish in time");

    assert_eq!(final_view.status, JobStatus::Completed);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {seen:?}");
    for floor in [10.0, 40.0, 60.0, 80.0, 100.0] {
        assert!(seen.contains(&floor), "missing progress {floor}: {seen:?}");
    }

    // 2. Persisted record matches
    let stored = job_store
        .get(job.id)
        .await
        .expect("Redis read failed")
        .expect("Job record missing");
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.progress, 100.0);
    assert!(stored.worker_pid.is_none());
    assert!(stored.completed_at.is_some());

    // 3. Listing comes from the store
    let listed = state.registry.list(200, 0).await.expect("Listing failed");
    assert!(listed.from_store);
    assert!(listed.jobs.iter().any(|v| v.job_id == job.id));

    // 4. Deletion removes record and artifact
    let deleted = state.registry.delete(job.id).await.expect("Delete failed");
    assert!(deleted.record_removed);
    assert!(deleted.artifact_removed);
    assert!(matches!(
        state.registry.get_status(job.id).await,
        Err(RegistryError::NotFound(_))
    ));
}
