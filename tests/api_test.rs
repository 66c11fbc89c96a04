mod helpers;

use avatar_render_jobs::error::ErrorResponse;
use avatar_render_jobs::models::generation::{DeleteResponse, JobListResponse};
use avatar_render_jobs::models::job::{JobStatus, JobView};
use avatar_render_jobs::models::workspace::{TrainingProfile, WorkspaceStatus};
use helpers::{assert_completed, hello_form, spawn_server, PNG_BYTES};
use reqwest::multipart;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_hello_world_renders_and_downloads() {
    let server = spawn_server(&[]).await;

    let accepted = server.submit(hello_form()).await;
    assert_eq!(accepted.status, JobStatus::Queued);
    assert_eq!(accepted.estimated_seconds, 40);

    let view = server.wait_for_terminal(accepted.job_id).await;
    assert_completed(&view);

    let download = server
        .client
        .get(server.url(view.artifact_url.as_deref().unwrap()))
        .send()
        .await
        .unwrap();
    assert_eq!(download.status(), 200);
    assert_eq!(download.headers()["content-type"], "video/mp4");
    assert_eq!(
        download.headers()["content-disposition"],
        format!("attachment; filename=\"avatar_{}.mp4\"", accepted.job_id).as_str()
    );
    let body = download.text().await.unwrap();
    assert!(body.starts_with("sim-render"));
    assert!(body.contains("frames=120"));
    assert!(body.contains("Hello world"));

    let listed: JobListResponse = server
        .client
        .get(server.url("/api/v1/jobs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.from_store);
    assert_eq!(listed.limit, 50);
    assert_eq!(listed.jobs.len(), 1);
    assert_eq!(listed.jobs[0].job_id, accepted.job_id);
}

#[tokio::test]
async fn test_zero_duration_is_rejected_without_a_job() {
    let server = spawn_server(&[]).await;

    let form = multipart::Form::new()
        .text("text", "Hello world")
        .text("duration", "0");
    let response = server.generate(form).await;
    assert_eq!(response.status(), 400);
    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.error, "Invalid request");

    let listed: JobListResponse = server
        .client
        .get(server.url("/api/v1/jobs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.jobs.is_empty());
}

#[tokio::test]
async fn test_malformed_fields_are_rejected() {
    let server = spawn_server(&[]).await;

    let missing_text = multipart::Form::new().text("language", "German");
    assert_eq!(server.generate(missing_text).await.status(), 400);

    let bad_resolution = hello_form().text("resolution", "1080");
    assert_eq!(server.generate(bad_resolution).await.status(), 400);

    let weak_image = hello_form().text("image_strength", "0.1");
    assert_eq!(server.generate(weak_image).await.status(), 400);

    let nan_strength = hello_form().text("image_strength", "NaN");
    assert_eq!(server.generate(nan_strength).await.status(), 400);
}

#[tokio::test]
async fn test_delete_removes_record_and_artifact() {
    let server = spawn_server(&[]).await;
    let accepted = server.submit(hello_form()).await;
    assert_completed(&server.wait_for_terminal(accepted.job_id).await);

    let path = format!("/api/v1/jobs/{}", accepted.job_id);
    let deleted: DeleteResponse = server
        .client
        .delete(server.url(&path))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(deleted.record_removed);
    assert!(deleted.artifact_removed);

    assert_eq!(server.status(accepted.job_id).await.status(), 404);
    let download = server
        .client
        .get(server.url(&format!("{path}/download")))
        .send()
        .await
        .unwrap();
    assert_eq!(download.status(), 404);
    let again = server.client.delete(server.url(&path)).send().await.unwrap();
    assert_eq!(again.status(), 404);
}

#[tokio::test]
async fn test_identical_concurrent_submissions_get_distinct_jobs() {
    let server = spawn_server(&[]).await;

    let (a, b) = tokio::join!(server.submit(hello_form()), server.submit(hello_form()));
    assert_ne!(a.job_id, b.job_id);

    for id in [a.job_id, b.job_id] {
        assert_completed(&server.wait_for_terminal(id).await);
        let download = server
            .client
            .get(server.url(&format!("/api/v1/jobs/{id}/download")))
            .send()
            .await
            .unwrap();
        assert_eq!(download.status(), 200);
    }

    let workspace: WorkspaceStatus = server
        .client
        .get(server.url("/api/v1/workspace"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(workspace.artifacts, 2);
}

#[tokio::test]
async fn test_renderer_failure_is_reported() {
    let server = spawn_server(&["--fail-with", "3"]).await;
    let accepted = server.submit(hello_form()).await;

    let view = server.wait_for_terminal(accepted.job_id).await;
    assert_eq!(view.status, JobStatus::Failed);
    assert!(view.error.as_deref().unwrap().contains("code 3"));
    assert!(view.artifact_url.is_none());
}

#[tokio::test]
async fn test_missing_artifact_fails_the_job() {
    let server = spawn_server(&["--skip-output"]).await;
    let accepted = server.submit(hello_form()).await;

    let view = server.wait_for_terminal(accepted.job_id).await;
    assert_eq!(view.status, JobStatus::Failed);
    assert!(view.error.as_deref().unwrap().contains("artifact is missing"));
}

#[tokio::test]
async fn test_reference_image_conditions_the_render() {
    let server = spawn_server(&[]).await;

    let form = hello_form()
        .text("image_strength", "1.5")
        .part(
            "image",
            multipart::Part::bytes(PNG_BYTES.to_vec())
                .file_name("face.png")
                .mime_str("image/png")
                .unwrap(),
        );
    let accepted = server.submit(form).await;
    assert_completed(&server.wait_for_terminal(accepted.job_id).await);

    let not_an_image = hello_form().part(
        "image",
        multipart::Part::bytes(b"plain text".to_vec()).file_name("face.png"),
    );
    assert_eq!(server.generate(not_an_image).await.status(), 415);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let server = spawn_server(&[]).await;
    let response = server.status(Uuid::new_v4()).await;
    assert_eq!(response.status(), 404);
    let body: ErrorResponse = response.json().await.unwrap();
    assert_eq!(body.error, "Job not found");
}

#[tokio::test]
async fn test_health_reports_components() {
    let server = spawn_server(&[]).await;
    let response = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["job_store"]["detail"], "memory");
}

#[tokio::test]
async fn test_profile_round_trip() {
    let server = spawn_server(&[]).await;
    let url = server.url("/api/v1/profile");

    let empty: Option<TrainingProfile> =
        server.client.get(&url).send().await.unwrap().json().await.unwrap();
    assert!(empty.is_none());

    let stored: TrainingProfile = server
        .client
        .put(&url)
        .json(&json!({ "name": "studio-presenter", "reference_images": 24, "accuracy": 91.0 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored.accuracy, Some(91.0));

    let fetched: Option<TrainingProfile> =
        server.client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(fetched, Some(stored));

    let invalid = server
        .client
        .put(&url)
        .json(&json!({ "name": "", "reference_images": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 400);
}

#[tokio::test]
async fn test_cleanup_keeps_artifacts() {
    let server = spawn_server(&[]).await;
    let accepted = server.submit(hello_form()).await;
    let view: JobView = server.wait_for_terminal(accepted.job_id).await;
    assert_completed(&view);

    let stray = server.root.path().join("outputs").join("partial.tmp");
    tokio::fs::write(&stray, b"leftover").await.unwrap();

    let response = server
        .client
        .post(server.url("/api/v1/workspace/cleanup"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(!stray.exists());

    let download = server
        .client
        .get(server.url(&format!("/api/v1/jobs/{}/download", accepted.job_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(download.status(), 200);
}
