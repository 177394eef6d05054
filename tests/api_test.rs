//! HTTP tests against the router served on an ephemeral port.

mod helpers;

use helpers::*;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use image_jobs::app_state::AppState;
use image_jobs::routes;
use image_jobs::services::generator::{GeneratedImage, ImageGenerator};

async fn spawn_app(generator: Arc<dyn ImageGenerator>) -> String {
    let (manager, store) = manager_with(generator, settings());
    let app = routes::router(AppState::new(store, manager));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server error");
    });

    format!("http://{}", addr)
}

async fn submit(client: &reqwest::Client, base_url: &str, prompt: &str) -> reqwest::Response {
    client
        .post(format!("{}/api/images/generate", base_url))
        .json(&serde_json::json!({ "prompt": prompt }))
        .send()
        .await
        .expect("Submit request failed")
}

/// Poll a job until it leaves `pending`, like a browser client would.
async fn poll_until_terminal(client: &reqwest::Client, base_url: &str, id: &str) -> Value {
    for _ in 0..200 {
        let job: Value = client
            .get(format!("{}/api/images/{}", base_url, id))
            .send()
            .await
            .expect("Status request failed")
            .json()
            .await
            .expect("Invalid job JSON");

        if job["status"] != "pending" {
            return job;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never left pending", id);
}

#[tokio::test]
async fn test_generate_poll_list_delete() {
    let generator = Arc::new(GatedGenerator::default());
    let release = generator.gate("a red cube");
    let base_url = spawn_app(generator.clone()).await;
    let client = reqwest::Client::new();

    let response = submit(&client, &base_url, "a red cube").await;
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    let job: Value = response.json().await.unwrap();
    assert_eq!(job["status"], "pending");
    assert_eq!(job["prompt"], "a red cube");
    assert!(job.get("imageUrl").is_none());
    assert!(job.get("createdAt").is_some());
    let id = job["id"].as_str().unwrap().to_string();

    let listed: Vec<Value> = client
        .get(format!("{}/api/images", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], id.as_str());

    release
        .send(Ok(GeneratedImage::Url("http://x/a.jpg".to_string())))
        .unwrap();
    let done = poll_until_terminal(&client, &base_url, &id).await;
    assert_eq!(done["status"], "completed");
    assert_eq!(done["imageUrl"], "http://x/a.jpg");
    assert!(done.get("errorMessage").is_none());
    assert!(done.get("completedAt").is_some());

    let deleted = client
        .delete(format!("{}/api/images/{}", base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), reqwest::StatusCode::OK);
    let body: Value = deleted.json().await.unwrap();
    assert_eq!(body["message"], "Image deleted successfully");

    let missing = client
        .get(format!("{}/api/images/{}", base_url, id))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = missing.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_blank_prompt_is_bad_request() {
    let base_url = spawn_app(Arc::new(StalledGenerator)).await;
    let client = reqwest::Client::new();

    for prompt in ["", "    "] {
        let response = submit(&client, &base_url, prompt).await;
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].is_string());
    }

    let missing_prompt = client
        .post(format!("{}/api/images/generate", base_url))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing_prompt.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = missing_prompt.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));

    let not_json = client
        .post(format!("{}/api/images/generate", base_url))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body("prompt=a red cube")
        .send()
        .await
        .unwrap();
    assert_eq!(not_json.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = not_json.json().await.unwrap();
    assert!(body["error"].is_string());

    let listed: Vec<Value> = client
        .get(format!("{}/api/images", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_failed_generation_is_reported_on_the_job() {
    let base_url = spawn_app(Arc::new(RejectingGenerator)).await;
    let client = reqwest::Client::new();

    let job: Value = submit(&client, &base_url, "forbidden").await.json().await.unwrap();
    let id = job["id"].as_str().unwrap().to_string();

    let done = poll_until_terminal(&client, &base_url, &id).await;
    assert_eq!(done["status"], "failed");
    assert!(done.get("imageUrl").is_none());
    assert!(done["errorMessage"].as_str().unwrap().contains("SAFETY"));
    assert!(done.get("failedAt").is_some());
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let generator = StaticGenerator {
        delay: Duration::ZERO,
    };
    let base_url = spawn_app(Arc::new(generator)).await;
    let client = reqwest::Client::new();

    let mut ids = Vec::new();
    for prompt in ["one", "two", "three"] {
        let job: Value = submit(&client, &base_url, prompt).await.json().await.unwrap();
        ids.push(job["id"].as_str().unwrap().to_string());
    }
    for id in &ids {
        poll_until_terminal(&client, &base_url, id).await;
    }

    let completed: Vec<Value> = client
        .get(format!("{}/api/images?status=completed&limit=2", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let listed: Vec<&str> = completed.iter().map(|j| j["id"].as_str().unwrap()).collect();
    assert_eq!(listed, vec![ids[2].as_str(), ids[1].as_str()]);

    let pending: Vec<Value> = client
        .get(format!("{}/api/images?status=pending", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_unknown_and_malformed_ids() {
    let base_url = spawn_app(Arc::new(StalledGenerator)).await;
    let client = reqwest::Client::new();

    let unknown = client
        .delete(format!("{}/api/images/{}", base_url, uuid::Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = unknown.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("not found"));

    let malformed = client
        .get(format!("{}/api/images/not-a-uuid", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = malformed.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("Invalid image ID"));

    let bad_filter = client
        .get(format!("{}/api/images?status=processing", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_filter.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = bad_filter.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("Invalid query"));
}

#[tokio::test]
async fn test_health_reports_store_and_counts() {
    let base_url = spawn_app(Arc::new(StalledGenerator)).await;
    let client = reqwest::Client::new();

    submit(&client, &base_url, "queued").await;

    let response = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let health: Value = response.json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["checks"]["store"]["status"], "ok");
    assert_eq!(health["jobs"]["pending"], 1);
    assert_eq!(health["jobs"]["completed"], 0);
    assert_eq!(health["jobs"]["failed"], 0);
}
