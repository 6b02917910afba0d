//! API integration tests against the full router with a fake renderer.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

use vrender_api::{create_router, ApiConfig, AppState, SupabaseClaims};
use vrender_models::{JobId, JobStatus, RenderSpec};
use vrender_queue::{JobStore, QueueConfig};
use vrender_storage::{ArtifactLocation, MemoryArtifactStore};
use vrender_worker::{
    ClassifiedFailure, FailureCategory, JobExecutor, LogOnlyLedger, ProgressSink,
    RenderOutcome, RenderRunner, WorkerConfig,
};

const SECRET: &str = "test-jwt-secret";
const RESULT_URL: &str = "https://s3.us-east-1.amazonaws.com/renders/out/video.mp4";

/// Renderer that reports 50% and then waits for the test to release it.
struct FakeRunner {
    gate: Notify,
    outcome: Mutex<RenderOutcome>,
}

impl FakeRunner {
    fn new(outcome: RenderOutcome) -> Self {
        Self {
            gate: Notify::new(),
            outcome: Mutex::new(outcome),
        }
    }

    fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl RenderRunner for FakeRunner {
    async fn render(&self, _job_id: &JobId, _payload: &RenderSpec, progress: ProgressSink) -> RenderOutcome {
        progress(50);
        self.gate.notified().await;
        self.outcome.lock().unwrap().clone()
    }
}

struct TestApp {
    router: Router,
    executor: JobExecutor,
    runner: Arc<FakeRunner>,
    artifacts: Arc<MemoryArtifactStore>,
}

impl TestApp {
    fn new(outcome: RenderOutcome) -> Self {
        Self::with_credentials(outcome, true)
    }

    fn with_credentials(outcome: RenderOutcome, credentials: bool) -> Self {
        let config = ApiConfig {
            download_delay: Duration::ZERO,
            jwt_secret: Some(SECRET.to_string()),
            ..ApiConfig::default()
        };
        let queue_config = QueueConfig {
            rescan_delay: Duration::from_millis(10),
            ..QueueConfig::default()
        };
        let worker = WorkerConfig {
            serve_url: Some("https://example.test/site".to_string()),
            aws_access_key_id: credentials.then(|| "AKIATEST".to_string()),
            aws_secret_access_key: credentials.then(|| "secret".to_string()),
            ..WorkerConfig::default()
        };

        let runner = Arc::new(FakeRunner::new(outcome));
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let executor = JobExecutor::new(
            &queue_config,
            Arc::new(JobStore::new()),
            runner.clone(),
            Arc::new(LogOnlyLedger),
        );
        let state = AppState::new(config, queue_config, worker, executor.clone(), artifacts.clone());

        Self {
            router: create_router(state, None),
            executor,
            runner,
            artifacts,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn submit(&self, user: &str) -> JobId {
        let response = self.send(submit_request(Some(user), &render_body())).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        JobId::from(body["jobId"].as_str().unwrap())
    }

    async fn wait_for(&self, job_id: &JobId, status: JobStatus) {
        for _ in 0..200 {
            if self.executor.get(job_id).await.unwrap().status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached {}", job_id, status);
    }
}

fn token(user: &str) -> String {
    let claims = SupabaseClaims {
        sub: user.to_string(),
        email: None,
        role: Some("authenticated".to_string()),
        aud: "authenticated".to_string(),
        exp: chrono::Utc::now().timestamp() + 3600,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn render_body() -> Value {
    json!({
        "trackItems": [
            {"id": "t1", "type": "video", "display": {"from": 0, "to": 10000}, "details": {"src": "a.mp4"}}
        ],
        "overlays": [],
        "platform": {"name": "tiktok", "width": 1080, "height": 1920, "aspectRatio": "9:16", "fps": 30},
        "duration": 10000,
        "projectName": "Summer Trip"
    })
}

fn submit_request(user: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/render")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
    }
    builder.body(Body::empty()).unwrap()
}

fn cancel(job_id: &JobId, user: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/render/cancel?jobId={}", job_id))
        .header(header::AUTHORIZATION, format!("Bearer {}", token(user)))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn completed() -> RenderOutcome {
    RenderOutcome::Completed {
        result: RESULT_URL.to_string(),
        cost: Some(0.0123),
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new(completed());
    let response = app.send(get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_ready_reports_missing_credentials() {
    let app = TestApp::with_credentials(completed(), false);
    let response = app.send(get("/ready", None)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["renderer"]["status"], "error");
}

#[tokio::test]
async fn test_submit_requires_token() {
    let app = TestApp::new(completed());
    let response = app.send(submit_request(None, &render_body())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_submit_without_credentials_is_config_error() {
    let app = TestApp::with_credentials(completed(), false);
    let response = app.send(submit_request(Some("alice"), &render_body())).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["code"], "configuration_error");
    assert!(app.executor.list_for_user("alice").await.is_empty());
}

#[tokio::test]
async fn test_submit_rejects_invalid_body() {
    let app = TestApp::new(completed());
    let response = app
        .send(submit_request(Some("alice"), &json!({"trackItems": "nope"})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut body = render_body();
    body["platform"]["fps"] = json!(0);
    let response = app.send(submit_request(Some("alice"), &body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_submit_and_poll_to_completion() {
    let app = TestApp::new(completed());

    let response = app.send(submit_request(Some("alice"), &render_body())).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    let job_id = body["jobId"].as_str().unwrap().to_string();
    assert_eq!(body["status"], "pending");
    assert_eq!(body["pollUrl"], format!("/api/render/status?jobId={}", job_id));
    assert_eq!(body["downloadUrl"], format!("/api/render/download?jobId={}", job_id));

    let job_id = JobId::from(job_id);
    app.wait_for(&job_id, JobStatus::Processing).await;
    app.runner.release();
    app.wait_for(&job_id, JobStatus::Completed).await;

    // Status is readable without credentials.
    let response = app
        .send(get(&format!("/api/render/status?jobId={}", job_id), None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["progress"], 100);
    assert_eq!(body["result"], RESULT_URL);
    assert_eq!(body["cost"], 0.0123);
    assert_eq!(body["cancelled"], false);
    assert!(body["completedAt"].is_string());
}

#[tokio::test]
async fn test_status_errors() {
    let app = TestApp::new(completed());

    let response = app.send(get("/api/render/status?jobId=missing", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.send(get("/api/render/status", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_rejects_non_owner_before_status() {
    let app = TestApp::new(completed());
    let job_id = app.submit("alice").await;

    let response = app
        .send(get(&format!("/api/render/download?jobId={}", job_id), Some("mallory")))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.runner.release();
    app.wait_for(&job_id, JobStatus::Completed).await;

    let response = app
        .send(get(&format!("/api/render/download?jobId={}", job_id), Some("mallory")))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_download_while_running_is_retryable() {
    let app = TestApp::new(completed());
    let job_id = app.submit("alice").await;
    app.wait_for(&job_id, JobStatus::Processing).await;

    let response = app
        .send(get(&format!("/api/render/download?jobId={}", job_id), Some("alice")))
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["status"], "processing");
    assert_eq!(body["retryable"], true);

    app.runner.release();
}

#[tokio::test]
async fn test_download_completed_video() {
    let app = TestApp::new(completed());
    app.artifacts
        .put(&ArtifactLocation::parse(RESULT_URL).unwrap(), b"mp4-bytes".to_vec())
        .await;

    let job_id = app.submit("alice").await;
    app.runner.release();
    app.wait_for(&job_id, JobStatus::Completed).await;

    let response = app
        .send(get(&format!("/api/render/download?jobId={}", job_id), Some("alice")))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"Summer-Trip-{}.mp4\"", job_id).as_str()
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"mp4-bytes");
}

#[tokio::test]
async fn test_download_missing_artifact_is_not_found() {
    let app = TestApp::new(completed());
    let job_id = app.submit("alice").await;
    app.runner.release();
    app.wait_for(&job_id, JobStatus::Completed).await;

    let response = app
        .send(get(&format!("/api/render/download?jobId={}", job_id), Some("alice")))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_failed_render_returns_message() {
    let failure = ClassifiedFailure::new(
        FailureCategory::AccessDenied,
        "AWS Access Denied: User is not authorized",
    );
    let app = TestApp::new(RenderOutcome::Failed(failure));
    let job_id = app.submit("alice").await;
    app.runner.release();
    app.wait_for(&job_id, JobStatus::Failed).await;

    let response = app
        .send(get(&format!("/api/render/download?jobId={}", job_id), Some("alice")))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["detail"], "AWS Access Denied: User is not authorized");
}

#[tokio::test]
async fn test_cancel_flow() {
    let app = TestApp::new(completed());
    let job_id = app.submit("alice").await;
    app.wait_for(&job_id, JobStatus::Processing).await;

    let response = app.send(cancel(&job_id, "mallory")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.send(cancel(&job_id, "alice")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["cancelled"], true);

    // Idempotent.
    let response = app.send(cancel(&job_id, "alice")).await;
    assert_eq!(response.status(), StatusCode::OK);

    // The render finishing afterwards does not resurrect the job.
    app.runner.release();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(app.executor.get(&job_id).await.unwrap().status, JobStatus::Cancelled);

    let response = app
        .send(get(&format!("/api/render/download?jobId={}", job_id), Some("alice")))
        .await;
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_cancel_via_delete_and_conflict_on_finished() {
    let app = TestApp::new(completed());
    let job_id = app.submit("alice").await;
    app.runner.release();
    app.wait_for(&job_id, JobStatus::Completed).await;

    let response = app
        .send(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/render?jobId={}", job_id))
                .header(header::AUTHORIZATION, format!("Bearer {}", token("alice")))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.send(cancel(&JobId::from("missing"), "alice")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_jobs_and_queue_listing() {
    let app = TestApp::new(completed());
    let first = app.submit("alice").await;
    let second = app.submit("alice").await;
    let third = app.submit("alice").await;
    app.submit("bob").await;

    let response = app.send(get("/api/render/jobs", Some("alice"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let ids: Vec<&str> = body["jobs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.contains(&first.as_str()));
    assert!(ids.contains(&second.as_str()));

    // Two of alice's jobs run, the third waits its turn.
    let response = app.send(get("/api/render/queue", Some("alice"))).await;
    let body = json_body(response).await;
    assert_eq!(body["pending"], 1);
    assert_eq!(body["active"], 3);
    assert_eq!(body["maxPerUser"], 2);
    assert_eq!(body["yourJobs"][0]["jobId"], third.as_str());
    assert_eq!(body["yourJobs"][0]["position"], 0);

    let response = app.send(get("/api/render/queue", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    for _ in 0..4 {
        app.runner.release();
    }
}
