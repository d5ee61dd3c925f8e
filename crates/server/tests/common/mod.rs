//! Common test utilities for API testing with mocks.
//!
//! Builds an in-process server over a temporary database with mock
//! collaborators, so the full job lifecycle runs without yt-dlp, whisper,
//! an LLM or a recipe manager.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use social_recipes_core::testing::MockCollaborators;
use social_recipes_core::{
    Config, ConfirmationConfig, ConfirmationGate, ExtractionPipeline, HistoryStore, JobStore,
    PendingUploadStore, PipelineBody, PipelineConfig, ProgressPublisher, RecoveryReport,
    RuntimeSettings, Scheduler, SchedulerConfig, SettingsService, SqliteHistoryStore,
    SqliteJobStore, SqlitePendingUploadStore, SqliteSettingsStore,
};

/// Re-export fixtures for test convenience
pub use social_recipes_core::testing::fixtures;

/// In-process server with controllable mocks.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_submit() {
///     let fixture = TestFixture::new().await;
///     let response = fixture.post("/api/v1/jobs", json!({"url": "https://example.com/v/1"})).await;
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    pub router: Router,
    pub mocks: MockCollaborators,
    pub scheduler: Arc<Scheduler>,
    pub gate: Arc<ConfirmationGate>,
    /// Temporary directory for the database and pipeline caches
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    /// Raw body, for non-JSON responses
    pub text: String,
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub max_concurrent_jobs: usize,
    pub confirmation_enabled: bool,
    pub confirmation_timeout_secs: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            confirmation_enabled: false,
            confirmation_timeout_secs: 300,
        }
    }
}

impl TestConfig {
    /// Park every job at the confirmation gate.
    pub fn with_confirmation() -> Self {
        Self {
            confirmation_enabled: true,
            ..Self::default()
        }
    }
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config = Config::default();
        config.database.path = db_path.clone();
        config.scheduler = SchedulerConfig {
            max_concurrent_jobs: test_config.max_concurrent_jobs,
        };
        config.confirmation = ConfirmationConfig {
            enabled: test_config.confirmation_enabled,
            timeout_secs: test_config.confirmation_timeout_secs,
            poll_interval_ms: 50,
        };
        config.pipeline = PipelineConfig {
            work_dir: temp_dir.path().join("work"),
            ..PipelineConfig::default()
        };

        let jobs: Arc<dyn JobStore> =
            Arc::new(SqliteJobStore::new(&db_path).expect("Failed to create job store"));
        let history: Arc<dyn HistoryStore> =
            Arc::new(SqliteHistoryStore::new(&db_path).expect("Failed to create history store"));
        let uploads: Arc<dyn PendingUploadStore> = Arc::new(
            SqlitePendingUploadStore::new(&db_path).expect("Failed to create upload store"),
        );

        let publisher = Arc::new(ProgressPublisher::new(jobs, Arc::clone(&history)));
        let scheduler = Arc::new(Scheduler::new(config.scheduler.clone(), Arc::clone(&publisher)));
        let gate = Arc::new(
            ConfirmationGate::new(config.confirmation.clone(), uploads)
                .with_job_store(Arc::clone(publisher.jobs())),
        );

        let settings = Arc::new(SettingsService::new(
            Arc::new(SqliteSettingsStore::new(&db_path).expect("Failed to create settings store")),
            RuntimeSettings {
                confirm_before_upload: config.confirmation.enabled,
                language: config.pipeline.language.clone(),
                output_targets: config.export.targets.clone(),
            },
        ));

        let mocks = MockCollaborators::new();
        let pipeline: Arc<dyn PipelineBody> = Arc::new(
            ExtractionPipeline::new(
                config.pipeline.clone(),
                mocks.collaborators(),
                publisher,
                Arc::clone(&gate),
            )
            .with_settings(Arc::clone(&settings)),
        );

        let state = Arc::new(social_recipes_server::state::AppState::new(
            config,
            Arc::clone(&scheduler),
            history,
            Arc::clone(&gate),
            pipeline,
            settings,
            RecoveryReport::default(),
        ));
        let router = social_recipes_server::api::create_router(state);

        Self {
            router,
            mocks,
            scheduler,
            gate,
            temp_dir,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// POST without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Submit a job and return its id.
    pub async fn submit(&self, url: &str) -> String {
        let response = self
            .post("/api/v1/jobs", serde_json::json!({ "url": url }))
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.body["id"]
            .as_str()
            .expect("job id")
            .to_string()
    }

    /// Poll a job until `predicate` holds, or panic after five seconds.
    pub async fn wait_for_job(&self, job_id: &str, predicate: impl Fn(&Value) -> bool) -> Value {
        let path = format!("/api/v1/jobs/{}", job_id);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let response = self.get(&path).await;
            if response.status == StatusCode::OK && predicate(&response.body) {
                return response.body;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("Timed out waiting for job {}: {}", job_id, response.body);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Poll a job until it has the given status.
    pub async fn wait_for_status(&self, job_id: &str, status: &str) -> Value {
        self.wait_for_job(job_id, |job| job["status"] == status).await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
