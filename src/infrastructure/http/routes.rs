//! HTTP Routes
//!
//! API Endpoints:
//! - /tts/generate            POST  提交合成请求（202 入队 / 200 已完成）
//! - /tts/jobs/:id            GET   查询 job 状态
//! - /tts/jobs/:id/cancel     POST  取消 job
//! - /tts/jobs/:id/events     WS    job 状态推送
//! - /tts/voices              GET   音色目录
//! - /tts/health              GET   健康快照（200 / 503）
//! - /tts/admin/stats         GET   管理统计（Bearer token，未配置 token 时不注册）
//! - /tts/audio/*key          GET   签名 URL 目标
//! - /ping                    GET   存活探测

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::middleware::require_admin;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/ping", get(handlers::ping))
        .nest("/tts", tts_routes(state))
}

fn tts_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    let router = Router::new()
        .route("/generate", post(handlers::generate))
        .nest("/jobs", job_routes())
        .route("/voices", get(handlers::list_voices))
        .route("/health", get(handlers::health))
        .route("/audio/*key", get(handlers::get_audio));

    if state.admin_enabled() {
        router.nest("/admin", admin_routes(state))
    } else {
        router
    }
}

fn job_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:job_id", get(handlers::get_job))
        .route("/:job_id/cancel", post(handlers::cancel_job))
        .route("/:job_id/events", get(handlers::job_events))
}

fn admin_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(handlers::admin_stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    use crate::application::{HealthAggregator, SubmissionConfig};
    use crate::domain::provider::{ProviderDescriptor, ProviderKind};
    use crate::infrastructure::http::server::build_router;
    use crate::infrastructure::http::state::{AppComponents, AppState};
    use crate::test_support::{test_harness, Harness, ScriptedProvider, TEST_PUBLIC_BASE_URL};

    async fn harness() -> Harness {
        test_harness(vec![(
            ProviderDescriptor::new("a", ProviderKind::Http),
            Arc::new(ScriptedProvider::always_ok().with_voices("a", &["v1", "v2"])),
        )])
        .await
    }

    fn app(harness: &Harness, submission: SubmissionConfig, admin_token: Option<&str>) -> Router {
        let state = AppState::new(AppComponents {
            submission,
            job_repo: harness.job_repo.clone(),
            idempotency: harness.idempotency.clone(),
            queue: harness.queue.clone(),
            object_store: harness.object_store.clone(),
            executor: harness.executor.clone(),
            health: HealthAggregator::new(
                harness.registry.clone(),
                harness.queue.clone(),
                harness.job_repo.clone(),
                harness.stats.clone(),
            ),
            event_publisher: harness.events.clone(),
            admin_token: admin_token.map(str::to_string),
        });
        build_router(Arc::new(state))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, bytes) = send(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_ping() {
        let harness = harness().await;
        let app = app(&harness, SubmissionConfig::default(), None);

        let (status, body) = send_json(&app, get("/ping")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_generate_queues_and_job_is_visible() {
        let harness = harness().await;
        let app = app(&harness, SubmissionConfig::default(), None);

        let (status, body) =
            send_json(&app, post_json("/tts/generate", r#"{"text":"Hello world"}"#)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "queued");
        let job_id = body["jobId"].as_str().unwrap().to_string();

        let (status, job) = send_json(&app, get(&format!("/tts/jobs/{}", job_id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job["jobId"], job_id.as_str());
        assert_eq!(job["status"], "queued");
        assert_eq!(job["attempts"], serde_json::json!([]));
        assert!(job.get("resultUrl").is_none());
        assert!(job["createdAt"].is_string());
    }

    #[tokio::test]
    async fn test_validation_errors_return_400_without_enqueue() {
        let harness = harness().await;
        let app = app(&harness, SubmissionConfig::default(), None);

        let (status, body) =
            send_json(&app, post_json("/tts/generate", r#"{"text":"  <br/> "}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errno"], 400);
        assert_eq!(body["reason"], "empty_text");

        let (status, body) = send_json(
            &app,
            post_json("/tts/generate", r#"{"text":"hi","provider":"nope"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "unknown_provider");

        let (status, body) = send_json(
            &app,
            post_json("/tts/generate", r#"{"text":"hi","voiceOptions":{"speed":9}}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "option_out_of_range");

        let (status, body) = send_json(&app, post_json("/tts/generate", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "invalid_body");

        assert_eq!(harness.queue.snapshot().await.unwrap().waiting, 0);
    }

    #[tokio::test]
    async fn test_inline_completion_and_signed_audio() {
        let harness = harness().await;
        let app = app(
            &harness,
            SubmissionConfig {
                inline_max_chars: 100,
                ..Default::default()
            },
            None,
        );

        let (status, body) =
            send_json(&app, post_json("/tts/generate", r#"{"text":"Hello world"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["provider"], "a");
        assert_eq!(body["duration"], 1200);

        let url = body["resultUrl"].as_str().unwrap();
        let path = url.strip_prefix(TEST_PUBLIC_BASE_URL).unwrap();
        let (status, audio) = send(&app, get(path)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(audio, b"RIFF fake audio");

        let tampered = path.replace("signature=", "signature=00");
        let (status, body) = send_json(&app, get(&tampered)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["reason"], "invalid_signature");
    }

    #[tokio::test]
    async fn test_audio_requires_query() {
        let harness = harness().await;
        let app = app(&harness, SubmissionConfig::default(), None);

        let (status, body) = send_json(&app, get("/tts/audio/2026/01/01/x.wav")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "invalid_query");
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let harness = harness().await;
        let app = app(&harness, SubmissionConfig::default(), None);

        let (status, body) = send_json(&app, get("/tts/jobs/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errno"], 404);
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_cancel_queued_then_conflict() {
        let harness = harness().await;
        let app = app(&harness, SubmissionConfig::default(), None);

        let (_, body) =
            send_json(&app, post_json("/tts/generate", r#"{"text":"Hello world"}"#)).await;
        let job_id = body["jobId"].as_str().unwrap().to_string();
        let cancel_uri = format!("/tts/jobs/{}/cancel", job_id);

        let (status, body) = send_json(&app, post_json(&cancel_uri, "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "failed");
        assert_eq!(body["cancelRequested"], true);
        assert_eq!(harness.queue.snapshot().await.unwrap().waiting, 0);

        let (status, _) = send_json(&app, post_json(&cancel_uri, "")).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_health_reflects_circuit_state() {
        let harness = harness().await;
        let app = app(&harness, SubmissionConfig::default(), None);

        let (status, body) = send_json(&app, get("/tts/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["healthy"], true);

        for _ in 0..5 {
            harness.registry.breakers().record_failure("a");
        }
        let (status, body) = send_json(&app, get("/tts/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["healthy"], false);
    }

    #[tokio::test]
    async fn test_admin_stats_requires_token() {
        let harness = harness().await;

        let disabled = app(&harness, SubmissionConfig::default(), None);
        let (status, _) = send(&disabled, get("/tts/admin/stats")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let app = app(&harness, SubmissionConfig::default(), Some("s3cret"));
        let (status, body) = send_json(&app, get("/tts/admin/stats")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["errno"], 401);

        let wrong = Request::builder()
            .uri("/tts/admin/stats")
            .header(header::AUTHORIZATION, "Bearer nope")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, wrong).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let authorized = Request::builder()
            .uri("/tts/admin/stats")
            .header(header::AUTHORIZATION, "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send_json(&app, authorized).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["jobs"].is_object());
        assert!(body["health"]["healthy"].is_boolean());
    }

    #[tokio::test]
    async fn test_list_voices() {
        let harness = harness().await;
        let app = app(&harness, SubmissionConfig::default(), None);

        let (status, body) = send_json(&app, get("/tts/voices")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["voices"].as_array().unwrap().len(), 2);

        let (status, body) = send_json(&app, get("/tts/voices?provider=zzz")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "unknown_provider");
    }
}
