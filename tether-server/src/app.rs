//! HTTP surface of the proxy.
//!
//! Everything outside `/__tether/` goes through the cache worker; the
//! `/__tether/` routes are the worker's message and push channels.

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tether_cache::push::PushNotification;
use tether_cache::request::is_hop_by_hop;
use tether_cache::response::SOURCE_HEADER;
use tether_cache::{CacheRequest, CacheWorker, Routed, WorkerLifecycle, WorkerMessage, WorkerReply};
use tether_core::types::Timestamp;
use tether_telemetry::metrics::render_metrics;
use tether_telemetry::spans::request_span;
use tracing::{Instrument, debug, warn};

/// Largest request body forwarded upstream.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared handler state.
pub struct AppState {
    worker: Arc<CacheWorker>,
    started_at: Instant,
    started_wall: Timestamp,
}

impl AppState {
    /// State serving `worker`.
    #[must_use]
    pub fn new(worker: Arc<CacheWorker>) -> Self {
        Self {
            worker,
            started_at: Instant::now(),
            started_wall: Timestamp::now(),
        }
    }

    /// The hosted worker.
    #[must_use]
    pub fn worker(&self) -> &Arc<CacheWorker> {
        &self.worker
    }
}

/// Builds the proxy's router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/__tether/message", post(post_message))
        .route("/__tether/push", post(post_push))
        .route("/__tether/metrics", get(get_metrics))
        .route("/__tether/health", get(get_health))
        .fallback(proxy)
        .with_state(state)
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    Json(message): Json<WorkerMessage>,
) -> Json<WorkerReply> {
    Json(state.worker.handle_message(message).await)
}

/// Push payloads are JSON when they parse, otherwise ignored.
async fn post_push(State(state): State<Arc<AppState>>, body: Bytes) -> Json<PushNotification> {
    let payload = serde_json::from_slice::<Value>(&body).ok();
    Json(state.worker.push(payload.as_ref()))
}

async fn get_metrics() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        render_metrics(),
    )
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the listener runs.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// RFC 3339 time the router was built.
    pub started_at: String,
    /// Seconds since the router was built.
    pub uptime_secs: u64,
    /// Worker lifecycle stage.
    pub worker: WorkerLifecycle,
}

async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_wall.to_datetime().to_rfc3339(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        worker: state.worker.lifecycle(),
    })
}

async fn proxy(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let span = request_span(request.method().as_str(), request.uri().path());
    async move {
        let request = match to_cache_request(request).await {
            Ok(request) => request,
            Err(status) => return status.into_response(),
        };
        let routed = state.worker.handle(&request).await;
        debug!(
            status = routed.response.status,
            source = routed.source.as_str(),
            strategy = routed.strategy.as_str(),
            "Request routed"
        );
        into_response(routed)
    }
    .instrument(span)
    .await
}

/// Converts an incoming request into a routed request.
///
/// Navigations are recognized by `Sec-Fetch-Dest: document` or, for clients
/// that do not send it, a `GET` that accepts HTML.
async fn to_cache_request(request: Request) -> Result<CacheRequest, StatusCode> {
    let (parts, body) = request.into_parts();
    let url = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), |pq| pq.as_str().to_string());

    let body = to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
        warn!(error = %e, "Rejected request body");
        StatusCode::PAYLOAD_TOO_LARGE
    })?;

    let mut cache_request = CacheRequest::new(parts.method.clone(), url).with_body(body);
    for (name, value) in &parts.headers {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            cache_request = cache_request.with_header(name.as_str(), value);
        }
    }

    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    };
    let navigation = header("sec-fetch-dest") == "document"
        || (parts.method == Method::GET && header(ACCEPT.as_str()).contains("text/html"));
    if navigation {
        cache_request = cache_request.as_document();
    }
    Ok(cache_request)
}

fn into_response(routed: Routed) -> Response {
    let status =
        StatusCode::from_u16(routed.response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = Response::new(Body::from(routed.response.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in &routed.response.headers {
        if is_hop_by_hop(name) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => debug!(header = %name, "Dropping unrepresentable header"),
        }
    }
    headers.insert(
        SOURCE_HEADER,
        HeaderValue::from_static(routed.source.as_str()),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tether_cache::{CacheConfig, CacheStore, Fetcher, HttpFetcher, MemoryCacheStore};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn app_for(upstream: &str) -> (Arc<CacheWorker>, Router) {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
        let fetcher: Arc<dyn Fetcher> =
            Arc::new(HttpFetcher::new(upstream, Duration::from_secs(5)).unwrap());
        let worker = Arc::new(CacheWorker::new(CacheConfig::default(), store, fetcher));
        worker.install().await.unwrap();
        worker.activate().await.unwrap();
        let app = router(Arc::new(AppState::new(Arc::clone(&worker))));
        (worker, app)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &Value) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_api_request_is_proxied_and_cached() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/players"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["alex", "sam"])))
            .expect(1)
            .mount(&upstream)
            .await;
        let (worker, app) = app_for(&upstream.uri()).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/players")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[SOURCE_HEADER], "network");
        assert_eq!(body_json(response).await, json!(["alex", "sam"]));

        let status = worker.cache_status().await.unwrap();
        assert!(
            status["tether-api-v1"]
                .items
                .contains(&"/api/players".to_string())
        );
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_offline_page() {
        let (_worker, app) = app_for("http://127.0.0.1:1").await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/dashboard")
                    .header("sec-fetch-dest", "document")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[SOURCE_HEADER], "offline");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("<html"));
    }

    #[tokio::test]
    async fn test_offline_api_request_gets_503() {
        let (_worker, app) = app_for("http://127.0.0.1:1").await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/server/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Offline");
        assert_eq!(body["cached"], false);
    }

    #[tokio::test]
    async fn test_queue_command_message() {
        let (worker, app) = app_for("http://127.0.0.1:1").await;

        let response = app
            .oneshot(post_json(
                "/__tether/message",
                &json!({"type": "QUEUE_COMMAND", "command": {"command": "say hi"}}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert!(body["id"].is_string());
        assert_eq!(worker.queue().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_message_is_rejected() {
        let (_worker, app) = app_for("http://127.0.0.1:1").await;

        let response = app
            .oneshot(post_json("/__tether/message", &json!({"type": "REBOOT"})))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_push_shaping() {
        let (_worker, app) = app_for("http://127.0.0.1:1").await;

        let response = app
            .clone()
            .oneshot(post_json("/__tether/push", &json!({"message": "Backup finished"})))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["title"], "tether");
        assert_eq!(body["body"], "Backup finished");

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/__tether/push")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["body"], "Server update");
    }

    #[tokio::test]
    async fn test_health_reports_worker_stage() {
        let (_worker, app) = app_for("http://127.0.0.1:1").await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/__tether/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["worker"], "activated");
        assert!(body["started_at"].as_str().unwrap().contains('T'));
    }
}
