//! convoy-api — REST API for Convoy.
//!
//! Desired state enters the system here; the controller never reads
//! anything but the snapshot store.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/apply` | Apply a `kind: Service` manifest (YAML, or JSON `{ "yaml": ... }`) |
//! | GET | `/state` | The whole cluster snapshot |
//! | POST | `/scale?service=&delta=` | Adjust desired replicas |
//! | POST | `/load?service=&cpu=` | Set simulated CPU (0-100) |
//! | POST | `/chaos/kill?service=&count=` | Kill running pods |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/healthz` | Daemon liveness |
//!
//! POST routes require `X-API-Key` when a key is configured.

pub mod error;
pub mod handlers;
pub mod manifest;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;

use convoy_runtime::PodRuntime;
use convoy_state::{Clock, StateStore};

pub use error::{ApiError, ApiResult};
pub use manifest::{ManifestError, parse_manifest};

/// Header carrying the API key on mutating requests.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub runtime: Arc<dyn PodRuntime>,
    pub clock: Arc<dyn Clock>,
    /// When set, mutating routes require a matching `X-API-Key`.
    pub api_key: Option<String>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let mutating = Router::new()
        .route("/apply", post(handlers::apply))
        .route("/scale", post(handlers::scale))
        .route("/load", post(handlers::set_load))
        .route("/chaos/kill", post(handlers::chaos_kill))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/state", get(handlers::get_state))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/healthz", get(handlers::healthz))
        .merge(mutating)
        .with_state(state)
}

async fn require_api_key(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.api_key.as_deref().filter(|k| !k.is_empty()) {
        let given = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if given != Some(expected) {
            tracing::warn!(path = %request.uri().path(), "rejected request without valid API key");
            return Err(ApiError::Unauthorized);
        }
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{self, StatusCode};
    use convoy_runtime::SimulatedRuntime;
    use convoy_state::ManualClock;
    use tower::ServiceExt;

    fn router(api_key: Option<&str>) -> Router {
        let clock = Arc::new(ManualClock::new(1_000));
        build_router(ApiState {
            store: StateStore::open_in_memory().unwrap(),
            runtime: Arc::new(SimulatedRuntime::new(clock.clone())),
            clock,
            api_key: api_key.map(str::to_string),
        })
    }

    fn apply_request(key: Option<&str>) -> http::Request<Body> {
        let mut builder = http::Request::builder()
            .method("POST")
            .uri("/apply")
            .header("content-type", "application/yaml");
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        builder
            .body(Body::from("kind: Service\nmetadata:\n  name: api\n"))
            .unwrap()
    }

    #[tokio::test]
    async fn mutations_require_key_when_configured() {
        let app = router(Some("s3cret"));

        let resp = app.clone().oneshot(apply_request(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app.clone().oneshot(apply_request(Some("wrong"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app.oneshot(apply_request(Some("s3cret"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn reads_do_not_need_key() {
        let app = router(Some("s3cret"));
        let req = http::Request::builder().uri("/state").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn open_when_no_key() {
        let app = router(None);
        let resp = app.oneshot(apply_request(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
