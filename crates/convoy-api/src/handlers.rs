//! REST API handlers.
//!
//! Mutations go through the store's writer gate so they never interleave
//! with a reconcile pass.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::{info, warn};

use convoy_state::{Clock, Event};

use crate::ApiState;
use crate::error::{ApiError, ApiResult};
use crate::manifest::parse_manifest;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    data: T,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

// ── Apply ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ApplyBody {
    yaml: String,
}

/// Raw YAML, or a JSON envelope `{ "yaml": "..." }`.
fn manifest_text(headers: &HeaderMap, body: &Bytes) -> ApiResult<String> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    if is_json {
        let envelope: ApplyBody = serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))?;
        Ok(envelope.yaml)
    } else {
        String::from_utf8(body.to_vec())
            .map_err(|_| ApiError::BadRequest("manifest is not valid UTF-8".into()))
    }
}

/// POST /apply
pub async fn apply(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let service = parse_manifest(&manifest_text(&headers, &body)?)?;
    let now = state.clock.now_ms();

    let applied = state
        .store
        .update(|snap| {
            snap.push_event(
                Event::info(
                    now,
                    format!(
                        "Applied Desired replicas={}, digest={}",
                        service.replicas, service.digest
                    ),
                )
                .service(&service.name)
                .explain("Desired state updated — controller will reconcile."),
            );
            snap.services.insert(service.name.clone(), service.clone());
            Ok::<_, ApiError>(service)
        })
        .await?;

    info!(
        service = %applied.name,
        replicas = applied.replicas,
        digest = %applied.digest,
        "service applied"
    );
    Ok(ApiResponse::ok(applied))
}

// ── State ─────────────────────────────────────────────────────────

/// GET /state
pub async fn get_state(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.load()?))
}

// ── Scaling and load ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ScaleParams {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub delta: i64,
}

/// POST /scale?service=&delta=
pub async fn scale(
    State(state): State<ApiState>,
    Query(params): Query<ScaleParams>,
) -> ApiResult<impl IntoResponse> {
    let now = state.clock.now_ms();
    let replicas = state
        .store
        .update(|snap| {
            let svc = snap
                .services
                .get_mut(&params.service)
                .ok_or_else(|| ApiError::ServiceNotFound(params.service.clone()))?;
            let after = i64::from(svc.replicas)
                .saturating_add(params.delta)
                .clamp(0, i64::from(u32::MAX)) as u32;
            svc.replicas = after;

            snap.push_event(
                Event::info(now, format!("Manual scale {:+} → {after}", params.delta))
                    .service(&params.service)
                    .explain("User-requested change to Desired replicas."),
            );
            Ok::<_, ApiError>(after)
        })
        .await?;

    info!(service = %params.service, delta = params.delta, replicas, "manual scale");
    Ok(ApiResponse::ok(serde_json::json!({ "replicas": replicas })))
}

#[derive(Debug, Deserialize)]
pub struct LoadParams {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub cpu: i64,
}

/// POST /load?service=&cpu=
pub async fn set_load(
    State(state): State<ApiState>,
    Query(params): Query<LoadParams>,
) -> ApiResult<impl IntoResponse> {
    let now = state.clock.now_ms();
    let cpu = params.cpu.clamp(0, 100) as u32;

    state
        .store
        .update(|snap| {
            let svc = snap
                .services
                .get_mut(&params.service)
                .ok_or_else(|| ApiError::ServiceNotFound(params.service.clone()))?;
            svc.cpu = cpu;

            snap.push_event(
                Event::info(now, format!("Load set to {cpu}%"))
                    .service(&params.service)
                    .explain("Autoscaler will react if above/below target."),
            );
            Ok::<_, ApiError>(())
        })
        .await?;

    Ok(ApiResponse::ok(serde_json::json!({ "cpu": cpu })))
}

// ── Chaos ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChaosParams {
    #[serde(default)]
    pub service: String,
    #[serde(default = "default_chaos_count")]
    pub count: usize,
}

fn default_chaos_count() -> usize {
    1
}

/// POST /chaos/kill?service=&count=
///
/// Kills up to `count` running pods of the service. The controller sees
/// the shortfall on its next pass and respawns.
pub async fn chaos_kill(
    State(state): State<ApiState>,
    Query(params): Query<ChaosParams>,
) -> ApiResult<impl IntoResponse> {
    let _guard = state.store.writer().await;
    let mut snap = state.store.load()?;
    if !snap.services.contains_key(&params.service) {
        return Err(ApiError::ServiceNotFound(params.service));
    }

    let victims: Vec<String> = snap
        .pods_for(&params.service)
        .filter(|p| p.is_running())
        .map(|p| p.id.clone())
        .take(params.count)
        .collect();

    let now = state.clock.now_ms();
    let mut killed = Vec::with_capacity(victims.len());
    for id in victims {
        if let Err(e) = state.runtime.kill(&id).await {
            warn!(service = %params.service, pod = %id, error = %e, "chaos kill failed");
            continue;
        }
        snap.remove_pod(&id);
        snap.push_event(
            Event::warn(now, "Chaos kill")
                .service(&params.service)
                .pod(&id)
                .explain("Intentional failure to showcase self-healing."),
        );
        killed.push(id);
    }

    if !killed.is_empty() {
        state.store.save(&mut snap)?;
    }
    warn!(service = %params.service, killed = killed.len(), "chaos kill");
    Ok(ApiResponse::ok(serde_json::json!({ "killed": killed })))
}

// ── Observability ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let body = convoy_metrics::render_prometheus(&state.store.load()?);
    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    ))
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::response::Response;
    use convoy_runtime::{PodRuntime, SimulatedRuntime, SpawnRequest};
    use convoy_state::{ClusterSnapshot, EventLevel, ManualClock, Pod, Service, StateStore};

    fn test_state() -> (ApiState, Arc<SimulatedRuntime>) {
        let clock = ManualClock::new(50_000);
        let runtime = Arc::new(SimulatedRuntime::new(Arc::new(clock.clone())));
        let state = ApiState {
            store: StateStore::open_in_memory().unwrap(),
            runtime: runtime.clone(),
            clock: Arc::new(clock),
            api_key: None,
        };
        (state, runtime)
    }

    fn seed(state: &ApiState, snapshot: &mut ClusterSnapshot) {
        state.store.save(snapshot).unwrap();
    }

    fn yaml_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/yaml".parse().unwrap());
        headers
    }

    fn status_of(resp: ApiResult<impl IntoResponse>) -> StatusCode {
        let resp: Response = match resp {
            Ok(r) => r.into_response(),
            Err(e) => e.into_response(),
        };
        resp.status()
    }

    #[tokio::test]
    async fn apply_stores_service_and_event() {
        let (state, _) = test_state();
        let body = Bytes::from("kind: Service\nmetadata:\n  name: api\nspec:\n  replicas: 3\n  image: r@v2\n");

        let status = status_of(apply(State(state.clone()), yaml_headers(), body).await);
        assert_eq!(status, StatusCode::OK);

        let snap = state.store.load().unwrap();
        assert_eq!(snap.services["api"].replicas, 3);
        assert_eq!(snap.services["api"].digest, "v2");
        let event = snap.events.last().unwrap();
        assert_eq!(event.level, EventLevel::Info);
        assert_eq!(event.message, "Applied Desired replicas=3, digest=v2");
        assert_eq!(event.service.as_deref(), Some("api"));
    }

    #[tokio::test]
    async fn apply_accepts_json_envelope() {
        let (state, _) = test_state();
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let body = Bytes::from(
            serde_json::json!({ "yaml": "kind: Service\nmetadata:\n  name: web\n" }).to_string(),
        );

        let status = status_of(apply(State(state.clone()), headers, body).await);
        assert_eq!(status, StatusCode::OK);
        assert!(state.store.load().unwrap().services.contains_key("web"));
    }

    #[tokio::test]
    async fn apply_resets_cpu() {
        let (state, _) = test_state();
        let mut snap = ClusterSnapshot::default();
        let mut svc = Service::new("api", 1, "v1");
        svc.cpu = 90;
        snap.services.insert("api".into(), svc);
        seed(&state, &mut snap);

        let body = Bytes::from("kind: Service\nmetadata:\n  name: api\n");
        apply(State(state.clone()), yaml_headers(), body).await.unwrap();
        assert_eq!(state.store.load().unwrap().services["api"].cpu, 0);
    }

    #[tokio::test]
    async fn apply_rejects_invalid_manifest() {
        let (state, _) = test_state();
        let body = Bytes::from("kind: Pod\nmetadata:\n  name: api\n");
        let status = status_of(apply(State(state.clone()), yaml_headers(), body).await);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(state.store.load().unwrap().services.is_empty());
    }

    #[tokio::test]
    async fn scale_clamps_at_zero() {
        let (state, _) = test_state();
        let mut snap = ClusterSnapshot::default();
        snap.services.insert("api".into(), Service::new("api", 2, "v1"));
        seed(&state, &mut snap);

        let params = ScaleParams {
            service: "api".into(),
            delta: -5,
        };
        scale(State(state.clone()), Query(params)).await.unwrap();

        let snap = state.store.load().unwrap();
        assert_eq!(snap.services["api"].replicas, 0);
        assert_eq!(snap.events.last().unwrap().message, "Manual scale -5 → 0");
    }

    #[tokio::test]
    async fn scale_saturates_on_huge_delta() {
        let (state, _) = test_state();
        let mut snap = ClusterSnapshot::default();
        snap.services.insert("api".into(), Service::new("api", 2, "v1"));
        seed(&state, &mut snap);

        let params = ScaleParams {
            service: "api".into(),
            delta: i64::MAX,
        };
        scale(State(state.clone()), Query(params)).await.unwrap();
        assert_eq!(state.store.load().unwrap().services["api"].replicas, u32::MAX);

        let params = ScaleParams {
            service: "api".into(),
            delta: i64::MIN,
        };
        scale(State(state.clone()), Query(params)).await.unwrap();
        assert_eq!(state.store.load().unwrap().services["api"].replicas, 0);
    }

    #[tokio::test]
    async fn scale_unknown_service_is_404() {
        let (state, _) = test_state();
        let params = ScaleParams {
            service: "ghost".into(),
            delta: 1,
        };
        let status = status_of(scale(State(state), Query(params)).await);
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn load_is_clamped() {
        let (state, _) = test_state();
        let mut snap = ClusterSnapshot::default();
        snap.services.insert("api".into(), Service::new("api", 1, "v1"));
        seed(&state, &mut snap);

        let params = LoadParams {
            service: "api".into(),
            cpu: 250,
        };
        set_load(State(state.clone()), Query(params)).await.unwrap();
        assert_eq!(state.store.load().unwrap().services["api"].cpu, 100);
    }

    #[tokio::test]
    async fn chaos_kills_running_pods() {
        let (state, runtime) = test_state();
        let mut snap = ClusterSnapshot::default();
        snap.services.insert("api".into(), Service::new("api", 3, "v1"));
        for _ in 0..3 {
            let spawned = runtime
                .spawn(&SpawnRequest {
                    service: "api".into(),
                    digest: "v1".into(),
                    env: vec![],
                })
                .await
                .unwrap();
            snap.pods.insert(
                spawned.id.clone(),
                Pod::new(spawned.id, "api", spawned.port, "v1", 50_000),
            );
        }
        seed(&state, &mut snap);

        let params = ChaosParams {
            service: "api".into(),
            count: 2,
        };
        chaos_kill(State(state.clone()), Query(params)).await.unwrap();

        let snap = state.store.load().unwrap();
        assert_eq!(snap.active_count("api"), 1);
        let warns = snap
            .events
            .iter()
            .filter(|e| e.level == EventLevel::Warn && e.message == "Chaos kill")
            .count();
        assert_eq!(warns, 2);
        // Killed pods drain in the runtime rather than vanish.
        assert_eq!(runtime.pod_count(), 3);
    }

    #[tokio::test]
    async fn chaos_unknown_service_is_404() {
        let (state, _) = test_state();
        let params = ChaosParams {
            service: "ghost".into(),
            count: 1,
        };
        let status = status_of(chaos_kill(State(state), Query(params)).await);
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_text() {
        let (state, _) = test_state();
        let resp = prometheus_metrics(State(state)).await.unwrap().into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.contains("text/plain"));
    }
}
