//! HTTP client for a remote pod agent.
//!
//! The agent exposes `POST /spawn`, `POST /kill`, and `GET /probe?port=`.
//! Mutating calls carry an optional `X-API-Key` header.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::contract::{PodRuntime, ProbeOutcome, SpawnRequest, SpawnedPod};
use crate::error::{RuntimeError, RuntimeResult};

/// Pod runtime that talks to an agent over HTTP.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AgentClient {
    /// Build a client for the agent at `base_url` (e.g. `http://agent:8070`).
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> RuntimeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("convoy-controller/0.1")
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.http.post(format!("{}{path}", self.base_url));
        match &self.api_key {
            Some(key) => req.header("X-API-Key", key),
            None => req,
        }
    }
}

#[async_trait]
impl PodRuntime for AgentClient {
    async fn spawn(&self, request: &SpawnRequest) -> RuntimeResult<SpawnedPod> {
        let resp = self.post("/spawn").json(request).send().await?;
        if !resp.status().is_success() {
            return Err(RuntimeError::Status {
                op: "spawn",
                status: resp.status().as_u16(),
            });
        }
        let pod: SpawnedPod = resp.json().await?;
        debug!(service = %request.service, pod = %pod.id, port = pod.port, "agent spawned pod");
        Ok(pod)
    }

    async fn kill(&self, pod_id: &str) -> RuntimeResult<()> {
        let resp = self
            .post("/kill")
            .json(&serde_json::json!({ "podId": pod_id }))
            .send()
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!(pod = %pod_id, "agent does not know pod, treating kill as done");
                Ok(())
            }
            s => Err(RuntimeError::Status {
                op: "kill",
                status: s.as_u16(),
            }),
        }
    }

    async fn probe(&self, port: u16) -> RuntimeResult<ProbeOutcome> {
        let resp = self
            .http
            .get(format!("{}/probe", self.base_url))
            .query(&[("port", port)])
            .send()
            .await?;
        Ok(ProbeOutcome::from_status(resp.status().as_u16()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use convoy_state::EnvVar;

    #[derive(Clone, Default)]
    struct Seen {
        keys: Arc<Mutex<Vec<Option<String>>>>,
        killed: Arc<Mutex<Vec<String>>>,
    }

    async fn spawn_agent(seen: Seen) -> String {
        let app = Router::new()
            .route(
                "/spawn",
                post(
                    |State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                        let key = headers
                            .get("x-api-key")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        seen.keys.lock().unwrap().push(key);
                        assert_eq!(body["env"][0]["name"], "HEALTHY");
                        Json(serde_json::json!({ "id": "pod-abc", "pid": 0, "port": 10001 }))
                    },
                ),
            )
            .route(
                "/kill",
                post(|State(seen): State<Seen>, Json(body): Json<serde_json::Value>| async move {
                    let id = body["podId"].as_str().unwrap_or_default().to_string();
                    if id == "pod-gone" {
                        return AxumStatus::NOT_FOUND;
                    }
                    seen.killed.lock().unwrap().push(id);
                    AxumStatus::OK
                }),
            )
            .route(
                "/probe",
                get(|Query(q): Query<std::collections::HashMap<String, u16>>| async move {
                    match q.get("port").copied() {
                        Some(10001) => AxumStatus::OK,
                        Some(10002) => AxumStatus::SERVICE_UNAVAILABLE,
                        Some(10003) => AxumStatus::INTERNAL_SERVER_ERROR,
                        _ => AxumStatus::NOT_FOUND,
                    }
                }),
            )
            .with_state(seen);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn spawn_sends_key_and_parses_pod() {
        let seen = Seen::default();
        let url = spawn_agent(seen.clone()).await;
        let client =
            AgentClient::new(url, Some("secret".into()), Duration::from_secs(2)).unwrap();

        let pod = client
            .spawn(&SpawnRequest {
                service: "api".into(),
                digest: "d1".into(),
                env: vec![EnvVar::new("HEALTHY", "1")],
            })
            .await
            .unwrap();

        assert_eq!(pod, SpawnedPod { id: "pod-abc".into(), port: 10001 });
        assert_eq!(seen.keys.lock().unwrap()[0].as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn kill_treats_unknown_pod_as_done() {
        let seen = Seen::default();
        let url = spawn_agent(seen.clone()).await;
        let client = AgentClient::new(url, None, Duration::from_secs(2)).unwrap();

        client.kill("pod-1").await.unwrap();
        client.kill("pod-gone").await.unwrap();
        assert_eq!(seen.killed.lock().unwrap().as_slice(), ["pod-1".to_string()]);
    }

    #[tokio::test]
    async fn probe_maps_statuses() {
        let url = spawn_agent(Seen::default()).await;
        let client = AgentClient::new(url, None, Duration::from_secs(2)).unwrap();

        assert_eq!(client.probe(10001).await.unwrap(), ProbeOutcome::Ready);
        assert_eq!(client.probe(10002).await.unwrap(), ProbeOutcome::NotReady);
        assert_eq!(client.probe(10003).await.unwrap(), ProbeOutcome::NotLive);
        assert_eq!(client.probe(9).await.unwrap(), ProbeOutcome::Unknown);
    }

    #[tokio::test]
    async fn unreachable_agent_is_an_error() {
        let client =
            AgentClient::new("http://127.0.0.1:1", None, Duration::from_millis(200)).unwrap();
        assert!(client.probe(10001).await.is_err());
        assert!(client.kill("pod-1").await.is_err());
    }
}
