//! The spawn/kill/probe contract every pod runtime implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use convoy_state::EnvVar;

use crate::error::RuntimeResult;

/// Everything a runtime needs to start a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub service: String,
    pub digest: String,
    pub env: Vec<EnvVar>,
}

/// Identity of a freshly spawned pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnedPod {
    pub id: String,
    pub port: u16,
}

/// Result of probing a pod's health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 200: live and ready for traffic.
    Ready,
    /// 503: live but not ready (starting up or draining).
    NotReady,
    /// 500: not live.
    NotLive,
    /// 404: the runtime does not know this port.
    Unknown,
}

impl ProbeOutcome {
    /// Map an agent HTTP status to an outcome.
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => ProbeOutcome::Ready,
            503 => ProbeOutcome::NotReady,
            404 => ProbeOutcome::Unknown,
            _ => ProbeOutcome::NotLive,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ProbeOutcome::Ready => 200,
            ProbeOutcome::NotReady => 503,
            ProbeOutcome::NotLive => 500,
            ProbeOutcome::Unknown => 404,
        }
    }

    /// Only a ready-and-live answer counts as a successful probe.
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Ready)
    }
}

/// A pod runtime.
///
/// `kill` is idempotent: killing an unknown pod is not an error.
#[async_trait]
pub trait PodRuntime: Send + Sync {
    async fn spawn(&self, request: &SpawnRequest) -> RuntimeResult<SpawnedPod>;

    async fn kill(&self, pod_id: &str) -> RuntimeResult<()>;

    async fn probe(&self, port: u16) -> RuntimeResult<ProbeOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ProbeOutcome::from_status(200), ProbeOutcome::Ready);
        assert_eq!(ProbeOutcome::from_status(503), ProbeOutcome::NotReady);
        assert_eq!(ProbeOutcome::from_status(500), ProbeOutcome::NotLive);
        assert_eq!(ProbeOutcome::from_status(404), ProbeOutcome::Unknown);
        assert_eq!(ProbeOutcome::from_status(502), ProbeOutcome::NotLive);
    }

    #[test]
    fn only_ready_is_success() {
        assert!(ProbeOutcome::Ready.is_success());
        assert!(!ProbeOutcome::NotReady.is_success());
        assert!(!ProbeOutcome::NotLive.is_success());
        assert!(!ProbeOutcome::Unknown.is_success());
    }
}
