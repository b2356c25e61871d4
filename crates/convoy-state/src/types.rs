//! Domain types for the Convoy cluster snapshot.
//!
//! The snapshot is one JSON document holding every service declaration,
//! pod, event, counter, and alert record. Policies are resolved into typed
//! structs when a service is applied, so the reconciler never has to
//! default optional fields at the point of use.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unix timestamp in milliseconds.
pub type Millis = u64;

/// Unique service name.
pub type ServiceName = String;

/// Unique pod identifier, assigned by the pod runtime.
pub type PodId = String;

// ── Service ────────────────────────────────────────────────────────

/// One entry of a service's environment list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Look up `key` in an ordered env list. The first matching entry wins.
pub fn env_lookup<'a>(env: &'a [EnvVar], key: &str) -> Option<&'a str> {
    env.iter()
        .find(|e| e.name == key)
        .map(|e| e.value.as_str())
}

/// How new versions replace old ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RolloutStrategy {
    /// Blue/green: converge straight to `replicas` pods on the current digest.
    #[default]
    #[serde(alias = "BlueGreen")]
    Immediate,
    /// Canary: move a growing percentage of replicas to the new digest.
    #[serde(alias = "Canary")]
    Staged,
}

/// A single canary step: the share of `replicas` that should run the new digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutStep {
    pub percent: u32,
}

/// Default pause between canary step advances.
pub const DEFAULT_STEP_PAUSE_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutPolicy {
    pub strategy: RolloutStrategy,
    #[serde(default)]
    pub steps: Vec<RolloutStep>,
    pub pause_ms: u64,
}

impl Default for RolloutPolicy {
    fn default() -> Self {
        Self {
            strategy: RolloutStrategy::Immediate,
            steps: Vec::new(),
            pause_ms: DEFAULT_STEP_PAUSE_MS,
        }
    }
}

impl RolloutPolicy {
    /// Staged convergence needs at least one step; otherwise the service
    /// falls back to immediate replacement.
    pub fn is_staged(&self) -> bool {
        self.strategy == RolloutStrategy::Staged && !self.steps.is_empty()
    }
}

/// Liveness or readiness probe parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbePolicy {
    /// Grace period after pod creation during which failures are not counted.
    pub initial_delay_ms: u64,
    pub period_ms: u64,
    /// Consecutive failures that trigger a restart.
    pub failure_threshold: u32,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            period_ms: 2_000,
            failure_threshold: 3,
        }
    }
}

/// CPU-driven replica bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoscalePolicy {
    pub target_cpu: u32,
    pub min: u32,
    pub max: u32,
}

impl Default for AutoscalePolicy {
    fn default() -> Self {
        Self {
            target_cpu: 60,
            min: 1,
            max: 10,
        }
    }
}

/// Where a staged rollout currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RolloutProgress {
    pub step_index: usize,
    /// When the step last advanced. `None` means the pause has already elapsed.
    pub last_step_at: Option<Millis>,
}

/// Desired-state declaration for one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: ServiceName,
    pub replicas: u32,
    pub digest: String,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub rollout: RolloutPolicy,
    #[serde(default)]
    pub readiness: ProbePolicy,
    #[serde(default)]
    pub liveness: ProbePolicy,
    #[serde(default)]
    pub autoscale: Option<AutoscalePolicy>,
    /// Simulated CPU load, 0-100.
    #[serde(default)]
    pub cpu: u32,
    #[serde(default)]
    pub progress: RolloutProgress,
}

impl Service {
    /// A service with default policies.
    pub fn new(name: impl Into<String>, replicas: u32, digest: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replicas,
            digest: digest.into(),
            env: Vec::new(),
            rollout: RolloutPolicy::default(),
            readiness: ProbePolicy::default(),
            liveness: ProbePolicy::default(),
            autoscale: None,
            cpu: 0,
            progress: RolloutProgress::default(),
        }
    }
}

// ── Pod ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    Running,
    Terminating,
}

/// One running instance of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub id: PodId,
    pub service: ServiceName,
    pub port: u16,
    pub digest: String,
    pub created_at: Millis,
    pub ready: bool,
    pub phase: PodPhase,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub restarts: u32,
    #[serde(default)]
    pub backoff_attempt: u32,
    #[serde(default)]
    pub backoff_until: Option<Millis>,
    #[serde(default)]
    pub last_probe_at: Option<Millis>,
}

impl Pod {
    /// A freshly spawned, not yet ready pod.
    pub fn new(
        id: impl Into<String>,
        service: impl Into<String>,
        port: u16,
        digest: impl Into<String>,
        created_at: Millis,
    ) -> Self {
        Self {
            id: id.into(),
            service: service.into(),
            port,
            digest: digest.into(),
            created_at,
            ready: false,
            phase: PodPhase::Running,
            consecutive_failures: 0,
            restarts: 0,
            backoff_attempt: 0,
            backoff_until: None,
            last_probe_at: None,
        }
    }

    pub fn age_ms(&self, now: Millis) -> u64 {
        now.saturating_sub(self.created_at)
    }

    pub fn is_running(&self) -> bool {
        self.phase == PodPhase::Running
    }
}

// ── Events ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Info => "INFO",
            EventLevel::Warn => "WARN",
            EventLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entry in the cluster event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub at: Millis,
    pub level: EventLevel,
    pub service: Option<ServiceName>,
    pub pod: Option<PodId>,
    pub message: String,
    pub explanation: Option<String>,
}

impl Event {
    pub fn new(at: Millis, level: EventLevel, message: impl Into<String>) -> Self {
        Self {
            at,
            level,
            service: None,
            pod: None,
            message: message.into(),
            explanation: None,
        }
    }

    pub fn info(at: Millis, message: impl Into<String>) -> Self {
        Self::new(at, EventLevel::Info, message)
    }

    pub fn warn(at: Millis, message: impl Into<String>) -> Self {
        Self::new(at, EventLevel::Warn, message)
    }

    pub fn error(at: Millis, message: impl Into<String>) -> Self {
        Self::new(at, EventLevel::Error, message)
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn pod(mut self, pod: impl Into<String>) -> Self {
        self.pod = Some(pod.into());
        self
    }

    pub fn explain(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }
}

// ── Metrics ───────────────────────────────────────────────────────

/// Restart backoff carried across respawns of a service's pods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RestartBackoff {
    pub attempt: u32,
    pub until: Option<Millis>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterMetrics {
    #[serde(default)]
    pub restarts: BTreeMap<ServiceName, u64>,
    #[serde(default)]
    pub ready_by_service: BTreeMap<ServiceName, u32>,
    #[serde(default)]
    pub backoff: BTreeMap<ServiceName, RestartBackoff>,
}

// ── Alerts ────────────────────────────────────────────────────────

/// Service availability as seen by the alert state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceStatus {
    Up,
    Down,
    Scaled,
}

impl ServiceStatus {
    /// SCALED when nothing is desired, UP when every desired replica is ready.
    pub fn derive(desired: u32, ready: u32) -> Self {
        if desired == 0 {
            ServiceStatus::Scaled
        } else if ready >= desired {
            ServiceStatus::Up
        } else {
            ServiceStatus::Down
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Up => "UP",
            ServiceStatus::Down => "DOWN",
            ServiceStatus::Scaled => "SCALED",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransition {
    pub to: ServiceStatus,
    pub since: Millis,
}

/// Per-service alerting bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub status: ServiceStatus,
    pub last_change_at: Millis,
    pub last_notified_at: Option<Millis>,
    pub notified_status: ServiceStatus,
    pub pending: Option<PendingTransition>,
    pub last_down_at: Option<Millis>,
    pub prev_desired: u32,
    pub suppress_until: Option<Millis>,
    pub suppress_handled: bool,
}

// ── Snapshot ──────────────────────────────────────────────────────

/// The entire cluster state, loaded and saved as one document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// Incremented on every save.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub services: BTreeMap<ServiceName, Service>,
    #[serde(default)]
    pub pods: BTreeMap<PodId, Pod>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub metrics: ClusterMetrics,
    #[serde(default)]
    pub alerts: BTreeMap<ServiceName, AlertRecord>,
}

impl ClusterSnapshot {
    /// Append an entry to the event log.
    pub fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Pods owned by `service`, in id order.
    pub fn pods_for<'a>(&'a self, service: &'a str) -> impl Iterator<Item = &'a Pod> + 'a {
        self.pods.values().filter(move |p| p.service == service)
    }

    /// Snapshot of pod ids owned by `service`, safe to iterate while mutating.
    pub fn pod_ids_for(&self, service: &str) -> Vec<PodId> {
        self.pods_for(service).map(|p| p.id.clone()).collect()
    }

    pub fn active_count(&self, service: &str) -> u32 {
        self.pods_for(service).count() as u32
    }

    pub fn ready_count(&self, service: &str) -> u32 {
        self.pods_for(service).filter(|p| p.ready).count() as u32
    }

    pub fn remove_pod(&mut self, id: &str) -> Option<Pod> {
        self.pods.remove(id)
    }

    /// Bump the per-service restart counter.
    pub fn count_restart(&mut self, service: &str) {
        *self.metrics.restarts.entry(service.to_string()).or_insert(0) += 1;
    }

    pub fn restarts(&self, service: &str) -> u64 {
        self.metrics.restarts.get(service).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_lookup_first_match_wins() {
        let env = vec![
            EnvVar::new("HEALTHY", "0"),
            EnvVar::new("MODE", "fast"),
            EnvVar::new("HEALTHY", "1"),
        ];
        assert_eq!(env_lookup(&env, "HEALTHY"), Some("0"));
        assert_eq!(env_lookup(&env, "MODE"), Some("fast"));
        assert_eq!(env_lookup(&env, "MISSING"), None);
    }

    #[test]
    fn status_derivation() {
        assert_eq!(ServiceStatus::derive(0, 0), ServiceStatus::Scaled);
        assert_eq!(ServiceStatus::derive(0, 3), ServiceStatus::Scaled);
        assert_eq!(ServiceStatus::derive(3, 3), ServiceStatus::Up);
        assert_eq!(ServiceStatus::derive(3, 4), ServiceStatus::Up);
        assert_eq!(ServiceStatus::derive(3, 2), ServiceStatus::Down);
    }

    #[test]
    fn staged_requires_steps() {
        let mut policy = RolloutPolicy {
            strategy: RolloutStrategy::Staged,
            ..Default::default()
        };
        assert!(!policy.is_staged());
        policy.steps.push(RolloutStep { percent: 50 });
        assert!(policy.is_staged());
    }

    #[test]
    fn strategy_accepts_legacy_names() {
        let s: RolloutStrategy = serde_json::from_str("\"Canary\"").unwrap();
        assert_eq!(s, RolloutStrategy::Staged);
        let s: RolloutStrategy = serde_json::from_str("\"BlueGreen\"").unwrap();
        assert_eq!(s, RolloutStrategy::Immediate);
    }

    #[test]
    fn snapshot_counts_by_service() {
        let mut snap = ClusterSnapshot::default();
        let mut ready = Pod::new("p1", "api", 10000, "d1", 0);
        ready.ready = true;
        snap.pods.insert("p1".into(), ready);
        snap.pods.insert("p2".into(), Pod::new("p2", "api", 10001, "d1", 0));
        snap.pods.insert("p3".into(), Pod::new("p3", "web", 10002, "d1", 0));

        assert_eq!(snap.active_count("api"), 2);
        assert_eq!(snap.ready_count("api"), 1);
        assert_eq!(snap.active_count("web"), 1);
        assert_eq!(snap.pod_ids_for("api"), vec!["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn restart_counter_accumulates() {
        let mut snap = ClusterSnapshot::default();
        assert_eq!(snap.restarts("api"), 0);
        snap.count_restart("api");
        snap.count_restart("api");
        assert_eq!(snap.restarts("api"), 2);
    }

    #[test]
    fn event_levels_serialize_uppercase() {
        let ev = Event::warn(5, "Liveness failed").service("api").pod("p1");
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"WARN\""));
        assert_eq!(ev.level.to_string(), "WARN");
    }

    #[test]
    fn empty_document_deserializes_to_defaults() {
        let snap: ClusterSnapshot = serde_json::from_str("{}").unwrap();
        assert_eq!(snap, ClusterSnapshot::default());
    }
}
