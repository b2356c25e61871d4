//! In-process simulated pod runtime.
//!
//! Pods are not processes: each is a port, a digest, a health flag, and a
//! pair of "ready after" / "live after" deadlines. A killed pod drains for
//! a grace period (probe answers 503) before it is forgotten. All deadlines
//! are compared against the injected clock when the runtime is touched; no
//! timers run in the background.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info};

use convoy_state::{Clock, Millis, env_lookup};

use crate::contract::{PodRuntime, ProbeOutcome, SpawnRequest, SpawnedPod};
use crate::error::{RuntimeError, RuntimeResult};

/// Tunables for the simulated agent.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// First port handed out.
    pub first_port: u16,
    /// Time after spawn before a healthy pod reports ready and live.
    pub startup_delay_ms: u64,
    /// How long a killed pod keeps draining before it disappears.
    pub kill_grace_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            first_port: 10_000,
            startup_delay_ms: 1_000,
            kill_grace_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone)]
struct SimPod {
    id: String,
    service: String,
    digest: String,
    healthy: bool,
    ready_after: Millis,
    live_after: Millis,
    terminate_at: Option<Millis>,
}

#[derive(Debug)]
struct SimState {
    next_port: u16,
    /// Pods keyed by port.
    pods: BTreeMap<u16, SimPod>,
    reject_spawns: bool,
}

/// A runtime that emulates the pod agent entirely in memory.
pub struct SimulatedRuntime {
    clock: Arc<dyn Clock>,
    config: SimulationConfig,
    state: Mutex<SimState>,
}

impl SimulatedRuntime {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_config(clock, SimulationConfig::default())
    }

    pub fn with_config(clock: Arc<dyn Clock>, config: SimulationConfig) -> Self {
        let state = SimState {
            next_port: config.first_port,
            pods: BTreeMap::new(),
            reject_spawns: false,
        };
        Self {
            clock,
            config,
            state: Mutex::new(state),
        }
    }

    /// Flip the health of every pod belonging to `service`.
    pub fn set_service_health(&self, service: &str, healthy: bool) {
        let mut state = self.lock();
        let mut touched = 0;
        for pod in state.pods.values_mut().filter(|p| p.service == service) {
            pod.healthy = healthy;
            touched += 1;
        }
        info!(%service, healthy, pods = touched, "simulated service health changed");
    }

    /// Make every subsequent spawn fail (or succeed again).
    pub fn set_reject_spawns(&self, reject: bool) {
        self.lock().reject_spawns = reject;
    }

    /// Number of pods the runtime still knows about, draining ones included.
    pub fn pod_count(&self) -> usize {
        let now = self.clock.now_ms();
        let mut state = self.lock();
        purge_drained(&mut state, now);
        state.pods.len()
    }

    /// Whether the pod with `id` is currently draining.
    pub fn is_terminating(&self, id: &str) -> bool {
        let now = self.clock.now_ms();
        let mut state = self.lock();
        purge_drained(&mut state, now);
        state
            .pods
            .values()
            .any(|p| p.id == id && p.terminate_at.is_some())
    }

    /// Digest of the pod listening on `port`, if any.
    pub fn digest_on(&self, port: u16) -> Option<String> {
        self.lock().pods.get(&port).map(|p| p.digest.clone())
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn purge_drained(state: &mut SimState, now: Millis) {
    state
        .pods
        .retain(|_, p| p.terminate_at.is_none_or(|at| now < at));
}

#[async_trait]
impl PodRuntime for SimulatedRuntime {
    async fn spawn(&self, request: &SpawnRequest) -> RuntimeResult<SpawnedPod> {
        let now = self.clock.now_ms();
        let mut state = self.lock();
        purge_drained(&mut state, now);

        if state.reject_spawns {
            return Err(RuntimeError::SpawnRejected(request.service.clone()));
        }

        let port = state.next_port;
        state.next_port = port.checked_add(1).ok_or(RuntimeError::PortsExhausted)?;

        let id = format!("pod-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let healthy = env_lookup(&request.env, "HEALTHY").unwrap_or("1") == "1";
        let ready_at = now + self.config.startup_delay_ms;

        state.pods.insert(
            port,
            SimPod {
                id: id.clone(),
                service: request.service.clone(),
                digest: request.digest.clone(),
                healthy,
                ready_after: ready_at,
                live_after: ready_at,
                terminate_at: None,
            },
        );

        debug!(service = %request.service, pod = %id, port, healthy, "simulated pod spawned");
        Ok(SpawnedPod { id, port })
    }

    async fn kill(&self, pod_id: &str) -> RuntimeResult<()> {
        let now = self.clock.now_ms();
        let grace = self.config.kill_grace_ms;
        let mut state = self.lock();
        purge_drained(&mut state, now);

        match state.pods.values_mut().find(|p| p.id == pod_id) {
            Some(pod) => {
                if pod.terminate_at.is_none() {
                    pod.terminate_at = Some(now + grace);
                    debug!(pod = %pod_id, grace_ms = grace, "simulated pod draining");
                }
            }
            None => debug!(pod = %pod_id, "kill for unknown pod ignored"),
        }
        Ok(())
    }

    async fn probe(&self, port: u16) -> RuntimeResult<ProbeOutcome> {
        let now = self.clock.now_ms();
        let mut state = self.lock();
        purge_drained(&mut state, now);

        let Some(pod) = state.pods.get(&port) else {
            return Ok(ProbeOutcome::Unknown);
        };
        if pod.terminate_at.is_some() {
            return Ok(ProbeOutcome::NotReady);
        }

        let live = pod.healthy && now >= pod.live_after;
        let ready = pod.healthy && now >= pod.ready_after;
        Ok(if !live {
            ProbeOutcome::NotLive
        } else if !ready {
            ProbeOutcome::NotReady
        } else {
            ProbeOutcome::Ready
        })
    }
}
