//! Probe every pod of a service and heal the ones that stopped answering.

use convoy_runtime::PodRuntime;
use convoy_state::{ClusterSnapshot, Event, Millis, PodId, RestartBackoff, Service};
use tracing::{debug, warn};

use crate::checker::{ProbeVerdict, evaluate_probe};

/// Summary of one service's probe sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub probed: usize,
    pub ready: usize,
    /// Pods killed for breaching the liveness threshold, in probe order.
    pub restarted: Vec<PodId>,
}

/// Probe each running pod of `service` once and apply the verdicts.
///
/// Restarted pods are killed through the runtime (best-effort) and removed
/// from the snapshot; nothing is respawned here.
pub async fn probe_service(
    snapshot: &mut ClusterSnapshot,
    service: &Service,
    runtime: &dyn PodRuntime,
    now: Millis,
) -> ProbeReport {
    let mut report = ProbeReport::default();
    let mut backoff = snapshot
        .metrics
        .backoff
        .get(&service.name)
        .copied()
        .unwrap_or_default();

    for id in snapshot.pod_ids_for(&service.name) {
        let Some(port) = snapshot.pods.get(&id).filter(|p| p.is_running()).map(|p| p.port) else {
            continue;
        };

        let success = match runtime.probe(port).await {
            Ok(outcome) => outcome.is_success(),
            Err(e) => {
                debug!(service = %service.name, pod = %id, error = %e, "probe failed");
                false
            }
        };

        let Some(pod) = snapshot.pods.get_mut(&id) else {
            continue;
        };
        report.probed += 1;

        match evaluate_probe(pod, success, &service.liveness, &mut backoff, now) {
            ProbeVerdict::Ready => report.ready += 1,
            ProbeVerdict::NotReady => {}
            ProbeVerdict::Restart { delay_ms } => {
                let restarts = pod.restarts;
                warn!(
                    service = %service.name,
                    pod = %id,
                    restarts,
                    delay_ms,
                    "liveness threshold breached, restarting pod"
                );
                snapshot.count_restart(&service.name);
                snapshot.push_event(
                    Event::warn(now, "Liveness failed — restarting")
                        .service(&service.name)
                        .pod(&id)
                        .explain(format!("Backoff {delay_ms}ms before respawn.")),
                );
                if let Err(e) = runtime.kill(&id).await {
                    debug!(service = %service.name, pod = %id, error = %e, "kill failed, dropping pod anyway");
                }
                snapshot.remove_pod(&id);
                report.restarted.push(id);
            }
        }
    }

    if backoff == RestartBackoff::default() {
        snapshot.metrics.backoff.remove(&service.name);
    } else {
        snapshot.metrics.backoff.insert(service.name.clone(), backoff);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use convoy_runtime::{SimulatedRuntime, SpawnRequest};
    use convoy_state::{EnvVar, EventLevel, ManualClock, Pod};

    async fn spawn_into(
        snap: &mut ClusterSnapshot,
        rt: &SimulatedRuntime,
        svc: &Service,
        healthy: bool,
        now: Millis,
    ) -> PodId {
        let spawned = rt
            .spawn(&SpawnRequest {
                service: svc.name.clone(),
                digest: svc.digest.clone(),
                env: vec![EnvVar::new("HEALTHY", if healthy { "1" } else { "0" })],
            })
            .await
            .unwrap();
        snap.pods.insert(
            spawned.id.clone(),
            Pod::new(&spawned.id, &svc.name, spawned.port, &svc.digest, now),
        );
        spawned.id
    }

    #[tokio::test]
    async fn healthy_pods_become_ready() {
        let clock = ManualClock::new(0);
        let rt = SimulatedRuntime::new(Arc::new(clock.clone()));
        let svc = Service::new("api", 2, "d1");
        let mut snap = ClusterSnapshot::default();
        spawn_into(&mut snap, &rt, &svc, true, 0).await;
        spawn_into(&mut snap, &rt, &svc, true, 0).await;

        let report = probe_service(&mut snap, &svc, &rt, 500).await;
        assert_eq!(report.ready, 0);
        assert_eq!(snap.ready_count("api"), 0);

        clock.set(1_000);
        let report = probe_service(&mut snap, &svc, &rt, 1_000).await;
        assert_eq!(report.probed, 2);
        assert_eq!(report.ready, 2);
        assert_eq!(snap.ready_count("api"), 2);
        assert!(snap.pods.values().all(|p| p.last_probe_at == Some(1_000)));
    }

    #[tokio::test]
    async fn unhealthy_pod_is_restarted_after_threshold() {
        let clock = ManualClock::new(0);
        let rt = SimulatedRuntime::new(Arc::new(clock.clone()));
        let svc = Service::new("api", 1, "d1");
        let mut snap = ClusterSnapshot::default();
        let id = spawn_into(&mut snap, &rt, &svc, false, 0).await;

        for t in [1_000, 2_000] {
            clock.set(t);
            let report = probe_service(&mut snap, &svc, &rt, t).await;
            assert!(report.restarted.is_empty());
        }

        clock.set(3_000);
        let report = probe_service(&mut snap, &svc, &rt, 3_000).await;
        assert_eq!(report.restarted, vec![id.clone()]);
        assert!(snap.pods.is_empty());
        assert_eq!(snap.restarts("api"), 1);
        assert!(rt.is_terminating(&id));
        assert_eq!(
            snap.metrics.backoff.get("api"),
            Some(&RestartBackoff { attempt: 1, until: Some(3_500) })
        );

        let ev = snap.events.last().unwrap();
        assert_eq!(ev.level, EventLevel::Warn);
        assert_eq!(ev.pod.as_deref(), Some(id.as_str()));
        assert_eq!(ev.explanation.as_deref(), Some("Backoff 500ms before respawn."));
    }

    #[tokio::test]
    async fn unknown_port_counts_as_failure() {
        let clock = ManualClock::new(0);
        let rt = SimulatedRuntime::new(Arc::new(clock.clone()));
        let svc = Service::new("api", 1, "d1");
        let mut snap = ClusterSnapshot::default();
        // Port the runtime never handed out: probe answers 404.
        snap.pods.insert("pod-ghost".into(), Pod::new("pod-ghost", "api", 4242, "d1", 0));

        clock.set(5_000);
        probe_service(&mut snap, &svc, &rt, 5_000).await;
        assert_eq!(snap.pods["pod-ghost"].consecutive_failures, 1);
        assert!(!snap.pods["pod-ghost"].ready);
    }

    #[tokio::test]
    async fn healthy_replacement_clears_service_backoff() {
        let clock = ManualClock::new(0);
        let rt = SimulatedRuntime::new(Arc::new(clock.clone()));
        let svc = Service::new("api", 1, "d1");
        let mut snap = ClusterSnapshot::default();
        snap.metrics
            .backoff
            .insert("api".into(), RestartBackoff { attempt: 3, until: Some(10) });
        let id = spawn_into(&mut snap, &rt, &svc, true, 0).await;
        snap.pods.get_mut(&id).unwrap().backoff_attempt = 3;

        clock.set(2_000);
        probe_service(&mut snap, &svc, &rt, 2_000).await;
        assert!(!snap.metrics.backoff.contains_key("api"));
    }

    #[tokio::test]
    async fn healthy_sibling_does_not_reset_crash_loop_backoff() {
        let clock = ManualClock::new(0);
        let rt = SimulatedRuntime::new(Arc::new(clock.clone()));
        let mut svc = Service::new("api", 2, "d1");
        svc.liveness.failure_threshold = 1;
        svc.liveness.initial_delay_ms = 0;
        let mut snap = ClusterSnapshot::default();
        spawn_into(&mut snap, &rt, &svc, true, 0).await;

        let mut explanations = Vec::new();
        for pass in 1..=5u64 {
            let now = pass * 2_000;
            let attempt = snap.metrics.backoff.get("api").map_or(0, |b| b.attempt);
            let id = spawn_into(&mut snap, &rt, &svc, false, now - 1_000).await;
            snap.pods.get_mut(&id).unwrap().backoff_attempt = attempt;

            clock.set(now);
            let report = probe_service(&mut snap, &svc, &rt, now).await;
            assert_eq!(report.ready, 1);
            assert_eq!(report.restarted, vec![id]);
            explanations.push(snap.events.last().unwrap().explanation.clone().unwrap());
        }

        assert_eq!(
            explanations,
            vec![
                "Backoff 500ms before respawn.",
                "Backoff 1000ms before respawn.",
                "Backoff 2000ms before respawn.",
                "Backoff 4000ms before respawn.",
                "Backoff 8000ms before respawn.",
            ]
        );
        assert_eq!(snap.metrics.backoff["api"].attempt, 5);
    }

    #[tokio::test]
    async fn other_services_are_untouched() {
        let clock = ManualClock::new(0);
        let rt = SimulatedRuntime::new(Arc::new(clock.clone()));
        let api = Service::new("api", 1, "d1");
        let web = Service::new("web", 1, "d1");
        let mut snap = ClusterSnapshot::default();
        spawn_into(&mut snap, &rt, &api, true, 0).await;
        let web_pod = spawn_into(&mut snap, &rt, &web, true, 0).await;

        clock.set(2_000);
        let report = probe_service(&mut snap, &api, &rt, 2_000).await;
        assert_eq!(report.probed, 1);
        assert_eq!(snap.pods[&web_pod].last_probe_at, None);
    }
}
