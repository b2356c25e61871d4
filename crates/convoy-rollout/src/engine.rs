//! Applying rollout decisions through the pod runtime.
//!
//! All functions take the service by `&mut` separately from the snapshot:
//! the reconciler works on a copy of the service and writes it back once
//! its sub-steps are done.

use convoy_runtime::{PodRuntime, SpawnRequest};
use convoy_state::{ClusterSnapshot, Event, Millis, Pod, PodId, Service};
use tracing::{debug, info, warn};

use crate::plan::{current_step_percent, desired_new_count, pause_elapsed, staged_victims, surplus_victims};

/// What convergence did for one service this pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvergeReport {
    pub spawned: Vec<PodId>,
    pub killed: Vec<PodId>,
    /// A spawn failed and further spawns were abandoned for this pass.
    pub spawn_failed: bool,
    /// The staged rollout moved to its next step.
    pub advanced: bool,
}

/// Kill every running pod whose digest differs from the service's.
pub async fn correct_drift(
    snapshot: &mut ClusterSnapshot,
    service: &Service,
    runtime: &dyn PodRuntime,
    now: Millis,
) -> Vec<PodId> {
    let drifted: Vec<PodId> = snapshot
        .pods_for(&service.name)
        .filter(|p| p.is_running() && p.digest != service.digest)
        .map(|p| p.id.clone())
        .collect();

    for id in &drifted {
        info!(service = %service.name, pod = %id, "killing drift pod");
        kill_pod(
            snapshot,
            runtime,
            &service.name,
            id,
            Event::info(now, "Kill drift pod (digest mismatch)")
                .explain("Old version draining out."),
        )
        .await;
    }
    drifted
}

/// Converge `service` with the strategy its rollout policy selects.
pub async fn converge(
    snapshot: &mut ClusterSnapshot,
    service: &mut Service,
    runtime: &dyn PodRuntime,
    now: Millis,
) -> ConvergeReport {
    if service.rollout.is_staged() {
        converge_staged(snapshot, service, runtime, now).await
    } else {
        converge_immediate(snapshot, service, runtime, now).await
    }
}

/// Blue/green: spawn up to `replicas`, or kill the oldest surplus.
pub async fn converge_immediate(
    snapshot: &mut ClusterSnapshot,
    service: &Service,
    runtime: &dyn PodRuntime,
    now: Millis,
) -> ConvergeReport {
    let mut report = ConvergeReport::default();
    let have = snapshot.active_count(&service.name);

    if have < service.replicas {
        spawn_pods(
            snapshot,
            service,
            runtime,
            now,
            service.replicas - have,
            || {
                Event::info(now, "Spawn pod")
                    .explain("Desired above actual, creating a pod to converge.")
            },
            &mut report,
        )
        .await;
    } else if have > service.replicas {
        let extra = (have - service.replicas) as usize;
        let victims = surplus_victims(snapshot.pods_for(&service.name), extra);
        for id in victims {
            kill_pod(
                snapshot,
                runtime,
                &service.name,
                &id,
                Event::info(now, "ScaleDown kill").explain("Desired below actual, removing an extra pod."),
            )
            .await;
            report.killed.push(id);
        }
    }
    report
}

/// Canary: grow the new-digest share step by step, then retire old pods.
/// The replica cap is enforced on every pass regardless of step state.
pub async fn converge_staged(
    snapshot: &mut ClusterSnapshot,
    service: &mut Service,
    runtime: &dyn PodRuntime,
    now: Millis,
) -> ConvergeReport {
    let mut report = ConvergeReport::default();
    let percent = current_step_percent(&service.rollout, &service.progress);
    let desired_new = desired_new_count(percent, service.replicas);
    let new_count = snapshot
        .pods_for(&service.name)
        .filter(|p| p.digest == service.digest)
        .count() as u32;

    if new_count < desired_new {
        spawn_pods(
            snapshot,
            service,
            runtime,
            now,
            desired_new - new_count,
            || {
                Event::info(now, format!("Canary spawn ({percent}%)"))
                    .explain("Rolling out gradually, new pods take a slice of traffic.")
            },
            &mut report,
        )
        .await;
    } else if pause_elapsed(&service.rollout, &service.progress, now) {
        let last_step = service.rollout.steps.len().saturating_sub(1);
        if service.progress.step_index < last_step {
            service.progress.step_index += 1;
            service.progress.last_step_at = Some(now);
            let next = current_step_percent(&service.rollout, &service.progress);
            info!(service = %service.name, step = service.progress.step_index, percent = next, "canary advanced");
            snapshot.push_event(
                Event::info(now, "Canary advanced step")
                    .service(&service.name)
                    .explain(format!("Now at {next}%")),
            );
            report.advanced = true;
        } else {
            let old: Vec<PodId> = snapshot
                .pods_for(&service.name)
                .filter(|p| p.is_running() && p.digest != service.digest)
                .map(|p| p.id.clone())
                .collect();
            if !old.is_empty() {
                info!(service = %service.name, pods = old.len(), "canary complete, retiring old pods");
            }
            for id in old {
                kill_pod(
                    snapshot,
                    runtime,
                    &service.name,
                    &id,
                    Event::info(now, "Canary complete — scale down old")
                        .explain("New version now at 100%."),
                )
                .await;
                report.killed.push(id);
            }
        }
    }

    let have = snapshot.active_count(&service.name);
    if have > service.replicas {
        let extra = (have - service.replicas) as usize;
        let victims = staged_victims(snapshot.pods_for(&service.name), &service.digest, extra);
        for id in victims {
            kill_pod(
                snapshot,
                runtime,
                &service.name,
                &id,
                Event::info(now, "ScaleDown kill").explain("Desired below actual during staged rollout."),
            )
            .await;
            report.killed.push(id);
        }
    }
    report
}

/// Spawn up to `count` pods on the service's current digest.
///
/// New pods inherit the service's restart backoff attempt. The first
/// failure is recorded as a WARN event and ends spawning for this pass.
async fn spawn_pods(
    snapshot: &mut ClusterSnapshot,
    service: &Service,
    runtime: &dyn PodRuntime,
    now: Millis,
    count: u32,
    event: impl Fn() -> Event,
    report: &mut ConvergeReport,
) {
    let request = SpawnRequest {
        service: service.name.clone(),
        digest: service.digest.clone(),
        env: service.env.clone(),
    };
    let attempt = snapshot
        .metrics
        .backoff
        .get(&service.name)
        .map_or(0, |b| b.attempt);

    for _ in 0..count {
        match runtime.spawn(&request).await {
            Ok(spawned) => {
                debug!(service = %service.name, pod = %spawned.id, port = spawned.port, "pod spawned");
                let mut pod = Pod::new(&spawned.id, &service.name, spawned.port, &service.digest, now);
                pod.backoff_attempt = attempt;
                snapshot.pods.insert(spawned.id.clone(), pod);
                snapshot.push_event(event().service(&service.name).pod(&spawned.id));
                report.spawned.push(spawned.id);
            }
            Err(e) => {
                warn!(service = %service.name, error = %e, "spawn failed");
                snapshot.push_event(
                    Event::warn(now, "Spawn failed")
                        .service(&service.name)
                        .explain(e.to_string()),
                );
                report.spawn_failed = true;
                break;
            }
        }
    }
}

/// Best-effort kill, then drop the pod from the snapshot and log `event`.
async fn kill_pod(
    snapshot: &mut ClusterSnapshot,
    runtime: &dyn PodRuntime,
    service: &str,
    id: &str,
    event: Event,
) {
    if let Err(e) = runtime.kill(id).await {
        debug!(%service, pod = %id, error = %e, "kill failed, dropping pod anyway");
    }
    snapshot.remove_pod(id);
    snapshot.push_event(event.service(service).pod(id));
}
