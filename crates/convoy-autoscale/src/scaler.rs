//! Autoscaler evaluation.

use convoy_state::{AutoscalePolicy, ClusterSnapshot, Event, Millis, Service};
use tracing::info;

/// A scaling decision for a single service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    ScaleTo(u32),
    NoChange,
}

/// Decide the next replica count for `replicas` at `cpu` percent.
pub fn evaluate(policy: &AutoscalePolicy, replicas: u32, cpu: u32) -> ScaleDecision {
    if cpu > policy.target_cpu && replicas < policy.max {
        ScaleDecision::ScaleTo(replicas + 1)
    } else if u64::from(cpu) * 2 < u64::from(policy.target_cpu) && replicas > policy.min {
        ScaleDecision::ScaleTo(replicas - 1)
    } else {
        ScaleDecision::NoChange
    }
}

/// Apply the autoscale policy (if any) to `service`, recording an event
/// for every change.
pub fn autoscale(snapshot: &mut ClusterSnapshot, service: &mut Service, now: Millis) -> ScaleDecision {
    let Some(policy) = service.autoscale else {
        return ScaleDecision::NoChange;
    };

    let decision = evaluate(&policy, service.replicas, service.cpu);
    if let ScaleDecision::ScaleTo(target) = decision {
        let up = target > service.replicas;
        info!(
            service = %service.name,
            from = service.replicas,
            to = target,
            cpu = service.cpu,
            target_cpu = policy.target_cpu,
            "autoscaling"
        );
        let (message, why) = if up {
            ("HPA scale up", "CPU above target.")
        } else {
            ("HPA scale down", "CPU well below target.")
        };
        snapshot.push_event(Event::info(now, message).service(&service.name).explain(why));
        service.replicas = target;
    }
    decision
}
