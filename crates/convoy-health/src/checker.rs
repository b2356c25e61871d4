//! Per-pod probe evaluation.
//!
//! Pure bookkeeping: given a pod, the latest probe result, and the
//! service's liveness policy, update the pod's counters and decide what
//! happens to it.

use convoy_state::{Millis, Pod, ProbePolicy, RestartBackoff};
use tracing::debug;

/// Delay for the first restart.
pub const BACKOFF_BASE_MS: u64 = 500;

/// The exponent stops growing here (500ms × 64 = 32s).
pub const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Restart delay for the given attempt number.
pub fn backoff_delay_ms(attempt: u32) -> u64 {
    BACKOFF_BASE_MS << attempt.min(MAX_BACKOFF_EXPONENT)
}

/// What the pass should do with a pod after probing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// Probe succeeded; pod is ready.
    Ready,
    /// Probe failed but the pod stays (grace window or below threshold).
    NotReady,
    /// Liveness threshold breached. The pod must be killed and removed.
    Restart { delay_ms: u64 },
}

/// Apply one probe result to `pod`.
///
/// `backoff` is the owning service's restart tracker. A restart consumes its
/// current attempt and bumps it. Only a success from a replacement pod (one
/// spawned with an inherited attempt) resets it, so healthy siblings never
/// clear a crash loop.
pub fn evaluate_probe(
    pod: &mut Pod,
    success: bool,
    liveness: &ProbePolicy,
    backoff: &mut RestartBackoff,
    now: Millis,
) -> ProbeVerdict {
    pod.last_probe_at = Some(now);

    if success {
        pod.consecutive_failures = 0;
        pod.ready = true;
        if pod.backoff_attempt > 0 {
            if backoff.attempt > 0 || backoff.until.is_some() {
                debug!(service = %pod.service, pod = %pod.id, "restart backoff reset");
            }
            *backoff = RestartBackoff::default();
        }
        return ProbeVerdict::Ready;
    }

    pod.ready = false;
    if pod.age_ms(now) < liveness.initial_delay_ms {
        return ProbeVerdict::NotReady;
    }

    pod.consecutive_failures += 1;
    if pod.consecutive_failures < liveness.failure_threshold {
        return ProbeVerdict::NotReady;
    }

    let delay_ms = backoff_delay_ms(backoff.attempt);
    let until = now + delay_ms;
    pod.restarts += 1;
    pod.backoff_until = Some(until);
    backoff.attempt += 1;
    backoff.until = Some(until);
    pod.backoff_attempt = backoff.attempt;

    ProbeVerdict::Restart { delay_ms }
}
