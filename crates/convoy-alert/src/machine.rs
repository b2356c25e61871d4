//! Per-service availability state machine.
//!
//! Pure bookkeeping over `AlertRecord`s. The machine decides which
//! notifications are due and marks them as notified at decision time;
//! delivery happens afterwards (see `delivery`), and a failed delivery does
//! not roll the bookkeeping back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use convoy_state::{
    AlertRecord, Millis, PendingTransition, ProbePolicy, Service, ServiceName, ServiceStatus,
};

/// Debounce, cooldown, and startup grace settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertPolicy {
    /// How long DOWN must persist before it is committed.
    pub down_confirm_ms: u64,
    /// How long UP must persist before it is committed.
    pub up_confirm_ms: u64,
    /// Minimum gap between non-forced notifications.
    pub cooldown_ms: u64,
    /// Suppression after a desired-replica increase. Unset derives it from
    /// the readiness probe.
    pub startup_grace_ms: Option<u64>,
}

impl AlertPolicy {
    /// Grace window opened when desired replicas go up.
    pub fn startup_grace_for(&self, readiness: &ProbePolicy) -> u64 {
        self.startup_grace_ms
            .unwrap_or_else(|| (readiness.initial_delay_ms + 1_000).max(1_000))
    }

    fn confirm_ms(&self, status: ServiceStatus) -> u64 {
        match status {
            ServiceStatus::Down => self.down_confirm_ms,
            ServiceStatus::Up => self.up_confirm_ms,
            ServiceStatus::Scaled => 0,
        }
    }
}

/// A notification the machine decided to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub service: ServiceName,
    pub status: ServiceStatus,
    pub desired: u32,
    pub ready: u32,
    pub digest: String,
    #[serde(rename = "timestamp")]
    pub at: Millis,
    /// Set on DOWN→UP recoveries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downtime_ms: Option<u64>,
    /// Sent because suppression ended while still DOWN.
    #[serde(default)]
    pub forced: bool,
}

struct Observation<'a> {
    service: &'a Service,
    desired: u32,
    ready: u32,
    now: Millis,
}

/// Advance the alert record of `service` given its current ready count.
///
/// The first observation only records a baseline. Returns the
/// notifications due this pass, in the order they were decided.
pub fn evaluate(
    alerts: &mut BTreeMap<ServiceName, AlertRecord>,
    service: &Service,
    ready: u32,
    policy: &AlertPolicy,
    now: Millis,
) -> Vec<Notification> {
    let desired = service.replicas;
    let computed = ServiceStatus::derive(desired, ready);
    let grace = policy.startup_grace_for(&service.readiness);

    let Some(rec) = alerts.get_mut(&service.name) else {
        debug!(service = %service.name, status = %computed, "alert baseline recorded");
        alerts.insert(service.name.clone(), baseline(computed, desired, grace, now));
        return Vec::new();
    };

    let obs = Observation {
        service,
        desired,
        ready,
        now,
    };
    let mut due = Vec::new();

    if rec.prev_desired < desired {
        rec.suppress_until = Some(now + grace);
        rec.suppress_handled = false;
    }

    if desired == 0 {
        rec.status = ServiceStatus::Scaled;
        rec.pending = None;
        rec.last_change_at = now;
        rec.prev_desired = 0;
        rec.suppress_until = None;
        rec.suppress_handled = true;
        return due;
    }

    if rec.status != computed {
        let since = match rec.pending {
            Some(p) if p.to == computed => p.since,
            _ => now,
        };
        rec.pending = Some(PendingTransition { to: computed, since });

        if now.saturating_sub(since) >= policy.confirm_ms(computed) {
            let from = rec.status;
            rec.status = computed;
            rec.last_change_at = now;
            rec.pending = None;
            if computed == ServiceStatus::Down {
                rec.last_down_at = Some(now);
            }
            let downtime_ms = match (from, computed, rec.last_down_at) {
                (ServiceStatus::Down, ServiceStatus::Up, Some(down)) => Some(now.saturating_sub(down)),
                _ => None,
            };
            debug!(service = %service.name, %from, to = %computed, "status transition committed");

            let suppressed = rec.suppress_until.is_some_and(|until| now < until);
            if !suppressed {
                due.extend(attempt(rec, computed, &obs, downtime_ms, false, policy));
            }
        }
    } else {
        rec.pending = None;
    }

    if let Some(until) = rec.suppress_until {
        if now >= until && !rec.suppress_handled {
            rec.suppress_handled = true;
            let already_down = due.iter().any(|n| n.status == ServiceStatus::Down);
            if rec.status == ServiceStatus::Down && !already_down {
                due.extend(attempt(rec, ServiceStatus::Down, &obs, None, true, policy));
            }
        }
    }

    rec.prev_desired = desired;
    due
}

fn baseline(status: ServiceStatus, desired: u32, grace: u64, now: Millis) -> AlertRecord {
    AlertRecord {
        status,
        last_change_at: now,
        last_notified_at: None,
        notified_status: status,
        pending: None,
        last_down_at: (status == ServiceStatus::Down).then_some(now),
        prev_desired: desired,
        suppress_until: (desired > 0).then_some(now + grace),
        suppress_handled: false,
    }
}

/// Cooldown and same-status checks, skipped when `forced`.
fn attempt(
    rec: &mut AlertRecord,
    status: ServiceStatus,
    obs: &Observation<'_>,
    downtime_ms: Option<u64>,
    forced: bool,
    policy: &AlertPolicy,
) -> Option<Notification> {
    if status == ServiceStatus::Scaled {
        return None;
    }
    if !forced {
        let cooling = policy.cooldown_ms > 0
            && rec
                .last_notified_at
                .is_some_and(|at| obs.now.saturating_sub(at) < policy.cooldown_ms);
        if cooling || rec.notified_status == status {
            debug!(service = %obs.service.name, %status, cooling, "notification skipped");
            return None;
        }
    }

    rec.last_notified_at = Some(obs.now);
    rec.notified_status = status;
    Some(Notification {
        service: obs.service.name.clone(),
        status,
        desired: obs.desired,
        ready: obs.ready,
        digest: obs.service.digest.clone(),
        at: obs.now,
        downtime_ms,
        forced,
    })
}
