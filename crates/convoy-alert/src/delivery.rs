//! Turning decided notifications into event log entries and deliveries.

use convoy_state::{ClusterSnapshot, Event, ServiceStatus};
use tracing::{debug, warn};

use crate::machine::Notification;
use crate::notifier::{Delivery, Notifier};

/// The "Service UP/DOWN" log entry written before delivery is attempted.
pub fn notification_event(n: &Notification, delivery_enabled: bool) -> Event {
    let (verb, base) = match n.status {
        ServiceStatus::Down => ("down", Event::warn(n.at, "Service DOWN")),
        _ => ("up", Event::info(n.at, format!("Service {}", n.status))),
    };
    let explanation = if delivery_enabled {
        format!("Alert sent (service {verb}).")
    } else {
        "Alerts not configured; set notifier.webhook_url to enable.".to_string()
    };
    base.service(&n.service).explain(explanation)
}

/// Log and deliver each notification in order.
///
/// Delivery failures are recorded as WARN events; the alert records were
/// already marked as notified when the notifications were decided.
pub async fn dispatch(
    snapshot: &mut ClusterSnapshot,
    notifier: &dyn Notifier,
    notifications: Vec<Notification>,
) {
    let enabled = notifier.is_enabled();
    for n in notifications {
        snapshot.push_event(notification_event(&n, enabled));
        match notifier.send(&n).await {
            Ok(Delivery::Sent) => {}
            Ok(Delivery::Skipped) => {
                debug!(service = %n.service, status = %n.status, "alert delivery skipped");
            }
            Err(e) => {
                warn!(service = %n.service, status = %n.status, error = %e, "alert delivery failed");
                snapshot.push_event(
                    Event::warn(n.at, format!("Alert send failed: {e}"))
                        .service(&n.service)
                        .explain("Alerting attempted but delivery failed."),
                );
            }
        }
    }
}
