//! Human-readable rendering of alert notifications.

use chrono::{DateTime, SecondsFormat};
use convoy_state::ServiceStatus;

use crate::machine::Notification;

/// Subject line plus plain-text body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

/// Render `ms` as `1h 2m 3s`, dropping zero hours and minutes.
pub fn format_duration(ms: u64) -> String {
    let secs = ms / 1_000;
    let (h, m, s) = (secs / 3_600, (secs / 60) % 60, secs % 60);
    let mut parts = Vec::with_capacity(3);
    if h > 0 {
        parts.push(format!("{h}h"));
    }
    if m > 0 {
        parts.push(format!("{m}m"));
    }
    parts.push(format!("{s}s"));
    parts.join(" ")
}

/// UTC RFC 3339 with millisecond precision.
pub fn format_timestamp(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn render(n: &Notification, subject_prefix: &str, ui_url: Option<&str>) -> AlertMessage {
    let subject = format!("{subject_prefix}{} is {}", n.service, n.status);
    let digest = if n.digest.is_empty() { "(unknown)" } else { &n.digest };

    let mut lines = vec![
        format!("Service: {}", n.service),
        format!("Status: {}", n.status),
        format!("Desired replicas: {}", n.desired),
        format!("Ready replicas: {}", n.ready),
        format!("Digest: {digest}"),
        format!("Time: {}", format_timestamp(n.at)),
    ];
    if let (ServiceStatus::Up, Some(down)) = (n.status, n.downtime_ms) {
        lines.push(format!("Downtime: {}", format_duration(down)));
    }
    if let Some(url) = ui_url.filter(|u| !u.is_empty()) {
        lines.push(format!("UI: {url}"));
    }

    AlertMessage {
        subject,
        body: lines.join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recovery() -> Notification {
        Notification {
            service: "api".into(),
            status: ServiceStatus::Up,
            desired: 3,
            ready: 3,
            digest: "sha256:abc".into(),
            at: 0,
            downtime_ms: Some(3_723_000),
            forced: false,
        }
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(999), "0s");
        assert_eq!(format_duration(61_000), "1m 1s");
        assert_eq!(format_duration(3_600_000), "1h 0s");
        assert_eq!(format_duration(3_723_000), "1h 2m 3s");
    }

    #[test]
    fn timestamps_are_utc() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_timestamp(1_700_000_000_123), "2023-11-14T22:13:20.123Z");
    }

    #[test]
    fn recovery_message() {
        let msg = render(&recovery(), "[convoy] ", Some("http://ui.local"));
        assert_eq!(msg.subject, "[convoy] api is UP");
        assert_eq!(
            msg.body,
            "Service: api\nStatus: UP\nDesired replicas: 3\nReady replicas: 3\n\
             Digest: sha256:abc\nTime: 1970-01-01T00:00:00.000Z\n\
             Downtime: 1h 2m 3s\nUI: http://ui.local"
        );
    }

    #[test]
    fn down_message_has_no_downtime() {
        let mut n = recovery();
        n.status = ServiceStatus::Down;
        n.digest.clear();
        let msg = render(&n, "", None);
        assert_eq!(msg.subject, "api is DOWN");
        assert!(msg.body.contains("Digest: (unknown)"));
        assert!(!msg.body.contains("Downtime"));
        assert!(!msg.body.contains("UI:"));
    }
}
