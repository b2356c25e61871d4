//! Prometheus text exposition format.

use std::collections::BTreeMap;
use std::fmt::Write;

use convoy_state::{ClusterSnapshot, EventLevel};

/// Render per-service pod gauges, restart and event counters, and the
/// `controller_up` gauge.
pub fn render_prometheus(snapshot: &ClusterSnapshot) -> String {
    let mut out = String::new();

    header(&mut out, "controller_up", "gauge", "Controller is running.");
    out.push_str("controller_up 1\n");

    header(&mut out, "convoy_pods_ready", "gauge", "Ready pods per service.");
    for name in snapshot.services.keys() {
        sample(&mut out, "convoy_pods_ready", name, snapshot.ready_count(name));
    }

    header(&mut out, "convoy_pods_desired", "gauge", "Desired replicas per service.");
    for (name, svc) in &snapshot.services {
        sample(&mut out, "convoy_pods_desired", name, svc.replicas);
    }

    header(&mut out, "convoy_pods_total", "gauge", "Active pods per service.");
    for name in snapshot.services.keys() {
        sample(&mut out, "convoy_pods_total", name, snapshot.active_count(name));
    }

    header(&mut out, "convoy_restarts_total", "counter", "Pod restarts per service.");
    for name in snapshot.services.keys() {
        sample(&mut out, "convoy_restarts_total", name, snapshot.restarts(name));
    }

    header(&mut out, "convoy_events_total", "counter", "Events by service and level.");
    let mut counts: BTreeMap<(&str, EventLevel), u64> = BTreeMap::new();
    for ev in &snapshot.events {
        let service = ev.service.as_deref().unwrap_or("unknown");
        *counts.entry((service, ev.level)).or_default() += 1;
    }
    for ((service, level), count) in counts {
        let _ = writeln!(
            out,
            "convoy_events_total{{service=\"{}\",level=\"{}\"}} {count}",
            escape(service),
            level
        );
    }

    out
}

fn header(out: &mut String, name: &str, kind: &str, help: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

fn sample(out: &mut String, name: &str, service: &str, value: impl std::fmt::Display) {
    let _ = writeln!(out, "{name}{{service=\"{}\"}} {value}", escape(service));
}

fn escape(label: &str) -> String {
    label
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
