//! convoy-metrics — Prometheus exposition of the cluster snapshot.
//!
//! Everything is derived from a `ClusterSnapshot` at render time; nothing
//! is collected in between.

pub mod prometheus;

pub use prometheus::render_prometheus;
