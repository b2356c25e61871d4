//! convoy-controller — the reconciliation loop.
//!
//! # Architecture
//!
//! ```text
//! Controller (scheduler)
//!   ├── interval ticker, MissedTickBehavior::Skip
//!   ├── in-flight guard: a tick during a pass is dropped
//!   └── Reconciler::reconcile_once()
//!         ├── StateStore writer gate, load once
//!         ├── per service:
//!         │     convoy_rollout::correct_drift
//!         │     convoy_health::probe_service
//!         │     convoy_rollout::converge
//!         │     convoy_autoscale::autoscale
//!         │     convoy_alert::evaluate + dispatch
//!         └── save once
//! ```
//!
//! `ConvoyConfig` (`convoy.toml`) carries the daemon's settings.

pub mod config;
pub mod error;
pub mod reconciler;
pub mod scheduler;

pub use config::{
    ApiConfig, ControllerConfig, ConvoyConfig, RuntimeConfig, RuntimeMode, StoreBackend,
    StoreConfig,
};
pub use error::{ControllerError, ControllerResult};
pub use reconciler::{PassSummary, Reconciler};
pub use scheduler::{Controller, TickOutcome};
