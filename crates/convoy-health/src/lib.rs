//! convoy-health — liveness/readiness probing and self-healing.
//!
//! Every pass probes each pod of a service once. A pod still inside its
//! liveness initial delay never accumulates failures. Past that, failures
//! count up until the liveness threshold, at which point the pod is killed
//! and dropped from the snapshot; the rollout engine respawns it later in
//! the same pass.
//!
//! # Architecture
//!
//! ```text
//! probe_service(snapshot, service, runtime, now)
//!   ├── runtime.probe(port) → ProbeOutcome (errors count as failure)
//!   ├── evaluate_probe()   → Ready | NotReady | Restart { delay_ms }
//!   └── Restart: counters++, backoff tracker, WARN event, kill, remove
//! ```
//!
//! # Backoff
//!
//! `500ms × 2^min(attempt, 6)`, so 500ms up to a 32s ceiling. The attempt
//! counter lives per service so it survives respawns; one successful probe
//! of any pod of the service resets it.

pub mod checker;
pub mod monitor;

pub use checker::{BACKOFF_BASE_MS, MAX_BACKOFF_EXPONENT, ProbeVerdict, backoff_delay_ms, evaluate_probe};
pub use monitor::{ProbeReport, probe_service};
