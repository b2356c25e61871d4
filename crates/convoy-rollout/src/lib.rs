//! convoy-rollout — converging a service's pods toward its declaration.
//!
//! Runs after probing, so it sees post-probe readiness and never sees pods
//! the health engine already removed.
//!
//! # Components
//!
//! - **`plan`** — pure arithmetic: how many new-digest pods a canary step
//!   wants, when a step may advance, and which pods to kill first.
//! - **`engine`** — applies a plan through the pod runtime: drift
//!   correction, immediate (blue/green) convergence, staged (canary)
//!   convergence with a replica cap.
//!
//! Every spawn and kill is recorded in the event log.

pub mod engine;
pub mod plan;

pub use engine::{ConvergeReport, converge, correct_drift};
pub use plan::{
    current_step_percent, desired_new_count, effective_pause_ms, pause_elapsed, staged_victims,
    surplus_victims,
};
