//! convoy-autoscale — one-step-per-pass replica adjustment from CPU load.
//!
//! ```text
//! cpu > target        && replicas < max  → replicas + 1
//! cpu < target × 0.5  && replicas > min  → replicas - 1
//! otherwise                              → unchanged
//! ```
//!
//! There is no cooldown and no hysteresis beyond the half-target band.
//! The new replica count takes effect on the next pass's convergence.

pub mod scaler;

pub use scaler::{ScaleDecision, autoscale, evaluate};
