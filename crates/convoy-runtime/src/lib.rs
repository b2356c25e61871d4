//! convoy-runtime — the pod runtime contract and its implementations.
//!
//! The controller never starts processes itself. It asks a `PodRuntime`
//! to spawn, kill, and probe pods, and treats every failure of those calls
//! as transient.
//!
//! # Architecture
//!
//! ```text
//! Reconciler
//!   └── &dyn PodRuntime
//!         ├── SimulatedRuntime (in-process, clock-driven)
//!         │     ports 10000.., ready/live 1s after spawn,
//!         │     killed pods drain 3s answering 503
//!         └── AgentClient (reqwest)
//!               POST /spawn  POST /kill  GET /probe?port=
//! ```

pub mod agent;
pub mod contract;
pub mod error;
pub mod simulated;

pub use agent::AgentClient;
pub use contract::{PodRuntime, ProbeOutcome, SpawnRequest, SpawnedPod};
pub use error::{RuntimeError, RuntimeResult};
pub use simulated::{SimulatedRuntime, SimulationConfig};
