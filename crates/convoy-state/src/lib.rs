//! convoy-state — the cluster snapshot model and its store.
//!
//! The whole cluster (services, pods, events, counters, alert records) is
//! one `ClusterSnapshot` document. The reconciler loads it once per pass,
//! mutates it in memory, and saves it once at the end; a
//! `SnapshotRepository` guarantees that no reader ever observes a
//! half-written document.
//!
//! # Backends
//!
//! - **`RedbSnapshotStore`** — one JSON row in a redb table, replaced inside
//!   a write transaction. Also available in-memory for tests.
//! - **`JsonSnapshotFile`** — pretty JSON on disk, written to a temp file
//!   and renamed into place.

pub mod clock;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock, epoch_millis};
pub use error::{StateError, StateResult};
pub use store::{JsonSnapshotFile, RedbSnapshotStore, SnapshotRepository, StateStore};
pub use types::*;
