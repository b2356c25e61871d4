//! redb table definitions for the Convoy snapshot store.
//!
//! The whole cluster state lives in a single row so that a write
//! transaction replaces it atomically.

use redb::TableDefinition;

/// JSON-serialized `ClusterSnapshot` documents keyed by slot name.
pub const SNAPSHOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshots");

/// Key of the authoritative snapshot row.
pub const CURRENT: &str = "current";
