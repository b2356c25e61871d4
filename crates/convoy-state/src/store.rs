//! StateStore — atomic whole-snapshot persistence for Convoy.
//!
//! A `SnapshotRepository` loads and saves the entire `ClusterSnapshot` as
//! one document. Readers always see either the previous or the new
//! document in full. Two backends are provided: a redb database (one row,
//! replaced inside a write transaction) and a JSON file (written to a temp
//! file and renamed into place).

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::{CURRENT, SNAPSHOTS};
use crate::types::{ClusterSnapshot, Event};

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Load/save contract for the cluster snapshot.
///
/// `load` returns an empty document when nothing has been saved yet.
pub trait SnapshotRepository: Send + Sync {
    fn load(&self) -> StateResult<ClusterSnapshot>;
    fn save(&self, snapshot: &ClusterSnapshot) -> StateResult<()>;
}

// ── redb backend ───────────────────────────────────────────────────

/// Snapshot repository backed by redb.
#[derive(Clone)]
pub struct RedbSnapshotStore {
    db: Arc<Database>,
}

impl RedbSnapshotStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "redb snapshot store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory snapshot store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

impl SnapshotRepository for RedbSnapshotStore {
    fn load(&self) -> StateResult<ClusterSnapshot> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
        match table.get(CURRENT).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize)),
            None => Ok(ClusterSnapshot::default()),
        }
    }

    fn save(&self, snapshot: &ClusterSnapshot) -> StateResult<()> {
        let value = serde_json::to_vec(snapshot).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SNAPSHOTS).map_err(map_err!(Table))?;
            table
                .insert(CURRENT, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

// ── JSON file backend ──────────────────────────────────────────────

/// Snapshot repository backed by a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonSnapshotFile {
    path: PathBuf,
}

impl JsonSnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotRepository for JsonSnapshotFile {
    fn load(&self) -> StateResult<ClusterSnapshot> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(map_err!(Deserialize)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClusterSnapshot::default()),
            Err(e) => Err(StateError::Io(e)),
        }
    }

    fn save(&self, snapshot: &ClusterSnapshot) -> StateResult<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        // The temp file must live on the same filesystem for the rename to be atomic.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, snapshot).map_err(map_err!(Serialize))?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| StateError::Write(e.to_string()))?;
        Ok(())
    }
}

// ── StateStore ─────────────────────────────────────────────────────

/// Shared handle to the authoritative snapshot.
///
/// `StateStore` is `Clone` + `Send` + `Sync`. Every in-process writer takes
/// the writer gate for its whole read-modify-write, so the reconciler and
/// API mutations never interleave. Plain reads do not take the gate.
#[derive(Clone)]
pub struct StateStore {
    repo: Arc<dyn SnapshotRepository>,
    writer: Arc<Mutex<()>>,
}

impl StateStore {
    pub fn from_repository(repo: Arc<dyn SnapshotRepository>) -> Self {
        Self {
            repo,
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Open a redb-backed store at `path`.
    pub fn open(path: &Path) -> StateResult<Self> {
        Ok(Self::from_repository(Arc::new(RedbSnapshotStore::open(path)?)))
    }

    /// Open a JSON-file-backed store at `path`.
    pub fn open_json(path: &Path) -> Self {
        debug!(?path, "json snapshot store opened");
        Self::from_repository(Arc::new(JsonSnapshotFile::new(path)))
    }

    /// In-memory redb store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        Ok(Self::from_repository(Arc::new(
            RedbSnapshotStore::open_in_memory()?,
        )))
    }

    /// Read the current snapshot.
    pub fn load(&self) -> StateResult<ClusterSnapshot> {
        self.repo.load()
    }

    /// Replace the stored snapshot, bumping its version.
    ///
    /// Callers that loaded the snapshot for modification should hold the
    /// writer gate (see [`StateStore::writer`]) across load and save.
    pub fn save(&self, snapshot: &mut ClusterSnapshot) -> StateResult<()> {
        snapshot.version += 1;
        self.repo.save(snapshot)?;
        debug!(version = snapshot.version, "snapshot saved");
        Ok(())
    }

    /// Acquire the writer gate.
    pub async fn writer(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.writer).lock_owned().await
    }

    /// Run a read-modify-write under the writer gate.
    ///
    /// The snapshot is saved only when `f` returns `Ok`.
    pub async fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut ClusterSnapshot) -> Result<T, E>,
        E: From<StateError>,
    {
        let _guard = self.writer().await;
        let mut snapshot = self.load()?;
        let out = f(&mut snapshot)?;
        self.save(&mut snapshot)?;
        Ok(out)
    }

    /// Append a single event to the stored log.
    pub async fn record_event(&self, event: Event) -> StateResult<()> {
        self.update(|snap| {
            snap.push_event(event);
            Ok::<(), StateError>(())
        })
        .await
    }
}
