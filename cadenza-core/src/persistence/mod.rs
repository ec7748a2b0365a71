//! Persistence collaborators.
//!
//! The dispatch pipeline hands a folded `ChangeSummary` to a
//! `ChangePersistence` implementation, which applies it atomically. Deleting
//! or updating an id that does not exist is a no-op, so an entity created and
//! removed within one unflushed window can be sent as a bare remove.

pub mod load;
pub mod memory;
pub mod save;
pub mod schema;

pub use memory::MemoryPersistence;

use std::path::{Path, PathBuf};

use rusqlite::Connection as SqlConnection;
use thiserror::Error;

use cadenza_types::{ChangeSummary, CompositionId, CompositionMeta, CompositionSnapshot};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("composition {0} not found")]
    NotFound(CompositionId),
    #[error("flush rejected: {0}")]
    Rejected(String),
}

pub type PersistenceResult<T = ()> = Result<T, PersistenceError>;

/// Storage side of the flush: apply one summary for one composition in a
/// single transaction.
pub trait ChangePersistence: Send + Sync {
    fn apply_change_summary(
        &self,
        composition_id: CompositionId,
        summary: &ChangeSummary,
    ) -> PersistenceResult;
}

/// SQLite-backed persistence.
///
/// Opens a connection per call, so flushes may run on any thread.
pub struct SqlitePersistence {
    path: PathBuf,
}

impl SqlitePersistence {
    /// Open (or create) a database at `path` and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let persistence = Self {
            path: path.as_ref().to_path_buf(),
        };
        let conn = persistence.connect()?;
        schema::create_tables(&conn)?;
        Ok(persistence)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> PersistenceResult<SqlConnection> {
        let conn = SqlConnection::open(&self.path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(conn)
    }

    /// Create an empty composition and return its id.
    pub fn create_composition(&self, meta: &CompositionMeta) -> PersistenceResult<CompositionId> {
        let conn = self.connect()?;
        save::insert_composition(&conn, meta)
    }

    /// Read a composition in the snapshot shape a session is bootstrapped from.
    pub fn load_snapshot(&self, composition_id: CompositionId) -> PersistenceResult<CompositionSnapshot> {
        let conn = self.connect()?;
        load::load_snapshot(&conn, composition_id)
    }
}

impl ChangePersistence for SqlitePersistence {
    fn apply_change_summary(
        &self,
        composition_id: CompositionId,
        summary: &ChangeSummary,
    ) -> PersistenceResult {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        save::apply_summary(&tx, composition_id, summary)?;
        tx.commit()?;
        log::debug!(
            target: "core::persistence",
            "composition {}: applied {} pending entities",
            composition_id,
            summary.entity_count()
        );
        Ok(())
    }
}
