//! libSQL storage layer for harvested players.
//!
//! The [`Storage`] struct wraps a local libSQL database holding a single
//! `players` table keyed by account identifier. Writes are insert-or-ignore,
//! so re-ingesting a player is a no-op rather than an error.
//!
//! All writes go through [`PlayerBatch`], an open transaction that the
//! caller commits or rolls back explicitly. Dropping a batch without
//! committing discards it.

mod migrations;

use std::path::Path;

use libsql::{Connection, Database, Transaction, params};
use neuraltheft_shared::{EnrichedRecord, HarvestError, Result};

const INSERT_PLAYER: &str =
    "INSERT OR IGNORE INTO players (uuid, name, tag, twitch) VALUES (?1, ?2, ?3, ?4)";

/// Whether an insert wrote a new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row with this identifier already existed; nothing was written.
    Duplicate,
}

impl InsertOutcome {
    fn from_rows_changed(changed: u64) -> Self {
        if changed == 0 {
            Self::Duplicate
        } else {
            Self::Inserted
        }
    }
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and ensure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| HarvestError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| HarvestError::Storage(format!("cannot open {}: {e}", path.display())))?;

        let conn = db
            .connect()
            .map_err(|e| HarvestError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        HarvestError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Player operations
    // -----------------------------------------------------------------------

    /// Open a transaction for a batch of inserts.
    pub async fn begin_batch(&self) -> Result<PlayerBatch> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| HarvestError::Storage(format!("cannot begin transaction: {e}")))?;
        Ok(PlayerBatch { tx, pending: 0 })
    }

    /// Number of stored players.
    pub async fn count_players(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM players", params![])
            .await
            .map_err(|e| HarvestError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|n| n as u64)
                .map_err(|e| HarvestError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(HarvestError::Storage(e.to_string())),
        }
    }

    /// Get a player by identifier.
    pub async fn get_player(&self, identifier: &str) -> Result<Option<EnrichedRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT uuid, name, tag, twitch FROM players WHERE uuid = ?1",
                params![identifier],
            )
            .await
            .map_err(|e| HarvestError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(HarvestError::Storage(e.to_string())),
        }
    }

    /// List all players in insertion order.
    pub async fn list_players(&self) -> Result<Vec<EnrichedRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT uuid, name, tag, twitch FROM players ORDER BY rowid",
                params![],
            )
            .await
            .map_err(|e| HarvestError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_record(&row)?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// An open write transaction over the `players` table.
pub struct PlayerBatch {
    tx: Transaction,
    pending: usize,
}

impl PlayerBatch {
    /// Insert-or-ignore one player inside this transaction.
    pub async fn insert(&mut self, record: &EnrichedRecord) -> Result<InsertOutcome> {
        let changed = self
            .tx
            .execute(
                INSERT_PLAYER,
                params![
                    record.identifier.as_str(),
                    record.display_name.as_str(),
                    record.discriminator_tag.as_str(),
                    record.external_handle.as_str(),
                ],
            )
            .await
            .map_err(|e| HarvestError::Storage(e.to_string()))?;
        self.pending += 1;
        Ok(InsertOutcome::from_rows_changed(changed))
    }

    /// Statements executed since the transaction opened.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Make every insert in this batch durable.
    pub async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| HarvestError::Storage(format!("commit failed: {e}")))
    }

    /// Discard every insert in this batch.
    pub async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| HarvestError::Storage(format!("rollback failed: {e}")))
    }
}

/// Convert a database row to an [`EnrichedRecord`].
fn row_to_record(row: &libsql::Row) -> Result<EnrichedRecord> {
    Ok(EnrichedRecord {
        identifier: row
            .get::<String>(0)
            .map_err(|e| HarvestError::Storage(e.to_string()))?,
        display_name: row.get::<String>(1).unwrap_or_default(),
        discriminator_tag: row.get::<String>(2).unwrap_or_default(),
        external_handle: row.get::<String>(3).unwrap_or_default(),
    })
}
