//! SQLite-backed synonym store. Persistent across runs and shareable between processes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{merge_estimate, rank, RankedReplacement, SynonymEntry, SynonymStore};
use crate::error::StoreError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Table `synonym_stats(word, replacement, estimate, count)`.
///
/// Each merge is one `BEGIN IMMEDIATE` transaction: the write lock is taken before the
/// read, so concurrent writers (threads or processes) apply merges one at a time.
pub struct SqliteSynonymStore {
    db_path: PathBuf,
}

impl SqliteSynonymStore {
    /// Opens (or creates) the database and ensures the table exists.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = open(&db_path)?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS synonym_stats (
                word TEXT NOT NULL,
                replacement TEXT NOT NULL,
                estimate REAL NOT NULL,
                count INTEGER NOT NULL,
                PRIMARY KEY (word, replacement)
            )
            "#,
            [],
        )?;
        Ok(Self { db_path })
    }
}

fn open(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

#[async_trait]
impl SynonymStore for SqliteSynonymStore {
    async fn lookup(&self, word: &str) -> Result<Vec<RankedReplacement>, StoreError> {
        let word = word.to_lowercase();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            let mut stmt = conn.prepare(
                "SELECT replacement, estimate, count FROM synonym_stats WHERE word = ?1",
            )?;
            let rows = stmt.query_map(params![word], |row| {
                Ok(RankedReplacement {
                    replacement: row.get(0)?,
                    estimate: row.get(1)?,
                    count: row.get::<_, i64>(2)? as u64,
                })
            })?;
            let mut ranked = rows.collect::<Result<Vec<_>, _>>()?;
            rank(&mut ranked);
            Ok::<_, StoreError>(ranked)
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    async fn merge(&self, word: &str, replacement: &str, delta: f64) -> Result<f64, StoreError> {
        let word = word.to_lowercase();
        let replacement = replacement.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = open(&db_path)?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current: Option<(f64, i64)> = tx
                .query_row(
                    "SELECT estimate, count FROM synonym_stats WHERE word = ?1 AND replacement = ?2",
                    params![word, replacement],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let (estimate, count) =
                merge_estimate(current.map(|(e, c)| (e, c.max(0) as u64)), delta);
            tx.execute(
                "INSERT OR REPLACE INTO synonym_stats (word, replacement, estimate, count) VALUES (?1, ?2, ?3, ?4)",
                params![word, replacement, estimate, count as i64],
            )?;
            tx.commit()?;
            Ok::<_, StoreError>(estimate)
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }

    async fn entries(&self) -> Result<Vec<SynonymEntry>, StoreError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open(&db_path)?;
            let mut stmt = conn.prepare(
                "SELECT word, replacement, estimate, count FROM synonym_stats ORDER BY word, replacement",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(SynonymEntry {
                    word: row.get(0)?,
                    replacement: row.get(1)?,
                    estimate: row.get(2)?,
                    count: row.get::<_, i64>(3)? as u64,
                })
            })?;
            let entries = rows.collect::<Result<Vec<_>, _>>()?;
            Ok::<_, StoreError>(entries)
        })
        .await
        .map_err(|e| StoreError::Storage(e.to_string()))?
    }
}
