//! Durable resolution store
//!
//! Records are keyed by (name, version, system, channel) with a unique
//! index and carry an absolute `expires_at`. Expired records are never
//! returned, even before the sweep physically removes them.

use crate::error::{FlakepinError, FlakepinResult};
use crate::model::{CacheEntry, DurableResolutionRecord, ResolutionSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The non-channel part of a record key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    pub name: String,
    pub version: String,
    pub system: String,
}

/// Durable, cross-process resolution storage
#[async_trait]
pub trait ResolutionStore: Send + Sync {
    /// Create the unique key index and the expiry index
    async fn ensure_indexes(&self) -> FlakepinResult<()>;

    /// Live record for `key` in the most preferred of `channels`
    async fn find_active(
        &self,
        key: &RecordKey,
        channels: &[String],
        now: DateTime<Utc>,
    ) -> FlakepinResult<Option<DurableResolutionRecord>>;

    /// Insert or replace the record for `key` + `entry.channel`, expiring at
    /// `now + ttl`
    async fn upsert(
        &self,
        key: &RecordKey,
        entry: &CacheEntry,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> FlakepinResult<DurableResolutionRecord>;

    /// Physically remove records that expired at or before `now`
    async fn purge_expired(&self, now: DateTime<Utc>) -> FlakepinResult<usize>;
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS resolutions (
        name            TEXT NOT NULL,
        version         TEXT NOT NULL,
        system          TEXT NOT NULL,
        channel         TEXT NOT NULL,
        attribute_path  TEXT NOT NULL,
        commit_hash     TEXT NOT NULL,
        source          TEXT NOT NULL,
        resolved_at     INTEGER NOT NULL,
        expires_at      INTEGER NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_resolutions_key
        ON resolutions (name, version, system, channel);
    CREATE INDEX IF NOT EXISTS idx_resolutions_expires_at
        ON resolutions (expires_at);
";

/// SQLite-backed [`ResolutionStore`]
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> FlakepinResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FlakepinError::io(format!("creating store directory {}", parent.display()), e)
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| FlakepinError::Store(format!("opening {}: {e}", path.display())))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| FlakepinError::Store(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| FlakepinError::Store(e.to_string()))?;

        debug!("Opened resolution store at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    /// Private in-memory database
    pub fn open_in_memory() -> FlakepinResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| FlakepinError::Store(e.to_string()))?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run blocking SQLite work off the async runtime
    async fn with_conn<T, F>(&self, f: F) -> rusqlite::Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        match tokio::task::spawn_blocking(move || f(&conn.lock())).await {
            Ok(result) => result,
            Err(e) => Err(rusqlite::Error::ToSqlConversionFailure(Box::new(e))),
        }
    }
}

fn store_err(e: rusqlite::Error) -> FlakepinError {
    FlakepinError::Store(e.to_string())
}

fn from_millis(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(0, ms))
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<DurableResolutionRecord> {
    let source: String = row.get(6)?;
    Ok(DurableResolutionRecord {
        name: row.get(0)?,
        version: row.get(1)?,
        system: row.get(2)?,
        channel: row.get(3)?,
        attribute_path: row.get(4)?,
        commit_hash: row.get(5)?,
        source: ResolutionSource::from_stored(&source),
        resolved_at: from_millis(row.get(7)?)?,
        expires_at: from_millis(row.get(8)?)?,
    })
}

#[async_trait]
impl ResolutionStore for SqliteStore {
    async fn ensure_indexes(&self) -> FlakepinResult<()> {
        self.with_conn(|conn| conn.execute_batch(SCHEMA))
            .await
            .map_err(|e| FlakepinError::StoreIndex(e.to_string()))
    }

    async fn find_active(
        &self,
        key: &RecordKey,
        channels: &[String],
        now: DateTime<Utc>,
    ) -> FlakepinResult<Option<DurableResolutionRecord>> {
        let key = key.clone();
        let now_ms = now.timestamp_millis();

        let live = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT name, version, system, channel, attribute_path, commit_hash,
                            source, resolved_at, expires_at
                     FROM resolutions
                     WHERE name = ?1 AND version = ?2 AND system = ?3 AND expires_at > ?4",
                )?;
                let rows = stmt.query_map(
                    params![key.name, key.version, key.system, now_ms],
                    row_to_record,
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await
            .map_err(store_err)?;

        // Channel preference order wins over recency
        let best = live
            .into_iter()
            .filter(|r| !r.is_expired(now))
            .filter_map(|r| {
                let rank = channels.iter().position(|c| c == &r.channel)?;
                Some((rank, r))
            })
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, r)| r);

        Ok(best)
    }

    async fn upsert(
        &self,
        key: &RecordKey,
        entry: &CacheEntry,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> FlakepinResult<DurableResolutionRecord> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| FlakepinError::Store(format!("invalid TTL: {e}")))?;
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| FlakepinError::Store("TTL overflows timestamp".to_string()))?;

        let record = DurableResolutionRecord {
            name: key.name.clone(),
            version: key.version.clone(),
            system: key.system.clone(),
            channel: entry.channel.clone(),
            attribute_path: entry.attribute_path.clone(),
            commit_hash: entry.commit_hash.clone(),
            source: entry.source,
            resolved_at: now,
            expires_at,
        };

        let row = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO resolutions (name, version, system, channel, attribute_path,
                                          commit_hash, source, resolved_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(name, version, system, channel) DO UPDATE SET
                    attribute_path = excluded.attribute_path,
                    commit_hash = excluded.commit_hash,
                    source = excluded.source,
                    resolved_at = excluded.resolved_at,
                    expires_at = excluded.expires_at",
                params![
                    row.name,
                    row.version,
                    row.system,
                    row.channel,
                    row.attribute_path,
                    row.commit_hash,
                    row.source.as_str(),
                    row.resolved_at.timestamp_millis(),
                    row.expires_at.timestamp_millis(),
                ],
            )
        })
        .await
        .map_err(store_err)?;

        let swept = self.purge_expired(now).await?;
        if swept > 0 {
            debug!("Swept {} expired resolution records", swept);
        }
        Ok(record)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> FlakepinResult<usize> {
        let now_ms = now.timestamp_millis();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM resolutions WHERE expires_at <= ?1", params![now_ms])
        })
        .await
        .map_err(store_err)
    }
}
