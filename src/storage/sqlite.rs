//! SQLite-backed crawl state
//!
//! `StateStore` is the only component that touches the `urls` table. Every
//! operation checks a connection out of the pool, runs on the blocking thread
//! pool and commits before returning.

use crate::config::Config;
use crate::state::{UrlKind, UrlStatus};
use crate::storage::pool::ConnectionPool;
use crate::storage::{truncate_error, StorageError, StorageResult, UrlRecord};
use crate::url::validate_url;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Number of rows written per transaction by [`StateStore::add_urls_batch`]
pub const BATCH_CHUNK_SIZE: usize = 500;

/// Cached result of [`StateStore::get_stats`]
type StatsCache = Option<(Instant, BTreeMap<String, i64>)>;

/// Durable URL state for one site
pub struct StateStore {
    path: PathBuf,
    pool: ConnectionPool,
    stats_ttl: Duration,
    stats_cache: Mutex<StatsCache>,
}

impl StateStore {
    /// Opens (or creates) the state database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file; parent directories are created
    /// * `pool_size` - Number of pooled connections
    /// * `busy_timeout` - How long a connection waits on a locked database
    /// * `stats_ttl` - How long `get_stats` results are reused
    pub fn open(
        path: &Path,
        pool_size: usize,
        busy_timeout: Duration,
        stats_ttl: Duration,
    ) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let pool = ConnectionPool::open(path, pool_size, busy_timeout)?;

        Ok(Self {
            path: path.to_path_buf(),
            pool,
            stats_ttl,
            stats_cache: Mutex::new(None),
        })
    }

    /// Opens the state database using the pool settings from `config`
    pub fn open_with_config(path: &Path, config: &Config) -> StorageResult<Self> {
        Self::open(
            path,
            config.db_pool_size,
            config.db_timeout(),
            config.stats_cache_ttl(),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the table and indices if absent
    ///
    /// Already done by [`StateStore::open`]; calling it again is harmless.
    pub async fn initialize(&self) -> StorageResult<()> {
        self.pool
            .with_conn(|conn| Ok(crate::storage::initialize_schema(conn)?))
            .await
    }

    /// Inserts a URL unless it is already tracked
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The URL was inserted
    /// * `Ok(false)` - The URL already existed; the stored row is unchanged
    /// * `Err(StorageError::Validation)` - The URL lacks a scheme/host or is too long
    pub async fn add_url(&self, url: &str, status: UrlStatus, kind: UrlKind) -> StorageResult<bool> {
        validate_url(url)?;

        let url = url.to_string();
        let inserted = self
            .pool
            .with_conn(move |conn| {
                let now = Utc::now().to_rfc3339();
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO urls (url, status, type, retries, discovered_at)
                     VALUES (?1, ?2, ?3, 0, ?4)",
                    params![url, status.to_db_string(), kind.to_db_string(), now],
                )?;
                Ok(changed > 0)
            })
            .await?;

        Ok(inserted)
    }

    /// Inserts many URLs in chunks of [`BATCH_CHUNK_SIZE`]
    ///
    /// Every URL is validated before anything is written; one invalid URL
    /// rejects the whole call. Each chunk commits as its own transaction, so a
    /// failure part-way leaves earlier chunks in place. An empty slice does
    /// nothing.
    ///
    /// # Returns
    ///
    /// The number of rows actually inserted (existing URLs are ignored)
    pub async fn add_urls_batch(
        &self,
        urls: &[String],
        status: UrlStatus,
        kind: UrlKind,
    ) -> StorageResult<usize> {
        if urls.is_empty() {
            return Ok(0);
        }

        for url in urls {
            validate_url(url)?;
        }

        let mut inserted = 0;
        for chunk in urls.chunks(BATCH_CHUNK_SIZE) {
            let chunk = chunk.to_vec();
            inserted += self
                .pool
                .with_conn(move |conn| insert_chunk(conn, &chunk, status, kind))
                .await?;
        }

        Ok(inserted)
    }

    /// Sets a URL's status and last error
    ///
    /// The error is truncated to 500 characters; `None` clears it.
    pub async fn update_status(
        &self,
        url: &str,
        status: UrlStatus,
        error: Option<&str>,
    ) -> StorageResult<()> {
        let url = url.to_string();
        let error = error.map(truncate_error);

        self.pool
            .with_conn(move |conn| {
                let now = Utc::now().to_rfc3339();
                conn.execute(
                    "UPDATE urls SET status = ?2, last_error = ?3, last_try = ?4 WHERE url = ?1",
                    params![url, status.to_db_string(), error, now],
                )?;
                Ok(())
            })
            .await
    }

    /// Increments the retry counter and refreshes `last_try`
    ///
    /// # Returns
    ///
    /// The new retry count
    pub async fn increment_retry(&self, url: &str) -> StorageResult<u32> {
        let url = url.to_string();

        self.pool
            .with_conn(move |conn| {
                let now = Utc::now().to_rfc3339();
                let retries: Option<u32> = conn
                    .query_row(
                        "UPDATE urls SET retries = COALESCE(retries, 0) + 1, last_try = ?2
                         WHERE url = ?1 RETURNING retries",
                        params![url, now],
                        |row| row.get(0),
                    )
                    .optional()?;
                retries.ok_or(StorageError::NotFound(url))
            })
            .await
    }

    /// Puts an interrupted URL back to `pending` unless it already finished
    ///
    /// Returns true when a row was changed.
    pub async fn release_url(&self, url: &str) -> StorageResult<bool> {
        let url = url.to_string();

        self.pool
            .with_conn(move |conn| {
                let changed = conn.execute(
                    "UPDATE urls SET status = ?2 WHERE url = ?1 AND status NOT IN (?3, ?4)",
                    params![
                        url,
                        UrlStatus::Pending.to_db_string(),
                        UrlStatus::Completed.to_db_string(),
                        UrlStatus::Failed.to_db_string()
                    ],
                )?;
                Ok(changed > 0)
            })
            .await
    }

    /// Returns URLs of `kind` that still need work
    ///
    /// That is every `pending` URL plus every `failed` URL whose retry count is
    /// below `max_retries`, oldest discovery first.
    pub async fn get_pending_urls(&self, kind: UrlKind, max_retries: u32) -> StorageResult<Vec<String>> {
        self.pool
            .with_conn(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT url FROM urls
                     WHERE type = ?1
                       AND (status = ?2 OR (status = ?3 AND COALESCE(retries, 0) < ?4))
                     ORDER BY discovered_at, rowid",
                )?;

                let urls = stmt
                    .query_map(
                        params![
                            kind.to_db_string(),
                            UrlStatus::Pending.to_db_string(),
                            UrlStatus::Failed.to_db_string(),
                            max_retries
                        ],
                        |row| row.get(0),
                    )?
                    .collect::<Result<Vec<String>, _>>()?;

                Ok(urls)
            })
            .await
    }

    /// Returns row counts grouped by status
    ///
    /// Results are cached for the configured TTL; `force_refresh` bypasses the
    /// cache.
    pub async fn get_stats(&self, force_refresh: bool) -> StorageResult<BTreeMap<String, i64>> {
        if !force_refresh {
            let cache = self.lock_cache();
            if let Some((at, stats)) = cache.as_ref() {
                if at.elapsed() < self.stats_ttl {
                    return Ok(stats.clone());
                }
            }
        }

        let stats = self
            .pool
            .with_conn(|conn| {
                let mut stmt = conn.prepare_cached("SELECT status, COUNT(*) FROM urls GROUP BY status")?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                    .collect::<Result<BTreeMap<_, _>, _>>()?;
                Ok(rows)
            })
            .await?;

        *self.lock_cache() = Some((Instant::now(), stats.clone()));
        Ok(stats)
    }

    /// Returns row counts grouped by kind and status
    pub async fn get_kind_stats(&self) -> StorageResult<BTreeMap<(String, String), i64>> {
        self.pool
            .with_conn(|conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT COALESCE(type, ''), status, COUNT(*) FROM urls GROUP BY type, status",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            (row.get::<_, String>(0)?, row.get::<_, String>(1)?),
                            row.get::<_, i64>(2)?,
                        ))
                    })?
                    .collect::<Result<BTreeMap<_, _>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Returns every tracked URL
    ///
    /// Used once at startup to rebuild the in-memory seen sets.
    pub async fn all_urls(&self) -> StorageResult<Vec<UrlRecord>> {
        self.pool
            .with_conn(|conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT url, status, type, retries, last_error, last_try, discovered_at
                     FROM urls ORDER BY rowid",
                )?;
                let rows = stmt
                    .query_map([], row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Looks up a single URL
    pub async fn get_url(&self, url: &str) -> StorageResult<Option<UrlRecord>> {
        let url = url.to_string();
        self.pool
            .with_conn(move |conn| {
                let record = conn
                    .query_row(
                        "SELECT url, status, type, retries, last_error, last_try, discovered_at
                         FROM urls WHERE url = ?1",
                        params![url],
                        row_to_record,
                    )
                    .optional()?;
                Ok(record)
            })
            .await
    }

    /// Most frequent `last_error` values among failed URLs
    pub async fn top_errors(&self, limit: usize) -> StorageResult<Vec<(String, i64)>> {
        self.pool
            .with_conn(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT last_error, COUNT(*) AS n FROM urls
                     WHERE status = ?1 AND last_error IS NOT NULL
                     GROUP BY last_error
                     ORDER BY n DESC, last_error
                     LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![UrlStatus::Failed.to_db_string(), limit as i64], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Closes the connection pool; later calls fail with `PoolClosed`
    pub fn close(&self) {
        self.pool.close();
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, StatsCache> {
        self.stats_cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn insert_chunk(
    conn: &mut Connection,
    chunk: &[String],
    status: UrlStatus,
    kind: UrlKind,
) -> StorageResult<usize> {
    let now = Utc::now().to_rfc3339();
    let tx = conn.transaction()?;
    let mut inserted = 0;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT OR IGNORE INTO urls (url, status, type, retries, discovered_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
        )?;
        for url in chunk {
            inserted += stmt.execute(params![
                url,
                status.to_db_string(),
                kind.to_db_string(),
                now
            ])?;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<UrlRecord> {
    let status: String = row.get(1)?;
    let kind: Option<String> = row.get(2)?;
    Ok(UrlRecord {
        url: row.get(0)?,
        status: UrlStatus::from_db_string(&status).unwrap_or(UrlStatus::Pending),
        kind: kind.as_deref().and_then(UrlKind::from_db_string),
        retries: row.get::<_, Option<u32>>(3)?.unwrap_or(0),
        last_error: row.get(4)?,
        last_try: row.get(5)?,
        discovered_at: row.get(6)?,
    })
}
