//! Database schema definitions
//!
//! This module contains the SQL schema for the per-site state database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per URL ever discovered for this site
CREATE TABLE IF NOT EXISTS urls (
    url TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'pending',
    type TEXT,
    retries INTEGER DEFAULT 0,
    last_error TEXT,
    last_try TIMESTAMP,
    discovered_at TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_status_type ON urls(status, type);
CREATE INDEX IF NOT EXISTS idx_retries ON urls(retries);
CREATE INDEX IF NOT EXISTS idx_discovered_at ON urls(discovered_at);
CREATE INDEX IF NOT EXISTS idx_last_try ON urls(last_try);
CREATE INDEX IF NOT EXISTS idx_status_type_retries ON urls(status, type, retries);
"#;

/// Per-connection settings applied to every pooled connection
pub const CONNECTION_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA cache_size = -64000;
    PRAGMA temp_store = MEMORY;
";

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    1
}
