//! Local SQLite persistence for the order collections.
//!
//! Uses rusqlite with WAL mode. The pending collection, the backup
//! collection, and the backup metadata are each stored as a named,
//! atomically replaceable JSON record in the `records` table; a single
//! upsert (or one transaction for multi-record writes) keeps every replace
//! all-or-nothing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{error, info, warn};

use crate::error::SyncError;
use crate::order::{BackupMetadata, Order};
use crate::store::OrderStore;

/// Record names for the collections this engine owns.
const REC_PENDING_ORDERS: &str = "pending_orders";
const REC_BACKUP_ORDERS: &str = "backup_orders";
const REC_BACKUP_METADATA: &str = "backup_metadata";

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Shared handle to the terminal database.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

/// Initialize the database at `{data_dir}/ordervault.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas, and
/// runs any pending migrations. On corruption or open failure, deletes the
/// file and retries once.
pub fn init(data_dir: &Path) -> Result<DbState, SyncError> {
    fs::create_dir_all(data_dir)
        .map_err(|e| SyncError::Storage(format!("create data dir: {e}")))?;

    let db_path = data_dir.join("ordervault.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                // Also remove WAL/SHM files if present
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path)
                .map_err(|e| SyncError::Storage(format!("open after retry: {e}")))?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> Result<Connection, SyncError> {
    let conn =
        Connection::open(path).map_err(|e| SyncError::Storage(format!("sqlite open: {e}")))?;

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )
    .map_err(|e| SyncError::Storage(format!("pragma setup: {e}")))?;

    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> Result<(), SyncError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| SyncError::Storage(format!("create schema_version: {e}")))?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Migration v1: named-record table holding the order collections.
fn migrate_v1(conn: &Connection) -> Result<(), SyncError> {
    conn.execute_batch(
        "
        -- records (atomically replaceable named JSON documents)
        CREATE TABLE IF NOT EXISTS records (
            record_key TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            created_at TEXT DEFAULT (datetime('now'))
        );

        -- Record migration
        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        SyncError::Storage(format!("migration v1: {e}"))
    })?;

    info!("Applied migration v1 (records table)");
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, SyncError> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(|e| SyncError::Storage(format!("table_info {table}: {e}")))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| SyncError::Storage(format!("table_info query: {e}")))?;
    while let Some(row) = rows
        .next()
        .map_err(|e| SyncError::Storage(format!("table_info next: {e}")))?
    {
        let name: String = row
            .get(1)
            .map_err(|e| SyncError::Storage(format!("table_info name: {e}")))?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Migration v2: per-record update tracking for support diagnostics.
fn migrate_v2(conn: &Connection) -> Result<(), SyncError> {
    if !column_exists(conn, "records", "updated_at")? {
        conn.execute_batch("ALTER TABLE records ADD COLUMN updated_at TEXT;")
            .map_err(|e| SyncError::Storage(format!("migration v2 add updated_at: {e}")))?;
    }

    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_records_updated_at ON records(updated_at);

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        SyncError::Storage(format!("migration v2: {e}"))
    })?;

    info!("Applied migration v2 (records updated_at)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Record helpers
// ---------------------------------------------------------------------------

fn read_record(conn: &Connection, key: &str) -> Result<Option<String>, SyncError> {
    conn.query_row(
        "SELECT data FROM records WHERE record_key = ?1",
        params![key],
        |row| row.get(0),
    )
    .map(Some)
    .or_else(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(SyncError::Storage(format!("read record {key}: {other}"))),
    })
}

fn write_record(conn: &Connection, key: &str, data: &str) -> Result<(), SyncError> {
    conn.execute(
        "INSERT INTO records (record_key, data, updated_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(record_key) DO UPDATE SET
            data = excluded.data,
            updated_at = excluded.updated_at",
        params![key, data],
    )
    .map_err(|e| SyncError::Storage(format!("write record {key}: {e}")))?;
    Ok(())
}

fn parse_orders(raw: Option<String>, key: &str) -> Result<Vec<Order>, SyncError> {
    match raw {
        Some(data) => serde_json::from_str(&data)
            .map_err(|e| SyncError::Storage(format!("parse record {key}: {e}"))),
        None => Ok(Vec::new()),
    }
}

// ---------------------------------------------------------------------------
// OrderStore implementation
// ---------------------------------------------------------------------------

impl DbState {
    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SyncError> {
        self.conn
            .lock()
            .map_err(|e| SyncError::Storage(format!("db lock poisoned: {e}")))
    }
}

impl OrderStore for DbState {
    fn pending_orders(&self) -> Result<Vec<Order>, SyncError> {
        let conn = self.lock_conn()?;
        parse_orders(read_record(&conn, REC_PENDING_ORDERS)?, REC_PENDING_ORDERS)
    }

    fn replace_pending_orders(&self, orders: &[Order]) -> Result<(), SyncError> {
        let data = serde_json::to_string(orders)?;
        let conn = self.lock_conn()?;
        write_record(&conn, REC_PENDING_ORDERS, &data)
    }

    fn backup_orders(&self) -> Result<Vec<Order>, SyncError> {
        let conn = self.lock_conn()?;
        parse_orders(read_record(&conn, REC_BACKUP_ORDERS)?, REC_BACKUP_ORDERS)
    }

    fn replace_backup_orders(&self, orders: &[Order]) -> Result<(), SyncError> {
        let metadata = BackupMetadata {
            count: orders.len(),
            last_backup: Utc::now(),
        };
        let orders_json = serde_json::to_string(orders)?;
        let metadata_json = serde_json::to_string(&metadata)?;

        // Orders and metadata land together or not at all.
        let mut conn = self.lock_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| SyncError::Storage(format!("begin backup replace: {e}")))?;
        {
            let mut upsert = |key: &str, data: &str| -> Result<(), SyncError> {
                tx.execute(
                    "INSERT INTO records (record_key, data, updated_at)
                     VALUES (?1, ?2, datetime('now'))
                     ON CONFLICT(record_key) DO UPDATE SET
                        data = excluded.data,
                        updated_at = excluded.updated_at",
                    params![key, data],
                )
                .map_err(|e| SyncError::Storage(format!("write record {key}: {e}")))?;
                Ok(())
            };
            upsert(REC_BACKUP_ORDERS, &orders_json)?;
            upsert(REC_BACKUP_METADATA, &metadata_json)?;
        }
        tx.commit()
            .map_err(|e| SyncError::Storage(format!("commit backup replace: {e}")))?;
        Ok(())
    }

    fn backup_metadata(&self) -> Result<Option<BackupMetadata>, SyncError> {
        let conn = self.lock_conn()?;
        match read_record(&conn, REC_BACKUP_METADATA)? {
            Some(data) => serde_json::from_str(&data)
                .map(Some)
                .map_err(|e| SyncError::Storage(format!("parse backup metadata: {e}"))),
            None => Ok(None),
        }
    }

    fn clear_backup_orders(&self) -> Result<(), SyncError> {
        let mut conn = self.lock_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| SyncError::Storage(format!("begin backup clear: {e}")))?;
        tx.execute(
            "DELETE FROM records WHERE record_key IN (?1, ?2)",
            params![REC_BACKUP_ORDERS, REC_BACKUP_METADATA],
        )
        .map_err(|e| SyncError::Storage(format!("clear backup records: {e}")))?;
        tx.commit()
            .map_err(|e| SyncError::Storage(format!("commit backup clear: {e}")))?;
        Ok(())
    }

    fn last_order(&self) -> Result<Option<Order>, SyncError> {
        let orders = self.pending_orders()?;
        Ok(orders.into_iter().max_by_key(|o| o.created_at))
    }
}
