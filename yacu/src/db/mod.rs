//! Database layer for yacu.
//!
//! SQLite persistence for the freshness cache. The connection is shared
//! behind a mutex; domain stores such as [`RemoteImageTable`] wrap it.

mod remote_images;
mod schema;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OptionalExtension};

use yacu_shared::errors::{YacuError, YacuResult};

pub use remote_images::{RemoteImageRow, RemoteImageStore, RemoteImageTable};

/// Helper macro to convert rusqlite errors to YacuError.
macro_rules! db_err {
    ($result:expr) => {
        $result.map_err(|e| YacuError::Database(e.to_string()))
    };
}

pub(crate) use db_err;

/// SQLite database handle.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database.
    pub fn open(db_path: &Path) -> YacuResult<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = db_err!(Connection::open(db_path))?;
        Self::configure(conn)
    }

    /// Private database that disappears with the handle.
    pub fn open_in_memory() -> YacuResult<Self> {
        let conn = db_err!(Connection::open_in_memory())?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> YacuResult<Self> {
        db_err!(conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=FULL;
            PRAGMA busy_timeout=100000;
            "
        ))?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Create the schema on a new database; refuse any other version.
    fn init_schema(conn: &Connection) -> YacuResult<()> {
        db_err!(conn.execute_batch(schema::SCHEMA_VERSION_TABLE))?;

        let current_version: Option<i32> = db_err!(
            conn.query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
        )?;

        match current_version {
            None => Self::apply_full_schema(conn)?,
            Some(v) if v == schema::SCHEMA_VERSION => {}
            Some(v) => {
                return Err(YacuError::Database(format!(
                    "Schema version mismatch: database has v{}, process expects v{}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
        }

        Ok(())
    }

    fn apply_full_schema(conn: &Connection) -> YacuResult<()> {
        for sql in schema::all_schemas() {
            db_err!(conn.execute_batch(sql))?;
        }

        let now = Utc::now().to_rfc3339();
        db_err!(conn.execute(
            "INSERT INTO schema_version (id, version, updated_at) VALUES (1, ?1, ?2)",
            rusqlite::params![schema::SCHEMA_VERSION, now],
        ))?;

        tracing::info!(
            "Initialized database schema version {}",
            schema::SCHEMA_VERSION
        );
        Ok(())
    }
}
