//! Persisted registry state per image name.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};
use yacu_shared::errors::{YacuError, YacuResult};

use super::{Database, db_err};

/// One row of the `remote_images` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteImageRow {
    pub id: i64,
    /// Familiar `repo:tag`.
    pub name: String,
    pub domain: String,
    pub created: DateTime<Utc>,
    pub digest: String,
    pub last_check: DateTime<Utc>,
}

/// Row store behind the freshness cache.
///
/// Absence of a row means the image was never checked; that is reported as
/// `Ok(None)`, not as an error.
pub trait RemoteImageStore: Send + Sync {
    fn get_by_name(&self, name: &str) -> YacuResult<Option<RemoteImageRow>>;

    /// Insert a freshly checked image. An existing `(name, domain)` row is
    /// overwritten in place and keeps its id.
    fn insert(
        &self,
        name: &str,
        domain: &str,
        created: DateTime<Utc>,
        digest: &str,
        checked_at: DateTime<Utc>,
    ) -> YacuResult<i64>;

    fn update_created_and_digest(
        &self,
        row_id: i64,
        created: DateTime<Utc>,
        digest: &str,
    ) -> YacuResult<()>;

    fn update_last_check(&self, row_id: i64, checked_at: DateTime<Utc>) -> YacuResult<()>;
}

/// [`RemoteImageStore`] backed by SQLite.
#[derive(Clone)]
pub struct RemoteImageTable {
    db: Database,
}

impl RemoteImageTable {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl RemoteImageStore for RemoteImageTable {
    fn get_by_name(&self, name: &str) -> YacuResult<Option<RemoteImageRow>> {
        let conn = self.db.conn();
        let raw = db_err!(
            conn.query_row(
                "SELECT id, name, domain, created, digest, last_check
                 FROM remote_images WHERE name = ?1",
                [name],
                RawRow::from_row,
            )
            .optional()
        )?;

        raw.map(RawRow::into_row).transpose()
    }

    fn insert(
        &self,
        name: &str,
        domain: &str,
        created: DateTime<Utc>,
        digest: &str,
        checked_at: DateTime<Utc>,
    ) -> YacuResult<i64> {
        let conn = self.db.conn();
        db_err!(conn.query_row(
            "INSERT INTO remote_images (name, domain, created, digest, last_check)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (name, domain) DO UPDATE SET
                created = excluded.created,
                digest = excluded.digest,
                last_check = excluded.last_check
             RETURNING id",
            rusqlite::params![
                name,
                domain,
                created.to_rfc3339(),
                digest,
                checked_at.to_rfc3339()
            ],
            |row| row.get(0),
        ))
    }

    fn update_created_and_digest(
        &self,
        row_id: i64,
        created: DateTime<Utc>,
        digest: &str,
    ) -> YacuResult<()> {
        let conn = self.db.conn();
        let changed = db_err!(conn.execute(
            "UPDATE remote_images SET created = ?1, digest = ?2 WHERE id = ?3",
            rusqlite::params![created.to_rfc3339(), digest, row_id],
        ))?;
        expect_one(changed, row_id)
    }

    fn update_last_check(&self, row_id: i64, checked_at: DateTime<Utc>) -> YacuResult<()> {
        let conn = self.db.conn();
        let changed = db_err!(conn.execute(
            "UPDATE remote_images SET last_check = ?1 WHERE id = ?2",
            rusqlite::params![checked_at.to_rfc3339(), row_id],
        ))?;
        expect_one(changed, row_id)
    }
}

fn expect_one(changed: usize, row_id: i64) -> YacuResult<()> {
    if changed == 0 {
        return Err(YacuError::Database(format!(
            "remote image row {} does not exist",
            row_id
        )));
    }
    Ok(())
}

/// Row as stored, before timestamp parsing.
struct RawRow {
    id: i64,
    name: String,
    domain: String,
    created: String,
    digest: String,
    last_check: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            domain: row.get(2)?,
            created: row.get(3)?,
            digest: row.get(4)?,
            last_check: row.get(5)?,
        })
    }

    fn into_row(self) -> YacuResult<RemoteImageRow> {
        Ok(RemoteImageRow {
            created: parse_timestamp(&self.created, "created", self.id)?,
            last_check: parse_timestamp(&self.last_check, "last_check", self.id)?,
            id: self.id,
            name: self.name,
            domain: self.domain,
            digest: self.digest,
        })
    }
}

fn parse_timestamp(raw: &str, column: &str, row_id: i64) -> YacuResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            YacuError::Database(format!(
                "row {} has malformed {} '{}': {}",
                row_id, column, raw, e
            ))
        })
}
