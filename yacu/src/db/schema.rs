//! Database schema definitions.

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Schema version tracking table.
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Last known registry state per image.
///
/// `name` is the familiar `repo:tag` string. Timestamps are RFC 3339 text.
pub const REMOTE_IMAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS remote_images (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    domain TEXT NOT NULL,
    created TEXT NOT NULL,
    digest TEXT NOT NULL,
    last_check TEXT NOT NULL,
    UNIQUE (name, domain)
);

CREATE INDEX IF NOT EXISTS idx_remote_images_name ON remote_images(name);
"#;

/// Get all schema creation statements.
pub fn all_schemas() -> Vec<&'static str> {
    vec![SCHEMA_VERSION_TABLE, REMOTE_IMAGES_TABLE]
}
