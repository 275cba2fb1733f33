use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, unixepoch())",
        rusqlite::params![SCHEMA_VERSION],
    )?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- AUTOINCREMENT: ids are never reused, so dangling mappings stay dangling.
CREATE TABLE IF NOT EXISTS objects (
    object_id INTEGER PRIMARY KEY AUTOINCREMENT,
    type_tag TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_objects_type ON objects (type_tag);

CREATE TABLE IF NOT EXISTS object_fields (
    object_id INTEGER NOT NULL REFERENCES objects (object_id) ON DELETE CASCADE,
    field_key TEXT NOT NULL,
    value BLOB NOT NULL,
    match_text TEXT,
    PRIMARY KEY (object_id, field_key)
);
CREATE INDEX IF NOT EXISTS idx_object_fields_match ON object_fields (field_key, match_text);

CREATE TABLE IF NOT EXISTS unique_values (
    type_tag TEXT NOT NULL,
    field_key TEXT NOT NULL,
    match_text TEXT NOT NULL,
    object_id INTEGER NOT NULL REFERENCES objects (object_id) ON DELETE CASCADE,
    UNIQUE (type_tag, field_key, match_text)
);
CREATE INDEX IF NOT EXISTS idx_unique_values_object ON unique_values (object_id);

CREATE TABLE IF NOT EXISTS object_links (
    object_id INTEGER NOT NULL REFERENCES objects (object_id) ON DELETE CASCADE,
    relation TEXT NOT NULL,
    target_id INTEGER NOT NULL REFERENCES objects (object_id) ON DELETE CASCADE,
    PRIMARY KEY (object_id, relation, target_id)
);
CREATE INDEX IF NOT EXISTS idx_object_links_target ON object_links (target_id);

CREATE TABLE IF NOT EXISTS external_systems (
    system_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE CHECK (length(name) > 0),
    description TEXT NOT NULL DEFAULT ''
);

-- No foreign key on object_id: a mapping may outlive its target.
CREATE TABLE IF NOT EXISTS external_key_mappings (
    mapping_id INTEGER PRIMARY KEY AUTOINCREMENT,
    system_id INTEGER NOT NULL REFERENCES external_systems (system_id) ON DELETE CASCADE,
    external_key TEXT NOT NULL CHECK (length(external_key) > 0),
    type_tag TEXT NOT NULL,
    object_id INTEGER NOT NULL,
    UNIQUE (system_id, external_key)
);
CREATE INDEX IF NOT EXISTS idx_mappings_target ON external_key_mappings (type_tag, object_id);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn mappings_do_not_reference_objects() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute("INSERT INTO external_systems (name) VALUES ('crm')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO external_key_mappings (system_id, external_key, type_tag, object_id)
             VALUES (1, 'K1', 'House', 42)",
            [],
        )
        .unwrap();
        assert!(conn
            .execute("INSERT INTO object_links (object_id, relation, target_id) VALUES (1, 'r', 2)", [])
            .is_err());
    }
}
