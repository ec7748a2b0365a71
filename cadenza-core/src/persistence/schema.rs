use rusqlite::{params, Connection, Result as SqlResult};

/// Schema version for the relational format.
pub const SCHEMA_VERSION: i32 = 1;

/// Create all tables if they do not exist yet and record the schema version.
pub fn create_tables(conn: &Connection) -> SqlResult<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
        params![SCHEMA_VERSION],
    )?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS compositions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    bpm REAL NOT NULL DEFAULT 120.0,
    updated_at TEXT
);

-- Entity ids are client-generated and unique per composition.

CREATE TABLE IF NOT EXISTS audio_nodes (
    composition_id INTEGER NOT NULL,
    id INTEGER NOT NULL,
    node_type TEXT NOT NULL,
    label TEXT NOT NULL,
    x REAL NOT NULL,
    y REAL NOT NULL,
    -- sparse JSON object of overridden properties
    properties TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (composition_id, id)
);

CREATE TABLE IF NOT EXISTS audio_edges (
    composition_id INTEGER NOT NULL,
    id INTEGER NOT NULL,
    source_node INTEGER NOT NULL,
    source_socket INTEGER NOT NULL,
    target_node INTEGER NOT NULL,
    target_socket INTEGER NOT NULL,
    PRIMARY KEY (composition_id, id)
);

CREATE TABLE IF NOT EXISTS music_layers (
    composition_id INTEGER NOT NULL,
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    PRIMARY KEY (composition_id, id)
);

CREATE TABLE IF NOT EXISTS music_keys (
    composition_id INTEGER NOT NULL,
    id INTEGER NOT NULL,
    layer_id INTEGER NOT NULL,
    instrument_id INTEGER NOT NULL,
    note INTEGER NOT NULL,
    time REAL NOT NULL,
    duration REAL NOT NULL,
    velocity REAL NOT NULL,
    PRIMARY KEY (composition_id, id)
);
";
