use rusqlite::Connection;

use crate::errors::EntityGraphError;

/// Creates the storage tables and the schema catalog if they are missing.
pub fn ensure_schema(conn: &Connection) -> Result<(), EntityGraphError> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS graph_entities (
            id    INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL,
            uuid  TEXT NOT NULL UNIQUE
        );
        CREATE TABLE IF NOT EXISTS graph_edges (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            from_id INTEGER NOT NULL REFERENCES graph_entities(id),
            to_id   INTEGER NOT NULL REFERENCES graph_entities(id),
            label   TEXT NOT NULL,
            uuid    TEXT NOT NULL UNIQUE
        );
        CREATE TABLE IF NOT EXISTS graph_properties (
            element_kind TEXT NOT NULL,
            element_id   INTEGER NOT NULL,
            key          TEXT NOT NULL,
            ordinal      INTEGER NOT NULL,
            value        TEXT NOT NULL,
            PRIMARY KEY (element_kind, element_id, key, ordinal)
        );
        CREATE TABLE IF NOT EXISTS graph_property_keys (
            name        TEXT PRIMARY KEY,
            data_type   TEXT NOT NULL,
            cardinality TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS graph_vertex_labels (
            name TEXT PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS graph_edge_labels (
            name         TEXT PRIMARY KEY,
            multiplicity TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS graph_indexes (
            name         TEXT PRIMARY KEY,
            element_kind TEXT NOT NULL,
            scope_label  TEXT,
            keys         TEXT NOT NULL,
            status       TEXT NOT NULL,
            cursor       INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS graph_index_entries (
            index_name TEXT NOT NULL,
            element_id INTEGER NOT NULL,
            key_values TEXT NOT NULL,
            PRIMARY KEY (index_name, element_id)
        );
        CREATE INDEX IF NOT EXISTS idx_entities_label ON graph_entities(label, id);
        CREATE INDEX IF NOT EXISTS idx_edges_from ON graph_edges(from_id, label);
        CREATE INDEX IF NOT EXISTS idx_edges_to ON graph_edges(to_id, label);
        CREATE INDEX IF NOT EXISTS idx_edges_label ON graph_edges(label, id);
        CREATE INDEX IF NOT EXISTS idx_props_key_value ON graph_properties(element_kind, key, value);
        CREATE INDEX IF NOT EXISTS idx_index_entries_lookup ON graph_index_entries(index_name, key_values);
        "#,
    )
    .map_err(|e| EntityGraphError::schema(e.to_string()))?;
    Ok(())
}
