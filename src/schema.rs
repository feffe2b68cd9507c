use rusqlite::Connection;

use crate::errors::RouteGraphError;

/// Creates the property-graph tables when missing.
///
/// `AUTOINCREMENT` keeps node and edge ids from ever being reused, even after
/// [`crate::graph::SqliteGraph::drop_all`]. `graph_business_keys` carries the
/// unique index that makes upsert-by-business-key an atomic conditional insert.
pub fn ensure_schema(conn: &Connection) -> Result<(), RouteGraphError> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS graph_entities (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            kind      TEXT NOT NULL,
            data      TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS graph_edges (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            from_id   INTEGER NOT NULL,
            to_id     INTEGER NOT NULL,
            edge_type TEXT NOT NULL,
            data      TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS graph_properties (
            entity_id INTEGER NOT NULL,
            key       TEXT NOT NULL,
            value     TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS graph_business_keys (
            kind      TEXT NOT NULL,
            key       TEXT NOT NULL,
            value     TEXT NOT NULL,
            entity_id INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_entities_kind ON graph_entities(kind);
        CREATE INDEX IF NOT EXISTS idx_edges_from ON graph_edges(from_id);
        CREATE INDEX IF NOT EXISTS idx_edges_to ON graph_edges(to_id);
        CREATE INDEX IF NOT EXISTS idx_edges_type ON graph_edges(edge_type);
        CREATE INDEX IF NOT EXISTS idx_props_key_value ON graph_properties(key, value);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_business_key
            ON graph_business_keys(kind, key, value);
        "#,
    )
    .map_err(|e| RouteGraphError::schema(e.to_string()))?;
    Ok(())
}
