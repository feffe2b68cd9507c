//! Property and business-key indexes backing vertex lookup-by-property.
//!
//! Values are indexed in their JSON encoding so that `"5"` and `5` stay distinct.

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use crate::{
    errors::RouteGraphError,
    graph::{NodeId, PropertyMap},
};

pub fn encode_value(value: &Value) -> Result<String, RouteGraphError> {
    match value {
        Value::Array(_) | Value::Object(_) => Err(RouteGraphError::invalid_input(
            "only scalar values can be indexed",
        )),
        scalar => {
            serde_json::to_string(scalar).map_err(|e| RouteGraphError::invalid_input(e.to_string()))
        }
    }
}

pub fn index_properties(
    conn: &Connection,
    id: NodeId,
    properties: &PropertyMap,
) -> Result<(), RouteGraphError> {
    let mut stmt = conn
        .prepare_cached("INSERT INTO graph_properties(entity_id, key, value) VALUES(?1, ?2, ?3)")
        .map_err(|e| RouteGraphError::query(e.to_string()))?;
    for (key, value) in properties {
        let encoded = encode_value(value)?;
        stmt.execute(params![id.0, key, encoded])
            .map_err(|e| RouteGraphError::query(e.to_string()))?;
    }
    Ok(())
}

pub fn node_ids_by_property(
    conn: &Connection,
    label: &str,
    key: &str,
    value: &Value,
) -> Result<Vec<NodeId>, RouteGraphError> {
    let encoded = encode_value(value)?;
    let mut stmt = conn
        .prepare_cached(
            "SELECT p.entity_id FROM graph_properties p \
             JOIN graph_entities e ON e.id = p.entity_id \
             WHERE e.kind=?1 AND p.key=?2 AND p.value=?3 ORDER BY p.entity_id",
        )
        .map_err(|e| RouteGraphError::query(e.to_string()))?;
    let rows = stmt
        .query_map(params![label, key, encoded], |row| row.get(0))
        .map_err(|e| RouteGraphError::query(e.to_string()))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(NodeId(
            row.map_err(|e| RouteGraphError::query(e.to_string()))?,
        ));
    }
    Ok(ids)
}

pub fn lookup_business_key(
    conn: &Connection,
    label: &str,
    key: &str,
    encoded: &str,
) -> Result<Option<NodeId>, RouteGraphError> {
    conn.query_row(
        "SELECT entity_id FROM graph_business_keys WHERE kind=?1 AND key=?2 AND value=?3",
        params![label, key, encoded],
        |row| row.get(0),
    )
    .optional()
    .map(|id| id.map(NodeId))
    .map_err(|e| RouteGraphError::query(e.to_string()))
}

/// Returns `false` when another node already owns the key.
pub fn claim_business_key(
    conn: &Connection,
    label: &str,
    key: &str,
    encoded: &str,
    id: NodeId,
) -> Result<bool, RouteGraphError> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO graph_business_keys(kind, key, value, entity_id) \
             VALUES(?1, ?2, ?3, ?4)",
            params![label, key, encoded, id.0],
        )
        .map_err(|e| RouteGraphError::query(e.to_string()))?;
    Ok(inserted == 1)
}
