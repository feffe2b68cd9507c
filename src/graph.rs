use std::{fmt, path::Path};

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{cache::AdjacencyCache, errors::RouteGraphError, index, schema::ensure_schema};

/// Scalar property bag attached to nodes and edges.
pub type PropertyMap = serde_json::Map<String, Value>;

/// Store-assigned node identity. Assigned once at creation, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub i64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub label: String,
    pub properties: PropertyMap,
}

impl Node {
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.property(key).and_then(Value::as_str)
    }
}

/// Directed edge. Bidirectional links are stored as two opposing edges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub label: String,
    pub source: NodeId,
    pub target: NodeId,
    pub properties: PropertyMap,
}

impl Edge {
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.property(key).and_then(Value::as_f64)
    }
}

pub struct SqliteGraph {
    conn: Connection,
    outgoing_cache: AdjacencyCache,
    incoming_cache: AdjacencyCache,
    cache_enabled: bool,
}

impl SqliteGraph {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RouteGraphError> {
        let conn =
            Connection::open(path).map_err(|e| RouteGraphError::unavailable(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, RouteGraphError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RouteGraphError::unavailable(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn with_adjacency_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self.invalidate_caches();
        self
    }

    /// Inserts a node and returns its rowid (monotonically increasing, never reused).
    pub fn insert_node(
        &self,
        label: &str,
        properties: &PropertyMap,
    ) -> Result<NodeId, RouteGraphError> {
        validate_label(label, "node")?;
        let properties = clean_properties(properties)?;
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| RouteGraphError::query(e.to_string()))?;
        let id = insert_node_row(&tx, label, &properties)?;
        tx.commit()
            .map_err(|e| RouteGraphError::query(e.to_string()))?;
        Ok(id)
    }

    /// Returns the node owning `properties[key]` under `label`, creating it when
    /// absent. The second value is `true` when a node was created.
    ///
    /// The business key is claimed through a unique index inside the same
    /// transaction as the insert, so two writers can never both create it.
    pub fn upsert_node(
        &self,
        label: &str,
        key: &str,
        properties: &PropertyMap,
    ) -> Result<(NodeId, bool), RouteGraphError> {
        validate_label(label, "node")?;
        let properties = clean_properties(properties)?;
        let value = properties.get(key).ok_or_else(|| {
            RouteGraphError::invalid_input(format!("business key '{key}' missing from properties"))
        })?;
        let encoded = index::encode_value(value)?;

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| RouteGraphError::query(e.to_string()))?;
        if let Some(existing) = index::lookup_business_key(&tx, label, key, &encoded)? {
            return Ok((existing, false));
        }
        // A node written without upsert holds the value but not the key.
        if let Some(&existing) = index::node_ids_by_property(&tx, label, key, value)?.first() {
            let owner = if index::claim_business_key(&tx, label, key, &encoded, existing)? {
                existing
            } else {
                index::lookup_business_key(&tx, label, key, &encoded)?
                    .ok_or_else(|| RouteGraphError::query("business key claim lost without owner"))?
            };
            tx.commit()
                .map_err(|e| RouteGraphError::query(e.to_string()))?;
            debug!(id = %owner, label, key, "claimed business key for existing node");
            return Ok((owner, false));
        }
        let id = insert_node_row(&tx, label, &properties)?;
        if !index::claim_business_key(&tx, label, key, &encoded, id)? {
            drop(tx);
            let winner = index::lookup_business_key(&self.conn, label, key, &encoded)?
                .ok_or_else(|| RouteGraphError::query("business key claim lost without owner"))?;
            return Ok((winner, false));
        }
        tx.commit()
            .map_err(|e| RouteGraphError::query(e.to_string()))?;
        debug!(%id, label, key, "created node");
        Ok((id, true))
    }

    pub fn get_node(&self, id: NodeId) -> Result<Node, RouteGraphError> {
        self.node(id)?
            .ok_or_else(|| RouteGraphError::not_found(format!("node {id}")))
    }

    pub fn node(&self, id: NodeId) -> Result<Option<Node>, RouteGraphError> {
        self.conn
            .query_row(
                "SELECT id, kind, data FROM graph_entities WHERE id=?1",
                params![id.0],
                row_to_node,
            )
            .optional()
            .map_err(|e| RouteGraphError::query(e.to_string()))
    }

    /// All nodes carrying `label` whose property `key` equals `value`, by ascending id.
    pub fn find_nodes_by_property(
        &self,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>, RouteGraphError> {
        let ids = index::node_ids_by_property(&self.conn, label, key, value)?;
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            nodes.push(self.get_node(id)?);
        }
        Ok(nodes)
    }

    pub fn insert_edge(
        &self,
        label: &str,
        source: NodeId,
        target: NodeId,
        properties: &PropertyMap,
    ) -> Result<EdgeId, RouteGraphError> {
        validate_label(label, "edge")?;
        if source == target {
            return Err(RouteGraphError::invalid_input(
                "self loops are not supported",
            ));
        }
        if !self.node_exists(source)? || !self.node_exists(target)? {
            return Err(RouteGraphError::invalid_input(
                "edge endpoints must reference existing nodes",
            ));
        }
        let properties = clean_properties(properties)?;
        let data = serde_json::to_string(&properties)
            .map_err(|e| RouteGraphError::invalid_input(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO graph_edges(from_id, to_id, edge_type, data) VALUES(?1, ?2, ?3, ?4)",
                params![source.0, target.0, label, data],
            )
            .map_err(|e| RouteGraphError::query(e.to_string()))?;
        self.invalidate_caches();
        Ok(EdgeId(self.conn.last_insert_rowid()))
    }

    pub fn get_edge(&self, id: EdgeId) -> Result<Edge, RouteGraphError> {
        self.conn
            .query_row(
                "SELECT id, from_id, to_id, edge_type, data FROM graph_edges WHERE id=?1",
                params![id.0],
                row_to_edge,
            )
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => {
                    RouteGraphError::not_found(format!("edge {id}"))
                }
                other => RouteGraphError::query(other.to_string()),
            })
    }

    pub fn edge_exists(
        &self,
        label: &str,
        source: NodeId,
        target: NodeId,
    ) -> Result<bool, RouteGraphError> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM graph_edges WHERE from_id=?1 AND to_id=?2 AND edge_type=?3 LIMIT 1",
                params![source.0, target.0, label],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RouteGraphError::query(e.to_string()))?;
        Ok(exists.is_some())
    }

    /// Edges leaving `id`, ordered by ascending edge id.
    pub fn outgoing_edges(&self, id: NodeId) -> Result<Vec<Edge>, RouteGraphError> {
        if self.cache_enabled {
            if let Some(cached) = self.outgoing_cache.get(id) {
                return Ok(cached);
            }
        }
        let edges = self.collect_edges(
            "SELECT id, from_id, to_id, edge_type, data FROM graph_edges WHERE from_id=?1 ORDER BY id",
            id,
        )?;
        if self.cache_enabled {
            self.outgoing_cache.insert(id, edges.clone());
        }
        Ok(edges)
    }

    /// Edges arriving at `id`, ordered by ascending edge id.
    pub fn incoming_edges(&self, id: NodeId) -> Result<Vec<Edge>, RouteGraphError> {
        if self.cache_enabled {
            if let Some(cached) = self.incoming_cache.get(id) {
                return Ok(cached);
            }
        }
        let edges = self.collect_edges(
            "SELECT id, from_id, to_id, edge_type, data FROM graph_edges WHERE to_id=?1 ORDER BY id",
            id,
        )?;
        if self.cache_enabled {
            self.incoming_cache.insert(id, edges.clone());
        }
        Ok(edges)
    }

    pub fn node_count(&self) -> Result<i64, RouteGraphError> {
        self.count("SELECT COUNT(*) FROM graph_entities")
    }

    pub fn edge_count(&self) -> Result<i64, RouteGraphError> {
        self.count("SELECT COUNT(*) FROM graph_edges")
    }

    pub fn node_ids(&self) -> Result<Vec<NodeId>, RouteGraphError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM graph_entities ORDER BY id")
            .map_err(|e| RouteGraphError::query(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| RouteGraphError::query(e.to_string()))?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(NodeId(id.map_err(|e| RouteGraphError::query(e.to_string()))?));
        }
        Ok(ids)
    }

    /// Removes every node, edge and index row. Ids already handed out stay retired.
    pub fn drop_all(&self) -> Result<(), RouteGraphError> {
        self.conn
            .execute_batch(
                "DELETE FROM graph_edges;
                 DELETE FROM graph_properties;
                 DELETE FROM graph_business_keys;
                 DELETE FROM graph_entities;",
            )
            .map_err(|e| RouteGraphError::query(e.to_string()))?;
        self.invalidate_caches();
        Ok(())
    }
}

impl SqliteGraph {
    /// Number of adjacency lists currently memoized, both directions.
    pub fn cached_adjacency_entries(&self) -> usize {
        self.outgoing_cache.len() + self.incoming_cache.len()
    }

    fn collect_edges(&self, sql: &str, id: NodeId) -> Result<Vec<Edge>, RouteGraphError> {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| RouteGraphError::query(e.to_string()))?;
        let rows = stmt
            .query_map(params![id.0], row_to_edge)
            .map_err(|e| RouteGraphError::query(e.to_string()))?;
        let mut result = Vec::new();
        for item in rows {
            result.push(item.map_err(|e| RouteGraphError::query(e.to_string()))?);
        }
        Ok(result)
    }

    fn node_exists(&self, id: NodeId) -> Result<bool, RouteGraphError> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM graph_entities WHERE id=?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RouteGraphError::query(e.to_string()))?;
        Ok(exists.is_some())
    }

    fn count(&self, sql: &str) -> Result<i64, RouteGraphError> {
        self.conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(|e| RouteGraphError::query(e.to_string()))
    }

    fn invalidate_caches(&self) {
        self.outgoing_cache.clear();
        self.incoming_cache.clear();
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            outgoing_cache: AdjacencyCache::new(),
            incoming_cache: AdjacencyCache::new(),
            cache_enabled: true,
        }
    }
}

fn insert_node_row(
    conn: &Connection,
    label: &str,
    properties: &PropertyMap,
) -> Result<NodeId, RouteGraphError> {
    let data = serde_json::to_string(properties)
        .map_err(|e| RouteGraphError::invalid_input(e.to_string()))?;
    conn.execute(
        "INSERT INTO graph_entities(kind, data) VALUES(?1, ?2)",
        params![label, data],
    )
    .map_err(|e| RouteGraphError::query(e.to_string()))?;
    let id = NodeId(conn.last_insert_rowid());
    index::index_properties(conn, id, properties)?;
    Ok(id)
}

fn row_to_node(row: &rusqlite::Row<'_>) -> Result<Node, rusqlite::Error> {
    let data: String = row.get(2)?;
    Ok(Node {
        id: NodeId(row.get(0)?),
        label: row.get(1)?,
        properties: parse_properties(&data)?,
    })
}

fn row_to_edge(row: &rusqlite::Row<'_>) -> Result<Edge, rusqlite::Error> {
    let data: String = row.get(4)?;
    Ok(Edge {
        id: EdgeId(row.get(0)?),
        source: NodeId(row.get(1)?),
        target: NodeId(row.get(2)?),
        label: row.get(3)?,
        properties: parse_properties(&data)?,
    })
}

fn parse_properties(data: &str) -> Result<PropertyMap, rusqlite::Error> {
    serde_json::from_str(data).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            data.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn validate_label(label: &str, what: &str) -> Result<(), RouteGraphError> {
    if label.trim().is_empty() {
        return Err(RouteGraphError::invalid_input(format!(
            "{what} label must be set"
        )));
    }
    Ok(())
}

/// Drops null values and rejects nested structures: property bags hold scalars only.
fn clean_properties(properties: &PropertyMap) -> Result<PropertyMap, RouteGraphError> {
    let mut cleaned = PropertyMap::new();
    for (key, value) in properties {
        if key.trim().is_empty() {
            return Err(RouteGraphError::invalid_input("property keys must be set"));
        }
        match value {
            Value::Null => continue,
            Value::Array(_) | Value::Object(_) => {
                return Err(RouteGraphError::invalid_input(format!(
                    "property '{key}' must be a scalar"
                )));
            }
            scalar => {
                cleaned.insert(key.clone(), scalar.clone());
            }
        }
    }
    Ok(cleaned)
}
