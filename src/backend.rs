//! Store trait consumed by the traversal and search engines. [`SqliteStore`]
//! delegates to the [`SqliteGraph`] primitives; other stores only have to
//! provide vertex/edge CRUD and adjacency reads, and may override
//! [`GraphStore::traverse`] to push the walk down to a server.

use std::path::Path;

use serde_json::Value;
use tracing::warn;

use crate::{
    errors::RouteGraphError,
    graph::{Edge, EdgeId, Node, NodeId, PropertyMap, SqliteGraph},
    materialize::{self, ElementMap, RawElement},
    traversal::{self, Branch, TraversalOutcome, TraversalSpec},
};

/// Result of an upsert-by-business-key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Upserted {
    pub id: NodeId,
    pub created: bool,
}

pub trait GraphStore {
    /// Every vertex under `label` whose `key` equals `value`, by ascending id.
    fn find_vertices_by_property(
        &self,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>, RouteGraphError>;
    fn create_vertex(&self, label: &str, properties: PropertyMap)
    -> Result<NodeId, RouteGraphError>;
    /// Atomic create-unless-exists keyed by `properties[key]`.
    fn upsert_vertex(
        &self,
        label: &str,
        key: &str,
        properties: PropertyMap,
    ) -> Result<Upserted, RouteGraphError>;
    fn create_edge(
        &self,
        label: &str,
        source: NodeId,
        target: NodeId,
        properties: PropertyMap,
    ) -> Result<EdgeId, RouteGraphError>;
    fn edge_exists(
        &self,
        label: &str,
        source: NodeId,
        target: NodeId,
    ) -> Result<bool, RouteGraphError>;
    fn vertex(&self, id: NodeId) -> Result<Option<Node>, RouteGraphError>;
    fn edge(&self, id: EdgeId) -> Result<Option<Edge>, RouteGraphError>;
    /// Edges leaving `id` in a stable order (ascending edge id).
    fn outgoing_edges(&self, id: NodeId) -> Result<Vec<Edge>, RouteGraphError>;
    /// Edges arriving at `id` in a stable order (ascending edge id).
    fn incoming_edges(&self, id: NodeId) -> Result<Vec<Edge>, RouteGraphError>;
    fn drop_all(&self) -> Result<(), RouteGraphError>;

    /// First match by ascending id. Duplicates are logged, not rejected.
    fn find_vertex_by_property(
        &self,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Option<Node>, RouteGraphError> {
        let mut matches = self.find_vertices_by_property(label, key, value)?;
        if matches.len() > 1 {
            warn!(
                label,
                key,
                %value,
                matches = matches.len(),
                "ambiguous vertex lookup, using lowest id"
            );
        }
        if matches.is_empty() {
            Ok(None)
        } else {
            Ok(Some(matches.swap_remove(0)))
        }
    }

    fn node_element_map(&self, id: NodeId) -> Result<ElementMap, RouteGraphError> {
        let node = self
            .vertex(id)?
            .ok_or_else(|| RouteGraphError::not_found(format!("node {id}")))?;
        Ok(materialize::node_element_map(&node))
    }

    fn edge_element_map(&self, id: EdgeId) -> Result<ElementMap, RouteGraphError> {
        let edge = self
            .edge(id)?
            .ok_or_else(|| RouteGraphError::not_found(format!("edge {id}")))?;
        Ok(materialize::edge_element_map(&edge))
    }

    /// Concrete node and edge maps visited by `branch`, alternating.
    fn materialize_branch(&self, branch: &Branch) -> Result<Vec<RawElement>, RouteGraphError> {
        let mut raw = Vec::with_capacity(branch.nodes.len() + branch.edges.len());
        for (idx, node) in branch.nodes.iter().enumerate() {
            if let Some(edge) = idx.checked_sub(1).and_then(|prev| branch.edges.get(prev)) {
                raw.push(RawElement::Edge(self.edge_element_map(*edge)?));
            }
            raw.push(RawElement::Node(self.node_element_map(*node)?));
        }
        Ok(raw)
    }

    fn traverse(
        &self,
        start: NodeId,
        spec: &TraversalSpec,
    ) -> Result<TraversalOutcome, RouteGraphError> {
        traversal::expand(self, start, spec)
    }
}

pub struct SqliteStore {
    graph: SqliteGraph,
}

impl SqliteStore {
    pub fn in_memory() -> Result<Self, RouteGraphError> {
        Ok(Self {
            graph: SqliteGraph::open_in_memory()?,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RouteGraphError> {
        Ok(Self {
            graph: SqliteGraph::open(path)?,
        })
    }

    pub fn from_graph(graph: SqliteGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &SqliteGraph {
        &self.graph
    }
}

impl GraphStore for SqliteStore {
    fn find_vertices_by_property(
        &self,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>, RouteGraphError> {
        self.graph.find_nodes_by_property(label, key, value)
    }

    fn create_vertex(
        &self,
        label: &str,
        properties: PropertyMap,
    ) -> Result<NodeId, RouteGraphError> {
        self.graph.insert_node(label, &properties)
    }

    fn upsert_vertex(
        &self,
        label: &str,
        key: &str,
        properties: PropertyMap,
    ) -> Result<Upserted, RouteGraphError> {
        let (id, created) = self.graph.upsert_node(label, key, &properties)?;
        Ok(Upserted { id, created })
    }

    fn create_edge(
        &self,
        label: &str,
        source: NodeId,
        target: NodeId,
        properties: PropertyMap,
    ) -> Result<EdgeId, RouteGraphError> {
        self.graph.insert_edge(label, source, target, &properties)
    }

    fn edge_exists(
        &self,
        label: &str,
        source: NodeId,
        target: NodeId,
    ) -> Result<bool, RouteGraphError> {
        self.graph.edge_exists(label, source, target)
    }

    fn vertex(&self, id: NodeId) -> Result<Option<Node>, RouteGraphError> {
        self.graph.node(id)
    }

    fn edge(&self, id: EdgeId) -> Result<Option<Edge>, RouteGraphError> {
        match self.graph.get_edge(id) {
            Ok(edge) => Ok(Some(edge)),
            Err(RouteGraphError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn outgoing_edges(&self, id: NodeId) -> Result<Vec<Edge>, RouteGraphError> {
        self.graph.outgoing_edges(id)
    }

    fn incoming_edges(&self, id: NodeId) -> Result<Vec<Edge>, RouteGraphError> {
        self.graph.incoming_edges(id)
    }

    fn drop_all(&self) -> Result<(), RouteGraphError> {
        self.graph.drop_all()
    }
}

impl<'a, B> GraphStore for &'a B
where
    B: GraphStore + ?Sized,
{
    fn find_vertices_by_property(
        &self,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>, RouteGraphError> {
        (*self).find_vertices_by_property(label, key, value)
    }

    fn create_vertex(
        &self,
        label: &str,
        properties: PropertyMap,
    ) -> Result<NodeId, RouteGraphError> {
        (*self).create_vertex(label, properties)
    }

    fn upsert_vertex(
        &self,
        label: &str,
        key: &str,
        properties: PropertyMap,
    ) -> Result<Upserted, RouteGraphError> {
        (*self).upsert_vertex(label, key, properties)
    }

    fn create_edge(
        &self,
        label: &str,
        source: NodeId,
        target: NodeId,
        properties: PropertyMap,
    ) -> Result<EdgeId, RouteGraphError> {
        (*self).create_edge(label, source, target, properties)
    }

    fn edge_exists(
        &self,
        label: &str,
        source: NodeId,
        target: NodeId,
    ) -> Result<bool, RouteGraphError> {
        (*self).edge_exists(label, source, target)
    }

    fn vertex(&self, id: NodeId) -> Result<Option<Node>, RouteGraphError> {
        (*self).vertex(id)
    }

    fn edge(&self, id: EdgeId) -> Result<Option<Edge>, RouteGraphError> {
        (*self).edge(id)
    }

    fn outgoing_edges(&self, id: NodeId) -> Result<Vec<Edge>, RouteGraphError> {
        (*self).outgoing_edges(id)
    }

    fn incoming_edges(&self, id: NodeId) -> Result<Vec<Edge>, RouteGraphError> {
        (*self).incoming_edges(id)
    }

    fn drop_all(&self) -> Result<(), RouteGraphError> {
        (*self).drop_all()
    }

    fn find_vertex_by_property(
        &self,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Option<Node>, RouteGraphError> {
        (*self).find_vertex_by_property(label, key, value)
    }

    fn node_element_map(&self, id: NodeId) -> Result<ElementMap, RouteGraphError> {
        (*self).node_element_map(id)
    }

    fn edge_element_map(&self, id: EdgeId) -> Result<ElementMap, RouteGraphError> {
        (*self).edge_element_map(id)
    }

    fn materialize_branch(&self, branch: &Branch) -> Result<Vec<RawElement>, RouteGraphError> {
        (*self).materialize_branch(branch)
    }

    fn traverse(
        &self,
        start: NodeId,
        spec: &TraversalSpec,
    ) -> Result<TraversalOutcome, RouteGraphError> {
        (*self).traverse(start, spec)
    }
}
