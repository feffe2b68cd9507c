//! Seeded synthetic graphs for benchmarks and randomized tests.

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::json;

use crate::{
    backend::GraphStore,
    errors::RouteGraphError,
    graph::{NodeId, PropertyMap},
};

pub const NODE_LABEL: &str = "node";
pub const EDGE_LABEL: &str = "link";
pub const COST_FIELD: &str = "cost";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyntheticEdge {
    pub from: usize,
    pub to: usize,
    pub cost: u32,
}

#[derive(Clone, Debug)]
pub struct GraphDataset {
    pub node_count: usize,
    pub edges: Vec<SyntheticEdge>,
}

impl GraphDataset {
    pub fn nodes(&self) -> usize {
        self.node_count
    }

    pub fn edges(&self) -> usize {
        self.edges.len()
    }

    pub fn out_degrees(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.node_count];
        for edge in &self.edges {
            counts[edge.from] += 1;
        }
        counts
    }

    /// Index of the node with the highest out-degree (lowest index on ties).
    pub fn hub_index(&self) -> usize {
        let mut best = (0usize, 0usize);
        for (idx, deg) in self.out_degrees().into_iter().enumerate() {
            if deg > best.0 {
                best = (deg, idx);
            }
        }
        best.1
    }

    /// Adds the opposing edge, same cost, for every edge.
    pub fn bidirectional(mut self) -> Self {
        let reversed: Vec<SyntheticEdge> = self
            .edges
            .iter()
            .map(|edge| SyntheticEdge {
                from: edge.to,
                to: edge.from,
                cost: edge.cost,
            })
            .collect();
        self.edges.extend(reversed);
        sort_edges(&mut self.edges);
        self
    }

    /// Writes the dataset to `store`. Index `i` of the result is node `i`.
    pub fn load_into<S>(&self, store: &S) -> Result<Vec<NodeId>, RouteGraphError>
    where
        S: GraphStore + ?Sized,
    {
        let mut ids = Vec::with_capacity(self.node_count);
        for idx in 0..self.node_count {
            let mut properties = PropertyMap::new();
            properties.insert("name".into(), json!(format!("n{idx}")));
            properties.insert("idx".into(), json!(idx));
            ids.push(store.create_vertex(NODE_LABEL, properties)?);
        }
        for edge in &self.edges {
            let mut properties = PropertyMap::new();
            properties.insert(COST_FIELD.into(), json!(edge.cost));
            properties.insert("label".into(), json!(format!("{}-{}", edge.from, edge.to)));
            store.create_edge(EDGE_LABEL, ids[edge.from], ids[edge.to], properties)?;
        }
        Ok(ids)
    }
}

#[derive(Clone, Debug)]
pub enum GraphShape {
    Line,
    Star,
    Grid2D { width: usize, height: usize },
    RandomErdosRenyi { edges: usize },
    ScaleFree { m: usize },
}

/// Builds `shape` over `node_count` nodes with integer costs in `1..=max_cost`.
pub fn generate_graph(
    shape: GraphShape,
    node_count: usize,
    max_cost: u32,
    seed: u64,
) -> Result<GraphDataset, RouteGraphError> {
    if node_count < 2 {
        return Err(RouteGraphError::invalid_input("node_count must exceed 1"));
    }
    if max_cost == 0 {
        return Err(RouteGraphError::invalid_input("max_cost must be positive"));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let pairs = match shape {
        GraphShape::Line => (0..node_count - 1).map(|idx| (idx, idx + 1)).collect(),
        GraphShape::Star => (1..node_count).map(|leaf| (0, leaf)).collect(),
        GraphShape::Grid2D { width, height } => grid_pairs(width, height, node_count)?,
        GraphShape::RandomErdosRenyi { edges } => random_pairs(node_count, edges, &mut rng)?,
        GraphShape::ScaleFree { m } => scale_free_pairs(node_count, m, &mut rng)?,
    };
    let mut edges: Vec<SyntheticEdge> = pairs
        .into_iter()
        .map(|(from, to)| SyntheticEdge {
            from,
            to,
            cost: rng.gen_range(1..=max_cost),
        })
        .collect();
    sort_edges(&mut edges);
    Ok(GraphDataset { node_count, edges })
}

fn sort_edges(edges: &mut [SyntheticEdge]) {
    edges.sort_by(|a, b| a.from.cmp(&b.from).then_with(|| a.to.cmp(&b.to)));
}

fn grid_pairs(
    width: usize,
    height: usize,
    node_count: usize,
) -> Result<Vec<(usize, usize)>, RouteGraphError> {
    if width * height != node_count {
        return Err(RouteGraphError::invalid_input(
            "grid dimensions must match node count",
        ));
    }
    let mut pairs = Vec::with_capacity(width * height * 2);
    for y in 0..height {
        for x in 0..width {
            let base = y * width + x;
            if x + 1 < width {
                pairs.push((base, base + 1));
            }
            if y + 1 < height {
                pairs.push((base, base + width));
            }
        }
    }
    Ok(pairs)
}

/// Directed G(n, M): `edge_count` distinct ordered pairs without self loops.
fn random_pairs(
    node_count: usize,
    edge_count: usize,
    rng: &mut StdRng,
) -> Result<Vec<(usize, usize)>, RouteGraphError> {
    let total = node_count * (node_count - 1);
    if edge_count > total {
        return Err(RouteGraphError::invalid_input(
            "edge_count exceeds possible pairs",
        ));
    }
    // Selection sampling over the ordered pair index space keeps output sorted.
    let mut pairs = Vec::with_capacity(edge_count);
    let mut remaining = edge_count;
    for idx in 0..total {
        if remaining == 0 {
            break;
        }
        let left = total - idx;
        if rng.gen_range(0..left) < remaining {
            let from = idx / (node_count - 1);
            let mut to = idx % (node_count - 1);
            if to >= from {
                to += 1;
            }
            pairs.push((from, to));
            remaining -= 1;
        }
    }
    Ok(pairs)
}

fn scale_free_pairs(
    node_count: usize,
    m: usize,
    rng: &mut StdRng,
) -> Result<Vec<(usize, usize)>, RouteGraphError> {
    if m == 0 || node_count <= m + 1 {
        return Err(RouteGraphError::invalid_input(
            "scale-free graphs need m > 0 and node_count > m + 1",
        ));
    }
    let mut degrees = vec![0usize; node_count];
    let mut pairs = Vec::new();
    let seed_nodes = m + 1;
    for u in 0..seed_nodes {
        for v in (u + 1)..seed_nodes {
            pairs.push((u, v));
            degrees[u] += 1;
            degrees[v] += 1;
        }
    }
    let mut total_degree: usize = degrees.iter().sum();
    for new_node in seed_nodes..node_count {
        let mut targets = Vec::with_capacity(m);
        while targets.len() < m {
            let pick = rng.gen_range(0..total_degree);
            let mut cumulative = 0usize;
            for (candidate, degree) in degrees.iter().enumerate().take(new_node) {
                cumulative += degree;
                if pick < cumulative {
                    if !targets.contains(&candidate) {
                        targets.push(candidate);
                    }
                    break;
                }
            }
        }
        targets.sort_unstable();
        for target in targets {
            pairs.push((target, new_node));
            degrees[target] += 1;
            degrees[new_node] += 1;
            total_degree += 2;
        }
    }
    Ok(pairs)
}
