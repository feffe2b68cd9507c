//! Depth-synchronous frontier expansion over a [`GraphStore`].
//!
//! Every depth step expands all live branches, sorts the candidates by
//! accumulated cost and (optionally) keeps only the cheapest `frontier_width`
//! of them before advancing. That sort-and-prune is a barrier: no branch of
//! depth `d + 1` is expanded before every branch of depth `d` has been. The
//! wall-clock budget is checked at the same barrier.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    backend::GraphStore,
    errors::RouteGraphError,
    graph::{Edge, EdgeId, NodeId},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// How each traversed edge contributes to a branch's cost.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Accumulator {
    /// Every edge costs 1.
    Hops,
    /// Sum of a numeric edge property. Values must be finite and non-negative.
    Sum(String),
}

/// When a branch stops growing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Until {
    /// The branch reached this node.
    Reaches(NodeId),
    /// The branch has no admissible extension left.
    Exhausted,
}

/// Which branches end up in [`TraversalOutcome::branches`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Emit {
    /// Only branches that satisfied the [`Until`] predicate.
    Terminal,
    /// Every branch that survived pruning, at every depth.
    Every,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TraversalSpec {
    pub direction: Direction,
    pub edge_label: Option<String>,
    pub accumulator: Accumulator,
    pub until: Until,
    pub emit: Emit,
    pub max_hops: u32,
    pub frontier_width: Option<usize>,
    pub time_budget: Option<Duration>,
    /// Keep only the cheapest `limit` emitted branches.
    pub limit: Option<usize>,
}

impl TraversalSpec {
    /// Outgoing walk toward `target`, hop-count cost, every branch kept.
    pub fn toward(target: NodeId, max_hops: u32) -> Self {
        Self {
            direction: Direction::Outgoing,
            edge_label: None,
            accumulator: Accumulator::Hops,
            until: Until::Reaches(target),
            emit: Emit::Terminal,
            max_hops,
            frontier_width: None,
            time_budget: None,
            limit: None,
        }
    }

    /// Walk until no extension is left, emitting every intermediate branch.
    pub fn exhaustive(direction: Direction, max_hops: u32) -> Self {
        Self {
            direction,
            edge_label: None,
            accumulator: Accumulator::Hops,
            until: Until::Exhausted,
            emit: Emit::Every,
            max_hops,
            frontier_width: None,
            time_budget: None,
            limit: None,
        }
    }

    pub fn with_accumulator(mut self, accumulator: Accumulator) -> Self {
        self.accumulator = accumulator;
        self
    }

    pub fn with_edge_label(mut self, label: impl Into<String>) -> Self {
        self.edge_label = Some(label.into());
        self
    }

    pub fn with_frontier_width(mut self, width: Option<usize>) -> Self {
        self.frontier_width = width;
        self
    }

    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.time_budget = budget;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    fn validate(&self) -> Result<(), RouteGraphError> {
        if self.frontier_width == Some(0) {
            return Err(RouteGraphError::invalid_input(
                "frontier width must be at least 1",
            ));
        }
        if self.limit == Some(0) {
            return Err(RouteGraphError::invalid_input("limit must be at least 1"));
        }
        if let Accumulator::Sum(field) = &self.accumulator {
            if field.trim().is_empty() {
                return Err(RouteGraphError::invalid_input("cost field must be set"));
            }
        }
        Ok(())
    }
}

/// A partial path: visited node ids, traversed edge ids, accumulated cost.
#[derive(Clone, Debug, PartialEq)]
pub struct Branch {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    pub cost: f64,
}

impl Branch {
    pub fn root(start: NodeId) -> Self {
        Self {
            nodes: vec![start],
            edges: Vec::new(),
            cost: 0.0,
        }
    }

    pub fn head(&self) -> NodeId {
        // A branch always holds at least its root.
        self.nodes[self.nodes.len() - 1]
    }

    pub fn hops(&self) -> usize {
        self.edges.len()
    }

    pub fn visits(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    fn extend(&self, edge: EdgeId, next: NodeId, cost: f64) -> Self {
        let mut nodes = Vec::with_capacity(self.nodes.len() + 1);
        nodes.extend_from_slice(&self.nodes);
        nodes.push(next);
        let mut edges = Vec::with_capacity(self.edges.len() + 1);
        edges.extend_from_slice(&self.edges);
        edges.push(edge);
        Self { nodes, edges, cost }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// No live branch remained.
    Exhausted,
    /// Live branches remained at `max_hops`.
    HopLimit,
    /// The wall-clock budget elapsed at a depth barrier.
    TimeBudget,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalStats {
    /// Deepest barrier passed.
    pub depth: u32,
    /// Branches whose adjacency was read.
    pub branches_expanded: usize,
    /// Loop-free extensions generated before pruning.
    pub candidates: usize,
    /// Candidates dropped by the width limit or the cost bound.
    pub pruned: usize,
    pub peak_frontier: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TraversalOutcome {
    /// Emitted branches, cheapest first; ties keep emission order.
    pub branches: Vec<Branch>,
    pub stop: StopReason,
    pub stats: TraversalStats,
}

/// Runs `spec` from `start` against any store's adjacency reads.
///
/// When `until` is [`Until::Reaches`] with a `limit`, candidates that can no
/// longer beat the `limit`-th cheapest arrival are discarded before the width
/// limit applies. Edge costs are non-negative, so this never changes which
/// branches are returned.
pub fn expand<S>(
    store: &S,
    start: NodeId,
    spec: &TraversalSpec,
) -> Result<TraversalOutcome, RouteGraphError>
where
    S: GraphStore + ?Sized,
{
    spec.validate()?;
    let started = Instant::now();
    let mut frontier = vec![Branch::root(start)];
    let mut emitted: Vec<Branch> = Vec::new();
    let mut stats = TraversalStats {
        peak_frontier: 1,
        ..TraversalStats::default()
    };

    let stop = loop {
        if frontier.is_empty() {
            break StopReason::Exhausted;
        }
        if stats.depth >= spec.max_hops {
            break StopReason::HopLimit;
        }
        if let Some(budget) = spec.time_budget {
            if started.elapsed() >= budget {
                break StopReason::TimeBudget;
            }
        }

        let bound = admission_bound(&emitted, spec);
        let mut candidates = Vec::new();
        for branch in &frontier {
            stats.branches_expanded += 1;
            let mut extended = false;
            for edge in adjacent(store, branch.head(), spec)? {
                let next = far_end(&edge, spec.direction);
                if branch.visits(next) {
                    continue;
                }
                let cost = branch.cost + step_cost(&edge, &spec.accumulator)?;
                if bound.is_some_and(|limit| cost >= limit) {
                    stats.pruned += 1;
                    continue;
                }
                candidates.push(branch.extend(edge.id, next, cost));
                extended = true;
            }
            if !extended
                && spec.until == Until::Exhausted
                && spec.emit == Emit::Terminal
                && branch.hops() > 0
            {
                emitted.push(branch.clone());
            }
        }
        stats.candidates += candidates.len();

        candidates.sort_by(|a, b| a.cost.total_cmp(&b.cost));
        if let Some(width) = spec.frontier_width {
            if candidates.len() > width {
                stats.pruned += candidates.len() - width;
                candidates.truncate(width);
            }
        }
        stats.depth += 1;

        let mut next = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let arrived = matches!(spec.until, Until::Reaches(target) if candidate.head() == target);
            if arrived {
                emitted.push(candidate);
                continue;
            }
            if spec.emit == Emit::Every {
                emitted.push(candidate.clone());
            }
            next.push(candidate);
        }
        debug!(
            depth = stats.depth,
            frontier = next.len(),
            emitted = emitted.len(),
            "depth barrier"
        );
        stats.peak_frontier = stats.peak_frontier.max(next.len());
        frontier = next;
    };

    emitted.sort_by(|a, b| a.cost.total_cmp(&b.cost));
    if let Some(limit) = spec.limit {
        emitted.truncate(limit);
    }
    Ok(TraversalOutcome {
        branches: emitted,
        stop,
        stats,
    })
}

/// Cost at or above which a new candidate cannot enter the best `limit` arrivals.
fn admission_bound(emitted: &[Branch], spec: &TraversalSpec) -> Option<f64> {
    if !matches!(spec.until, Until::Reaches(_)) || spec.emit != Emit::Terminal {
        return None;
    }
    let limit = spec.limit?;
    if emitted.len() < limit {
        return None;
    }
    let mut costs: Vec<f64> = emitted.iter().map(|branch| branch.cost).collect();
    costs.sort_by(|a, b| a.total_cmp(b));
    costs.get(limit - 1).copied()
}

fn adjacent<S>(store: &S, node: NodeId, spec: &TraversalSpec) -> Result<Vec<Edge>, RouteGraphError>
where
    S: GraphStore + ?Sized,
{
    let mut edges = match spec.direction {
        Direction::Outgoing => store.outgoing_edges(node)?,
        Direction::Incoming => store.incoming_edges(node)?,
    };
    if let Some(label) = spec.edge_label.as_deref() {
        edges.retain(|edge| edge.label == label);
    }
    Ok(edges)
}

fn far_end(edge: &Edge, direction: Direction) -> NodeId {
    match direction {
        Direction::Outgoing => edge.target,
        Direction::Incoming => edge.source,
    }
}

fn step_cost(edge: &Edge, accumulator: &Accumulator) -> Result<f64, RouteGraphError> {
    match accumulator {
        Accumulator::Hops => Ok(1.0),
        Accumulator::Sum(field) => match edge.number(field) {
            Some(cost) if cost.is_finite() && cost >= 0.0 => Ok(cost),
            Some(cost) => Err(RouteGraphError::invalid_input(format!(
                "edge {} has an invalid '{field}' cost: {cost}",
                edge.id
            ))),
            None => Err(RouteGraphError::invalid_input(format!(
                "edge {} has no numeric '{field}' property",
                edge.id
            ))),
        },
    }
}
