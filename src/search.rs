//! Minimum-cost simple-path search built on [`GraphStore::traverse`].

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    backend::GraphStore,
    errors::RouteGraphError,
    graph::NodeId,
    materialize::{self, Path, Projection},
    traversal::{Accumulator, Branch, StopReason, TraversalSpec, TraversalStats},
};

/// Hard ceiling on path length, whatever the request asks for.
pub const DEFAULT_HOP_CEILING: u32 = 40;

pub type SearchStats = TraversalStats;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConstraints {
    /// Requested hop bound; `None` means "up to the ceiling".
    pub max_hops: Option<u32>,
    /// Beam width; `None` keeps every candidate (exact search).
    pub frontier_width: Option<usize>,
    pub time_budget: Option<Duration>,
    pub hop_ceiling: u32,
}

impl Default for SearchConstraints {
    fn default() -> Self {
        Self {
            max_hops: None,
            frontier_width: None,
            time_budget: None,
            hop_ceiling: DEFAULT_HOP_CEILING,
        }
    }
}

impl SearchConstraints {
    pub fn with_max_hops(mut self, hops: u32) -> Self {
        self.max_hops = Some(hops);
        self
    }

    pub fn with_frontier_width(mut self, width: usize) -> Self {
        self.frontier_width = Some(width);
        self
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn with_hop_ceiling(mut self, ceiling: u32) -> Self {
        self.hop_ceiling = ceiling;
        self
    }

    /// Requested bound clamped to the ceiling.
    pub fn effective_max_hops(&self) -> u32 {
        match self.max_hops {
            Some(hops) => hops.min(self.hop_ceiling),
            None => self.hop_ceiling,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchRequest {
    pub start: NodeId,
    pub end: NodeId,
    /// Edge property to accumulate; `None` searches by hop count.
    pub cost_field: Option<String>,
    pub edge_label: Option<String>,
    pub constraints: SearchConstraints,
    pub projection: Projection,
}

impl SearchRequest {
    pub fn new(start: NodeId, end: NodeId) -> Self {
        Self {
            start,
            end,
            cost_field: None,
            edge_label: None,
            constraints: SearchConstraints::default(),
            projection: Projection::default(),
        }
    }

    pub fn weighted_by(mut self, field: impl Into<String>) -> Self {
        self.cost_field = Some(field.into());
        self
    }

    pub fn along(mut self, edge_label: impl Into<String>) -> Self {
        self.edge_label = Some(edge_label.into());
        self
    }

    pub fn with_constraints(mut self, constraints: SearchConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    fn traversal_spec(&self) -> TraversalSpec {
        let accumulator = match &self.cost_field {
            Some(field) => Accumulator::Sum(field.clone()),
            None => Accumulator::Hops,
        };
        let mut spec = TraversalSpec::toward(self.end, self.constraints.effective_max_hops())
            .with_accumulator(accumulator)
            .with_frontier_width(self.constraints.frontier_width)
            .with_time_budget(self.constraints.time_budget)
            .with_limit(Some(1));
        if let Some(label) = &self.edge_label {
            spec = spec.with_edge_label(label.clone());
        }
        spec
    }
}

/// Why a search returned no path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoPathReason {
    /// Every loop-free branch was explored without reaching the end node.
    Unreachable,
    /// Live branches were still open when the hop bound was hit.
    HopLimitReached,
    TimeBudgetElapsed,
    /// The walk ran dry, but only after width pruning dropped branches that
    /// might have reached the end node.
    BeamExhausted,
}

impl NoPathReason {
    /// True when the search stopped early rather than proving unreachability.
    pub fn is_horizon(self) -> bool {
        !matches!(self, NoPathReason::Unreachable)
    }
}

impl fmt::Display for NoPathReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NoPathReason::Unreachable => "unreachable",
            NoPathReason::HopLimitReached => "hop limit reached",
            NoPathReason::TimeBudgetElapsed => "time budget elapsed",
            NoPathReason::BeamExhausted => "beam exhausted",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PathOutcome {
    Found {
        path: Path,
        stats: SearchStats,
    },
    NotFound {
        reason: NoPathReason,
        stats: SearchStats,
    },
}

impl PathOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, PathOutcome::Found { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            PathOutcome::Found { path, .. } => Some(path),
            PathOutcome::NotFound { .. } => None,
        }
    }

    pub fn into_path(self) -> Option<Path> {
        match self {
            PathOutcome::Found { path, .. } => Some(path),
            PathOutcome::NotFound { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<NoPathReason> {
        match self {
            PathOutcome::Found { .. } => None,
            PathOutcome::NotFound { reason, .. } => Some(*reason),
        }
    }

    pub fn stats(&self) -> &SearchStats {
        match self {
            PathOutcome::Found { stats, .. } | PathOutcome::NotFound { stats, .. } => stats,
        }
    }
}

/// Runs `request` against `store`.
///
/// Both endpoints must already be resolved; an id the store does not know is
/// [`RouteGraphError::NotFound`]. With no `frontier_width` the result is the
/// global minimum over loop-free paths within the hop bound. With a width it
/// is the minimum among paths that survived pruning.
pub fn search<S>(store: &S, request: &SearchRequest) -> Result<PathOutcome, RouteGraphError>
where
    S: GraphStore + ?Sized,
{
    for endpoint in [request.start, request.end] {
        if store.vertex(endpoint)?.is_none() {
            return Err(RouteGraphError::not_found(format!("node {endpoint}")));
        }
    }

    if request.start == request.end {
        let path = materialize_branch_path(store, &Branch::root(request.start), &request.projection)?;
        return Ok(PathOutcome::Found {
            path,
            stats: SearchStats::default(),
        });
    }

    let outcome = store.traverse(request.start, &request.traversal_spec())?;
    let stats = outcome.stats;
    let Some(best) = outcome.branches.first() else {
        let reason = match outcome.stop {
            StopReason::Exhausted if stats.pruned > 0 => NoPathReason::BeamExhausted,
            StopReason::Exhausted => NoPathReason::Unreachable,
            StopReason::HopLimit => NoPathReason::HopLimitReached,
            StopReason::TimeBudget => NoPathReason::TimeBudgetElapsed,
        };
        info!(start = %request.start, end = %request.end, %reason, depth = stats.depth, "no path");
        return Ok(PathOutcome::NotFound { reason, stats });
    };
    if outcome.stop == StopReason::TimeBudget {
        info!(
            start = %request.start,
            end = %request.end,
            depth = stats.depth,
            "time budget elapsed before the search settled"
        );
        debug!(
            hops = best.hops(),
            cost = best.cost,
            "discarding unsettled arrival"
        );
        return Ok(PathOutcome::NotFound {
            reason: NoPathReason::TimeBudgetElapsed,
            stats,
        });
    }

    let path = materialize_branch_path(store, best, &request.projection)?;
    info!(
        start = %request.start,
        end = %request.end,
        hops = path.hops(),
        cost = path.total_cost,
        expanded = stats.branches_expanded,
        "path found"
    );
    Ok(PathOutcome::Found { path, stats })
}

/// Contract-shaped wrapper over [`search`]: `Ok(None)` for every no-path reason.
pub fn find_path<S>(
    store: &S,
    start: NodeId,
    end: NodeId,
    cost_field: Option<&str>,
    constraints: &SearchConstraints,
) -> Result<Option<Path>, RouteGraphError>
where
    S: GraphStore + ?Sized,
{
    let mut request = SearchRequest::new(start, end).with_constraints(*constraints);
    if let Some(field) = cost_field {
        request = request.weighted_by(field);
    }
    Ok(search(store, &request)?.into_path())
}

/// Fetches the concrete elements of `branch` and projects them.
pub fn materialize_branch_path<S>(
    store: &S,
    branch: &Branch,
    projection: &Projection,
) -> Result<Path, RouteGraphError>
where
    S: GraphStore + ?Sized,
{
    let raw = store.materialize_branch(branch)?;
    materialize::materialize(&raw, projection, branch.cost)
}
