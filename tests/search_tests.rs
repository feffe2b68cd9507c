use std::{cell::RefCell, collections::HashMap, time::Duration};

use routegraph::{
    Edge, EdgeId, GraphStore, NoPathReason, Node, NodeId, PathOutcome, Projection, PropertyMap,
    RouteGraphError, SearchConstraints, SearchRequest, SqliteStore, Upserted, find_path, search,
    synthetic::{COST_FIELD, GraphShape, generate_graph},
};
use serde_json::{Value, json};

struct Fixture {
    store: SqliteStore,
    ids: HashMap<&'static str, NodeId>,
}

impl Fixture {
    fn new(nodes: &[&'static str]) -> Self {
        let store = SqliteStore::in_memory().expect("store");
        let mut ids = HashMap::new();
        for name in nodes {
            let mut props = PropertyMap::new();
            props.insert("name".into(), json!(name));
            ids.insert(*name, store.create_vertex("station", props).expect("vertex"));
        }
        Self { store, ids }
    }

    fn id(&self, name: &str) -> NodeId {
        self.ids[name]
    }

    fn link(&self, from: &str, to: &str, duration: Value) -> EdgeId {
        let mut props = PropertyMap::new();
        props.insert("duration".into(), duration);
        props.insert("line".into(), json!(format!("{from}{to}")));
        self.store
            .create_edge("connects_to", self.id(from), self.id(to), props)
            .expect("edge")
    }

    fn weighted(&self, from: &str, to: &str) -> SearchRequest {
        SearchRequest::new(self.id(from), self.id(to))
            .weighted_by("duration")
            .with_projection(Projection::new("name", "line"))
    }
}

fn line_abc() -> Fixture {
    let fx = Fixture::new(&["A", "B", "C", "D"]);
    fx.link("A", "B", json!(5));
    fx.link("B", "C", json!(3));
    fx
}

#[test]
fn test_line_scenario_returns_summed_cost() {
    let fx = line_abc();
    let outcome = search(&fx.store, &fx.weighted("A", "C")).expect("search");
    let path = outcome.path().expect("path");
    assert_eq!(path.names(), vec!["A", "B", "C"]);
    assert_eq!(path.total_cost, 8.0);
    assert_eq!(path.hops(), 2);
    assert_eq!(path.display[1].via.as_deref(), Some("AB"));
    assert_eq!(path.display[2].via.as_deref(), Some("BC"));
}

#[test]
fn test_disconnected_node_reports_unreachable() {
    let fx = line_abc();
    let outcome = search(&fx.store, &fx.weighted("A", "D")).expect("search");
    assert!(!outcome.is_found());
    assert_eq!(outcome.reason(), Some(NoPathReason::Unreachable));
    assert!(!NoPathReason::Unreachable.is_horizon());

    let none = find_path(
        &fx.store,
        fx.id("A"),
        fx.id("D"),
        Some("duration"),
        &SearchConstraints::default(),
    )
    .expect("find_path");
    assert!(none.is_none());
}

#[test]
fn test_edges_are_directed() {
    let fx = line_abc();
    let outcome = search(&fx.store, &fx.weighted("C", "A")).expect("search");
    assert_eq!(outcome.reason(), Some(NoPathReason::Unreachable));
}

#[test]
fn test_cheaper_detour_beats_direct_edge() {
    let fx = Fixture::new(&["A", "B", "X"]);
    fx.link("A", "B", json!(10));
    fx.link("A", "X", json!(4));
    fx.link("X", "B", json!(4));

    let weighted = find_path(
        &fx.store,
        fx.id("A"),
        fx.id("B"),
        Some("duration"),
        &SearchConstraints::default(),
    )
    .expect("find_path")
    .expect("path");
    assert_eq!(weighted.node_ids(), vec![fx.id("A"), fx.id("X"), fx.id("B")]);
    assert_eq!(weighted.total_cost, 8.0);

    let hops = find_path(
        &fx.store,
        fx.id("A"),
        fx.id("B"),
        None,
        &SearchConstraints::default(),
    )
    .expect("find_path")
    .expect("path");
    assert_eq!(hops.node_ids(), vec![fx.id("A"), fx.id("B")]);
    assert_eq!(hops.total_cost, 1.0);
}

#[test]
fn test_equal_cost_paths_break_ties_by_discovery_order() {
    let fx = Fixture::new(&["A", "X", "Y", "B"]);
    fx.link("A", "X", json!(1));
    fx.link("A", "Y", json!(1));
    fx.link("Y", "B", json!(1));
    fx.link("X", "B", json!(1));

    for _ in 0..3 {
        let path = search(&fx.store, &fx.weighted("A", "B"))
            .expect("search")
            .into_path()
            .expect("path");
        assert_eq!(path.names(), vec!["A", "X", "B"]);
    }
}

#[test]
fn test_start_equal_to_end_is_a_single_node_path() {
    let fx = line_abc();
    let path = search(&fx.store, &fx.weighted("B", "B"))
        .expect("search")
        .into_path()
        .expect("path");
    assert_eq!(path.node_ids(), vec![fx.id("B")]);
    assert!(path.edges.is_empty());
    assert_eq!(path.total_cost, 0.0);
}

#[test]
fn test_unknown_endpoint_is_not_found() {
    let fx = line_abc();
    let request = SearchRequest::new(fx.id("A"), NodeId(77_777));
    let err = search(&fx.store, &request).expect_err("unknown node");
    assert!(err.is_not_found());
}

#[test]
fn test_missing_or_negative_cost_is_invalid_input() {
    let fx = Fixture::new(&["A", "B", "C"]);
    fx.link("A", "B", json!(-1));
    let err = search(&fx.store, &fx.weighted("A", "B")).expect_err("negative");
    assert!(matches!(err, RouteGraphError::InvalidInput(_)));

    let fx = Fixture::new(&["A", "B"]);
    fx.link("A", "B", json!("fast"));
    let err = search(&fx.store, &fx.weighted("A", "B")).expect_err("not numeric");
    assert!(matches!(err, RouteGraphError::InvalidInput(_)));
}

#[test]
fn test_hop_limit_is_reported_distinctly() {
    let fx = Fixture::new(&["A", "B", "C", "D", "E"]);
    fx.link("A", "B", json!(1));
    fx.link("B", "C", json!(1));
    fx.link("C", "D", json!(1));
    fx.link("D", "E", json!(1));

    let request = fx
        .weighted("A", "E")
        .with_constraints(SearchConstraints::default().with_max_hops(2));
    let outcome = search(&fx.store, &request).expect("search");
    assert_eq!(outcome.reason(), Some(NoPathReason::HopLimitReached));
    assert!(NoPathReason::HopLimitReached.is_horizon());
    assert_eq!(outcome.stats().depth, 2);

    let clamped = SearchConstraints::default()
        .with_hop_ceiling(3)
        .with_max_hops(100);
    assert_eq!(clamped.effective_max_hops(), 3);
    let outcome = search(&fx.store, &fx.weighted("A", "E").with_constraints(clamped))
        .expect("search");
    assert_eq!(outcome.reason(), Some(NoPathReason::HopLimitReached));

    let enough = SearchConstraints::default().with_max_hops(4);
    let outcome = search(&fx.store, &fx.weighted("A", "E").with_constraints(enough))
        .expect("search");
    assert_eq!(outcome.path().expect("path").hops(), 4);
}

#[test]
fn test_elapsed_time_budget_reports_no_path() {
    let fx = line_abc();
    let request = fx
        .weighted("A", "C")
        .with_constraints(SearchConstraints::default().with_time_budget(Duration::ZERO));
    let outcome = search(&fx.store, &request).expect("search");
    assert_eq!(outcome.reason(), Some(NoPathReason::TimeBudgetElapsed));
    assert!(outcome.path().is_none());
}

#[test]
fn test_narrow_beam_can_miss_the_optimum() {
    let fx = Fixture::new(&["A", "B", "C", "D"]);
    fx.link("A", "B", json!(1));
    fx.link("B", "D", json!(100));
    fx.link("A", "C", json!(2));
    fx.link("C", "D", json!(1));

    let exact = search(&fx.store, &fx.weighted("A", "D")).expect("search");
    assert_eq!(exact.path().expect("path").total_cost, 3.0);

    let beam = fx
        .weighted("A", "D")
        .with_constraints(SearchConstraints::default().with_frontier_width(1));
    let pruned = search(&fx.store, &beam).expect("search");
    let path = pruned.path().expect("path");
    assert_eq!(path.total_cost, 101.0);
    assert_eq!(path.names(), vec!["A", "B", "D"]);
    assert!(pruned.stats().pruned > 0);
}

#[test]
fn test_beam_that_drops_the_only_route_is_a_horizon_stop() {
    let fx = Fixture::new(&["A", "B", "C", "D"]);
    fx.link("A", "B", json!(1));
    fx.link("A", "C", json!(5));
    fx.link("C", "D", json!(1));

    let exact = search(&fx.store, &fx.weighted("A", "D")).expect("search");
    assert_eq!(exact.path().expect("path").names(), vec!["A", "C", "D"]);

    let beam = fx
        .weighted("A", "D")
        .with_constraints(SearchConstraints::default().with_frontier_width(1));
    let outcome = search(&fx.store, &beam).expect("search");
    assert_eq!(outcome.reason(), Some(NoPathReason::BeamExhausted));
    assert!(NoPathReason::BeamExhausted.is_horizon());
    assert_eq!(outcome.stats().pruned, 1);
    assert_eq!(NoPathReason::BeamExhausted.to_string(), "beam exhausted");
}

#[test]
fn test_zero_frontier_width_is_rejected() {
    let fx = line_abc();
    let request = fx
        .weighted("A", "C")
        .with_constraints(SearchConstraints::default().with_frontier_width(0));
    let err = search(&fx.store, &request).expect_err("zero width");
    assert!(matches!(err, RouteGraphError::InvalidInput(_)));
}

/// Minimum cost and minimum hop count over every simple path, by exhaustive DFS.
fn brute_force(adjacency: &[Vec<(usize, f64)>], start: usize, end: usize) -> Option<(f64, usize)> {
    fn walk(
        adjacency: &[Vec<(usize, f64)>],
        node: usize,
        end: usize,
        visited: &mut Vec<bool>,
        cost: f64,
        hops: usize,
        best: &mut Option<(f64, usize)>,
    ) {
        if node == end {
            *best = Some(match *best {
                None => (cost, hops),
                Some((c, h)) => (c.min(cost), h.min(hops)),
            });
            return;
        }
        for &(next, weight) in &adjacency[node] {
            if !visited[next] {
                visited[next] = true;
                walk(adjacency, next, end, visited, cost + weight, hops + 1, best);
                visited[next] = false;
            }
        }
    }
    let mut visited = vec![false; adjacency.len()];
    visited[start] = true;
    let mut best = None;
    walk(adjacency, start, end, &mut visited, 0.0, 0, &mut best);
    best
}

#[test]
fn test_star_routes_pass_through_the_hub() {
    let star = generate_graph(GraphShape::Star, 6, 5, 3).expect("star");
    assert_eq!(star.hub_index(), 0);
    assert_eq!(star.out_degrees()[0], 5);
    let star = star.bidirectional();
    let store = SqliteStore::in_memory().expect("store");
    let ids = star.load_into(&store).expect("load");

    let outcome = search(&store, &SearchRequest::new(ids[1], ids[5])).expect("search");
    let path = outcome.path().expect("path");
    assert_eq!(path.node_ids(), vec![ids[1], ids[0], ids[5]]);
}

#[test]
fn test_scale_free_graph_is_reachable_from_its_root() {
    let dataset = generate_graph(GraphShape::ScaleFree { m: 2 }, 12, 9, 11).expect("dataset");
    let degrees = dataset.out_degrees();
    let hub = dataset.hub_index();
    assert_eq!(Some(&degrees[hub]), degrees.iter().max());
    assert!(degrees[..hub].iter().all(|degree| *degree < degrees[hub]));

    let store = SqliteStore::in_memory().expect("store");
    let ids = dataset.load_into(&store).expect("load");
    for target in 1..dataset.nodes() {
        let outcome = search(
            &store,
            &SearchRequest::new(ids[0], ids[target]).weighted_by(COST_FIELD),
        )
        .expect("search");
        let path = outcome.path().expect("path");
        assert_path_is_consistent(&store, path, ids[0], ids[target]);
    }
}

#[test]
fn test_randomized_graphs_match_brute_force() {
    for seed in 0..12u64 {
        let dataset = generate_graph(GraphShape::RandomErdosRenyi { edges: 18 }, 8, 9, seed)
            .expect("dataset");
        let store = SqliteStore::in_memory().expect("store");
        let ids = dataset.load_into(&store).expect("load");
        let mut adjacency = vec![Vec::new(); dataset.nodes()];
        for edge in &dataset.edges {
            adjacency[edge.from].push((edge.to, f64::from(edge.cost)));
        }

        for (start, end) in [(0usize, 7usize), (1, 6), (2, 5), (7, 0)] {
            let expected = brute_force(&adjacency, start, end);
            let weighted = search(
                &store,
                &SearchRequest::new(ids[start], ids[end]).weighted_by(COST_FIELD),
            )
            .expect("weighted");
            let hops = search(&store, &SearchRequest::new(ids[start], ids[end])).expect("hops");
            let beam = search(
                &store,
                &SearchRequest::new(ids[start], ids[end])
                    .weighted_by(COST_FIELD)
                    .with_constraints(SearchConstraints::default().with_frontier_width(2)),
            )
            .expect("beam");

            match expected {
                None => {
                    assert_eq!(weighted.reason(), Some(NoPathReason::Unreachable));
                    assert_eq!(hops.reason(), Some(NoPathReason::Unreachable));
                    assert!(beam.path().is_none());
                }
                Some((min_cost, min_hops)) => {
                    let path = weighted.path().expect("weighted path");
                    assert_eq!(path.total_cost, min_cost, "seed {seed} {start}->{end}");
                    assert_path_is_consistent(&store, path, ids[start], ids[end]);

                    let hop_path = hops.path().expect("hop path");
                    assert_eq!(hop_path.hops(), min_hops, "seed {seed} {start}->{end}");
                    assert_eq!(hop_path.total_cost, min_hops as f64);

                    if let Some(beam_path) = beam.path() {
                        assert!(beam_path.total_cost >= min_cost);
                        assert_path_is_consistent(&store, beam_path, ids[start], ids[end]);
                    }
                }
            }
        }
    }
}

fn assert_path_is_consistent(
    store: &SqliteStore,
    path: &routegraph::Path,
    start: NodeId,
    end: NodeId,
) {
    let nodes = path.node_ids();
    assert_eq!(nodes.first(), Some(&start));
    assert_eq!(nodes.last(), Some(&end));
    assert_eq!(nodes.len(), path.edges.len() + 1);
    let mut seen = nodes.clone();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), nodes.len(), "node repeated");

    let mut sum = 0.0;
    for (idx, edge) in path.edges.iter().enumerate() {
        assert_eq!(edge.source, nodes[idx]);
        assert_eq!(edge.target, nodes[idx + 1]);
        let stored = store.edge(edge.id).expect("edge").expect("present");
        sum += stored.number(COST_FIELD).expect("cost");
    }
    assert_eq!(sum, path.total_cost);
}

#[test]
fn test_beam_expansion_is_bounded_by_width_times_hops() {
    let dataset = generate_graph(GraphShape::Grid2D { width: 6, height: 6 }, 36, 5, 0xBEEF)
        .expect("grid")
        .bidirectional();
    let store = SqliteStore::in_memory().expect("store");
    let ids = dataset.load_into(&store).expect("load");
    let width = 4usize;
    let max_hops = 12u32;
    let request = SearchRequest::new(ids[0], ids[35])
        .weighted_by(COST_FIELD)
        .with_constraints(
            SearchConstraints::default()
                .with_frontier_width(width)
                .with_max_hops(max_hops),
        );
    let outcome = search(&store, &request).expect("search");
    let stats = outcome.stats();
    assert!(stats.branches_expanded <= width * max_hops as usize + 1);
    assert!(stats.peak_frontier <= width);
    assert!(stats.depth <= max_hops);
}

/// Minimal store that keeps everything in vectors; proves the engine only
/// needs the trait.
#[derive(Default)]
struct MemoryStore {
    nodes: RefCell<Vec<Node>>,
    edges: RefCell<Vec<Edge>>,
    /// Added to every adjacency read.
    latency: Duration,
}

impl GraphStore for MemoryStore {
    fn find_vertices_by_property(
        &self,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>, RouteGraphError> {
        Ok(self
            .nodes
            .borrow()
            .iter()
            .filter(|node| node.label == label && node.property(key) == Some(value))
            .cloned()
            .collect())
    }

    fn create_vertex(&self, label: &str, properties: PropertyMap) -> Result<NodeId, RouteGraphError> {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId(nodes.len() as i64 + 1);
        nodes.push(Node {
            id,
            label: label.to_string(),
            properties,
        });
        Ok(id)
    }

    fn upsert_vertex(
        &self,
        label: &str,
        key: &str,
        properties: PropertyMap,
    ) -> Result<Upserted, RouteGraphError> {
        let value = properties.get(key).cloned().unwrap_or(Value::Null);
        if let Some(node) = self.find_vertex_by_property(label, key, &value)? {
            return Ok(Upserted {
                id: node.id,
                created: false,
            });
        }
        let id = self.create_vertex(label, properties)?;
        Ok(Upserted { id, created: true })
    }

    fn create_edge(
        &self,
        label: &str,
        source: NodeId,
        target: NodeId,
        properties: PropertyMap,
    ) -> Result<EdgeId, RouteGraphError> {
        let mut edges = self.edges.borrow_mut();
        let id = EdgeId(edges.len() as i64 + 1);
        edges.push(Edge {
            id,
            label: label.to_string(),
            source,
            target,
            properties,
        });
        Ok(id)
    }

    fn edge_exists(
        &self,
        label: &str,
        source: NodeId,
        target: NodeId,
    ) -> Result<bool, RouteGraphError> {
        Ok(self
            .edges
            .borrow()
            .iter()
            .any(|e| e.label == label && e.source == source && e.target == target))
    }

    fn vertex(&self, id: NodeId) -> Result<Option<Node>, RouteGraphError> {
        Ok(self.nodes.borrow().iter().find(|n| n.id == id).cloned())
    }

    fn edge(&self, id: EdgeId) -> Result<Option<Edge>, RouteGraphError> {
        Ok(self.edges.borrow().iter().find(|e| e.id == id).cloned())
    }

    fn outgoing_edges(&self, id: NodeId) -> Result<Vec<Edge>, RouteGraphError> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        Ok(self
            .edges
            .borrow()
            .iter()
            .filter(|e| e.source == id)
            .cloned()
            .collect())
    }

    fn incoming_edges(&self, id: NodeId) -> Result<Vec<Edge>, RouteGraphError> {
        Ok(self
            .edges
            .borrow()
            .iter()
            .filter(|e| e.target == id)
            .cloned()
            .collect())
    }

    fn drop_all(&self) -> Result<(), RouteGraphError> {
        self.nodes.borrow_mut().clear();
        self.edges.borrow_mut().clear();
        Ok(())
    }
}

#[test]
fn test_engine_runs_against_any_store() {
    let store = MemoryStore::default();
    let named = |name: &str| {
        let mut props = PropertyMap::new();
        props.insert("name".into(), json!(name));
        store.create_vertex("station", props).expect("vertex")
    };
    let (a, b, x) = (named("A"), named("B"), named("X"));
    for (from, to, cost) in [(a, b, 10), (a, x, 4), (x, b, 4)] {
        let mut props = PropertyMap::new();
        props.insert("duration".into(), json!(cost));
        store
            .create_edge("connects_to", from, to, props)
            .expect("edge");
    }

    let path = search(&store, &SearchRequest::new(a, b).weighted_by("duration"))
        .expect("search")
        .into_path()
        .expect("path");
    assert_eq!(path.names(), vec!["A", "X", "B"]);
    assert_eq!(path.total_cost, 8.0);

    let by_ref: &dyn GraphStore = &store;
    let again = find_path(by_ref, a, b, Some("duration"), &SearchConstraints::default())
        .expect("find_path")
        .expect("path");
    assert_eq!(again, path);
}

/// Store whose adjacency reads fail as if the connection dropped.
struct UnavailableStore {
    inner: MemoryStore,
}

impl GraphStore for UnavailableStore {
    fn find_vertices_by_property(
        &self,
        label: &str,
        key: &str,
        value: &Value,
    ) -> Result<Vec<Node>, RouteGraphError> {
        self.inner.find_vertices_by_property(label, key, value)
    }

    fn create_vertex(&self, label: &str, properties: PropertyMap) -> Result<NodeId, RouteGraphError> {
        self.inner.create_vertex(label, properties)
    }

    fn upsert_vertex(
        &self,
        label: &str,
        key: &str,
        properties: PropertyMap,
    ) -> Result<Upserted, RouteGraphError> {
        self.inner.upsert_vertex(label, key, properties)
    }

    fn create_edge(
        &self,
        label: &str,
        source: NodeId,
        target: NodeId,
        properties: PropertyMap,
    ) -> Result<EdgeId, RouteGraphError> {
        self.inner.create_edge(label, source, target, properties)
    }

    fn edge_exists(
        &self,
        label: &str,
        source: NodeId,
        target: NodeId,
    ) -> Result<bool, RouteGraphError> {
        self.inner.edge_exists(label, source, target)
    }

    fn vertex(&self, id: NodeId) -> Result<Option<Node>, RouteGraphError> {
        self.inner.vertex(id)
    }

    fn edge(&self, id: EdgeId) -> Result<Option<Edge>, RouteGraphError> {
        self.inner.edge(id)
    }

    fn outgoing_edges(&self, _id: NodeId) -> Result<Vec<Edge>, RouteGraphError> {
        Err(RouteGraphError::unavailable("connection reset"))
    }

    fn incoming_edges(&self, _id: NodeId) -> Result<Vec<Edge>, RouteGraphError> {
        Err(RouteGraphError::unavailable("connection reset"))
    }

    fn drop_all(&self) -> Result<(), RouteGraphError> {
        self.inner.drop_all()
    }
}

#[test]
fn test_store_failures_propagate() {
    let store = UnavailableStore {
        inner: MemoryStore::default(),
    };
    let a = store.create_vertex("station", PropertyMap::new()).expect("a");
    let b = store.create_vertex("station", PropertyMap::new()).expect("b");
    let err = search(&store, &SearchRequest::new(a, b)).expect_err("unavailable");
    assert!(matches!(err, RouteGraphError::StoreUnavailable(_)));
}

#[test]
fn test_outcome_accessors() {
    let fx = line_abc();
    let outcome = search(&fx.store, &fx.weighted("A", "C")).expect("search");
    assert!(matches!(outcome, PathOutcome::Found { .. }));
    assert!(outcome.reason().is_none());
    assert!(outcome.stats().branches_expanded >= 2);
    assert!(outcome.into_path().is_some());
}

#[test]
fn test_arrival_before_the_budget_elapses_is_not_reported() {
    let store = MemoryStore {
        latency: Duration::from_millis(30),
        ..MemoryStore::default()
    };
    let named = |name: &str| {
        let mut props = PropertyMap::new();
        props.insert("name".into(), json!(name));
        store.create_vertex("station", props).expect("vertex")
    };
    let (a, b, c) = (named("A"), named("B"), named("C"));
    for (from, to, cost) in [(a, b, 10), (a, c, 1), (c, b, 1)] {
        let mut props = PropertyMap::new();
        props.insert("duration".into(), json!(cost));
        store
            .create_edge("connects_to", from, to, props)
            .expect("edge");
    }

    let request = SearchRequest::new(a, b)
        .weighted_by("duration")
        .with_constraints(SearchConstraints::default().with_time_budget(Duration::from_millis(10)));
    let outcome = search(&store, &request).expect("search");
    assert_eq!(outcome.reason(), Some(NoPathReason::TimeBudgetElapsed));
    assert_eq!(outcome.stats().depth, 1);
    assert!(outcome.path().is_none());

    let settled = search(&store, &SearchRequest::new(a, b).weighted_by("duration"))
        .expect("search")
        .into_path()
        .expect("path");
    assert_eq!(settled.total_cost, 2.0);
}
