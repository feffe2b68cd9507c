//! Property-graph routing over SQLite: a beam-pruned shortest-path engine, the
//! store trait it runs against, and metro and curriculum applications on top.
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod backend;
pub mod cache;
pub mod client;
pub mod config;
pub mod curriculum;
pub mod errors;
pub mod graph;
pub mod index;
pub mod materialize;
pub mod metro;
pub mod schema;
pub mod search;
pub mod synthetic;
pub mod traversal;

pub use crate::backend::{GraphStore, SqliteStore, Upserted};
pub use crate::config::AppConfig;
pub use crate::errors::RouteGraphError;
pub use crate::graph::{Edge, EdgeId, Node, NodeId, PropertyMap, SqliteGraph};
pub use crate::materialize::{DisplayStep, Path, Projection, materialize};
pub use crate::search::{
    NoPathReason, PathOutcome, SearchConstraints, SearchRequest, SearchStats, find_path, search,
};
pub use crate::traversal::{Direction, TraversalSpec};
