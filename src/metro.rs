//! Metro network: stations, bidirectional timed connections, itineraries.

use std::{fmt::Write as _, fs, path::Path as FsPath};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::{
    backend::GraphStore,
    errors::RouteGraphError,
    graph::{Node, NodeId, PropertyMap},
    materialize::{Path, Projection},
    search::{PathOutcome, SearchConstraints, SearchRequest, search},
};

pub const STATION: &str = "station";
pub const CONNECTS_TO: &str = "connects_to";
pub const DEFAULT_STOP_SECONDS: f64 = 90.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: NodeId,
    pub name: String,
    pub zone: i64,
}

impl Station {
    fn from_node(node: &Node) -> Self {
        Self {
            id: node.id,
            name: node.text("name").unwrap_or_default().to_string(),
            zone: node.property("zone").and_then(Value::as_i64).unwrap_or(1),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Station entries read, counting repeats across lines.
    pub stations_processed: usize,
    pub stations_created: usize,
    /// Consecutive station pairs linked.
    pub links: usize,
    /// Directed edges actually written.
    pub edges_created: usize,
}

pub struct MetroNetwork<S> {
    store: S,
    constraints: SearchConstraints,
}

impl<S> MetroNetwork<S>
where
    S: GraphStore,
{
    pub fn new(store: S, constraints: SearchConstraints) -> Self {
        Self { store, constraints }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn find_station(&self, name: &str) -> Result<Option<Station>, RouteGraphError> {
        Ok(self
            .store
            .find_vertex_by_property(STATION, "name", &json!(name))?
            .map(|node| Station::from_node(&node)))
    }

    pub fn station(&self, name: &str) -> Result<Station, RouteGraphError> {
        self.find_station(name)?
            .ok_or_else(|| RouteGraphError::not_found(format!("station '{name}'")))
    }

    /// Returns the station called `name`, creating it in zone 1 when absent.
    pub fn save_station(&self, name: &str) -> Result<(Station, bool), RouteGraphError> {
        let mut properties = PropertyMap::new();
        properties.insert("name".into(), json!(name));
        properties.insert("zone".into(), json!(1));
        let upserted = self.store.upsert_vertex(STATION, "name", properties)?;
        let node = self
            .store
            .vertex(upserted.id)?
            .ok_or_else(|| RouteGraphError::not_found(format!("node {}", upserted.id)))?;
        Ok((Station::from_node(&node), upserted.created))
    }

    /// Links two stations both ways. Directions that already exist are left
    /// alone; the number of edges written is returned.
    pub fn save_connection(
        &self,
        from: &Station,
        to: &Station,
        line: &str,
        duration: f64,
    ) -> Result<usize, RouteGraphError> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(RouteGraphError::invalid_input(format!(
                "connection duration must be a non-negative number, got {duration}"
            )));
        }
        let mut properties = PropertyMap::new();
        properties.insert("line".into(), json!(line));
        properties.insert("duration".into(), json!(duration));
        let mut created = 0;
        for (source, target) in [(from.id, to.id), (to.id, from.id)] {
            if !self.store.edge_exists(CONNECTS_TO, source, target)? {
                self.store
                    .create_edge(CONNECTS_TO, source, target, properties.clone())?;
                created += 1;
            }
        }
        Ok(created)
    }

    /// Minimum total travel time between two stations.
    pub fn fastest_route(&self, from: &str, to: &str) -> Result<PathOutcome, RouteGraphError> {
        let request = self.request(from, to)?.weighted_by("duration");
        search(&self.store, &request)
    }

    /// Fewest stops between two stations, ignoring durations.
    pub fn fewest_hops_route(&self, from: &str, to: &str) -> Result<PathOutcome, RouteGraphError> {
        let request = self.request(from, to)?;
        search(&self.store, &request)
    }

    pub fn import_file<P: AsRef<FsPath>>(&self, path: P) -> Result<ImportSummary, RouteGraphError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            RouteGraphError::invalid_input(format!("cannot read {}: {e}", path.display()))
        })?;
        self.import_json(&text)
    }

    pub fn import_json(&self, text: &str) -> Result<ImportSummary, RouteGraphError> {
        let document: Value =
            serde_json::from_str(text).map_err(|e| RouteGraphError::invalid_input(e.to_string()))?;
        self.import(&document)
    }

    /// Loads `{TYPE: {avg_stop_time, lines: {line: [station, ...]}}}`.
    pub fn import(&self, document: &Value) -> Result<ImportSummary, RouteGraphError> {
        let types = document
            .as_object()
            .ok_or_else(|| RouteGraphError::invalid_input("network document must be an object"))?;
        let mut summary = ImportSummary::default();
        for (transport, section) in types {
            let stop_seconds = match section.get("avg_stop_time") {
                None | Some(Value::Null) => DEFAULT_STOP_SECONDS,
                Some(value) => value.as_f64().ok_or_else(|| {
                    RouteGraphError::invalid_input(format!(
                        "{transport}: avg_stop_time must be a number"
                    ))
                })?,
            };
            let Some(lines) = section.get("lines") else {
                continue;
            };
            let lines = lines.as_object().ok_or_else(|| {
                RouteGraphError::invalid_input(format!("{transport}: lines must be an object"))
            })?;
            for (line, stations) in lines {
                let label = line_label(transport, line);
                let stations = stations.as_array().ok_or_else(|| {
                    RouteGraphError::invalid_input(format!("line {label}: expected a station list"))
                })?;
                let mut previous: Option<Station> = None;
                for entry in stations {
                    let name = entry.as_str().ok_or_else(|| {
                        RouteGraphError::invalid_input(format!(
                            "line {label}: station names must be strings"
                        ))
                    })?;
                    let (station, created) = self.save_station(name)?;
                    summary.stations_processed += 1;
                    summary.stations_created += usize::from(created);
                    if let Some(prev) = &previous {
                        if prev.id != station.id {
                            summary.edges_created +=
                                self.save_connection(prev, &station, &label, stop_seconds)?;
                            summary.links += 1;
                        }
                    }
                    previous = Some(station);
                }
            }
        }
        info!(
            stations = summary.stations_created,
            links = summary.links,
            edges = summary.edges_created,
            "metro network imported"
        );
        Ok(summary)
    }

    fn request(&self, from: &str, to: &str) -> Result<SearchRequest, RouteGraphError> {
        let start = self.station(from)?;
        let end = self.station(to)?;
        Ok(SearchRequest::new(start.id, end.id)
            .along(CONNECTS_TO)
            .with_constraints(self.constraints)
            .with_projection(Projection::new("name", "line")))
    }
}

/// Display label of a line: bare for the metro, prefixed with its type otherwise.
pub fn line_label(transport: &str, line: &str) -> String {
    if transport == "METRO" {
        line.to_string()
    } else {
        format!("{transport} {line}")
    }
}

pub fn format_duration(seconds: f64) -> String {
    let whole = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{} min {} sec", whole / 60, whole % 60)
}

/// Human-readable itinerary for a metro route. `weighted` selects whether the
/// header reports travel time or stop count.
pub fn render_itinerary(path: &Path, weighted: bool) -> String {
    let mut out = String::new();
    if weighted {
        let _ = writeln!(out, "Fastest route ({})", format_duration(path.total_cost));
    } else {
        let _ = writeln!(out, "Fewest stops ({} hops)", path.hops());
    }
    let _ = writeln!(out, "{}", "=".repeat(40));
    let steps = &path.display;
    for (idx, step) in steps.iter().enumerate() {
        if idx == 0 {
            let _ = writeln!(out, "START: {}", step.name);
            continue;
        }
        let via = step.via.as_deref().unwrap_or("unknown");
        let _ = writeln!(out, "    (travel via {via})");
        if idx + 1 == steps.len() {
            let _ = writeln!(out, "ARRIVAL: {}", step.name);
        } else {
            let _ = writeln!(out, "  {}", step.name);
        }
    }
    out
}
