use std::{env, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    backend::SqliteStore,
    errors::RouteGraphError,
    graph::SqliteGraph,
    search::{DEFAULT_HOP_CEILING, SearchConstraints},
};

/// Environment variables read by [`AppConfig::from_env`], paired with the
/// override key they map to.
pub const ENV_KEYS: [(&str, &str); 5] = [
    ("ROUTEGRAPH_DB", "db"),
    ("ROUTEGRAPH_HOP_CEILING", "hop-ceiling"),
    ("ROUTEGRAPH_FRONTIER_WIDTH", "frontier-width"),
    ("ROUTEGRAPH_TIME_BUDGET_MS", "time-budget-ms"),
    ("ROUTEGRAPH_ADJACENCY_CACHE", "adjacency-cache"),
];

/// Process configuration. Built once at start-up and passed down explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// `memory` or a database file path.
    pub database: String,
    pub hop_ceiling: u32,
    pub frontier_width: Option<usize>,
    pub time_budget_ms: Option<u64>,
    pub adjacency_cache: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: "memory".to_string(),
            hop_ceiling: DEFAULT_HOP_CEILING,
            frontier_width: Some(100),
            time_budget_ms: Some(90_000),
            adjacency_cache: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, RouteGraphError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for [`ENV_KEYS`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RouteGraphError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        for (var, key) in ENV_KEYS {
            if let Some(value) = lookup(var) {
                config
                    .set(key, &value)
                    .map_err(|e| RouteGraphError::invalid_input(format!("{var}: {e}")))?;
            }
        }
        Ok(config)
    }

    /// Applies `key=value` overrides in order; later ones win.
    pub fn apply_overrides(&mut self, overrides: &[(String, String)]) -> Result<(), RouteGraphError> {
        for (key, value) in overrides {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Sets one field from its textual form. `none` clears optional limits.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), RouteGraphError> {
        match key.replace('_', "-").as_str() {
            "db" | "database" => {
                if value.trim().is_empty() {
                    return Err(RouteGraphError::invalid_input("database must not be empty"));
                }
                self.database = value.to_string();
            }
            "hop-ceiling" => {
                let ceiling = parse_number::<u32>(key, value)?;
                if ceiling == 0 {
                    return Err(RouteGraphError::invalid_input("hop-ceiling must be positive"));
                }
                self.hop_ceiling = ceiling;
            }
            "frontier-width" => {
                let width = parse_optional::<usize>(key, value)?;
                if width == Some(0) {
                    return Err(RouteGraphError::invalid_input(
                        "frontier-width must be positive",
                    ));
                }
                self.frontier_width = width;
            }
            "time-budget-ms" => self.time_budget_ms = parse_optional::<u64>(key, value)?,
            "adjacency-cache" => self.adjacency_cache = parse_flag(key, value)?,
            other => {
                return Err(RouteGraphError::invalid_input(format!(
                    "unknown setting {other}"
                )));
            }
        }
        Ok(())
    }

    pub fn search_constraints(&self) -> SearchConstraints {
        SearchConstraints {
            max_hops: None,
            frontier_width: self.frontier_width,
            time_budget: self.time_budget_ms.map(Duration::from_millis),
            hop_ceiling: self.hop_ceiling,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == "memory"
    }

    pub fn open_store(&self) -> Result<SqliteStore, RouteGraphError> {
        let graph = if self.is_in_memory() {
            SqliteGraph::open_in_memory()?
        } else {
            SqliteGraph::open(&self.database)?
        };
        Ok(SqliteStore::from_graph(
            graph.with_adjacency_cache(self.adjacency_cache),
        ))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, RouteGraphError> {
    value
        .trim()
        .parse()
        .map_err(|_| RouteGraphError::invalid_input(format!("{key} expects a number, got '{value}'")))
}

fn parse_optional<T: std::str::FromStr>(
    key: &str,
    value: &str,
) -> Result<Option<T>, RouteGraphError> {
    match value.trim() {
        "none" | "unbounded" => Ok(None),
        other => parse_number(key, other).map(Some),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, RouteGraphError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RouteGraphError::invalid_input(format!(
            "{key} expects true or false, got '{value}'"
        ))),
    }
}
