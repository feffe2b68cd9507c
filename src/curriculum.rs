//! Learning units linked by prerequisites, and the roadmap leading to a unit.

use std::{fs, path::Path as FsPath};

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{
    backend::GraphStore,
    errors::RouteGraphError,
    graph::{Node, NodeId, PropertyMap},
    materialize::{Path, Projection},
    search::{DEFAULT_HOP_CEILING, materialize_branch_path},
    traversal::{Direction, TraversalSpec},
};

pub const LEARNING_UNIT: &str = "learning_unit";
pub const LEADS_TO: &str = "leads_to";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LearningUnit {
    pub id: NodeId,
    pub slug: String,
    pub title: String,
    pub category: String,
    pub hours: f64,
}

impl LearningUnit {
    fn from_node(node: &Node) -> Self {
        Self {
            id: node.id,
            slug: node.text("slug").unwrap_or_default().to_string(),
            title: node.text("title").unwrap_or_default().to_string(),
            category: node.text("category").unwrap_or_default().to_string(),
            hours: node.property("hours").and_then(Value::as_f64).unwrap_or(0.0),
        }
    }
}

/// Unit data as it appears in an import document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    #[serde(rename = "id")]
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub hours: f64,
    #[serde(default)]
    pub prerequisites: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct CurriculumDocument {
    #[serde(default)]
    units: Vec<UnitRecord>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumImport {
    pub units: usize,
    pub units_created: usize,
    pub dependencies: usize,
    pub skipped_prerequisites: usize,
}

/// Everything that has to be studied before `target`.
#[derive(Clone, Debug, PartialEq)]
pub struct Roadmap {
    pub target: LearningUnit,
    /// Every prerequisite chain walking back from the target, shortest first.
    /// Displayed from the target outward.
    pub chains: Vec<Path>,
    /// Distinct units in an order that respects every prerequisite, target last.
    pub study_order: Vec<LearningUnit>,
    pub total_hours: f64,
}

pub struct CurriculumRepository<S> {
    store: S,
    max_depth: u32,
}

impl<S> CurriculumRepository<S>
where
    S: GraphStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_depth: DEFAULT_HOP_CEILING,
        }
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn find_by_slug(&self, slug: &str) -> Result<Option<LearningUnit>, RouteGraphError> {
        Ok(self
            .store
            .find_vertex_by_property(LEARNING_UNIT, "slug", &json!(slug))?
            .map(|node| LearningUnit::from_node(&node)))
    }

    pub fn unit(&self, slug: &str) -> Result<LearningUnit, RouteGraphError> {
        self.find_by_slug(slug)?
            .ok_or_else(|| RouteGraphError::not_found(format!("learning unit '{slug}'")))
    }

    /// Upserts by slug. An existing unit is returned unchanged.
    pub fn save_unit(&self, record: &UnitRecord) -> Result<(LearningUnit, bool), RouteGraphError> {
        if record.slug.trim().is_empty() {
            return Err(RouteGraphError::invalid_input("learning unit slug must be set"));
        }
        let mut properties = PropertyMap::new();
        properties.insert("slug".into(), json!(record.slug));
        properties.insert("title".into(), json!(record.title));
        properties.insert("category".into(), json!(record.category));
        properties.insert("hours".into(), json!(record.hours));
        let upserted = self.store.upsert_vertex(LEARNING_UNIT, "slug", properties)?;
        let node = self
            .store
            .vertex(upserted.id)?
            .ok_or_else(|| RouteGraphError::not_found(format!("node {}", upserted.id)))?;
        Ok((LearningUnit::from_node(&node), upserted.created))
    }

    /// Records that `prerequisite` leads to `unit`. Returns `false` if the link existed.
    pub fn add_prerequisite(
        &self,
        prerequisite: &LearningUnit,
        unit: &LearningUnit,
    ) -> Result<bool, RouteGraphError> {
        if self.store.edge_exists(LEADS_TO, prerequisite.id, unit.id)? {
            return Ok(false);
        }
        let mut properties = PropertyMap::new();
        properties.insert("type".into(), json!("required"));
        self.store
            .create_edge(LEADS_TO, prerequisite.id, unit.id, properties)?;
        Ok(true)
    }

    /// Walks `leads_to` edges backwards from `slug` until units with no
    /// prerequisites, keeping every intermediate chain.
    pub fn roadmap(&self, slug: &str) -> Result<Roadmap, RouteGraphError> {
        let target = self.unit(slug)?;
        let spec = TraversalSpec::exhaustive(Direction::Incoming, self.max_depth)
            .with_edge_label(LEADS_TO);
        let outcome = self.store.traverse(target.id, &spec)?;

        let projection = Projection::new("title", "type");
        let mut depth: AHashMap<NodeId, usize> = AHashMap::new();
        depth.insert(target.id, 0);
        let mut chains = Vec::with_capacity(outcome.branches.len());
        for branch in &outcome.branches {
            for (hops, node) in branch.nodes.iter().enumerate() {
                let entry = depth.entry(*node).or_insert(hops);
                *entry = (*entry).max(hops);
            }
            chains.push(materialize_branch_path(&self.store, branch, &projection)?);
        }

        let mut ordered: Vec<(NodeId, usize)> = depth.into_iter().collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let mut study_order = Vec::with_capacity(ordered.len());
        for (id, _) in ordered {
            let node = self
                .store
                .vertex(id)?
                .ok_or_else(|| RouteGraphError::not_found(format!("node {id}")))?;
            study_order.push(LearningUnit::from_node(&node));
        }
        let total_hours = study_order.iter().map(|unit| unit.hours).sum();
        info!(
            target = %target.slug,
            chains = chains.len(),
            units = study_order.len(),
            "roadmap built"
        );
        Ok(Roadmap {
            target,
            chains,
            study_order,
            total_hours,
        })
    }

    pub fn import_file<P: AsRef<FsPath>>(
        &self,
        path: P,
    ) -> Result<CurriculumImport, RouteGraphError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            RouteGraphError::invalid_input(format!("cannot read {}: {e}", path.display()))
        })?;
        self.import_json(&text)
    }

    pub fn import_json(&self, text: &str) -> Result<CurriculumImport, RouteGraphError> {
        let document: CurriculumDocument =
            serde_json::from_str(text).map_err(|e| RouteGraphError::invalid_input(e.to_string()))?;
        self.import(&document.units)
    }

    /// Two passes: upsert every unit, then link prerequisites. Unknown
    /// prerequisite slugs are skipped.
    pub fn import(&self, records: &[UnitRecord]) -> Result<CurriculumImport, RouteGraphError> {
        let mut summary = CurriculumImport::default();
        let mut saved: AHashMap<&str, LearningUnit> = AHashMap::new();
        for record in records {
            let (unit, created) = self.save_unit(record)?;
            summary.units_created += usize::from(created);
            saved.insert(record.slug.as_str(), unit);
        }
        summary.units = saved.len();

        let mut seen: AHashSet<(NodeId, NodeId)> = AHashSet::new();
        for record in records {
            let Some(unit) = saved.get(record.slug.as_str()) else {
                continue;
            };
            for prerequisite in &record.prerequisites {
                let Some(source) = saved.get(prerequisite.as_str()) else {
                    warn!(
                        unit = %record.slug,
                        prerequisite = %prerequisite,
                        "unknown prerequisite skipped"
                    );
                    summary.skipped_prerequisites += 1;
                    continue;
                };
                if source.id == unit.id || !seen.insert((source.id, unit.id)) {
                    continue;
                }
                if self.add_prerequisite(source, unit)? {
                    summary.dependencies += 1;
                }
            }
        }
        info!(
            units = summary.units,
            dependencies = summary.dependencies,
            "curriculum imported"
        );
        Ok(summary)
    }
}
