//! Merge of per-language results into one graph

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use super::model::{
    Alias, Confidence, Edge, EdgeKind, EdgeTarget, Entity, Graph, RawEdge, EXTERNAL_ID,
};
use crate::error::AnalysisError;
use crate::extract::FileExtraction;
use crate::resolve::{EntityIndex, Located};
use crate::scanner::LanguageTag;

/// Everything one language contributed to a run
#[derive(Debug, Clone)]
pub struct PartialGraph {
    pub language: LanguageTag,
    pub entities: Vec<Entity>,
    pub aliases: Vec<Alias>,
    pub edges: Vec<RawEdge>,
}

impl PartialGraph {
    #[must_use]
    pub fn new(language: LanguageTag) -> Self {
        Self {
            language,
            entities: Vec::new(),
            aliases: Vec::new(),
            edges: Vec::new(),
        }
    }
}

/// Single-writer merge step
///
/// Entity ids are expected to be unique across partials; a repeat is an
/// internal error. Edges are deduplicated by (source, target, kind) keeping
/// the earliest site and the most certain confidence.
#[derive(Debug, Clone)]
pub struct Unifier {
    root: PathBuf,
    entry_points: Vec<String>,
}

impl Unifier {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, entry_points: &[String]) -> Self {
        Self {
            root: root.into(),
            entry_points: entry_points.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// Whether a local name is exempt from orphan detection
    #[must_use]
    pub fn is_entry_point(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.entry_points
            .iter()
            .any(|pattern| match pattern.strip_suffix('*') {
                Some(prefix) => name.starts_with(prefix),
                None => name == *pattern,
            })
    }

    /// Merge partial results into a graph
    ///
    /// # Errors
    /// Returns `AnalysisError::GraphConsistency` if two entities share an id.
    pub fn unify(&self, partials: Vec<PartialGraph>) -> Result<Graph, AnalysisError> {
        let mut entities: BTreeMap<String, Entity> = BTreeMap::new();
        let mut aliases = Vec::new();
        let mut raw_edges = Vec::new();

        for partial in partials {
            tracing::debug!(
                "Merging {}: {} entities, {} edges",
                partial.language,
                partial.entities.len(),
                partial.edges.len()
            );
            for entity in partial.entities {
                if let Some(first) = entities.get(&entity.id) {
                    return Err(AnalysisError::GraphConsistency {
                        id: entity.id,
                        first: first.file.clone(),
                        second: entity.file,
                    });
                }
                entities.insert(entity.id.clone(), entity);
            }
            aliases.extend(partial.aliases);
            raw_edges.extend(partial.edges);
        }

        let mut index = EntityIndex::new(&self.root, None);
        index.insert(FileExtraction {
            entities: entities.values().cloned().collect(),
            aliases,
        });

        let mut edges: BTreeMap<(String, String, EdgeKind), Edge> = BTreeMap::new();
        for raw in raw_edges {
            if !entities.contains_key(&raw.source) {
                tracing::debug!("Dropping edge from unknown entity {}", raw.source);
                continue;
            }
            let target = match raw.target {
                EdgeTarget::Entity(id) if entities.contains_key(&id) => Some(id),
                EdgeTarget::Deferred(location) => match index.locate(&location) {
                    Located::Entity(found) => Some(found.id.clone()),
                    Located::Elsewhere(_) | Located::External => None,
                },
                EdgeTarget::Entity(_) | EdgeTarget::External => None,
            };
            let (target, confidence) = match target {
                Some(id) => (id, raw.confidence),
                None => (EXTERNAL_ID.to_string(), Confidence::Unresolved),
            };

            let edge = Edge {
                source: raw.source,
                target,
                kind: raw.kind,
                confidence,
                line: raw.site.line,
                column: raw.site.character,
            };
            edges
                .entry((edge.source.clone(), edge.target.clone(), edge.kind))
                .and_modify(|kept| {
                    if (edge.line, edge.column) < (kept.line, kept.column) {
                        kept.line = edge.line;
                        kept.column = edge.column;
                    }
                    kept.confidence = kept.confidence.min(edge.confidence);
                })
                .or_insert(edge);
        }

        let referenced: HashSet<&str> = edges
            .values()
            .filter(|e| !e.is_external() && e.source != e.target)
            .map(|e| e.target.as_str())
            .collect();
        let orphans: HashSet<String> = entities
            .values()
            .filter(|e| !referenced.contains(e.id.as_str()) && !self.is_entry_point(&e.name))
            .map(|e| e.id.clone())
            .collect();

        let entities: Vec<Entity> = entities
            .into_values()
            .map(|mut entity| {
                entity.orphan = orphans.contains(&entity.id);
                entity
            })
            .collect();
        let mut edges: Vec<Edge> = edges.into_values().collect();
        edges.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        tracing::info!(
            "Unified {} entities, {} edges, {} orphans",
            entities.len(),
            edges.len(),
            orphans.len()
        );
        Ok(Graph { entities, edges })
    }
}
