//! Reference resolution
//!
//! For each entity, asks its backend where its calls (or its supertypes)
//! resolve to and turns every answer into a raw edge. The backend's answer
//! is trusted as given; dispatch is never re-derived here.

mod classify;
mod index;

pub use classify::{call_kind, is_supertype_site, supertype_kind};
pub use index::{EntityIndex, Located};

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::backend::{BackendHandle, HierarchyItem, Location, Position};
use crate::error::BackendError;
use crate::graph::{Confidence, EdgeKind, EdgeTarget, Entity, RawEdge};

/// What to emit when a call resolves to an abstract declaration
///
/// Such an answer means the backend could not trace the concrete receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchPolicy {
    /// One `unresolved` call edge to the external sentinel
    #[default]
    Unresolved,
    /// One `ambiguous` call edge per implementation the backend reports
    FanOut,
}

/// Resolution switches taken from the analyzer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    pub dispatch: DispatchPolicy,
    pub type_hierarchy: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            dispatch: DispatchPolicy::default(),
            type_hierarchy: true,
        }
    }
}

/// Malformed responses count as empty ones
pub(crate) fn empty_on_protocol<T>(
    result: Result<Vec<T>, BackendError>,
    what: &str,
) -> Result<Vec<T>, BackendError> {
    match result {
        Err(BackendError::Protocol { operation, detail }) => {
            tracing::warn!("Ignoring malformed {} response for {}: {}", operation, what, detail);
            Ok(Vec::new())
        }
        other => other,
    }
}

/// Resolves the entities of one language against its entity index
pub struct Resolver<'a> {
    handle: &'a BackendHandle,
    index: &'a EntityIndex,
    options: ResolveOptions,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(handle: &'a BackendHandle, index: &'a EntityIndex, options: ResolveOptions) -> Self {
        Self {
            handle,
            index,
            options,
        }
    }

    fn location_of(&self, entity: &Entity) -> Location {
        Location::new(self.index.path_of(entity), entity.span).with_selection(entity.selection)
    }

    /// Raw edges leaving one entity
    ///
    /// # Errors
    /// Returns the backend error when the entity's references could not be
    /// obtained. Malformed responses yield no edges instead.
    pub async fn resolve_entity(&self, entity: &Entity) -> Result<Vec<RawEdge>, BackendError> {
        if entity.kind.is_callable() {
            self.resolve_calls(entity).await
        } else if entity.kind.is_type() && self.options.type_hierarchy {
            self.resolve_supertypes(entity).await
        } else {
            Ok(Vec::new())
        }
    }

    async fn resolve_calls(&self, entity: &Entity) -> Result<Vec<RawEdge>, BackendError> {
        let at = self.location_of(entity);
        let calls = empty_on_protocol(self.handle.outgoing_calls(&at).await, &entity.id)?;

        // Distinct targets per call site
        let mut per_site: BTreeMap<Position, HashSet<&Location>> = BTreeMap::new();
        for call in &calls {
            for site in &call.sites {
                per_site
                    .entry(site.start)
                    .or_default()
                    .insert(&call.target.location);
            }
        }

        let mut edges = Vec::new();
        let mut fanned: HashMap<String, Vec<EdgeTarget>> = HashMap::new();
        for call in &calls {
            for site in &call.sites {
                let shared = per_site.get(&site.start).map_or(1, HashSet::len) > 1;
                let confidence = if shared {
                    Confidence::Ambiguous
                } else {
                    Confidence::Resolved
                };
                let supertype_site = self
                    .index
                    .line_text(&at.file, site.start.line)
                    .is_some_and(|line| {
                        is_supertype_site(line, site.start.character, &entity.language)
                    });

                self.call_edges(
                    entity,
                    &call.target,
                    site.start,
                    confidence,
                    supertype_site,
                    &mut fanned,
                    &mut edges,
                )
                .await?;
            }
        }
        Ok(edges)
    }

    #[allow(clippy::too_many_arguments)]
    async fn call_edges(
        &self,
        entity: &Entity,
        target: &HierarchyItem,
        site: Position,
        confidence: Confidence,
        supertype_site: bool,
        fanned: &mut HashMap<String, Vec<EdgeTarget>>,
        edges: &mut Vec<RawEdge>,
    ) -> Result<(), BackendError> {
        let edge = |target: EdgeTarget, kind: EdgeKind, confidence: Confidence| RawEdge {
            source: entity.id.clone(),
            target,
            kind,
            confidence,
            site,
        };

        match self.index.locate(&target.location) {
            Located::Entity(found) if found.is_abstract && !supertype_site => {
                match self.options.dispatch {
                    DispatchPolicy::Unresolved => {
                        edges.push(edge(EdgeTarget::External, EdgeKind::Call, Confidence::Unresolved));
                    }
                    DispatchPolicy::FanOut => {
                        if !fanned.contains_key(&found.id) {
                            let targets = self.implementations_of(found).await?;
                            fanned.insert(found.id.clone(), targets);
                        }
                        match fanned.get(&found.id).map(Vec::as_slice) {
                            Some(targets) if !targets.is_empty() => {
                                for implementor in targets {
                                    edges.push(edge(
                                        implementor.clone(),
                                        EdgeKind::Call,
                                        Confidence::Ambiguous,
                                    ));
                                }
                            }
                            _ => edges.push(edge(
                                EdgeTarget::External,
                                EdgeKind::Call,
                                Confidence::Unresolved,
                            )),
                        }
                    }
                }
            }
            Located::Entity(found) => edges.push(edge(
                EdgeTarget::Entity(found.id.clone()),
                call_kind(target, Some(found), supertype_site),
                confidence,
            )),
            Located::Elsewhere(location) => edges.push(edge(
                EdgeTarget::Deferred(location),
                call_kind(target, None, supertype_site),
                confidence,
            )),
            Located::External => edges.push(edge(
                EdgeTarget::External,
                call_kind(target, None, supertype_site),
                Confidence::Unresolved,
            )),
        }
        Ok(())
    }

    /// Concrete implementations of an abstract declaration
    async fn implementations_of(&self, declaration: &Entity) -> Result<Vec<EdgeTarget>, BackendError> {
        let at = self.location_of(declaration);
        let found = match self.handle.implementations(&at).await {
            Ok(found) => found,
            Err(e) if e.is_terminal() => return Err(e),
            Err(e) => {
                tracing::debug!("No implementations of {}: {}", declaration.id, e);
                Vec::new()
            }
        };

        let mut targets = Vec::new();
        for location in &found {
            let target = match self.index.locate(location) {
                Located::Entity(e) if !e.is_abstract && e.id != declaration.id => {
                    EdgeTarget::Entity(e.id.clone())
                }
                Located::Elsewhere(location) => EdgeTarget::Deferred(location),
                _ => continue,
            };
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        Ok(targets)
    }

    async fn resolve_supertypes(&self, entity: &Entity) -> Result<Vec<RawEdge>, BackendError> {
        let at = self.location_of(entity);
        let supers = empty_on_protocol(self.handle.supertypes(&at).await, &entity.id)?;

        Ok(supers
            .iter()
            .map(|sup| {
                let (target, kind, confidence) = match self.index.locate(&sup.location) {
                    Located::Entity(found) => (
                        EdgeTarget::Entity(found.id.clone()),
                        supertype_kind(entity.kind, sup, Some(found)),
                        Confidence::Resolved,
                    ),
                    Located::Elsewhere(location) => (
                        EdgeTarget::Deferred(location),
                        supertype_kind(entity.kind, sup, None),
                        Confidence::Resolved,
                    ),
                    Located::External => (
                        EdgeTarget::External,
                        supertype_kind(entity.kind, sup, None),
                        Confidence::Unresolved,
                    ),
                };
                RawEdge {
                    source: entity.id.clone(),
                    target,
                    kind,
                    confidence,
                    site: entity.selection,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests;
