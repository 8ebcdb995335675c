//! Symbol tree → entities

use std::collections::HashMap;

use super::id::{sanitize_segment, IdAllocator};
use super::kinds::{classify, is_abstract, visibility, Role, Scope};
use crate::backend::{BackendSymbol, BackendSymbolKind};
use crate::graph::{Entity, EntityKind};
use crate::scanner::LanguageTag;

/// A classified symbol, children first-class
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) symbol: BackendSymbol,
    pub(crate) role: Role,
    /// Scope the symbol itself sits in
    pub(crate) scope: Scope,
    pub(crate) children: Vec<Node>,
}

impl Node {
    /// Childless top-level bindings that may re-export another file's symbol
    pub(crate) fn is_binding(&self) -> bool {
        self.children.is_empty()
            && matches!(
                self.symbol.kind,
                BackendSymbolKind::Variable
                    | BackendSymbolKind::Constant
                    | BackendSymbolKind::Module
                    | BackendSymbolKind::Object
                    | BackendSymbolKind::Key
            )
    }
}

/// Rebuild a hierarchy from a flat listing using span containment
///
/// Hierarchical listings are returned unchanged.
#[must_use]
pub fn nest_flat(mut symbols: Vec<BackendSymbol>) -> Vec<BackendSymbol> {
    if symbols.iter().any(|s| !s.children.is_empty()) {
        return symbols;
    }
    symbols.sort_by(|a, b| {
        a.span
            .start
            .cmp(&b.span.start)
            .then_with(|| b.span.end.cmp(&a.span.end))
    });

    fn attach(done: BackendSymbol, stack: &mut [BackendSymbol], roots: &mut Vec<BackendSymbol>) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(done),
            None => roots.push(done),
        }
    }

    let mut roots = Vec::new();
    let mut stack: Vec<BackendSymbol> = Vec::new();
    for symbol in symbols {
        while stack.last().is_some_and(|top| {
            !(top.span.contains(symbol.span.start) && symbol.span.end <= top.span.end)
        }) {
            if let Some(done) = stack.pop() {
                attach(done, &mut stack, &mut roots);
            }
        }
        stack.push(symbol);
    }
    while let Some(done) = stack.pop() {
        attach(done, &mut stack, &mut roots);
    }
    roots
}

/// Classify a symbol tree, siblings in source order
pub(crate) fn build_nodes(mut symbols: Vec<BackendSymbol>, scope: Scope) -> Vec<Node> {
    symbols.sort_by_key(|s| (s.span.start, s.selection));
    symbols
        .into_iter()
        .map(|mut symbol| {
            let role = classify(&symbol, scope);
            let child_scope = match &role {
                Role::Entity { kind, .. } => scope.enter(*kind),
                Role::TypeScope { name: Some(_), .. } => scope.enter(EntityKind::Method),
                Role::TypeScope { name: None, .. } => scope.enter(EntityKind::Struct),
                Role::Skip => scope,
            };
            let children = build_nodes(std::mem::take(&mut symbol.children), child_scope);
            Node {
                symbol,
                role,
                scope,
                children,
            }
        })
        .collect()
}

/// Id assignment state for one file
struct Assigner<'a> {
    file: &'a str,
    language: &'a LanguageTag,
    ids: IdAllocator,
    /// First top-level type entity per sanitized name
    types: HashMap<String, String>,
    out: Vec<Entity>,
}

impl Assigner<'_> {
    fn visit(&mut self, nodes: &[Node], parent_id: &str, container: Option<&str>) {
        // Type scopes last, so `impl X` finds `X` wherever it is declared
        let (scopes, plain): (Vec<&Node>, Vec<&Node>) = nodes
            .iter()
            .partition(|n| matches!(n.role, Role::TypeScope { .. }));

        for node in plain {
            match &node.role {
                Role::Entity {
                    kind,
                    name,
                    constructor,
                } => {
                    let id = self.ids.child(parent_id, name);
                    if container.is_none() && kind.is_type() {
                        self.types
                            .entry(sanitize_segment(name))
                            .or_insert_with(|| id.clone());
                    }
                    self.push(node, id.clone(), name, *kind, *constructor, container);
                    self.visit(&node.children, &id, Some(&id));
                }
                Role::Skip => self.visit(&node.children, parent_id, container),
                Role::TypeScope { .. } => {}
            }
        }

        for node in scopes {
            let Role::TypeScope { type_name, name } = &node.role else {
                continue;
            };
            let (scope_id, scope_container) = match self.types.get(&sanitize_segment(type_name)) {
                Some(type_id) => (type_id.clone(), Some(type_id.clone())),
                None => (format!("{parent_id}.{}", sanitize_segment(type_name)), None),
            };

            match name {
                Some(method) => {
                    let id = self.ids.child(&scope_id, method);
                    self.push(
                        node,
                        id.clone(),
                        method,
                        EntityKind::Method,
                        false,
                        scope_container.as_deref(),
                    );
                    self.visit(&node.children, &id, Some(&id));
                }
                None => self.visit(&node.children, &scope_id, scope_container.as_deref()),
            }
        }
    }

    fn push(
        &mut self,
        node: &Node,
        id: String,
        name: &str,
        kind: EntityKind,
        constructor: bool,
        container: Option<&str>,
    ) {
        self.out.push(Entity {
            id,
            name: name.to_string(),
            kind,
            file: self.file.to_string(),
            container: container.map(str::to_string),
            span: node.symbol.span,
            selection: node.symbol.selection,
            visibility: visibility(&node.symbol, name, self.language),
            language: self.language.clone(),
            constructor,
            is_abstract: is_abstract(&node.symbol, kind, node.scope),
            orphan: false,
        });
    }
}

/// Assign canonical ids to a classified tree
///
/// `module` is the file's module path and `file` its root-relative path.
pub(crate) fn assign_ids(
    nodes: &[Node],
    module: &str,
    file: &str,
    language: &LanguageTag,
) -> Vec<Entity> {
    let mut assigner = Assigner {
        file,
        language,
        ids: IdAllocator::new(),
        types: HashMap::new(),
        out: Vec::new(),
    };
    assigner.visit(nodes, module, None);
    assigner.out
}

/// Entities of one file's symbol listing, without re-export probing
#[must_use]
pub fn entities_from_symbols(
    symbols: Vec<BackendSymbol>,
    module: &str,
    file: &str,
    language: &LanguageTag,
) -> Vec<Entity> {
    let nodes = build_nodes(nest_flat(symbols), Scope::default());
    assign_ids(&nodes, module, file, language)
}
