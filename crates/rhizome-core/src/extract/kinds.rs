//! Mapping of backend symbols onto entity kinds

use crate::backend::{BackendSymbol, BackendSymbolKind};
use crate::graph::{EntityKind, Visibility};
use crate::scanner::LanguageTag;

/// Where a symbol sits in its file's symbol tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scope {
    /// Kind of the nearest enclosing entity, `None` at the top level
    pub parent: Option<EntityKind>,
    /// Inside a function or method body
    pub in_callable: bool,
}

impl Scope {
    #[must_use]
    pub fn enter(self, kind: EntityKind) -> Self {
        Self {
            parent: Some(kind),
            in_callable: self.in_callable || kind.is_callable(),
        }
    }

    fn at_module_level(self) -> bool {
        !self.in_callable && matches!(self.parent, None | Some(EntityKind::Module))
    }
}

/// What a backend symbol contributes to the entity table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Entity {
        kind: EntityKind,
        /// Local name with receiver prefixes removed
        name: String,
        constructor: bool,
    },
    /// `impl X` blocks and Go receivers: children belong to type `X`
    TypeScope { type_name: String, name: Option<String> },
    /// Not an entity; children are still visited in the same scope
    Skip,
}

/// Classify a symbol given its enclosing scope
#[must_use]
pub fn classify(symbol: &BackendSymbol, scope: Scope) -> Role {
    if let Some(type_name) = impl_target(&symbol.name) {
        return Role::TypeScope {
            type_name,
            name: None,
        };
    }
    if let Some((type_name, method)) = receiver_method(&symbol.name) {
        return Role::TypeScope {
            type_name,
            name: Some(method),
        };
    }

    let entity = |kind| Role::Entity {
        kind,
        name: symbol.name.clone(),
        constructor: false,
    };

    match symbol.kind {
        BackendSymbolKind::Class => entity(EntityKind::Class),
        BackendSymbolKind::Interface => entity(EntityKind::Interface),
        BackendSymbolKind::Struct => entity(EntityKind::Struct),
        BackendSymbolKind::Enum => entity(EntityKind::Enum),
        BackendSymbolKind::EnumMember => entity(EntityKind::EnumMember),
        BackendSymbolKind::Module | BackendSymbolKind::Namespace | BackendSymbolKind::Package => {
            entity(EntityKind::Module)
        }
        // Associated functions of a type are its methods
        BackendSymbolKind::Function if scope.parent.is_some_and(EntityKind::is_type) => {
            entity(EntityKind::Method)
        }
        BackendSymbolKind::Function => entity(EntityKind::Function),
        BackendSymbolKind::Method | BackendSymbolKind::Constructor => Role::Entity {
            kind: EntityKind::Method,
            name: symbol.name.clone(),
            constructor: symbol.kind == BackendSymbolKind::Constructor
                || is_constructor_name(&symbol.name),
        },
        BackendSymbolKind::Constant if !scope.in_callable => entity(EntityKind::Constant),
        BackendSymbolKind::Variable if scope.at_module_level() => entity(EntityKind::Constant),
        BackendSymbolKind::TypeParameter if scope.at_module_level() => {
            entity(EntityKind::TypeAlias)
        }
        _ => Role::Skip,
    }
}

fn is_constructor_name(name: &str) -> bool {
    matches!(name, "__init__" | "constructor")
}

/// Self type of a Rust `impl` block label: `impl<T> Display for Foo<T>` → `Foo`
fn impl_target(name: &str) -> Option<String> {
    let rest = name.strip_prefix("impl")?;
    if !(rest.starts_with(' ') || rest.starts_with('<')) {
        return None;
    }
    let rest = skip_generics(rest.trim_start());
    let target = match rest.rfind(" for ") {
        Some(at) => &rest[at + 5..],
        None => rest,
    };
    let target = target.trim().trim_start_matches('&').trim_start_matches("mut ");
    let base: String = target
        .chars()
        .take_while(|c| *c != '<' && !c.is_whitespace())
        .collect();
    let base = base.rsplit("::").next().unwrap_or_default().to_string();
    (!base.is_empty()).then_some(base)
}

fn skip_generics(text: &str) -> &str {
    if !text.starts_with('<') {
        return text;
    }
    let mut depth = 0usize;
    for (i, ch) in text.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return text[i + 1..].trim_start();
                }
            }
            _ => {}
        }
    }
    ""
}

/// Go method labels: `(*Server).Handle` → (`Server`, `Handle`)
fn receiver_method(name: &str) -> Option<(String, String)> {
    let rest = name.strip_prefix('(')?;
    let close = rest.find(')')?;
    let receiver = rest[..close].trim().trim_start_matches('*');
    let method = rest[close + 1..].strip_prefix('.')?;
    let receiver: String = receiver.chars().take_while(|c| *c != '[').collect();
    if receiver.is_empty() || method.is_empty() {
        return None;
    }
    Some((receiver, method.to_string()))
}

/// Whether an entity declares behaviour without implementing it
#[must_use]
pub fn is_abstract(symbol: &BackendSymbol, kind: EntityKind, scope: Scope) -> bool {
    if kind != EntityKind::Method {
        return false;
    }
    scope.parent == Some(EntityKind::Interface) || detail_has(symbol, "abstract")
}

fn detail_has(symbol: &BackendSymbol, word: &str) -> bool {
    symbol.detail.as_deref().is_some_and(|detail| {
        detail
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .any(|token| token == word)
    })
}

/// Best-effort visibility from the backend's detail and naming conventions
#[must_use]
pub fn visibility(symbol: &BackendSymbol, name: &str, language: &LanguageTag) -> Visibility {
    if let Some(detail) = symbol.detail.as_deref() {
        if detail.contains("pub(crate)") || detail.contains("pub(super)") {
            return Visibility::Internal;
        }
        if detail_has(symbol, "private") || detail_has(symbol, "protected") {
            return Visibility::Private;
        }
        if detail_has(symbol, "internal") {
            return Visibility::Internal;
        }
        if detail_has(symbol, "pub") || detail_has(symbol, "public") {
            return Visibility::Public;
        }
    }

    if name.starts_with('#') || (name.starts_with('_') && !is_dunder(name)) {
        return Visibility::Private;
    }
    if language.as_str() == "go" && name.chars().next().is_some_and(char::is_lowercase) {
        return Visibility::Internal;
    }
    Visibility::Public
}

/// `__init__`-style names are public protocol methods, not private ones
fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}
