//! Graph model types

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::backend::{Location, Position, Span};
use crate::scanner::LanguageTag;

/// Id of the synthetic node standing for code outside the analyzed tree
pub const EXTERNAL_ID: &str = "$external";

/// Kind of entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Class,
    Interface,
    Struct,
    Function,
    Method,
    Constant,
    Enum,
    EnumMember,
    TypeAlias,
    Module,
}

impl EntityKind {
    /// Kinds whose bodies make outgoing calls
    #[must_use]
    pub const fn is_callable(self) -> bool {
        matches!(self, Self::Function | Self::Method)
    }

    /// Kinds that can have supertypes
    #[must_use]
    pub const fn is_type(self) -> bool {
        matches!(self, Self::Class | Self::Interface | Self::Struct | Self::Enum)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Struct => "struct",
            Self::Function => "function",
            Self::Method => "method",
            Self::Constant => "constant",
            Self::Enum => "enum",
            Self::EnumMember => "enum-member",
            Self::TypeAlias => "type-alias",
            Self::Module => "module",
        };
        write!(f, "{s}")
    }
}

/// Best-effort visibility of an entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Internal,
}

/// A defined code symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Canonical id, unique within a run
    pub id: String,
    /// Local name as spelled in source
    pub name: String,
    pub kind: EntityKind,
    /// Defining file, relative to the analyzed root, `/`-separated
    pub file: String,
    /// Id of the enclosing entity, if the container is itself an entity
    pub container: Option<String>,
    pub span: Span,
    /// Position of the entity's name
    pub selection: Position,
    pub visibility: Visibility,
    pub language: LanguageTag,
    /// Constructors are methods with this flag set
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub constructor: bool,
    /// Abstract declarations: interface members and `abstract` methods
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_abstract: bool,
    /// Set by the unifier: no incoming edges and not an entry point
    #[serde(default)]
    pub orphan: bool,
}

/// Kind of edge/relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeKind {
    Call,
    Construct,
    Inherit,
    Implement,
    FieldAccess,
    Import,
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Call => "call",
            Self::Construct => "construct",
            Self::Inherit => "inherit",
            Self::Implement => "implement",
            Self::FieldAccess => "field-access",
            Self::Import => "import",
        };
        write!(f, "{s}")
    }
}

/// Certainty of a call-target resolution, most certain first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Resolved,
    Ambiguous,
    Unresolved,
}

/// An edge in the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Source entity ID
    pub source: String,
    /// Target entity ID or [`EXTERNAL_ID`]
    pub target: String,
    /// Kind of relationship
    pub kind: EdgeKind,
    pub confidence: Confidence,
    /// Line of the earliest reference site (0-indexed)
    pub line: u32,
    /// Column of the earliest reference site (0-indexed)
    pub column: u32,
}

impl Edge {
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.target == EXTERNAL_ID
    }

    /// Total order used for serialization
    pub(crate) fn sort_key(&self) -> (&str, u32, u32, &str, EdgeKind) {
        (&self.source, self.line, self.column, &self.target, self.kind)
    }
}

/// Target of an edge before unification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeTarget {
    Entity(String),
    /// A location in another language's files, matched against the merged
    /// entity table by the unifier
    Deferred(Location),
    External,
}

/// An edge as produced by the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEdge {
    pub source: String,
    pub target: EdgeTarget,
    pub kind: EdgeKind,
    pub confidence: Confidence,
    pub site: Position,
}

/// A re-exported binding: the symbol at `file`/`span` stands for `target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub name: String,
    /// Absolute path of the re-exporting file
    pub file: std::path::PathBuf,
    pub span: Span,
    pub selection: Position,
    pub target: Location,
}

/// Entities and edges of one analysis run
///
/// Entities are sorted by id and edges by source, site, target and kind, so
/// the serialized form is reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub(crate) entities: Vec<Entity>,
    pub(crate) edges: Vec<Edge>,
}

impl Graph {
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Look up an entity by canonical id
    #[must_use]
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities
            .binary_search_by(|e| e.id.as_str().cmp(id))
            .ok()
            .map(|i| &self.entities[i])
    }

    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    pub fn edges_to<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target == id)
    }

    pub fn orphans(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.orphan)
    }

    /// Whether canonical ids are pairwise distinct
    #[must_use]
    pub fn ids_unique(&self) -> bool {
        let mut seen = BTreeSet::new();
        self.entities.iter().all(|e| seen.insert(e.id.as_str()))
    }

    /// Whether every edge endpoint is a known entity or the external sentinel
    #[must_use]
    pub fn edges_closed(&self) -> bool {
        self.edges.iter().all(|edge| {
            self.entity(&edge.source).is_some()
                && (edge.is_external() || self.entity(&edge.target).is_some())
        })
    }

    /// Serialize as JSON
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// SHA-256 of the JSON serialization, hex encoded
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn fingerprint(&self) -> serde_json::Result<String> {
        let json = self.to_json()?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}
