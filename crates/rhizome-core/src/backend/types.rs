//! Backend types for extracted information

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::scanner::LanguageTag;

/// A zero-based (line, character) position, as reported by backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open source range `[start, end)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Span covering whole lines `start_line..=end_line`
    #[must_use]
    pub const fn lines(start_line: u32, end_line: u32) -> Self {
        Self {
            start: Position::new(start_line, 0),
            end: Position::new(end_line, u32::MAX),
        }
    }

    /// Whether `pos` lies inside this span (end inclusive, so a position at
    /// the closing token still belongs to the symbol)
    #[must_use]
    pub fn contains(&self, pos: Position) -> bool {
        self.start <= pos && pos <= self.end
    }

    /// Rough size used to pick the innermost of several enclosing spans
    #[must_use]
    pub fn extent(&self) -> (u32, u32) {
        let lines = self.end.line.saturating_sub(self.start.line);
        let chars = if lines == 0 {
            self.end.character.saturating_sub(self.start.character)
        } else {
            self.end.character
        };
        (lines, chars)
    }
}

/// A span in a specific file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Absolute path
    pub file: PathBuf,
    /// Full range of the located item
    pub span: Span,
    /// Position of the item's name; equal to `span.start` when unknown
    pub selection: Position,
}

impl Location {
    #[must_use]
    pub fn new(file: impl Into<PathBuf>, span: Span) -> Self {
        Self {
            file: file.into(),
            span,
            selection: span.start,
        }
    }

    #[must_use]
    pub fn with_selection(mut self, selection: Position) -> Self {
        self.selection = selection;
        self
    }
}

/// A symbol reported by a backend's document symbol listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSymbol {
    /// Symbol name
    pub name: String,
    /// Symbol kind (function, class, etc.)
    pub kind: BackendSymbolKind,
    /// Full detail/signature
    pub detail: Option<String>,
    /// Container name (for flat SymbolInformation format)
    pub container_name: Option<String>,
    /// Full range of the symbol
    pub span: Span,
    /// Position of the symbol's name
    pub selection: Position,
    /// Children symbols (for hierarchical document symbols)
    pub children: Vec<BackendSymbol>,
}

/// Symbol kinds (mirrors lsp_types::SymbolKind)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendSymbolKind {
    File,
    Module,
    Namespace,
    Package,
    Class,
    Method,
    Property,
    Field,
    Constructor,
    Enum,
    Interface,
    Function,
    Variable,
    Constant,
    String,
    Number,
    Boolean,
    Array,
    Object,
    Key,
    Null,
    EnumMember,
    Struct,
    Event,
    Operator,
    TypeParameter,
}

impl BackendSymbolKind {
    /// Kinds whose invocation constructs a value
    #[must_use]
    pub const fn is_constructing(self) -> bool {
        matches!(self, Self::Constructor | Self::Class | Self::Struct)
    }

    /// Kinds that name data rather than code
    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(
            self,
            Self::Field | Self::Property | Self::Variable | Self::Constant | Self::EnumMember
        )
    }

    #[must_use]
    pub const fn is_namespace(self) -> bool {
        matches!(self, Self::Module | Self::Namespace | Self::Package)
    }
}

/// An item returned by call or type hierarchy requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyItem {
    pub name: String,
    pub kind: BackendSymbolKind,
    pub detail: Option<String>,
    pub location: Location,
}

/// One resolved outgoing call target and the call sites that reach it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingCall {
    pub target: HierarchyItem,
    /// Call-site ranges, in the caller's file
    pub sites: Vec<Span>,
}

/// Command line and options used to start a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendCommand {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Initialization options (JSON)
    #[serde(default)]
    pub init_options: Option<serde_json::Value>,
}

impl BackendCommand {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            init_options: None,
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Configuration for a backend process
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Language this backend handles
    pub language: LanguageTag,
    /// Command to start the backend
    pub command: BackendCommand,
    /// Working directory and workspace root
    pub root_path: PathBuf,
}

/// Kind of backend operation, used for timing and error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Start,
    OpenDocument,
    DocumentSymbols,
    Definition,
    OutgoingCalls,
    Implementations,
    Supertypes,
    Shutdown,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::OpenDocument => "open-document",
            Self::DocumentSymbols => "document-symbols",
            Self::Definition => "definition",
            Self::OutgoingCalls => "outgoing-calls",
            Self::Implementations => "implementations",
            Self::Supertypes => "supertypes",
            Self::Shutdown => "shutdown",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// Symbol traversal utilities
// ============================================================================

/// Flatten a tree of backend symbols into a list (depth-first traversal).
pub fn flatten_symbols(symbols: &[BackendSymbol]) -> Vec<&BackendSymbol> {
    let mut result = Vec::new();
    for sym in symbols {
        result.push(sym);
        result.extend(flatten_symbols(&sym.children));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_symbol(name: &str, start_line: u32, children: Vec<BackendSymbol>) -> BackendSymbol {
        BackendSymbol {
            name: name.to_string(),
            kind: BackendSymbolKind::Function,
            detail: None,
            container_name: None,
            span: Span::lines(start_line, start_line + 10),
            selection: Position::new(start_line, 0),
            children,
        }
    }

    #[test]
    fn test_flatten_symbols_empty() {
        let symbols: Vec<BackendSymbol> = vec![];
        assert!(flatten_symbols(&symbols).is_empty());
    }

    #[test]
    fn test_flatten_symbols_nested_is_depth_first() {
        let grandchild = make_symbol("grandchild", 6, vec![]);
        let child = make_symbol("child", 5, vec![grandchild]);
        let parent = make_symbol("parent", 1, vec![child]);
        let sibling = make_symbol("sibling", 20, vec![]);

        let symbols = [parent, sibling];
        let names: Vec<&str> = flatten_symbols(&symbols)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["parent", "child", "grandchild", "sibling"]);
    }

    #[test]
    fn test_span_contains_is_end_inclusive() {
        let span = Span::new(Position::new(5, 4), Position::new(15, 1));
        assert!(span.contains(Position::new(5, 4)));
        assert!(span.contains(Position::new(10, 0)));
        assert!(span.contains(Position::new(15, 1)));
        assert!(!span.contains(Position::new(5, 3)));
        assert!(!span.contains(Position::new(15, 2)));
        assert!(!span.contains(Position::new(16, 0)));
    }

    #[test]
    fn test_span_extent_orders_nested_spans() {
        let outer = Span::new(Position::new(1, 0), Position::new(50, 1));
        let inner = Span::new(Position::new(9, 4), Position::new(11, 5));
        let same_line = Span::new(Position::new(10, 4), Position::new(10, 30));
        assert!(inner.extent() < outer.extent());
        assert!(same_line.extent() < inner.extent());
    }

    #[test]
    fn test_location_selection_defaults_to_span_start() {
        let loc = Location::new("/src/a.py", Span::lines(3, 9));
        assert_eq!(loc.selection, Position::new(3, 0));
        let loc = loc.with_selection(Position::new(3, 4));
        assert_eq!(loc.selection, Position::new(3, 4));
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::OutgoingCalls.to_string(), "outgoing-calls");
        assert_eq!(Operation::DocumentSymbols.to_string(), "document-symbols");
    }

    #[test]
    fn test_backend_command_with_args() {
        let command = BackendCommand::new("pyright-langserver").with_args(["--stdio"]);
        assert_eq!(command.command, "pyright-langserver");
        assert_eq!(command.args, vec!["--stdio"]);
        assert!(command.init_options.is_none());
    }
}
