//! LSP type conversion utilities
//!
//! Converts between `async_lsp::lsp_types` and the backend types the
//! pipeline works with.

use std::path::{Path, PathBuf};

use async_lsp::lsp_types::{
    CallHierarchyItem, CallHierarchyOutgoingCall, DocumentSymbol, DocumentSymbolResponse,
    GotoDefinitionResponse, Location as LspLocation, Position as LspPosition, Range,
    SymbolInformation, SymbolKind, TypeHierarchyItem, Url,
};

use super::types::{
    BackendSymbol, BackendSymbolKind, HierarchyItem, Location, OutgoingCall, Position, Span,
};

/// Convert a `DocumentSymbolResponse` to a list of `BackendSymbol`.
pub fn convert_symbol_response(response: Option<DocumentSymbolResponse>) -> Vec<BackendSymbol> {
    match response {
        Some(DocumentSymbolResponse::Flat(symbols)) => symbols
            .iter()
            .map(convert_symbol_information)
            .collect(),
        Some(DocumentSymbolResponse::Nested(symbols)) => {
            symbols.iter().map(convert_document_symbol).collect()
        }
        None => vec![],
    }
}

/// Convert a `DocumentSymbol` (hierarchical format) to our `BackendSymbol` type.
pub fn convert_document_symbol(symbol: &DocumentSymbol) -> BackendSymbol {
    let children = symbol
        .children
        .as_ref()
        .map(|c| c.iter().map(convert_document_symbol).collect())
        .unwrap_or_default();

    BackendSymbol {
        name: symbol.name.clone(),
        kind: convert_symbol_kind(symbol.kind),
        detail: symbol.detail.clone(),
        container_name: None, // Nested format uses explicit children instead
        span: convert_range(symbol.range),
        selection: convert_position(symbol.selection_range.start),
        children,
    }
}

/// Convert a `SymbolInformation` (flat format) to our `BackendSymbol` type.
pub fn convert_symbol_information(symbol: &SymbolInformation) -> BackendSymbol {
    #[allow(deprecated)]
    let container_name = symbol.container_name.clone();
    let span = convert_range(symbol.location.range);
    BackendSymbol {
        name: symbol.name.clone(),
        kind: convert_symbol_kind(symbol.kind),
        detail: None,
        container_name,
        span,
        selection: span.start,
        children: vec![],
    }
}

/// Convert an LSP `SymbolKind` to our `BackendSymbolKind` enum.
pub fn convert_symbol_kind(kind: SymbolKind) -> BackendSymbolKind {
    // SymbolKind is an open newtype over integers, so unknown values fall
    // through to Variable
    match kind {
        SymbolKind::FILE => BackendSymbolKind::File,
        SymbolKind::MODULE => BackendSymbolKind::Module,
        SymbolKind::NAMESPACE => BackendSymbolKind::Namespace,
        SymbolKind::PACKAGE => BackendSymbolKind::Package,
        SymbolKind::CLASS => BackendSymbolKind::Class,
        SymbolKind::METHOD => BackendSymbolKind::Method,
        SymbolKind::PROPERTY => BackendSymbolKind::Property,
        SymbolKind::FIELD => BackendSymbolKind::Field,
        SymbolKind::CONSTRUCTOR => BackendSymbolKind::Constructor,
        SymbolKind::ENUM => BackendSymbolKind::Enum,
        SymbolKind::INTERFACE => BackendSymbolKind::Interface,
        SymbolKind::FUNCTION => BackendSymbolKind::Function,
        SymbolKind::VARIABLE => BackendSymbolKind::Variable,
        SymbolKind::CONSTANT => BackendSymbolKind::Constant,
        SymbolKind::STRING => BackendSymbolKind::String,
        SymbolKind::NUMBER => BackendSymbolKind::Number,
        SymbolKind::BOOLEAN => BackendSymbolKind::Boolean,
        SymbolKind::ARRAY => BackendSymbolKind::Array,
        SymbolKind::OBJECT => BackendSymbolKind::Object,
        SymbolKind::KEY => BackendSymbolKind::Key,
        SymbolKind::NULL => BackendSymbolKind::Null,
        SymbolKind::ENUM_MEMBER => BackendSymbolKind::EnumMember,
        SymbolKind::STRUCT => BackendSymbolKind::Struct,
        SymbolKind::EVENT => BackendSymbolKind::Event,
        SymbolKind::OPERATOR => BackendSymbolKind::Operator,
        SymbolKind::TYPE_PARAMETER => BackendSymbolKind::TypeParameter,
        _ => BackendSymbolKind::Variable,
    }
}

pub fn convert_position(position: LspPosition) -> Position {
    Position::new(position.line, position.character)
}

pub fn convert_range(range: Range) -> Span {
    Span::new(convert_position(range.start), convert_position(range.end))
}

/// Path of a `file://` URI, falling back to the raw URI path
pub fn uri_to_path(uri: &Url) -> PathBuf {
    uri.to_file_path()
        .unwrap_or_else(|_| Path::new(uri.path()).to_path_buf())
}

pub fn convert_location(location: &LspLocation) -> Location {
    Location::new(uri_to_path(&location.uri), convert_range(location.range))
}

/// Flatten the three shapes of a definition/implementation response.
pub fn convert_definition_response(response: Option<GotoDefinitionResponse>) -> Vec<Location> {
    match response {
        Some(GotoDefinitionResponse::Scalar(loc)) => vec![convert_location(&loc)],
        Some(GotoDefinitionResponse::Array(locs)) => locs.iter().map(convert_location).collect(),
        Some(GotoDefinitionResponse::Link(links)) => links
            .iter()
            .map(|link| {
                Location::new(uri_to_path(&link.target_uri), convert_range(link.target_range))
                    .with_selection(convert_position(link.target_selection_range.start))
            })
            .collect(),
        None => vec![],
    }
}

pub fn convert_call_hierarchy_item(item: &CallHierarchyItem) -> HierarchyItem {
    HierarchyItem {
        name: item.name.clone(),
        kind: convert_symbol_kind(item.kind),
        detail: item.detail.clone(),
        location: Location::new(uri_to_path(&item.uri), convert_range(item.range))
            .with_selection(convert_position(item.selection_range.start)),
    }
}

pub fn convert_type_hierarchy_item(item: &TypeHierarchyItem) -> HierarchyItem {
    HierarchyItem {
        name: item.name.clone(),
        kind: convert_symbol_kind(item.kind),
        detail: item.detail.clone(),
        location: Location::new(uri_to_path(&item.uri), convert_range(item.range))
            .with_selection(convert_position(item.selection_range.start)),
    }
}

pub fn convert_outgoing_call(call: &CallHierarchyOutgoingCall) -> OutgoingCall {
    OutgoingCall {
        target: convert_call_hierarchy_item(&call.to),
        sites: call.from_ranges.iter().copied().map(convert_range).collect(),
    }
}
