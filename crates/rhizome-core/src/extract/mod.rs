//! Entity extraction
//!
//! Turns each file's symbol listing into canonical entities, plus alias
//! records for bindings that only re-export another file's symbol.

mod id;
mod kinds;
mod symbols;

pub use id::{module_path, relative_file, sanitize_segment, IdAllocator, ModulePaths};
pub use kinds::{classify, Role, Scope};
pub use symbols::{entities_from_symbols, nest_flat};

use std::path::Path;
use std::sync::Arc;

use crate::backend::{flatten_symbols, BackendHandle, Location};
use crate::error::BackendError;
use crate::graph::{Alias, Entity};
use crate::scanner::LanguageTag;
use symbols::{assign_ids, build_nodes, Node};

/// Extraction switches taken from the analyzer configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    pub probe_reexports: bool,
}

/// What one file contributes before resolution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileExtraction {
    pub entities: Vec<Entity>,
    pub aliases: Vec<Alias>,
}

/// Extract one file's entities through its language's backend
///
/// `file` is absolute and under `root`; its module path comes from
/// `modules`.
///
/// # Errors
/// Returns the backend error if the symbol listing cannot be obtained.
/// A failed re-export probe keeps the symbol as an entity unless the
/// language was degraded or the run cancelled meanwhile.
pub async fn extract_file(
    handle: &BackendHandle,
    root: &Path,
    modules: &ModulePaths,
    file: &Path,
    language: &LanguageTag,
    text: Arc<str>,
    options: ExtractOptions,
) -> Result<FileExtraction, BackendError> {
    if let Err(e) = handle.open_document(file, text).await {
        if e.is_terminal() {
            return Err(e);
        }
        tracing::debug!("Opening {} failed: {}", file.display(), e);
    }

    let symbols = handle.document_symbols(file).await?;
    tracing::debug!(
        "{}: {} symbols reported",
        file.display(),
        flatten_symbols(&symbols).len()
    );
    let nodes = build_nodes(nest_flat(symbols), Scope::default());

    let (nodes, aliases) = if options.probe_reexports {
        split_reexports(handle, file, nodes).await?
    } else {
        (nodes, Vec::new())
    };

    let relative = file.strip_prefix(root).unwrap_or(file);
    let entities = assign_ids(
        &nodes,
        &modules.get(relative),
        &relative_file(relative),
        language,
    );
    tracing::debug!(
        "{}: {} entities, {} aliases",
        relative.display(),
        entities.len(),
        aliases.len()
    );
    Ok(FileExtraction { entities, aliases })
}

/// Move top-level bindings whose definition lives in another file out of
/// the tree and into alias records
async fn split_reexports(
    handle: &BackendHandle,
    file: &Path,
    nodes: Vec<Node>,
) -> Result<(Vec<Node>, Vec<Alias>), BackendError> {
    let mut kept = Vec::with_capacity(nodes.len());
    let mut aliases = Vec::new();

    for node in nodes {
        if !node.is_binding() {
            kept.push(node);
            continue;
        }

        let at = Location::new(file, node.symbol.span).with_selection(node.symbol.selection);
        let target = match handle.definition(&at).await {
            Ok(found) => found.into_iter().find(|loc| loc.file != file),
            Err(e) if e.is_terminal() => return Err(e),
            Err(e) => {
                tracing::debug!("Probe of {} failed: {}", node.symbol.name, e);
                None
            }
        };

        match target {
            Some(target) => aliases.push(Alias {
                name: node.symbol.name.clone(),
                file: file.to_path_buf(),
                span: node.symbol.span,
                selection: node.symbol.selection,
                target,
            }),
            None => kept.push(node),
        }
    }
    Ok((kept, aliases))
}

#[cfg(test)]
mod tests;
