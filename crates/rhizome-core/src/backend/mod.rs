//! Backend module: semantic-analysis backends and their supervision
//!
//! A backend is an external per-language process (a language server) that
//! lists a file's symbols and resolves call targets. The pipeline only talks
//! to the [`Backend`] trait; [`LspClient`] implements it over the Language
//! Server Protocol, and [`BackendPool`] supervises one instance per language.

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::BackendError;
use crate::scanner::LanguageTag;

mod client;
mod convert;
mod deadline;
mod defaults;
mod launcher;
mod pool;
mod requests;
mod state;
mod types;

pub use client::{ClientTimeouts, LspClient};
pub use deadline::Deadline;
pub use defaults::BackendDefaults;
pub use launcher::LspLauncher;
pub use pool::{BackendHandle, BackendPool, PoolSettings};
pub use types::{
    flatten_symbols, BackendCommand, BackendConfig, BackendSymbol, BackendSymbolKind,
    HierarchyItem, Location, Operation, OutgoingCall, Position, Span,
};

/// One live semantic-analysis backend for a language
///
/// Every method may be called concurrently; implementations are expected
/// to pipeline requests.
pub trait Backend: Send + Sync {
    fn language(&self) -> &LanguageTag;

    /// Make a file's content known to the backend
    fn open_document<'a>(
        &'a self,
        file: &'a Path,
        text: &'a str,
    ) -> BoxFuture<'a, Result<(), BackendError>>;

    /// Hierarchical symbol listing of a file
    fn document_symbols<'a>(
        &'a self,
        file: &'a Path,
    ) -> BoxFuture<'a, Result<Vec<BackendSymbol>, BackendError>>;

    /// Definition sites of the symbol at `at.selection`
    fn definition<'a>(
        &'a self,
        at: &'a Location,
    ) -> BoxFuture<'a, Result<Vec<Location>, BackendError>>;

    /// Resolved call targets of the callable whose name is at `at.selection`
    fn outgoing_calls<'a>(
        &'a self,
        at: &'a Location,
    ) -> BoxFuture<'a, Result<Vec<OutgoingCall>, BackendError>>;

    /// Concrete implementations of the abstract declaration at `at.selection`
    fn implementations<'a>(
        &'a self,
        at: &'a Location,
    ) -> BoxFuture<'a, Result<Vec<Location>, BackendError>>;

    /// Direct supertypes of the type at `at.selection`
    fn supertypes<'a>(
        &'a self,
        at: &'a Location,
    ) -> BoxFuture<'a, Result<Vec<HierarchyItem>, BackendError>>;

    /// Release the backend; must be idempotent
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// Starts backends for a language
pub trait BackendLauncher: Send + Sync {
    /// # Errors
    /// Returns `BackendError::Unavailable` when no backend is registered for
    /// `language` or it fails to start.
    fn launch<'a>(
        &'a self,
        language: &'a LanguageTag,
        root: &'a Path,
    ) -> BoxFuture<'a, Result<Arc<dyn Backend>, BackendError>>;
}

#[cfg(test)]
pub(crate) mod tests;
