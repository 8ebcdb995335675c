//! LSP request methods (document symbols, definition, call and type hierarchy)

use std::path::Path;

use async_lsp::lsp_types::request::{
    CallHierarchyOutgoingCalls, CallHierarchyPrepare, DocumentSymbolRequest, GotoDefinition,
    GotoImplementation, TypeHierarchyPrepare, TypeHierarchySupertypes,
};
use async_lsp::lsp_types::{
    CallHierarchyOutgoingCallsParams, CallHierarchyPrepareParams, DocumentSymbolParams,
    GotoDefinitionParams, Position as LspPosition, TextDocumentIdentifier,
    TextDocumentPositionParams, TypeHierarchyPrepareParams, TypeHierarchySupertypesParams,
};
use futures::future::BoxFuture;

use super::client::{file_url, LspClient};
use super::convert::{
    convert_definition_response, convert_outgoing_call, convert_symbol_response,
    convert_type_hierarchy_item,
};
use super::types::{BackendSymbol, HierarchyItem, Location, Operation, OutgoingCall};
use super::Backend;
use crate::error::BackendError;
use crate::scanner::LanguageTag;

fn position_params(
    at: &Location,
    operation: Operation,
) -> Result<TextDocumentPositionParams, BackendError> {
    Ok(TextDocumentPositionParams {
        text_document: TextDocumentIdentifier {
            uri: file_url(&at.file, operation)?,
        },
        position: LspPosition::new(at.selection.line, at.selection.character),
    })
}

impl LspClient {
    /// Get document symbols for a file
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn fetch_document_symbols(
        &self,
        file: &Path,
    ) -> Result<Vec<BackendSymbol>, BackendError> {
        let params = DocumentSymbolParams {
            text_document: TextDocumentIdentifier {
                uri: file_url(file, Operation::DocumentSymbols)?,
            },
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };

        tracing::debug!("Requesting document symbols for: {}", file.display());
        let response = self
            .request::<DocumentSymbolRequest>(Operation::DocumentSymbols, params)
            .await?;
        Ok(convert_symbol_response(response))
    }

    /// Go to definition of the symbol at a location's selection
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn fetch_definition(&self, at: &Location) -> Result<Vec<Location>, BackendError> {
        let params = GotoDefinitionParams {
            text_document_position_params: position_params(at, Operation::Definition)?,
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };

        let response = self
            .request::<GotoDefinition>(Operation::Definition, params)
            .await?;
        Ok(convert_definition_response(response))
    }

    /// Implementations of the declaration at a location's selection
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn fetch_implementations(
        &self,
        at: &Location,
    ) -> Result<Vec<Location>, BackendError> {
        let params = GotoDefinitionParams {
            text_document_position_params: position_params(at, Operation::Implementations)?,
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };

        let response = self
            .request::<GotoImplementation>(Operation::Implementations, params)
            .await?;
        Ok(convert_definition_response(response))
    }

    /// Outgoing calls of the callable at a location's selection
    ///
    /// Prepares the call hierarchy, then asks for the outgoing calls of
    /// every prepared item.
    ///
    /// # Errors
    /// Returns an error if either request fails.
    pub async fn fetch_outgoing_calls(
        &self,
        at: &Location,
    ) -> Result<Vec<OutgoingCall>, BackendError> {
        let params = CallHierarchyPrepareParams {
            text_document_position_params: position_params(at, Operation::OutgoingCalls)?,
            work_done_progress_params: Default::default(),
        };

        let items = self
            .request::<CallHierarchyPrepare>(Operation::OutgoingCalls, params)
            .await?
            .unwrap_or_default();

        let mut calls = Vec::new();
        for item in items {
            let params = CallHierarchyOutgoingCallsParams {
                item,
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            };
            let outgoing = self
                .request::<CallHierarchyOutgoingCalls>(Operation::OutgoingCalls, params)
                .await?
                .unwrap_or_default();
            calls.extend(outgoing.iter().map(convert_outgoing_call));
        }

        tracing::debug!(
            "{} outgoing calls from {}:{}",
            calls.len(),
            at.file.display(),
            at.selection.line
        );
        Ok(calls)
    }

    /// Direct supertypes of the type at a location's selection
    ///
    /// # Errors
    /// Returns an error if either request fails.
    pub async fn fetch_supertypes(&self, at: &Location) -> Result<Vec<HierarchyItem>, BackendError> {
        let params = TypeHierarchyPrepareParams {
            text_document_position_params: position_params(at, Operation::Supertypes)?,
            work_done_progress_params: Default::default(),
        };

        let items = self
            .request::<TypeHierarchyPrepare>(Operation::Supertypes, params)
            .await?
            .unwrap_or_default();

        let mut supertypes = Vec::new();
        for item in items {
            let params = TypeHierarchySupertypesParams {
                item,
                work_done_progress_params: Default::default(),
                partial_result_params: Default::default(),
            };
            let parents = self
                .request::<TypeHierarchySupertypes>(Operation::Supertypes, params)
                .await?
                .unwrap_or_default();
            supertypes.extend(parents.iter().map(convert_type_hierarchy_item));
        }
        Ok(supertypes)
    }
}

impl Backend for LspClient {
    fn language(&self) -> &LanguageTag {
        LspClient::language(self)
    }

    fn open_document<'a>(
        &'a self,
        file: &'a Path,
        text: &'a str,
    ) -> BoxFuture<'a, Result<(), BackendError>> {
        Box::pin(async move { self.did_open(file, text) })
    }

    fn document_symbols<'a>(
        &'a self,
        file: &'a Path,
    ) -> BoxFuture<'a, Result<Vec<BackendSymbol>, BackendError>> {
        Box::pin(self.fetch_document_symbols(file))
    }

    fn definition<'a>(
        &'a self,
        at: &'a Location,
    ) -> BoxFuture<'a, Result<Vec<Location>, BackendError>> {
        Box::pin(self.fetch_definition(at))
    }

    fn outgoing_calls<'a>(
        &'a self,
        at: &'a Location,
    ) -> BoxFuture<'a, Result<Vec<OutgoingCall>, BackendError>> {
        Box::pin(self.fetch_outgoing_calls(at))
    }

    fn implementations<'a>(
        &'a self,
        at: &'a Location,
    ) -> BoxFuture<'a, Result<Vec<Location>, BackendError>> {
        Box::pin(self.fetch_implementations(at))
    }

    fn supertypes<'a>(
        &'a self,
        at: &'a Location,
    ) -> BoxFuture<'a, Result<Vec<HierarchyItem>, BackendError>> {
        Box::pin(self.fetch_supertypes(at))
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(LspClient::close(self))
    }
}
