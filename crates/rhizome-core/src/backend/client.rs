//! Language server backend over stdio, driven by async-lsp

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_lsp::concurrency::ConcurrencyLayer;
use async_lsp::lsp_types::notification::{
    DidOpenTextDocument, Exit, Initialized, Notification,
};
use async_lsp::lsp_types::request::{Initialize, Request, Shutdown};
use async_lsp::lsp_types::{
    ClientCapabilities, DidOpenTextDocumentParams, DocumentSymbolClientCapabilities,
    InitializeParams, InitializedParams, TextDocumentClientCapabilities, TextDocumentItem, Url,
    WindowClientCapabilities, WorkspaceClientCapabilities, WorkspaceFolder,
};
use async_lsp::panic::CatchUnwindLayer;
use async_lsp::tracing::TracingLayer;
use async_lsp::ServerSocket;
use futures::channel::oneshot;
use tower::ServiceBuilder;

use super::state::{ClientState, Stop};
use super::types::{BackendConfig, Operation};
use crate::error::BackendError;
use crate::scanner::LanguageTag;

/// Grace period for the `shutdown` request when closing
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Timeouts applied by an [`LspClient`]
#[derive(Debug, Clone, Copy)]
pub struct ClientTimeouts {
    /// Bound on a single request
    pub request: Duration,
    /// Bound on spawn + initialize + indexing wait
    pub startup: Duration,
    /// How long to wait for indexing progress to finish
    pub indexing: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            startup: Duration::from_secs(60),
            indexing: Duration::from_secs(30),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One running language server process and its request socket
///
/// All methods take `&self`: the main loop correlates responses to
/// request ids, so one client can have many requests in flight.
pub struct LspClient {
    server: ServerSocket,
    mainloop_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    child: Mutex<Option<async_process::Child>>,
    indexed_rx: Mutex<Option<oneshot::Receiver<()>>>,
    config: BackendConfig,
    request_timeout: Duration,
    closed: AtomicBool,
}

impl LspClient {
    /// Start, initialize and wait for the server to index, all within
    /// `timeouts.startup`
    ///
    /// # Errors
    /// Returns `BackendError::Unavailable` if the server cannot be started
    /// or does not finish initializing in time.
    pub async fn open(config: BackendConfig, timeouts: ClientTimeouts) -> Result<Self, BackendError> {
        let language = config.language.clone();
        let startup = async {
            let client = Self::start(config, timeouts.request)?;
            client.initialize().await?;
            client.wait_for_indexing(timeouts.indexing).await;
            Ok::<_, BackendError>(client)
        };

        match tokio::time::timeout(timeouts.startup, startup).await {
            Ok(Ok(client)) => Ok(client),
            Ok(Err(BackendError::Unavailable { language, reason })) => {
                Err(BackendError::Unavailable { language, reason })
            }
            Ok(Err(e)) => Err(BackendError::Unavailable {
                language,
                reason: format!("initialization failed: {e}"),
            }),
            Err(_) => Err(BackendError::Unavailable {
                language,
                reason: format!("did not start within {:?}", timeouts.startup),
            }),
        }
    }

    /// Spawn the server, run the handshake and wait for indexing
    ///
    /// # Errors
    /// Returns `BackendError::Unavailable` if the process cannot be spawned.
    pub fn start(config: BackendConfig, request_timeout: Duration) -> Result<Self, BackendError> {
        let (indexed_tx, indexed_rx) = oneshot::channel();

        let (mainloop, server) = async_lsp::MainLoop::new_client(|_server| {
            ServiceBuilder::new()
                .layer(TracingLayer::default())
                .layer(CatchUnwindLayer::default())
                .layer(ConcurrencyLayer::default())
                .service(ClientState::new_router(indexed_tx))
        });

        let unavailable = |reason: String| BackendError::Unavailable {
            language: config.language.clone(),
            reason,
        };

        let mut child = async_process::Command::new(&config.command.command)
            .args(&config.command.args)
            .current_dir(&config.root_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| unavailable(format!("failed to spawn `{}`: {e}", config.command.command)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| unavailable("failed to get stdout from backend process".into()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| unavailable("failed to get stdin from backend process".into()))?;

        let language = config.language.clone();
        let mainloop_handle = tokio::spawn(async move {
            if let Err(e) = mainloop.run_buffered(stdout, stdin).await {
                tracing::warn!("LSP mainloop error for {}: {}", language, e);
            }
        });

        tracing::debug!("Started {} backend `{}`", config.language, config.command.command);

        Ok(Self {
            server,
            mainloop_handle: Mutex::new(Some(mainloop_handle)),
            child: Mutex::new(Some(child)),
            indexed_rx: Mutex::new(Some(indexed_rx)),
            config,
            request_timeout,
            closed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn language(&self) -> &LanguageTag {
        &self.config.language
    }

    /// `initialize` followed by `initialized`
    ///
    /// # Errors
    /// Returns an error if initialization fails.
    pub async fn initialize(&self) -> Result<(), BackendError> {
        let root_url = Url::from_file_path(&self.config.root_path).map_err(|()| {
            BackendError::Unavailable {
                language: self.config.language.clone(),
                reason: format!("root {} is not absolute", self.config.root_path.display()),
            }
        })?;

        tracing::debug!(
            "Initializing {} backend with init_options: {:?}",
            self.config.language,
            self.config.command.init_options
        );

        #[allow(deprecated)]
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri: Some(root_url.clone()),
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: root_url,
                name: "root".into(),
            }]),
            capabilities: ClientCapabilities {
                window: Some(WindowClientCapabilities {
                    work_done_progress: Some(true),
                    ..Default::default()
                }),
                text_document: Some(TextDocumentClientCapabilities {
                    document_symbol: Some(DocumentSymbolClientCapabilities {
                        hierarchical_document_symbol_support: Some(true),
                        ..Default::default()
                    }),
                    call_hierarchy: Some(Default::default()),
                    type_hierarchy: Some(Default::default()),
                    ..Default::default()
                }),
                workspace: Some(WorkspaceClientCapabilities {
                    configuration: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            },
            initialization_options: self.config.command.init_options.clone(),
            ..Default::default()
        };

        self.request::<Initialize>(Operation::Start, params).await?;
        self.notify::<Initialized>(Operation::Start, InitializedParams {})?;

        Ok(())
    }

    /// Block until the server reports its indexing progress done, or the wait expires
    ///
    /// Servers that never report progress are waited on for the full
    /// timeout; the client proceeds either way.
    pub async fn wait_for_indexing(&self, timeout: Duration) {
        let rx = lock(&self.indexed_rx).take();
        if let Some(rx) = rx {
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(())) => {
                    tracing::info!("{} backend indexing complete", self.config.language);
                }
                Ok(Err(_)) => {
                    tracing::debug!("Indexing channel closed");
                }
                Err(_) => {
                    tracing::debug!("Indexing wait timed out, proceeding anyway");
                }
            }
        }
    }

    /// Send a request and wait for its correlated response
    ///
    /// # Errors
    /// `Timeout` when no response arrives within the request timeout,
    /// `Protocol` for error or undecodable responses, `Closed` once the
    /// client is closed or the main loop has stopped.
    pub(super) async fn request<R: Request>(
        &self,
        operation: Operation,
        params: R::Params,
    ) -> Result<R::Result, BackendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.closed_error());
        }

        match tokio::time::timeout(self.request_timeout, self.server.request::<R>(params)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(self.map_lsp_error(operation, e)),
            Err(_) => Err(BackendError::Timeout {
                operation,
                timeout: self.request_timeout,
            }),
        }
    }

    pub(super) fn notify<N: Notification>(
        &self,
        operation: Operation,
        params: N::Params,
    ) -> Result<(), BackendError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.closed_error());
        }
        self.server
            .notify::<N>(params)
            .map_err(|e| self.map_lsp_error(operation, e))
    }

    /// Notify the server that a file was opened
    ///
    /// # Errors
    /// Returns an error if the notification fails.
    pub fn did_open(&self, file: &Path, text: &str) -> Result<(), BackendError> {
        let uri = file_url(file, Operation::OpenDocument)?;
        self.notify::<DidOpenTextDocument>(
            Operation::OpenDocument,
            DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri,
                    language_id: self.config.language.to_string(),
                    version: 1,
                    text: text.into(),
                },
            },
        )
    }

    /// Shut the server down and release the process
    ///
    /// Idempotent: only the first call talks to the server.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        match tokio::time::timeout(SHUTDOWN_GRACE, self.server.request::<Shutdown>(())).await {
            Ok(Ok(())) => {
                let _ = self.server.notify::<Exit>(());
            }
            Ok(Err(e)) => tracing::debug!("{} backend shutdown failed: {}", self.config.language, e),
            Err(_) => tracing::debug!("{} backend shutdown timed out", self.config.language),
        }
        let _ = self.server.emit(Stop);

        if let Some(mut child) = lock(&self.child).take() {
            let _ = child.kill();
        }
        if let Some(handle) = lock(&self.mainloop_handle).take() {
            handle.abort();
        }
        tracing::debug!("Closed {} backend", self.config.language);
    }

    fn closed_error(&self) -> BackendError {
        BackendError::Closed {
            language: self.config.language.clone(),
        }
    }

    fn map_lsp_error(&self, operation: Operation, error: async_lsp::Error) -> BackendError {
        match error {
            async_lsp::Error::ServiceStopped | async_lsp::Error::Eof | async_lsp::Error::Io(_) => {
                self.closed_error()
            }
            other => BackendError::Protocol {
                operation,
                detail: other.to_string(),
            },
        }
    }
}

impl Drop for LspClient {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.mainloop_handle).take() {
            handle.abort();
        }
    }
}

/// `file://` URL for an absolute path
pub(super) fn file_url(path: &Path, operation: Operation) -> Result<Url, BackendError> {
    Url::from_file_path(path).map_err(|()| BackendError::Protocol {
        operation,
        detail: format!("{} is not an absolute path", path.display()),
    })
}
