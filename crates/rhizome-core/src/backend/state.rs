//! LSP client state and notification handling

use std::collections::HashSet;
use std::ops::ControlFlow;

use async_lsp::lsp_types::{
    ConfigurationParams, LogMessageParams, NumberOrString, ProgressParams, ProgressParamsValue,
    PublishDiagnosticsParams, RegistrationParams, ShowMessageParams, WorkDoneProgress,
    WorkDoneProgressCreateParams,
};
use async_lsp::router::Router;
use async_lsp::{LanguageClient, ResponseError};
use futures::channel::oneshot;
use futures::future::BoxFuture;

/// Client state for handling LSP notifications
///
/// Indexing is considered finished once every work-done progress token the
/// server has begun has also ended.
pub(super) struct ClientState {
    indexed_tx: Option<oneshot::Sender<()>>,
    active_progress: HashSet<String>,
    seen_progress: bool,
}

/// Event to signal stopping the client
pub(super) struct Stop;

fn token_key(token: &NumberOrString) -> String {
    match token {
        NumberOrString::Number(n) => n.to_string(),
        NumberOrString::String(s) => s.clone(),
    }
}

impl ClientState {
    pub(super) fn new(indexed_tx: Option<oneshot::Sender<()>>) -> Self {
        ClientState {
            indexed_tx,
            active_progress: HashSet::new(),
            seen_progress: false,
        }
    }

    pub(super) fn new_router(indexed_tx: oneshot::Sender<()>) -> Router<Self> {
        let mut router = Router::from_language_client(ClientState::new(Some(indexed_tx)));
        router.event(Self::on_stop);
        router
    }

    fn on_stop(&mut self, _: Stop) -> ControlFlow<async_lsp::Result<()>> {
        ControlFlow::Break(Ok(()))
    }

    /// Whether the indexing signal has already been sent
    pub(super) fn is_indexed(&self) -> bool {
        self.indexed_tx.is_none()
    }

    fn track_progress(&mut self, token: &NumberOrString, progress: &WorkDoneProgress) {
        let key = token_key(token);
        match progress {
            WorkDoneProgress::Begin(_) => {
                self.seen_progress = true;
                self.active_progress.insert(key);
            }
            WorkDoneProgress::Report(_) => {}
            WorkDoneProgress::End(_) => {
                self.active_progress.remove(&key);
                if self.seen_progress && self.active_progress.is_empty() {
                    if let Some(tx) = self.indexed_tx.take() {
                        let _ = tx.send(());
                    }
                }
            }
        }
    }
}

impl LanguageClient for ClientState {
    type Error = ResponseError;
    type NotifyResult = ControlFlow<async_lsp::Result<()>>;

    fn progress(&mut self, params: ProgressParams) -> Self::NotifyResult {
        #[allow(irrefutable_let_patterns)]
        if let ProgressParamsValue::WorkDone(progress) = &params.value {
            self.track_progress(&params.token, progress);
        }
        ControlFlow::Continue(())
    }

    fn publish_diagnostics(&mut self, _: PublishDiagnosticsParams) -> Self::NotifyResult {
        ControlFlow::Continue(())
    }

    fn show_message(&mut self, params: ShowMessageParams) -> Self::NotifyResult {
        tracing::debug!("LSP message {:?}: {}", params.typ, params.message);
        ControlFlow::Continue(())
    }

    fn log_message(&mut self, params: LogMessageParams) -> Self::NotifyResult {
        tracing::debug!("LSP log {:?}: {}", params.typ, params.message);
        ControlFlow::Continue(())
    }

    fn work_done_progress_create(
        &mut self,
        _params: WorkDoneProgressCreateParams,
    ) -> BoxFuture<'static, Result<(), ResponseError>> {
        Box::pin(async { Ok(()) })
    }

    fn register_capability(
        &mut self,
        _params: RegistrationParams,
    ) -> BoxFuture<'static, Result<(), ResponseError>> {
        Box::pin(async { Ok(()) })
    }

    fn configuration(
        &mut self,
        params: ConfigurationParams,
    ) -> BoxFuture<'static, Result<Vec<serde_json::Value>, ResponseError>> {
        let items = params.items.len();
        Box::pin(async move { Ok(vec![serde_json::Value::Null; items]) })
    }
}
