//! Tests for ClientState in state module

#![allow(clippy::panic)]

use std::ops::ControlFlow;

use async_lsp::lsp_types::{
    ConfigurationItem, ConfigurationParams, LogMessageParams, MessageType, ProgressParams,
    ProgressParamsValue, ProgressToken, ShowMessageParams, WorkDoneProgress,
    WorkDoneProgressBegin, WorkDoneProgressCreateParams, WorkDoneProgressEnd,
    WorkDoneProgressReport,
};
use async_lsp::LanguageClient;
use futures::channel::oneshot;

use crate::backend::state::ClientState;

fn begin(token: ProgressToken) -> ProgressParams {
    ProgressParams {
        token,
        value: ProgressParamsValue::WorkDone(WorkDoneProgress::Begin(WorkDoneProgressBegin {
            title: "Indexing".to_string(),
            cancellable: None,
            message: None,
            percentage: None,
        })),
    }
}

fn report(token: ProgressToken) -> ProgressParams {
    ProgressParams {
        token,
        value: ProgressParamsValue::WorkDone(WorkDoneProgress::Report(WorkDoneProgressReport {
            cancellable: None,
            message: Some("50%".to_string()),
            percentage: Some(50),
        })),
    }
}

fn end(token: ProgressToken) -> ProgressParams {
    ProgressParams {
        token,
        value: ProgressParamsValue::WorkDone(WorkDoneProgress::End(WorkDoneProgressEnd {
            message: None,
        })),
    }
}

fn token(name: &str) -> ProgressToken {
    ProgressToken::String(name.to_string())
}

fn signalled(rx: &mut oneshot::Receiver<()>) -> bool {
    match rx.try_recv() {
        Ok(Some(())) => true,
        Ok(None) => false,
        Err(e) => panic!("Unexpected channel error: {:?}", e),
    }
}

#[test]
fn test_begin_then_end_signals_indexed() {
    let (tx, mut rx) = oneshot::channel();
    let mut state = ClientState::new(Some(tx));

    assert!(matches!(state.progress(begin(token("rustAnalyzer/Indexing"))), ControlFlow::Continue(())));
    assert!(!state.is_indexed());
    assert!(matches!(state.progress(end(token("rustAnalyzer/Indexing"))), ControlFlow::Continue(())));

    assert!(state.is_indexed());
    assert!(signalled(&mut rx));
}

#[test]
fn test_waits_for_every_begun_token() {
    let (tx, mut rx) = oneshot::channel();
    let mut state = ClientState::new(Some(tx));

    let _ = state.progress(begin(token("index")));
    let _ = state.progress(begin(ProgressToken::Number(7)));
    let _ = state.progress(report(token("index")));
    let _ = state.progress(end(token("index")));
    assert!(!state.is_indexed());

    let _ = state.progress(end(ProgressToken::Number(7)));
    assert!(state.is_indexed());
    assert!(signalled(&mut rx));
}

#[test]
fn test_end_without_begin_does_not_signal() {
    let (tx, mut rx) = oneshot::channel();
    let mut state = ClientState::new(Some(tx));

    let _ = state.progress(end(token("stray")));

    assert!(!state.is_indexed());
    assert!(!signalled(&mut rx));
}

#[test]
fn test_later_progress_after_signal_is_harmless() {
    let (tx, _rx) = oneshot::channel();
    let mut state = ClientState::new(Some(tx));

    let _ = state.progress(begin(token("a")));
    let _ = state.progress(end(token("a")));
    let _ = state.progress(begin(token("b")));
    let result = state.progress(end(token("b")));

    assert!(matches!(result, ControlFlow::Continue(())));
    assert!(state.is_indexed());
}

#[test]
fn test_progress_with_no_sender() {
    let mut state = ClientState::new(None);
    let result = state.progress(end(token("a")));
    assert!(matches!(result, ControlFlow::Continue(())));
    assert!(state.is_indexed());
}

#[test]
fn test_messages_continue() {
    let mut state = ClientState::new(None);
    for typ in [MessageType::ERROR, MessageType::WARNING, MessageType::INFO, MessageType::LOG] {
        let shown = state.show_message(ShowMessageParams {
            typ,
            message: "hello".to_string(),
        });
        assert!(matches!(shown, ControlFlow::Continue(())));
        let logged = state.log_message(LogMessageParams {
            typ,
            message: "hello".to_string(),
        });
        assert!(matches!(logged, ControlFlow::Continue(())));
    }
}

#[tokio::test]
async fn test_work_done_progress_create_returns_ok() {
    let mut state = ClientState::new(None);
    let result = state
        .work_done_progress_create(WorkDoneProgressCreateParams {
            token: token("create"),
        })
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_configuration_answers_null_per_item() {
    let mut state = ClientState::new(None);
    let values = state
        .configuration(ConfigurationParams {
            items: vec![ConfigurationItem::default(), ConfigurationItem::default()],
        })
        .await;
    assert_eq!(
        values.ok(),
        Some(vec![serde_json::Value::Null, serde_json::Value::Null])
    );
}

#[test]
fn test_new_router_creates_router() {
    let (tx, _rx) = oneshot::channel();
    let _router = ClientState::new_router(tx);
}
