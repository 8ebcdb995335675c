//! Backend pool: one supervised backend per language for a run

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::sync::OnceCell;

use super::deadline::Deadline;
use super::types::{BackendSymbol, HierarchyItem, Location, Operation, OutgoingCall};
use super::{Backend, BackendLauncher};
use crate::error::BackendError;
use crate::metrics::{MetricsRecorder, Outcome, Warning};
use crate::scanner::LanguageTag;

/// Retry and health thresholds applied by every handle of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Retries of a timed-out operation
    pub max_retries: u32,
    /// Base backoff, doubled per retry
    pub retry_backoff: Duration,
    /// A backend is restarted once its consecutive timeouts exceed this
    pub max_consecutive_timeouts: u32,
    /// Restarts allowed before the language is degraded
    pub max_restarts: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_backoff: Duration::from_millis(200),
            max_consecutive_timeouts: 3,
            max_restarts: 1,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Supervised {
    backend: Arc<dyn Backend>,
    /// Bumped on every restart so timeouts of the old process are ignored
    generation: u64,
    consecutive_timeouts: u32,
    restarts: u32,
    degraded: bool,
}

/// Shared, supervised access to one language's backend
///
/// Every operation is timed into the run's metrics, bounded by the run
/// deadline, and retried on timeout. Sustained timeouts restart the backend
/// and then degrade the language. A restarted backend gets every document
/// opened so far before it serves requests, and operations cut off by the
/// restart are retried on it.
pub struct BackendHandle {
    language: LanguageTag,
    root: PathBuf,
    launcher: Arc<dyn BackendLauncher>,
    settings: PoolSettings,
    deadline: Deadline,
    metrics: Arc<MetricsRecorder>,
    state: Mutex<Supervised>,
    /// Held for the whole of a restart
    restart: tokio::sync::Mutex<()>,
    opened: Mutex<BTreeMap<PathBuf, Arc<str>>>,
}

impl BackendHandle {
    #[must_use]
    pub fn language(&self) -> &LanguageTag {
        &self.language
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        lock(&self.state).degraded
    }

    #[must_use]
    pub fn restarts(&self) -> u32 {
        lock(&self.state).restarts
    }

    fn current(&self) -> Result<(Arc<dyn Backend>, u64), BackendError> {
        let state = lock(&self.state);
        if state.degraded {
            return Err(self.degraded_error());
        }
        Ok((Arc::clone(&state.backend), state.generation))
    }

    fn degraded_error(&self) -> BackendError {
        BackendError::Degraded {
            language: self.language.clone(),
        }
    }

    /// Run one backend operation under supervision
    ///
    /// A failure on a backend that was restarted meanwhile is retried on
    /// the new one without counting as an attempt. Opening a document is not
    /// retried that way, the restart replays it.
    ///
    /// # Errors
    /// `Degraded` once the language is demoted, `Cancelled` past the run
    /// deadline, `Timeout` when every retry timed out, or the operation's
    /// own error.
    pub async fn call<T, F>(&self, operation: Operation, op: F) -> Result<T, BackendError>
    where
        F: Fn(Arc<dyn Backend>) -> BoxFuture<'static, Result<T, BackendError>>,
    {
        let mut attempt = 0;
        loop {
            let (backend, generation) = self.current()?;
            if self.deadline.is_expired() {
                return Err(BackendError::Cancelled);
            }

            let started = Instant::now();
            let result = self.deadline.guard(op(backend)).await;
            self.metrics
                .record(operation, &self.language, started.elapsed(), Outcome::of(&result));

            match result {
                Ok(value) => {
                    self.on_success(generation);
                    return Ok(value);
                }
                Err(e) if e.is_timeout() => {
                    tracing::debug!(
                        "{} {} timed out (attempt {})",
                        self.language,
                        operation,
                        attempt + 1
                    );
                    self.on_timeout(generation).await?;
                    if attempt >= self.settings.max_retries {
                        return Err(e);
                    }
                    let backoff = self.settings.retry_backoff * 2u32.saturating_pow(attempt);
                    self.deadline
                        .guard(async {
                            tokio::time::sleep(backoff).await;
                            Ok(())
                        })
                        .await?;
                    attempt += 1;
                }
                Err(e) => {
                    if operation != Operation::OpenDocument && self.superseded(generation).await {
                        tracing::debug!(
                            "{} {} failed on a replaced backend, retrying: {}",
                            self.language,
                            operation,
                            e
                        );
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Whether `generation` was replaced or degraded, waiting out a restart
    /// in progress
    async fn superseded(&self, generation: u64) -> bool {
        let _restart = self.restart.lock().await;
        let state = lock(&self.state);
        state.degraded || state.generation != generation
    }

    fn on_success(&self, generation: u64) {
        let mut state = lock(&self.state);
        if state.generation == generation {
            state.consecutive_timeouts = 0;
        }
    }

    async fn on_timeout(&self, generation: u64) -> Result<(), BackendError> {
        let exceeded = {
            let mut state = lock(&self.state);
            if state.degraded {
                return Err(self.degraded_error());
            }
            if state.generation != generation {
                return Ok(());
            }
            state.consecutive_timeouts += 1;
            state.consecutive_timeouts > self.settings.max_consecutive_timeouts
        };

        if exceeded {
            self.restart_or_degrade(generation).await
        } else {
            Ok(())
        }
    }

    async fn restart_or_degrade(&self, generation: u64) -> Result<(), BackendError> {
        let _restart = self.restart.lock().await;

        let (old, timeouts, can_restart) = {
            let state = lock(&self.state);
            if state.degraded {
                return Err(self.degraded_error());
            }
            if state.generation != generation {
                // Another task already restarted this generation
                return Ok(());
            }
            (
                Arc::clone(&state.backend),
                state.consecutive_timeouts,
                state.restarts < self.settings.max_restarts,
            )
        };

        old.close().await;
        if !can_restart {
            self.degrade(format!("{timeouts} consecutive timeouts after restart"));
            return Err(self.degraded_error());
        }

        tracing::warn!(
            "Restarting {} backend after {} consecutive timeouts",
            self.language,
            timeouts
        );
        let started = Instant::now();
        let launched = self
            .deadline
            .guard(self.launcher.launch(&self.language, &self.root))
            .await;
        self.metrics.record(
            Operation::Start,
            &self.language,
            started.elapsed(),
            Outcome::of(&launched),
        );

        match launched {
            Ok(backend) => {
                self.reopen_documents(&backend).await?;
                let mut state = lock(&self.state);
                state.backend = backend;
                state.generation += 1;
                state.consecutive_timeouts = 0;
                state.restarts += 1;
                Ok(())
            }
            Err(BackendError::Cancelled) => Err(BackendError::Cancelled),
            Err(e) => {
                self.degrade(format!("restart failed: {e}"));
                Err(self.degraded_error())
            }
        }
    }

    /// Replay every document opened so far onto a fresh backend
    async fn reopen_documents(&self, backend: &Arc<dyn Backend>) -> Result<(), BackendError> {
        let documents: Vec<(PathBuf, Arc<str>)> = lock(&self.opened)
            .iter()
            .map(|(file, text)| (file.clone(), Arc::clone(text)))
            .collect();

        for (file, text) in &documents {
            let started = Instant::now();
            let result = self.deadline.guard(backend.open_document(file, text)).await;
            self.metrics.record(
                Operation::OpenDocument,
                &self.language,
                started.elapsed(),
                Outcome::of(&result),
            );
            match result {
                Ok(()) => {}
                Err(BackendError::Cancelled) => {
                    backend.close().await;
                    return Err(BackendError::Cancelled);
                }
                Err(e) => tracing::debug!("Reopening {} failed: {}", file.display(), e),
            }
        }
        tracing::debug!(
            "Reopened {} documents on the new {} backend",
            documents.len(),
            self.language
        );
        Ok(())
    }

    fn degrade(&self, reason: String) {
        {
            let mut state = lock(&self.state);
            if state.degraded {
                return;
            }
            state.degraded = true;
        }
        tracing::warn!("Language {} degraded: {}", self.language, reason);
        self.metrics.warn(Warning::LanguageDegraded {
            language: self.language.clone(),
            reason,
        });
    }

    /// Release the current backend process
    pub async fn close(&self) {
        let backend = Arc::clone(&lock(&self.state).backend);
        backend.close().await;
    }

    /// Open a document, remembering it for later restarts
    ///
    /// # Errors
    /// See [`BackendHandle::call`].
    pub async fn open_document(&self, file: &Path, text: Arc<str>) -> Result<(), BackendError> {
        let file = file.to_path_buf();
        let generation = {
            // A restart either replays this document or finishes before it is sent
            let _restart = self.restart.lock().await;
            lock(&self.opened).insert(file.clone(), Arc::clone(&text));
            lock(&self.state).generation
        };
        let opened = self.call(Operation::OpenDocument, move |backend| {
            let file = file.clone();
            let text = Arc::clone(&text);
            Box::pin(async move { backend.open_document(&file, &text).await })
        })
        .await;

        if let Err(e) = &opened {
            if !e.is_timeout() && self.superseded(generation).await {
                return self.current().map(|_| ());
            }
        }
        opened
    }

    /// # Errors
    /// See [`BackendHandle::call`].
    pub async fn document_symbols(&self, file: &Path) -> Result<Vec<BackendSymbol>, BackendError> {
        let file = file.to_path_buf();
        self.call(Operation::DocumentSymbols, move |backend| {
            let file = file.clone();
            Box::pin(async move { backend.document_symbols(&file).await })
        })
        .await
    }

    /// # Errors
    /// See [`BackendHandle::call`].
    pub async fn definition(&self, at: &Location) -> Result<Vec<Location>, BackendError> {
        let at = at.clone();
        self.call(Operation::Definition, move |backend| {
            let at = at.clone();
            Box::pin(async move { backend.definition(&at).await })
        })
        .await
    }

    /// # Errors
    /// See [`BackendHandle::call`].
    pub async fn outgoing_calls(&self, at: &Location) -> Result<Vec<OutgoingCall>, BackendError> {
        let at = at.clone();
        self.call(Operation::OutgoingCalls, move |backend| {
            let at = at.clone();
            Box::pin(async move { backend.outgoing_calls(&at).await })
        })
        .await
    }

    /// # Errors
    /// See [`BackendHandle::call`].
    pub async fn implementations(&self, at: &Location) -> Result<Vec<Location>, BackendError> {
        let at = at.clone();
        self.call(Operation::Implementations, move |backend| {
            let at = at.clone();
            Box::pin(async move { backend.implementations(&at).await })
        })
        .await
    }

    /// # Errors
    /// See [`BackendHandle::call`].
    pub async fn supertypes(&self, at: &Location) -> Result<Vec<HierarchyItem>, BackendError> {
        let at = at.clone();
        self.call(Operation::Supertypes, move |backend| {
            let at = at.clone();
            Box::pin(async move { backend.supertypes(&at).await })
        })
        .await
    }
}

type Slot = Arc<OnceCell<Result<Arc<BackendHandle>, BackendError>>>;

/// Owns one live backend per language for the run
pub struct BackendPool {
    root: PathBuf,
    launcher: Arc<dyn BackendLauncher>,
    settings: PoolSettings,
    deadline: Deadline,
    metrics: Arc<MetricsRecorder>,
    slots: Mutex<BTreeMap<LanguageTag, Slot>>,
}

impl BackendPool {
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        launcher: Arc<dyn BackendLauncher>,
        settings: PoolSettings,
        deadline: Deadline,
        metrics: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            root: root.into(),
            launcher,
            settings,
            deadline,
            metrics,
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    /// Get or start the backend for a language
    ///
    /// Every caller for the same language gets the same handle, including
    /// callers racing the first startup. A failed startup is remembered for
    /// the rest of the run.
    ///
    /// # Errors
    /// Returns `BackendError::Unavailable` if no backend can be started, or
    /// `Cancelled` if the run deadline passes during startup.
    pub async fn acquire(&self, language: &LanguageTag) -> Result<Arc<BackendHandle>, BackendError> {
        let slot = Arc::clone(lock(&self.slots).entry(language.clone()).or_default());

        slot.get_or_init(|| self.start(language.clone()))
            .await
            .clone()
    }

    async fn start(&self, language: LanguageTag) -> Result<Arc<BackendHandle>, BackendError> {
        tracing::debug!("Starting {} backend", language);
        let started = Instant::now();
        let launched = self
            .deadline
            .guard(self.launcher.launch(&language, &self.root))
            .await;
        self.metrics
            .record(Operation::Start, &language, started.elapsed(), Outcome::of(&launched));

        let backend = launched?;
        tracing::info!("{} backend ready in {:?}", language, started.elapsed());
        Ok(Arc::new(BackendHandle {
            language,
            root: self.root.clone(),
            launcher: Arc::clone(&self.launcher),
            settings: self.settings,
            deadline: self.deadline,
            metrics: Arc::clone(&self.metrics),
            state: Mutex::new(Supervised {
                backend,
                generation: 0,
                consecutive_timeouts: 0,
                restarts: 0,
                degraded: false,
            }),
            restart: tokio::sync::Mutex::new(()),
            opened: Mutex::new(BTreeMap::new()),
        }))
    }

    /// Shut down every backend, regardless of outstanding handles
    pub async fn release_all(&self) {
        let slots: Vec<Slot> = std::mem::take(&mut *lock(&self.slots))
            .into_values()
            .collect();

        let handles = slots
            .iter()
            .filter_map(|slot| slot.get().and_then(|started| started.as_ref().ok()));
        futures::future::join_all(handles.map(|handle| handle.close())).await;
        tracing::debug!("Released {} backends", slots.len());
    }
}
