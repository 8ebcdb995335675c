//! Scripted backends and source trees for whole-run tests
#![allow(dead_code, clippy::panic, clippy::expect_used)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use rhizome_core::backend::{
    BackendSymbol, BackendSymbolKind, HierarchyItem, Location, Operation, OutgoingCall, Position,
    Span,
};
use rhizome_core::{AnalyzerConfig, Backend, BackendError, BackendLauncher, Graph, LanguageTag};
use tempfile::TempDir;

// ============================================================================
// Source trees
// ============================================================================

/// A temporary source tree with a canonical root
pub struct Tree {
    _temp: TempDir,
    root: PathBuf,
}

impl Tree {
    pub fn new() -> anyhow::Result<Self> {
        let temp = TempDir::new()?;
        let root = temp.path().canonicalize()?;
        Ok(Self { _temp: temp, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a file under the root
    pub fn write(&self, relative: &str, text: &str) -> anyhow::Result<Src> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, text)?;
        Ok(Src {
            path,
            lines: text.lines().map(str::to_string).collect(),
        })
    }
}

/// A written source file, for computing positions in it
#[derive(Debug, Clone)]
pub struct Src {
    pub path: PathBuf,
    lines: Vec<String>,
}

impl Src {
    /// Character position of the `nth` occurrence of `needle` on `line`
    pub fn at_nth(&self, line: u32, needle: &str, nth: usize) -> Position {
        let text = &self.lines[line as usize];
        let (byte, _) = text
            .match_indices(needle)
            .nth(nth)
            .unwrap_or_else(|| panic!("{needle:?} #{nth} not on line {line}: {text:?}"));
        let column = text[..byte].chars().count();
        Position::new(line, u32::try_from(column).expect("column fits"))
    }

    pub fn at(&self, line: u32, needle: &str) -> Position {
        self.at_nth(line, needle, 0)
    }

    /// Span of the `nth` occurrence of `needle` on `line`
    pub fn site(&self, line: u32, needle: &str, nth: usize) -> Span {
        let start = self.at_nth(line, needle, nth);
        let len = u32::try_from(needle.chars().count()).expect("length fits");
        Span::new(start, Position::new(line, start.character + len))
    }

    /// A symbol spanning `lines`, named at the first occurrence of its
    /// name on the first line
    pub fn symbol(&self, name: &str, kind: BackendSymbolKind, lines: (u32, u32)) -> BackendSymbol {
        let end = u32::try_from(self.lines[lines.1 as usize].chars().count()).expect("fits");
        BackendSymbol {
            name: name.to_string(),
            kind,
            detail: None,
            container_name: None,
            span: Span::new(Position::new(lines.0, 0), Position::new(lines.1, end)),
            selection: self.at(lines.0, name),
            children: Vec::new(),
        }
    }

    pub fn location(&self, symbol: &BackendSymbol) -> Location {
        Location::new(&self.path, symbol.span).with_selection(symbol.selection)
    }

    pub fn item(&self, symbol: &BackendSymbol) -> HierarchyItem {
        HierarchyItem {
            name: symbol.name.clone(),
            kind: symbol.kind,
            detail: symbol.detail.clone(),
            location: self.location(symbol),
        }
    }

    /// A call to `symbol` (defined in this file) from the given sites
    pub fn call(&self, symbol: &BackendSymbol, sites: Vec<Span>) -> OutgoingCall {
        OutgoingCall {
            target: self.item(symbol),
            sites,
        }
    }
}

pub fn with_children(mut symbol: BackendSymbol, children: Vec<BackendSymbol>) -> BackendSymbol {
    symbol.children = children;
    symbol
}

// ============================================================================
// Scripted backend
// ============================================================================

type Key = (PathBuf, Position);

fn key(at: &Location) -> Key {
    (at.file.clone(), at.selection)
}

/// Backend answers keyed by file, or by (file, name position)
#[derive(Debug, Default, Clone)]
pub struct Script {
    symbols: HashMap<PathBuf, Vec<BackendSymbol>>,
    malformed: HashSet<PathBuf>,
    definitions: HashMap<Key, Vec<Location>>,
    calls: HashMap<Key, Vec<OutgoingCall>>,
    implementations: HashMap<Key, Vec<Location>>,
    supertypes: HashMap<Key, Vec<HierarchyItem>>,
}

impl Script {
    pub fn symbols(mut self, src: &Src, symbols: Vec<BackendSymbol>) -> Self {
        self.symbols.insert(src.path.clone(), symbols);
        self
    }

    /// Answer the file's symbol request with a malformed response
    pub fn malformed(mut self, src: &Src) -> Self {
        self.malformed.insert(src.path.clone());
        self
    }

    pub fn definition(mut self, at: Location, found: Vec<Location>) -> Self {
        self.definitions.insert(key(&at), found);
        self
    }

    pub fn calls(mut self, from: Location, calls: Vec<OutgoingCall>) -> Self {
        self.calls.insert(key(&from), calls);
        self
    }

    pub fn implementations(mut self, of: Location, found: Vec<Location>) -> Self {
        self.implementations.insert(key(&of), found);
        self
    }

    pub fn supertypes(mut self, of: Location, found: Vec<HierarchyItem>) -> Self {
        self.supertypes.insert(key(&of), found);
        self
    }
}

/// A backend answering from a [`Script`]
pub struct FakeBackend {
    language: LanguageTag,
    script: Script,
    /// Every request times out after this long
    stall: Option<Duration>,
    /// Outgoing-call requests take this long
    slow_calls: Option<Duration>,
    pub requests: AtomicUsize,
    pub closed: AtomicBool,
}

impl FakeBackend {
    pub fn new(language: &str, script: Script) -> Self {
        Self {
            language: LanguageTag::new(language),
            script,
            stall: None,
            slow_calls: None,
            requests: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn stalled(mut self, latency: Duration) -> Self {
        self.stall = Some(latency);
        self
    }

    pub fn slow_calls(mut self, delay: Duration) -> Self {
        self.slow_calls = Some(delay);
        self
    }

    async fn answer<T: Clone>(
        &self,
        operation: Operation,
        found: Option<&Vec<T>>,
    ) -> Result<Vec<T>, BackendError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::Closed {
                language: self.language.clone(),
            });
        }
        if let Some(latency) = self.stall {
            tokio::time::sleep(latency).await;
            return Err(BackendError::Timeout {
                operation,
                timeout: latency,
            });
        }
        if let (Operation::OutgoingCalls, Some(delay)) = (operation, self.slow_calls) {
            tokio::time::sleep(delay).await;
        }
        Ok(found.cloned().unwrap_or_default())
    }
}

impl Backend for FakeBackend {
    fn language(&self) -> &LanguageTag {
        &self.language
    }

    fn open_document<'a>(&'a self, _file: &'a Path, _text: &'a str) -> BoxFuture<'a, Result<(), BackendError>> {
        Box::pin(async { Ok(()) })
    }

    fn document_symbols<'a>(&'a self, file: &'a Path) -> BoxFuture<'a, Result<Vec<BackendSymbol>, BackendError>> {
        Box::pin(async move {
            if self.script.malformed.contains(file) {
                return Err(BackendError::Protocol {
                    operation: Operation::DocumentSymbols,
                    detail: "expected array".into(),
                });
            }
            self.answer(Operation::DocumentSymbols, self.script.symbols.get(file))
                .await
        })
    }

    fn definition<'a>(&'a self, at: &'a Location) -> BoxFuture<'a, Result<Vec<Location>, BackendError>> {
        Box::pin(self.answer(Operation::Definition, self.script.definitions.get(&key(at))))
    }

    fn outgoing_calls<'a>(&'a self, at: &'a Location) -> BoxFuture<'a, Result<Vec<OutgoingCall>, BackendError>> {
        Box::pin(self.answer(Operation::OutgoingCalls, self.script.calls.get(&key(at))))
    }

    fn implementations<'a>(&'a self, at: &'a Location) -> BoxFuture<'a, Result<Vec<Location>, BackendError>> {
        Box::pin(self.answer(
            Operation::Implementations,
            self.script.implementations.get(&key(at)),
        ))
    }

    fn supertypes<'a>(&'a self, at: &'a Location) -> BoxFuture<'a, Result<Vec<HierarchyItem>, BackendError>> {
        Box::pin(self.answer(Operation::Supertypes, self.script.supertypes.get(&key(at))))
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        self.closed.store(true, Ordering::SeqCst);
        Box::pin(async {})
    }
}

type Factory = Box<dyn Fn() -> FakeBackend + Send + Sync>;

/// Launches fake backends for registered languages only
#[derive(Default)]
pub struct FakeLauncher {
    factories: HashMap<LanguageTag, Factory>,
    launched: Mutex<Vec<Arc<FakeBackend>>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a language; `factory` runs on every launch, restarts included
    pub fn with<F>(mut self, language: &str, factory: F) -> Self
    where
        F: Fn() -> FakeBackend + Send + Sync + 'static,
    {
        self.factories
            .insert(LanguageTag::new(language), Box::new(factory));
        self
    }

    /// Register a language whose backend always answers from `script`
    pub fn scripted(self, language: &str, script: Script) -> Self {
        let tag = language.to_string();
        self.with(language, move || FakeBackend::new(&tag, script.clone()))
    }

    /// Every backend launched so far for `language`
    pub fn launched(&self, language: &str) -> Vec<Arc<FakeBackend>> {
        self.launched
            .lock()
            .expect("launch list")
            .iter()
            .filter(|b| b.language.as_str() == language)
            .cloned()
            .collect()
    }

    pub fn all_closed(&self) -> bool {
        self.launched
            .lock()
            .expect("launch list")
            .iter()
            .all(|b| b.closed.load(Ordering::SeqCst))
    }
}

impl BackendLauncher for FakeLauncher {
    fn launch<'a>(
        &'a self,
        language: &'a LanguageTag,
        _root: &'a Path,
    ) -> BoxFuture<'a, Result<Arc<dyn Backend>, BackendError>> {
        Box::pin(async move {
            let factory = self
                .factories
                .get(language)
                .ok_or_else(|| BackendError::Unavailable {
                    language: language.clone(),
                    reason: "no backend registered".into(),
                })?;
            let backend = Arc::new(factory());
            self.launched
                .lock()
                .expect("launch list")
                .push(Arc::clone(&backend));
            Ok(backend as Arc<dyn Backend>)
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Configuration with fast retries
pub fn config() -> AnalyzerConfig {
    AnalyzerConfig {
        max_in_flight: 4,
        retry_backoff_ms: 1,
        ..AnalyzerConfig::default()
    }
}

/// Ids unique, every edge endpoint known
pub fn assert_well_formed(graph: &Graph) {
    assert!(graph.ids_unique(), "duplicate entity ids");
    assert!(graph.edges_closed(), "edge to an unknown entity");
}
