//! Per-language pipeline: extraction, then resolution
//!
//! Both phases share the language's single backend and keep at most
//! `max_in_flight` requests outstanding against it. Resolution only starts
//! once every file of the language has been extracted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::info;

use crate::backend::{BackendHandle, BackendPool};
use crate::config::AnalyzerConfig;
use crate::error::BackendError;
use crate::extract::{extract_file, ExtractOptions, FileExtraction, ModulePaths};
use crate::graph::{PartialGraph, RawEdge};
use crate::metrics::{LanguageReport, LanguageStatus, MetricsRecorder, Warning};
use crate::resolve::{EntityIndex, ResolveOptions, Resolver};
use crate::scanner::{LanguageTag, SourceFile};

/// What every language pipeline of a run shares
pub(crate) struct RunContext<'a> {
    pub root: &'a Path,
    pub files: &'a [SourceFile],
    pub modules: &'a ModulePaths,
    pub pool: &'a BackendPool,
    pub metrics: &'a MetricsRecorder,
    pub config: &'a AnalyzerConfig,
}

/// Work that could not be completed for a language
#[derive(Debug, Default)]
struct Losses {
    count: usize,
    last: Option<String>,
}

impl Losses {
    fn add(&mut self, what: &str, error: &dyn std::fmt::Display) {
        tracing::debug!("Lost {}: {}", what, error);
        self.count += 1;
        self.last = Some(error.to_string());
    }
}

/// Run extraction and resolution for one language
///
/// Never fails: every backend problem ends up in the language's status
/// and the run's warnings.
pub(crate) async fn analyze_language(
    ctx: &RunContext<'_>,
    language: &LanguageTag,
    files: &[PathBuf],
) -> PartialGraph {
    let handle = match ctx.pool.acquire(language).await {
        Ok(handle) => handle,
        Err(e) => return skipped(ctx, language, files.len(), &e),
    };

    let mut losses = Losses::default();
    let texts = read_texts(files, &mut losses).await;

    info!("{}: extracting {} files", language, texts.len());
    let extractions = extract_all(ctx, &handle, language, &texts, &mut losses).await;

    let mut partial = PartialGraph::new(language.clone());
    let mut index = EntityIndex::new(ctx.root, Some(language.clone()));
    for file in ctx.files {
        index.register_file(&file.path, &file.language);
    }
    for (path, text) in &texts {
        index.set_text(path, Arc::clone(text));
    }
    for extraction in extractions {
        partial.aliases.extend(extraction.aliases.iter().cloned());
        index.insert(extraction);
    }

    if handle.is_degraded() {
        tracing::warn!("{}: backend degraded during extraction, skipping resolution", language);
    } else {
        info!("{}: resolving {} entities", language, index.entities().len());
        partial.edges = resolve_all(ctx, &handle, &index, &mut losses).await;
    }
    partial.entities = index.entities().to_vec();

    let status = if handle.is_degraded() {
        LanguageStatus::Degraded
    } else if losses.count > 0 {
        ctx.metrics.warn(Warning::LanguagePartial {
            language: language.clone(),
            reason: format!(
                "{} operations lost, last: {}",
                losses.count,
                losses.last.unwrap_or_default()
            ),
        });
        LanguageStatus::Partial
    } else {
        LanguageStatus::Complete
    };
    info!(
        "{}: {:?}, {} entities, {} raw edges",
        language,
        status,
        partial.entities.len(),
        partial.edges.len()
    );
    ctx.metrics.set_language(
        language.clone(),
        LanguageReport {
            status,
            files: files.len(),
            entities: partial.entities.len(),
        },
    );
    partial
}

/// Report a language whose backend never started
fn skipped(
    ctx: &RunContext<'_>,
    language: &LanguageTag,
    files: usize,
    error: &BackendError,
) -> PartialGraph {
    tracing::warn!("Skipping {}: {}", language, error);
    let (status, warning) = match error {
        BackendError::Cancelled => (
            LanguageStatus::Partial,
            Warning::LanguagePartial {
                language: language.clone(),
                reason: error.to_string(),
            },
        ),
        _ => (
            LanguageStatus::Unavailable,
            Warning::BackendUnavailable {
                language: language.clone(),
                reason: error.to_string(),
            },
        ),
    };
    ctx.metrics.warn(warning);
    ctx.metrics.set_language(
        language.clone(),
        LanguageReport {
            status,
            files,
            entities: 0,
        },
    );
    PartialGraph::new(language.clone())
}

async fn read_texts(files: &[PathBuf], losses: &mut Losses) -> Vec<(PathBuf, Arc<str>)> {
    let mut texts = Vec::with_capacity(files.len());
    for path in files {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => texts.push((path.clone(), Arc::from(text))),
            Err(e) => losses.add(&path.display().to_string(), &e),
        }
    }
    texts
}

async fn extract_all(
    ctx: &RunContext<'_>,
    handle: &BackendHandle,
    language: &LanguageTag,
    texts: &[(PathBuf, Arc<str>)],
    losses: &mut Losses,
) -> Vec<FileExtraction> {
    let options = ExtractOptions {
        probe_reexports: ctx.config.probe_reexports,
    };
    let mut results: Vec<(&PathBuf, Result<FileExtraction, BackendError>)> =
        stream::iter(texts)
            .map(|(path, text)| async move {
                let result = extract_file(
                    handle,
                    ctx.root,
                    ctx.modules,
                    path,
                    language,
                    Arc::clone(text),
                    options,
                )
                .await;
                (path, result)
            })
            .buffer_unordered(ctx.config.in_flight())
            .collect()
            .await;
    results.sort_by(|a, b| a.0.cmp(b.0));

    let mut extractions = Vec::with_capacity(results.len());
    for (path, result) in results {
        match result {
            Ok(extraction) => extractions.push(extraction),
            Err(BackendError::Protocol { operation, detail }) => {
                tracing::warn!(
                    "Ignoring malformed {} response for {}: {}",
                    operation,
                    path.display(),
                    detail
                );
            }
            Err(e) => losses.add(&path.display().to_string(), &e),
        }
    }
    extractions
}

async fn resolve_all(
    ctx: &RunContext<'_>,
    handle: &BackendHandle,
    index: &EntityIndex,
    losses: &mut Losses,
) -> Vec<RawEdge> {
    let resolver = Resolver::new(
        handle,
        index,
        ResolveOptions {
            dispatch: ctx.config.dispatch_policy,
            type_hierarchy: ctx.config.type_hierarchy,
        },
    );

    let results: Vec<_> = stream::iter(index.entities())
        .map(|entity| {
            let resolver = &resolver;
            async move { (entity, resolver.resolve_entity(entity).await) }
        })
        .buffer_unordered(ctx.config.in_flight())
        .collect()
        .await;

    let mut edges = Vec::new();
    for (entity, result) in results {
        match result {
            Ok(found) => edges.extend(found),
            Err(e) => losses.add(&entity.id, &e),
        }
    }
    edges
}
