//! Analysis entry point
//!
//! A run goes through three phases:
//! 1. Scan the tree and group files by language
//! 2. Per language, concurrently: extract entities, then resolve references
//! 3. Merge every language's partial result into one graph

mod language;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::{join_all, AbortHandle, AbortRegistration, Abortable};
use tracing::info;

use crate::backend::{BackendLauncher, BackendPool, LspLauncher};
use crate::config::AnalyzerConfig;
use crate::error::AnalysisError;
use crate::extract::ModulePaths;
use crate::graph::{Graph, Unifier};
use crate::metrics::{Metrics, MetricsRecorder};
use crate::run::RunInfo;
use crate::scanner::{tree_digest, LanguageMap, LanguageTag, Scanner, SourceFile};
use language::{analyze_language, RunContext};

/// Result of a run
#[derive(Debug, Clone)]
pub struct Analysis {
    pub graph: Graph,
    pub metrics: Metrics,
}

/// A configurable analysis run
pub struct Analyzer {
    root: PathBuf,
    languages: LanguageMap,
    config: AnalyzerConfig,
    launcher: Option<Arc<dyn BackendLauncher>>,
    abort: AbortHandle,
    registration: AbortRegistration,
}

impl Analyzer {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, languages: LanguageMap) -> Self {
        let (abort, registration) = AbortHandle::new_pair();
        Self {
            root: root.into(),
            languages,
            config: AnalyzerConfig::default(),
            launcher: None,
            abort,
            registration,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: AnalyzerConfig) -> Self {
        self.config = config;
        self
    }

    /// Start backends through `launcher` instead of language servers
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn BackendLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Handle that cancels the run, releasing every backend
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Run the analysis
    ///
    /// # Errors
    /// Returns `AnalysisError::InvalidRoot` if the root is not a readable
    /// directory, `Cancelled` if the run was aborted, and
    /// `GraphConsistency` on a canonical id collision. Backend failures
    /// only degrade the result.
    pub async fn run(self) -> Result<Analysis, AnalysisError> {
        let root = canonical_root(&self.root).await?;
        info!("Analyzing {}", root.display());

        let files = Scanner::new(&root, self.languages).scan();
        let groups = group_by_language(&files);
        info!("Found {} files in {} languages", files.len(), groups.len());

        let mut run = RunInfo::new(&root)
            .with_git_info()
            .with_tree_digest(tree_digest(&root, &files));
        log_run_info(&run);

        let launcher = self
            .launcher
            .unwrap_or_else(|| Arc::new(lsp_launcher(&self.config)) as Arc<dyn BackendLauncher>);
        let metrics = Arc::new(MetricsRecorder::new());
        let pool = BackendPool::new(
            &root,
            launcher,
            self.config.pool_settings(),
            self.config.deadline(),
            Arc::clone(&metrics),
        );

        let modules =
            ModulePaths::new(files.iter().filter_map(|f| f.path.strip_prefix(&root).ok()));
        let ctx = RunContext {
            root: &root,
            files: &files,
            modules: &modules,
            pool: &pool,
            metrics: &metrics,
            config: &self.config,
        };
        let pipelines = join_all(
            groups
                .iter()
                .map(|(language, paths)| analyze_language(&ctx, language, paths)),
        );
        let partials = match Abortable::new(pipelines, self.registration).await {
            Ok(partials) => partials,
            Err(_) => {
                tracing::warn!("Run cancelled, releasing backends");
                pool.release_all().await;
                return Err(AnalysisError::Cancelled);
            }
        };
        pool.release_all().await;

        let graph = Unifier::new(&root, &self.config.entry_points).unify(partials)?;
        let fingerprint = match graph.fingerprint() {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                tracing::warn!("Failed to fingerprint graph: {}", e);
                String::new()
            }
        };

        run.finish();
        let metrics = metrics.finish(&graph, run, fingerprint);
        log_summary(&metrics);
        Ok(Analysis { graph, metrics })
    }
}

/// Analyze `root` with the default configuration and language servers
///
/// `RHIZOME_*` environment overrides apply.
///
/// # Errors
/// See [`Analyzer::run`].
pub async fn analyze(
    root: impl Into<PathBuf>,
    languages: LanguageMap,
) -> Result<Analysis, AnalysisError> {
    Analyzer::new(root, languages)
        .with_config(AnalyzerConfig::default().with_env_overrides())
        .run()
        .await
}

/// Blocking form of [`analyze`] for callers without a runtime
///
/// # Errors
/// Returns `AnalysisError::Runtime` if the runtime cannot be built, or
/// any error of [`Analyzer::run`].
pub fn analyze_blocking(
    root: impl Into<PathBuf>,
    languages: LanguageMap,
) -> Result<Analysis, AnalysisError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(AnalysisError::Runtime)?;
    runtime.block_on(analyze(root, languages))
}

async fn canonical_root(root: &Path) -> Result<PathBuf, AnalysisError> {
    let invalid = |source| AnalysisError::InvalidRoot {
        path: root.to_path_buf(),
        source,
    };
    let canonical = tokio::fs::canonicalize(root).await.map_err(invalid)?;
    let metadata = tokio::fs::metadata(&canonical).await.map_err(invalid)?;
    if !metadata.is_dir() {
        return Err(invalid(std::io::Error::other("not a directory")));
    }
    Ok(canonical)
}

fn lsp_launcher(config: &AnalyzerConfig) -> LspLauncher {
    config.backends.iter().fold(
        LspLauncher::new(config.client_timeouts()),
        |launcher, (language, command)| launcher.with_override(language.clone(), command.clone()),
    )
}

/// Scanned files grouped by language, in path order
pub(crate) fn group_by_language(files: &[SourceFile]) -> BTreeMap<LanguageTag, Vec<PathBuf>> {
    let mut groups: BTreeMap<LanguageTag, Vec<PathBuf>> = BTreeMap::new();
    for file in files {
        groups
            .entry(file.language.clone())
            .or_default()
            .push(file.path.clone());
    }
    groups
}

fn log_run_info(run: &RunInfo) {
    info!(
        "Created run {} (commit: {}, branch: {:?})",
        run.id,
        run.commit_sha.as_deref().unwrap_or("none"),
        run.branch
    );
}

fn log_summary(metrics: &Metrics) {
    info!(
        "Analysis completed: {} entities, {} edges, {} orphans, {} unresolved, {} warnings",
        metrics.totals.entities,
        metrics.totals.edges,
        metrics.totals.orphans,
        metrics.totals.unresolved_edges,
        metrics.warnings.len()
    );
}
