//! Tests for per-file extraction through a backend

use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::tests::scripted::{Script, ScriptedBackend, ScriptedLauncher};
use crate::backend::{
    BackendPool, BackendSymbol, BackendSymbolKind, Deadline, Location, PoolSettings, Position,
    Span,
};
use crate::extract::{extract_file, ExtractOptions, ModulePaths};
use crate::metrics::MetricsRecorder;
use crate::scanner::LanguageTag;

const ROOT: &str = "/work";

fn path(file: &str) -> PathBuf {
    PathBuf::from(ROOT).join(file)
}

fn sym(name: &str, kind: BackendSymbolKind, line: u32) -> BackendSymbol {
    BackendSymbol {
        name: name.to_string(),
        kind,
        detail: None,
        container_name: None,
        span: Span::new(Position::new(line, 0), Position::new(line, 40)),
        selection: Position::new(line, 9),
        children: vec![],
    }
}

fn at(symbol: &BackendSymbol, file: &str) -> Location {
    Location::new(path(file), symbol.span).with_selection(symbol.selection)
}

fn barrel_script() -> Script {
    let helper = sym("helper", BackendSymbolKind::Variable, 0);
    let version = sym("VERSION", BackendSymbolKind::Variable, 1);
    let widget = sym("Widget", BackendSymbolKind::Class, 3);
    let original = Location::new(path("pkg/impl.py"), Span::lines(4, 6));

    Script::default()
        .symbols(path("pkg/__init__.py"), vec![helper.clone(), version.clone(), widget])
        .definition(&at(&helper, "pkg/__init__.py"), vec![original])
        .definition(&at(&version, "pkg/__init__.py"), vec![at(&version, "pkg/__init__.py")])
}

async fn run(options: ExtractOptions) -> anyhow::Result<crate::extract::FileExtraction> {
    let backend = Arc::new(ScriptedBackend::new("python", barrel_script()));
    let pool = BackendPool::new(
        ROOT,
        Arc::new(ScriptedLauncher::single(backend)),
        PoolSettings::default(),
        Deadline::none(),
        Arc::new(MetricsRecorder::new()),
    );
    let language = LanguageTag::new("python");
    let handle = pool.acquire(&language).await?;

    let extraction = extract_file(
        &handle,
        std::path::Path::new(ROOT),
        &ModulePaths::default(),
        &path("pkg/__init__.py"),
        &language,
        Arc::from("from .impl import helper\nVERSION = '1'\n"),
        options,
    )
    .await?;
    pool.release_all().await;
    Ok(extraction)
}

#[tokio::test]
async fn test_reexports_become_aliases() -> anyhow::Result<()> {
    let extraction = run(ExtractOptions {
        probe_reexports: true,
    })
    .await?;

    let ids: Vec<&str> = extraction.entities.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["pkg.__init___py.version", "pkg.__init___py.widget"]);

    assert_eq!(extraction.aliases.len(), 1);
    let alias = &extraction.aliases[0];
    assert_eq!(alias.name, "helper");
    assert_eq!(alias.file, path("pkg/__init__.py"));
    assert_eq!(alias.target.file, path("pkg/impl.py"));
    Ok(())
}

#[tokio::test]
async fn test_without_probes_every_binding_is_an_entity() -> anyhow::Result<()> {
    let extraction = run(ExtractOptions::default()).await?;

    assert_eq!(extraction.entities.len(), 3);
    assert!(extraction.aliases.is_empty());
    assert!(extraction.entities.iter().all(|e| e.file == "pkg/__init__.py"));
    Ok(())
}
