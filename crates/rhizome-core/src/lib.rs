//! rhizome-core: entity and call graph extraction across languages via LSP
//!
//! Drives one language server per detected language to list each file's
//! symbols and resolve their outgoing calls, then merges the answers into
//! a single graph of canonical entities and typed, confidence-rated edges.
//!
//! # Default Language Servers
//!
//! - **rust-analyzer** - Rust
//! - **pyright** - Python
//! - **typescript-language-server** - TypeScript/JavaScript
//! - **gopls** - Go
//! - **jdtls** - Java
//! - **clangd** - C/C++
//! - **csharp-ls** - C#

pub mod analyze;
pub mod backend;
pub mod config;
pub mod error;
pub mod extract;
pub mod graph;
pub mod metrics;
pub mod resolve;
pub mod run;
pub mod scanner;

// Re-export commonly used types
pub use analyze::{analyze, analyze_blocking, Analysis, Analyzer};
pub use backend::{Backend, BackendLauncher, BackendPool, LspClient, LspLauncher};
pub use config::AnalyzerConfig;
pub use error::{AnalysisError, BackendError};
pub use graph::{Confidence, Edge, EdgeKind, Entity, EntityKind, Graph, EXTERNAL_ID};
pub use metrics::{LanguageStatus, Metrics, Warning};
pub use resolve::DispatchPolicy;
pub use run::RunInfo;
pub use scanner::{LanguageMap, LanguageTag, Scanner};
