//! Scanner module: File discovery and language detection
//!
//! Responsible for walking directories, respecting .gitignore,
//! and mapping each file to a language tag by extension.

mod language;
mod walker;

pub use language::{LanguageMap, LanguageTag};
pub use walker::{compute_file_hash, tree_digest, Scanner, SourceFile};
