//! File walker: Discovers source files in a directory tree

use std::io::Read;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use sha2::{Digest, Sha256};

use super::{LanguageMap, LanguageTag};

/// A source file discovered during scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub language: LanguageTag,
}

impl SourceFile {
    /// SHA-256 of the file content as a lowercase hex string
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub fn compute_hash(&self) -> std::io::Result<String> {
        compute_file_hash(&self.path)
    }
}

/// SHA-256 of a file's content as a lowercase hex string
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn compute_file_hash(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Scanner for discovering source files in a directory
#[derive(Debug)]
pub struct Scanner {
    root: PathBuf,
    languages: LanguageMap,
}

impl Scanner {
    /// Create a new scanner for the given root directory
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, languages: LanguageMap) -> Self {
        Self {
            root: root.into(),
            languages,
        }
    }

    /// Scan the directory and return discovered files, sorted by path
    ///
    /// `.gitignore`d files are skipped; files whose extension is not in the
    /// language map are ignored.
    #[must_use]
    pub fn scan(&self) -> Vec<SourceFile> {
        let mut files: Vec<SourceFile> = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false)
            .filter_entry(|entry| entry.file_name() != ".git")
            .build()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter_map(|entry| {
                let path = entry.into_path();
                let language = self.languages.for_path(&path)?.clone();
                Some(SourceFile { path, language })
            })
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Get the root directory being scanned
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Digest of a file set: SHA-256 over sorted (relative path, content hash) pairs
///
/// Unreadable files contribute their path only.
#[must_use]
pub fn tree_digest(root: &Path, files: &[SourceFile]) -> String {
    let mut entries: Vec<(String, String)> = files
        .iter()
        .map(|file| {
            let relative = file
                .path
                .strip_prefix(root)
                .unwrap_or(&file.path)
                .to_string_lossy()
                .replace('\\', "/");
            (relative, file.compute_hash().unwrap_or_default())
        })
        .collect();
    entries.sort();

    let mut hasher = Sha256::new();
    for (path, hash) in &entries {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(hash.as_bytes());
        hasher.update([b'\n']);
    }
    format!("{:x}", hasher.finalize())
}
