//! Canonical ids
//!
//! `<module path>.<container>*.<name>`, lowercase and dot-joined. The module
//! path comes from the file's path relative to the root, with the file
//! extension kept so `foo.ts` and `foo.js` stay distinct. Paths that still
//! normalize alike (`foo-bar.py`, `foo_bar.py`) are told apart run-wide by
//! [`ModulePaths`].

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Normalize one id segment
///
/// Generic parameters and parameter lists are dropped, the rest is
/// lowercased and anything outside `[a-z0-9_$]` becomes `_`.
#[must_use]
pub fn sanitize_segment(name: &str) -> String {
    let mut depth_angle = 0usize;
    let mut depth_paren = 0usize;
    let mut out = String::with_capacity(name.len());

    for ch in name.trim().chars() {
        match ch {
            '<' => depth_angle += 1,
            '>' if depth_angle > 0 => depth_angle -= 1,
            '(' => depth_paren += 1,
            ')' if depth_paren > 0 => depth_paren -= 1,
            _ if depth_angle > 0 || depth_paren > 0 => {}
            _ => out.extend(ch.to_lowercase().map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                    c
                } else {
                    '_'
                }
            })),
        }
    }

    if out.is_empty() {
        "_".to_string()
    } else {
        out
    }
}

/// Module path of a file relative to the analyzed root
///
/// `src/auth/user.py` becomes `src.auth.user_py`.
#[must_use]
pub fn module_path(relative: &Path) -> String {
    let segments: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().replace('.', "_")),
            _ => None,
        })
        .map(|part| sanitize_segment(&part))
        .collect();

    if segments.is_empty() {
        "_".to_string()
    } else {
        segments.join(".")
    }
}

/// Module paths of every file in a run
///
/// Relative paths are taken in sorted order; the first file to claim a
/// module path keeps it and later ones get `~2`, `~3`, ...
#[derive(Debug, Clone, Default)]
pub struct ModulePaths {
    by_file: HashMap<PathBuf, String>,
}

impl ModulePaths {
    #[must_use]
    pub fn new<'a>(relative: impl IntoIterator<Item = &'a Path>) -> Self {
        let mut files: Vec<&Path> = relative.into_iter().collect();
        files.sort_unstable();
        files.dedup();

        let mut ids = IdAllocator::new();
        let by_file = files
            .into_iter()
            .map(|file| (file.to_path_buf(), ids.allocate(module_path(file))))
            .collect();
        Self { by_file }
    }

    /// Module path of a relative file; files outside the table get the
    /// plain [`module_path`]
    #[must_use]
    pub fn get(&self, relative: &Path) -> String {
        self.by_file
            .get(relative)
            .cloned()
            .unwrap_or_else(|| module_path(relative))
    }
}

/// `/`-separated form of a relative path, as stored on entities
#[must_use]
pub fn relative_file(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Hands out ids within one file, suffixing repeats with `~2`, `~3`, ...
#[derive(Debug, Default)]
pub struct IdAllocator {
    seen: HashMap<String, u32>,
}

impl IdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `name` under `parent`, unique among ids handed out so far
    pub fn child(&mut self, parent: &str, name: &str) -> String {
        self.allocate(format!("{parent}.{}", sanitize_segment(name)))
    }

    pub fn allocate(&mut self, base: String) -> String {
        let count = self.seen.entry(base.clone()).or_insert(0);
        *count += 1;
        // `~` never survives sanitizing, so suffixed ids cannot collide
        // with spelled names
        if *count == 1 {
            base
        } else {
            format!("{base}~{count}")
        }
    }
}
