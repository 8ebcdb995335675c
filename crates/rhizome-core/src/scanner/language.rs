//! Language tags and the extension → language mapping

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A language tag, e.g. `rust` or `python`
///
/// Tags are lowercase; the same tag selects the backend and is sent to the
/// backend as the LSP `languageId` when documents are opened.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct LanguageTag(String);

impl LanguageTag {
    #[must_use]
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(tag.as_ref().trim().to_lowercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LanguageTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for LanguageTag {
    fn from(tag: String) -> Self {
        Self::new(tag)
    }
}

/// Mapping of file extension → language tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageMap {
    by_extension: BTreeMap<String, LanguageTag>,
}

impl LanguageMap {
    /// An empty map; nothing is analyzed until extensions are added
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The conventional mapping for every language with a default backend
    #[must_use]
    pub fn standard() -> Self {
        const TABLE: &[(&str, &[&str])] = &[
            ("rust", &["rs"]),
            ("python", &["py", "pyi"]),
            ("typescript", &["ts", "tsx", "mts", "cts"]),
            ("javascript", &["js", "jsx", "mjs", "cjs"]),
            ("go", &["go"]),
            ("java", &["java"]),
            ("c", &["c", "h"]),
            ("cpp", &["cc", "cpp", "cxx", "hh", "hpp", "hxx"]),
            ("csharp", &["cs"]),
        ];

        TABLE
            .iter()
            .fold(Self::new(), |map, (tag, extensions)| {
                extensions.iter().fold(map, |map, ext| map.with(ext, *tag))
            })
    }

    /// Map an extension (with or without the leading dot) to a language
    #[must_use]
    pub fn with(mut self, extension: &str, language: impl Into<LanguageTag>) -> Self {
        self.insert(extension, language);
        self
    }

    pub fn insert(&mut self, extension: &str, language: impl Into<LanguageTag>) {
        let ext = extension.trim_start_matches('.').to_lowercase();
        self.by_extension.insert(ext, language.into());
    }

    /// Detect language from file extension
    #[must_use]
    pub fn for_extension(&self, ext: &str) -> Option<&LanguageTag> {
        self.by_extension.get(&ext.to_lowercase())
    }

    /// Detect language from file path
    #[must_use]
    pub fn for_path(&self, path: &Path) -> Option<&LanguageTag> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.for_extension(ext))
    }

    /// Distinct languages in the map, sorted
    #[must_use]
    pub fn languages(&self) -> Vec<LanguageTag> {
        let mut tags: Vec<LanguageTag> = self.by_extension.values().cloned().collect();
        tags.sort();
        tags.dedup();
        tags
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }
}
