//! Location → entity lookup

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::Location;
use crate::extract::{relative_file, FileExtraction};
use crate::graph::{Alias, Entity};
use crate::scanner::LanguageTag;

/// Longest re-export chain followed before giving up
const MAX_ALIAS_DEPTH: usize = 8;

/// Where a backend-reported location landed
#[derive(Debug, Clone, PartialEq)]
pub enum Located<'a> {
    Entity(&'a Entity),
    /// In another language's file; matched later against the merged table
    Elsewhere(Location),
    External,
}

#[derive(Debug, Default)]
struct FileEntry {
    language: Option<LanguageTag>,
    /// Indices into `EntityIndex::entities`
    entities: Vec<usize>,
    aliases: Vec<Alias>,
    text: Option<Arc<str>>,
}

/// Entities and aliases keyed by root-relative file
///
/// An index scoped to a language reports locations in other languages'
/// files as [`Located::Elsewhere`]; an unscoped index matches everything
/// it holds.
#[derive(Debug)]
pub struct EntityIndex {
    root: PathBuf,
    scope: Option<LanguageTag>,
    entities: Vec<Entity>,
    by_id: HashMap<String, usize>,
    files: HashMap<String, FileEntry>,
}

impl EntityIndex {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, scope: Option<LanguageTag>) -> Self {
        Self {
            root: root.into(),
            scope,
            entities: Vec::new(),
            by_id: HashMap::new(),
            files: HashMap::new(),
        }
    }

    /// Record that an analyzed file belongs to `language`
    pub fn register_file(&mut self, file: &Path, language: &LanguageTag) {
        if let Some(key) = self.key(file) {
            self.files.entry(key).or_default().language = Some(language.clone());
        }
    }

    /// Keep a file's text for call-site inspection
    pub fn set_text(&mut self, file: &Path, text: Arc<str>) {
        if let Some(key) = self.key(file) {
            self.files.entry(key).or_default().text = Some(text);
        }
    }

    /// Add one file's extraction
    pub fn insert(&mut self, extraction: FileExtraction) {
        for entity in extraction.entities {
            let index = self.entities.len();
            self.by_id.entry(entity.id.clone()).or_insert(index);
            self.files
                .entry(entity.file.clone())
                .or_default()
                .entities
                .push(index);
            self.entities.push(entity);
        }
        for alias in extraction.aliases {
            if let Some(key) = self.key(&alias.file) {
                self.files.entry(key).or_default().aliases.push(alias);
            }
        }
    }

    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.by_id.get(id).map(|&i| &self.entities[i])
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of an entity's file
    #[must_use]
    pub fn path_of(&self, entity: &Entity) -> PathBuf {
        self.root.join(&entity.file)
    }

    /// One line of a file's text, if it was kept
    #[must_use]
    pub fn line_text(&self, file: &Path, line: u32) -> Option<&str> {
        let text = self.files.get(&self.key(file)?)?.text.as_deref()?;
        text.lines().nth(usize::try_from(line).ok()?)
    }

    fn key(&self, file: &Path) -> Option<String> {
        file.strip_prefix(&self.root).ok().map(relative_file)
    }

    /// Match a location against the index
    ///
    /// Aliases are followed first. Then an entity whose span or name
    /// position equals the location's wins, else the smallest entity whose
    /// span contains the location's name position.
    #[must_use]
    pub fn locate(&self, at: &Location) -> Located<'_> {
        let mut at = Cow::Borrowed(at);

        for _ in 0..=MAX_ALIAS_DEPTH {
            let Some(entry) = self.key(&at.file).and_then(|key| self.files.get(&key)) else {
                return Located::External;
            };

            if let Some(alias) = entry.aliases.iter().find(|alias| {
                alias.span == at.span
                    || alias.selection == at.selection
                    || alias.span.contains(at.selection)
            }) {
                at = Cow::Owned(alias.target.clone());
                continue;
            }

            if let (Some(scope), Some(language)) = (&self.scope, &entry.language) {
                if scope != language {
                    return Located::Elsewhere(at.into_owned());
                }
            }

            return self
                .match_in(entry, &at)
                .map_or(Located::External, Located::Entity);
        }

        tracing::debug!("Alias chain too deep at {}", at.file.display());
        Located::External
    }

    fn match_in(&self, entry: &FileEntry, at: &Location) -> Option<&Entity> {
        let candidates = entry.entities.iter().map(|&i| &self.entities[i]);

        candidates
            .clone()
            .find(|e| e.span == at.span || e.selection == at.selection)
            .or_else(|| {
                candidates
                    .filter(|e| e.span.contains(at.selection))
                    .min_by_key(|e| e.span.extent())
            })
    }
}
