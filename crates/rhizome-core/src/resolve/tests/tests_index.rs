//! Tests for location → entity matching

use std::path::PathBuf;

use crate::backend::{Location, Position, Span};
use crate::extract::FileExtraction;
use crate::graph::{Alias, Entity, EntityKind, Visibility};
use crate::resolve::{EntityIndex, Located};
use crate::scanner::LanguageTag;

const ROOT: &str = "/work";

fn span(start: u32, end: u32) -> Span {
    Span::new(Position::new(start, 0), Position::new(end, 80))
}

fn entity(id: &str, file: &str, lines: (u32, u32)) -> Entity {
    Entity {
        id: id.to_string(),
        name: id.rsplit('.').next().unwrap_or(id).to_string(),
        kind: EntityKind::Function,
        file: file.to_string(),
        container: None,
        span: span(lines.0, lines.1),
        selection: Position::new(lines.0, 4),
        visibility: Visibility::Public,
        language: LanguageTag::new("python"),
        constructor: false,
        is_abstract: false,
        orphan: false,
    }
}

fn path(file: &str) -> PathBuf {
    PathBuf::from(ROOT).join(file)
}

fn index(scope: Option<&str>) -> EntityIndex {
    let mut index = EntityIndex::new(ROOT, scope.map(LanguageTag::new));
    index.register_file(&path("a.py"), &LanguageTag::new("python"));
    index.register_file(&path("web/b.ts"), &LanguageTag::new("typescript"));
    index.register_file(&path("barrel.py"), &LanguageTag::new("python"));
    index.insert(FileExtraction {
        entities: vec![
            entity("a_py.outer", "a.py", (0, 20)),
            entity("a_py.outer.inner", "a.py", (5, 8)),
            entity("a_py.other", "a.py", (30, 40)),
        ],
        aliases: vec![],
    });
    index
}

fn located_id(located: Located<'_>) -> Option<String> {
    match located {
        Located::Entity(e) => Some(e.id.clone()),
        _ => None,
    }
}

#[test]
fn test_exact_span_match() {
    let index = index(Some("python"));
    let at = Location::new(path("a.py"), span(30, 40));
    assert_eq!(located_id(index.locate(&at)), Some("a_py.other".to_string()));
}

#[test]
fn test_selection_match() {
    let index = index(Some("python"));
    let at = Location::new(path("a.py"), span(5, 6)).with_selection(Position::new(5, 4));
    assert_eq!(located_id(index.locate(&at)), Some("a_py.outer.inner".to_string()));
}

#[test]
fn test_nearest_enclosing_entity_wins() {
    let index = index(Some("python"));
    let at = Location::new(path("a.py"), span(6, 6)).with_selection(Position::new(6, 10));
    assert_eq!(located_id(index.locate(&at)), Some("a_py.outer.inner".to_string()));

    let at = Location::new(path("a.py"), span(12, 12)).with_selection(Position::new(12, 2));
    assert_eq!(located_id(index.locate(&at)), Some("a_py.outer".to_string()));
}

#[test]
fn test_outside_every_entity_is_external() {
    let index = index(Some("python"));
    let at = Location::new(path("a.py"), span(25, 25));
    assert_eq!(index.locate(&at), Located::External);
}

#[test]
fn test_outside_root_is_external() {
    let index = index(Some("python"));
    let at = Location::new("/usr/lib/python3/os.py", span(0, 1));
    assert_eq!(index.locate(&at), Located::External);
}

#[test]
fn test_unanalyzed_file_is_external() {
    let index = index(Some("python"));
    let at = Location::new(path("vendor/x.py"), span(0, 1));
    assert_eq!(index.locate(&at), Located::External);
}

#[test]
fn test_other_language_is_deferred() {
    let index = index(Some("python"));
    let at = Location::new(path("web/b.ts"), span(3, 4));
    assert_eq!(index.locate(&at), Located::Elsewhere(at.clone()));

    // The merged index has no scope and matches (or not) directly
    let merged = index_unscoped();
    assert_eq!(merged.locate(&at), Located::External);
}

fn index_unscoped() -> EntityIndex {
    index(None)
}

#[test]
fn test_aliases_are_followed() {
    let mut index = index(Some("python"));
    let original = Location::new(path("a.py"), span(30, 40)).with_selection(Position::new(30, 4));
    index.insert(FileExtraction {
        entities: vec![],
        aliases: vec![Alias {
            name: "other".to_string(),
            file: path("barrel.py"),
            span: span(2, 2),
            selection: Position::new(2, 20),
            target: original,
        }],
    });

    let through_barrel = Location::new(path("barrel.py"), span(2, 2)).with_selection(Position::new(2, 20));
    assert_eq!(located_id(index.locate(&through_barrel)), Some("a_py.other".to_string()));
}

#[test]
fn test_alias_cycles_end_external() {
    let mut index = index(Some("python"));
    let here = Location::new(path("barrel.py"), span(2, 2));
    index.insert(FileExtraction {
        entities: vec![],
        aliases: vec![Alias {
            name: "loop".to_string(),
            file: path("barrel.py"),
            span: span(2, 2),
            selection: here.selection,
            target: here.clone(),
        }],
    });

    assert_eq!(index.locate(&here), Located::External);
}

#[test]
fn test_line_text() {
    let mut index = index(Some("python"));
    index.set_text(&path("a.py"), "def outer():\n    inner()\n".into());

    assert_eq!(index.line_text(&path("a.py"), 1), Some("    inner()"));
    assert_eq!(index.line_text(&path("a.py"), 9), None);
    assert_eq!(index.line_text(&path("web/b.ts"), 0), None);
}

#[test]
fn test_get_by_id() {
    let index = index(None);
    assert!(index.get("a_py.outer").is_some());
    assert!(index.get("a_py.missing").is_none());
    assert_eq!(index.entities().len(), 3);
}
