//! Edge kinds from call context

use crate::backend::{BackendSymbolKind, HierarchyItem};
use crate::graph::{EdgeKind, Entity, EntityKind};
use crate::scanner::LanguageTag;

/// Kind of the edge for one call site
///
/// `target` is the backend's item and `entity` its match in the entity
/// table, when it has one.
#[must_use]
pub fn call_kind(target: &HierarchyItem, entity: Option<&Entity>, supertype_site: bool) -> EdgeKind {
    if supertype_site {
        return EdgeKind::Inherit;
    }
    let constructs = target.kind.is_constructing()
        || entity.is_some_and(|e| {
            e.constructor || matches!(e.kind, EntityKind::Class | EntityKind::Struct)
        });
    if constructs {
        return EdgeKind::Construct;
    }
    // A re-export's item names the binding, so the matched entity decides
    if let Some(entity) = entity {
        return match entity.kind {
            EntityKind::Module => EdgeKind::Import,
            EntityKind::Constant | EntityKind::EnumMember => EdgeKind::FieldAccess,
            _ => EdgeKind::Call,
        };
    }
    if target.kind.is_namespace() {
        EdgeKind::Import
    } else if target.kind.is_data() {
        EdgeKind::FieldAccess
    } else {
        EdgeKind::Call
    }
}

/// Kind of the edge from a type to one of its supertypes
#[must_use]
pub fn supertype_kind(sub: EntityKind, sup: &HierarchyItem, sup_entity: Option<&Entity>) -> EdgeKind {
    let sup_is_interface = sup_entity.map_or(sup.kind == BackendSymbolKind::Interface, |e| {
        e.kind == EntityKind::Interface
    });
    if sup_is_interface && sub != EntityKind::Interface {
        EdgeKind::Implement
    } else {
        EdgeKind::Inherit
    }
}

/// Whether the call at `column` goes through a supertype initializer or
/// receiver: `super(...)`, `super().x`, `super.x`, `super(A, self).x`, and
/// C# `base(...)`/`base.x`
///
/// `column` counts characters.
#[must_use]
pub fn is_supertype_site(line: &str, column: u32, language: &LanguageTag) -> bool {
    let keywords: &[&str] = if language.as_str() == "csharp" {
        &["super", "base"]
    } else {
        &["super"]
    };

    let split = line
        .char_indices()
        .nth(usize::try_from(column).unwrap_or(usize::MAX))
        .map_or(line.len(), |(at, _)| at);
    let (before, after) = line.split_at(split);

    if keywords.iter().any(|kw| is_keyword_call(after, kw)) {
        return true;
    }

    let Some(receiver) = before.trim_end().strip_suffix('.') else {
        return false;
    };
    let receiver = strip_call_args(receiver.trim_end());
    keywords.iter().any(|kw| ends_with_word(receiver, kw))
}

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// `super(` at the start of `text`
fn is_keyword_call(text: &str, keyword: &str) -> bool {
    text.strip_prefix(keyword)
        .is_some_and(|rest| !rest.starts_with(is_ident) && rest.trim_start().starts_with('('))
}

fn ends_with_word(text: &str, word: &str) -> bool {
    text.strip_suffix(word)
        .is_some_and(|rest| !rest.ends_with(is_ident))
}

/// `super(A, self)` → `super`; text without a trailing call is unchanged
fn strip_call_args(text: &str) -> &str {
    if !text.ends_with(')') {
        return text;
    }
    let mut depth = 0usize;
    for (at, ch) in text.char_indices().rev() {
        match ch {
            ')' => depth += 1,
            '(' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return text[..at].trim_end();
                }
            }
            _ => {}
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Location, Span};
    use rstest::rstest;

    fn item(kind: BackendSymbolKind) -> HierarchyItem {
        HierarchyItem {
            name: "x".to_string(),
            kind,
            detail: None,
            location: Location::new("/src/a.py", Span::lines(0, 1)),
        }
    }

    #[rstest]
    #[case("        super().__init__(name)", 16, "python", true)]
    #[case("        super(Dog, self).__init__(name)", 25, "python", true)]
    #[case("    super(name);", 4, "java", true)]
    #[case("    super.speak();", 10, "typescript", true)]
    #[case("    super  (name);", 4, "java", true)]
    #[case("    : base(name)", 6, "csharp", true)]
    #[case("        base.Speak();", 13, "csharp", true)]
    #[case("        base.compute()", 13, "python", false)]
    #[case("    superman.fly()", 13, "python", false)]
    #[case("    self.speak()", 9, "python", false)]
    #[case("    supervisor()", 4, "python", false)]
    #[case("    é = super().run()", 16, "python", true)]
    fn test_supertype_site(
        #[case] line: &str,
        #[case] column: u32,
        #[case] language: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(
            is_supertype_site(line, column, &LanguageTag::new(language)),
            expected
        );
    }

    #[test]
    fn test_column_past_end_of_line() {
        assert!(!is_supertype_site("x()", 40, &LanguageTag::new("python")));
    }

    #[rstest]
    #[case(BackendSymbolKind::Constructor, EdgeKind::Construct)]
    #[case(BackendSymbolKind::Class, EdgeKind::Construct)]
    #[case(BackendSymbolKind::Module, EdgeKind::Import)]
    #[case(BackendSymbolKind::Field, EdgeKind::FieldAccess)]
    #[case(BackendSymbolKind::EnumMember, EdgeKind::FieldAccess)]
    #[case(BackendSymbolKind::Method, EdgeKind::Call)]
    #[case(BackendSymbolKind::Function, EdgeKind::Call)]
    fn test_call_kind_from_target(#[case] kind: BackendSymbolKind, #[case] expected: EdgeKind) {
        assert_eq!(call_kind(&item(kind), None, false), expected);
    }

    #[test]
    fn test_matched_entity_decides_kind() {
        let mut function = Entity {
            id: "b_ts.greet".to_string(),
            name: "greet".to_string(),
            kind: EntityKind::Function,
            file: "b.ts".to_string(),
            container: None,
            span: Span::lines(0, 2),
            selection: crate::backend::Position::new(0, 16),
            visibility: crate::graph::Visibility::Public,
            language: LanguageTag::new("typescript"),
            constructor: false,
            is_abstract: false,
            orphan: false,
        };
        let reexport = item(BackendSymbolKind::Variable);
        assert_eq!(call_kind(&reexport, Some(&function), false), EdgeKind::Call);

        function.kind = EntityKind::Module;
        assert_eq!(call_kind(&reexport, Some(&function), false), EdgeKind::Import);
    }

    #[test]
    fn test_supertype_site_wins() {
        assert_eq!(
            call_kind(&item(BackendSymbolKind::Constructor), None, true),
            EdgeKind::Inherit
        );
    }

    #[rstest]
    #[case(EntityKind::Class, BackendSymbolKind::Interface, EdgeKind::Implement)]
    #[case(EntityKind::Struct, BackendSymbolKind::Interface, EdgeKind::Implement)]
    #[case(EntityKind::Interface, BackendSymbolKind::Interface, EdgeKind::Inherit)]
    #[case(EntityKind::Class, BackendSymbolKind::Class, EdgeKind::Inherit)]
    fn test_supertype_kind(
        #[case] sub: EntityKind,
        #[case] sup: BackendSymbolKind,
        #[case] expected: EdgeKind,
    ) {
        assert_eq!(supertype_kind(sub, &item(sup), None), expected);
    }
}
