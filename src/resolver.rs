//! Cross-reference resolver for functional options (pass 2).
//!
//! Pass 1 records raw content-reference strings and form usage markers as
//! found in the export. After pass 1 commits, the ingestion pipeline feeds
//! the id maps produced by the loader into a `Resolver`, which turns raw
//! strings into row references. Anything that does not match the grammar or
//! does not resolve is dropped and counted, never fatal.

use std::collections::HashMap;

use crate::models::{ContentRefType, ObjectType};

/// A content-reference string decomposed per the reference grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRef {
    pub object_type: ObjectType,
    pub object_name: String,
    pub ref_type: ContentRefType,
    /// Attribute/resource/dimension/column name for member references.
    pub element_name: Option<String>,
    /// Set only for tabular-section column references.
    pub tabular_section: Option<String>,
}

/// Parses a raw content-reference string. The grammar admits exactly three
/// shapes:
///
/// - `Type.Name` — the whole object
/// - `Type.Name.(Attribute|Resource|Dimension).Element`
/// - `Type.Name.TabularSection.Section.Attribute.Column`
pub fn parse_content_ref(raw: &str) -> Option<ContentRef> {
    let parts: Vec<&str> = raw.split('.').collect();
    let object_type = ObjectType::parse(parts.first()?)?;
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }

    match parts.as_slice() {
        [_, name] => Some(ContentRef {
            object_type,
            object_name: name.to_string(),
            ref_type: ContentRefType::Object,
            element_name: None,
            tabular_section: None,
        }),
        [_, name, section, element] => {
            let ref_type = match *section {
                "Attribute" => ContentRefType::Attribute,
                "Resource" => ContentRefType::Resource,
                "Dimension" => ContentRefType::Dimension,
                _ => return None,
            };
            Some(ContentRef {
                object_type,
                object_name: name.to_string(),
                ref_type,
                element_name: Some(element.to_string()),
                tabular_section: None,
            })
        }
        [_, name, "TabularSection", section, "Attribute", column] => Some(ContentRef {
            object_type,
            object_name: name.to_string(),
            ref_type: ContentRefType::TabularSectionColumn,
            element_name: Some(column.to_string()),
            tabular_section: Some(section.to_string()),
        }),
        _ => None,
    }
}

/// A content reference resolved against pass-1 row ids, ready for
/// `fo_content_ref`.
#[derive(Debug, Clone)]
pub struct ResolvedContentRef {
    pub metadata_object_id: i64,
    pub ref_type: ContentRefType,
    pub element_name: Option<String>,
    pub tabular_section: Option<String>,
}

/// Id maps built from pass-1 inserts. Functional options are addressable by
/// uuid, by bare name, and by the `FunctionalOption.<name>` marker form.
#[derive(Debug, Default)]
pub struct Resolver {
    objects: HashMap<(ObjectType, String), i64>,
    options: HashMap<String, i64>,
    dropped: u64,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, object_type: ObjectType, name: &str, row_id: i64) {
        self.objects.insert((object_type, name.to_string()), row_id);
    }

    /// Registers a functional option under every marker spelling that can
    /// point at it.
    pub fn add_option(&mut self, uuid: &str, name: &str, option_row_id: i64) {
        if !uuid.is_empty() {
            self.options.insert(uuid.to_string(), option_row_id);
        }
        self.options.insert(name.to_string(), option_row_id);
        self.options
            .insert(format!("FunctionalOption.{name}"), option_row_id);
    }

    pub fn object_id(&self, object_type: ObjectType, name: &str) -> Option<i64> {
        self.objects.get(&(object_type, name.to_string())).copied()
    }

    /// Resolves a form usage marker to a functional-option row id.
    pub fn resolve_marker(&mut self, marker: &str) -> Option<i64> {
        let found = self.options.get(marker).copied();
        if found.is_none() {
            self.dropped += 1;
        }
        found
    }

    /// Parses and resolves a raw content-reference string. Grammar misses
    /// and unknown target objects are dropped.
    pub fn resolve_content_ref(&mut self, raw: &str) -> Option<ResolvedContentRef> {
        let Some(parsed) = parse_content_ref(raw) else {
            self.dropped += 1;
            return None;
        };
        let Some(metadata_object_id) = self.object_id(parsed.object_type, &parsed.object_name)
        else {
            self.dropped += 1;
            return None;
        };
        Some(ResolvedContentRef {
            metadata_object_id,
            ref_type: parsed.ref_type,
            element_name: parsed.element_name,
            tabular_section: parsed.tabular_section,
        })
    }

    /// References dropped so far (grammar misses plus unresolved targets).
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_reference() {
        let r = parse_content_ref("Catalog.Контрагенты").unwrap();
        assert_eq!(r.object_type, ObjectType::Catalog);
        assert_eq!(r.object_name, "Контрагенты");
        assert_eq!(r.ref_type, ContentRefType::Object);
        assert_eq!(r.element_name, None);
    }

    #[test]
    fn parses_member_references() {
        let r = parse_content_ref("Document.Реализация.Attribute.Скидка").unwrap();
        assert_eq!(r.ref_type, ContentRefType::Attribute);
        assert_eq!(r.element_name.as_deref(), Some("Скидка"));

        let r = parse_content_ref("InformationRegister.Цены.Resource.Цена").unwrap();
        assert_eq!(r.ref_type, ContentRefType::Resource);

        let r = parse_content_ref("InformationRegister.Цены.Dimension.Товар").unwrap();
        assert_eq!(r.ref_type, ContentRefType::Dimension);
    }

    #[test]
    fn parses_tabular_column_reference() {
        let r = parse_content_ref("Document.Реализация.TabularSection.Товары.Attribute.Скидка")
            .unwrap();
        assert_eq!(r.ref_type, ContentRefType::TabularSectionColumn);
        assert_eq!(r.tabular_section.as_deref(), Some("Товары"));
        assert_eq!(r.element_name.as_deref(), Some("Скидка"));
    }

    #[test]
    fn rejects_off_grammar_strings() {
        assert!(parse_content_ref("Catalog").is_none());
        assert!(parse_content_ref("Nonsense.Имя").is_none());
        assert!(parse_content_ref("Catalog.Имя.Column.X").is_none());
        assert!(parse_content_ref("Catalog.Имя.TabularSection.ТЧ.Resource.X").is_none());
        assert!(parse_content_ref("Catalog..Attribute.X").is_none());
    }

    #[test]
    fn resolver_drops_unknown_targets() {
        let mut resolver = Resolver::new();
        resolver.add_object(ObjectType::Catalog, "Контрагенты", 7);

        let hit = resolver.resolve_content_ref("Catalog.Контрагенты").unwrap();
        assert_eq!(hit.metadata_object_id, 7);

        assert!(resolver.resolve_content_ref("Catalog.Номенклатура").is_none());
        assert!(resolver.resolve_content_ref("не ссылка").is_none());
        assert_eq!(resolver.dropped(), 2);
    }

    #[test]
    fn markers_resolve_by_uuid_name_and_prefixed_name() {
        let mut resolver = Resolver::new();
        resolver.add_option("aaaa-bbbb", "ИспользоватьСкидки", 42);

        assert_eq!(resolver.resolve_marker("aaaa-bbbb"), Some(42));
        assert_eq!(resolver.resolve_marker("ИспользоватьСкидки"), Some(42));
        assert_eq!(
            resolver.resolve_marker("FunctionalOption.ИспользоватьСкидки"),
            Some(42)
        );
        assert_eq!(resolver.resolve_marker("FunctionalOption.Другая"), None);
        assert_eq!(resolver.dropped(), 1);
    }
}
