//! Shared XML helpers for the structural and form parsers.
//!
//! Export files are namespaced, but every tag the parsers care about is
//! unambiguous by local name, so all lookups here ignore namespaces.
//! Files are UTF-8, frequently with a byte-order mark.

use anyhow::{Context, Result};
use roxmltree::Node;
use std::path::Path;

/// Reads an export file as UTF-8, stripping a leading BOM if present.
pub fn read_file(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(strip_bom(&text).to_string())
}

pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// First child element with the given local name.
pub fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

/// All child elements with the given local name.
pub fn children<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Vec<Node<'a, 'input>> {
    node.children()
        .filter(|n| n.is_element() && n.tag_name().name() == name)
        .collect()
}

/// Trimmed text content of a node, empty when absent.
pub fn text(node: Node) -> String {
    node.text().map(|t| t.trim().to_string()).unwrap_or_default()
}

/// Trimmed text of a named child element.
pub fn child_text(node: Node, name: &str) -> Option<String> {
    child(node, name).map(text)
}

/// Flattens a localized-string element (`item`/`lang`/`content` structure)
/// to its first non-empty `content` value.
pub fn localized_text(node: Node) -> String {
    node.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "content")
        .map(text)
        .find(|t| !t.is_empty())
        .unwrap_or_default()
}

/// Localized text of a named child, empty when absent.
pub fn localized_child_text(node: Node, name: &str) -> String {
    child(node, name).map(localized_text).unwrap_or_default()
}

/// Joins a `Type` element's member type names into one value. Composite
/// types (several `Type` leaves) become a comma-joined set; never truncated
/// to a single member.
pub fn joined_type(node: Node) -> String {
    let members: Vec<String> = node
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "Type" && *n != node)
        .map(text)
        .filter(|t| !t.is_empty())
        .collect();
    if members.is_empty() {
        // A bare <Type>xs:string</Type> leaf has no nested Type children.
        text(node)
    } else {
        members.join(",")
    }
}

/// Parses an explicit tri-state boolean: `true`/`false` text maps to a
/// value, anything else (including absence) stays unknown.
pub fn tri_state(value: Option<String>) -> Option<bool> {
    match value.as_deref() {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bom() {
        assert_eq!(strip_bom("\u{feff}<a/>"), "<a/>");
        assert_eq!(strip_bom("<a/>"), "<a/>");
    }

    #[test]
    fn child_lookup_ignores_namespace() {
        let doc = roxmltree::Document::parse(
            r#"<root xmlns="http://example.com/ns"><Name>X</Name></root>"#,
        )
        .unwrap();
        assert_eq!(
            child_text(doc.root_element(), "Name"),
            Some("X".to_string())
        );
    }

    #[test]
    fn localized_text_takes_first_content() {
        let doc = roxmltree::Document::parse(
            r#"<Synonym><item><lang>ru</lang><content>Контрагент</content></item></Synonym>"#,
        )
        .unwrap();
        assert_eq!(localized_text(doc.root_element()), "Контрагент");
    }

    #[test]
    fn composite_type_is_joined_not_truncated() {
        let doc = roxmltree::Document::parse(
            r#"<Type><Type>xs:string</Type><Type>cfg:CatalogRef.Товары</Type></Type>"#,
        )
        .unwrap();
        assert_eq!(
            joined_type(doc.root_element()),
            "xs:string,cfg:CatalogRef.Товары"
        );
    }

    #[test]
    fn single_type_leaf() {
        let doc = roxmltree::Document::parse(r#"<Type>xs:decimal</Type>"#).unwrap();
        assert_eq!(joined_type(doc.root_element()), "xs:decimal");
    }

    #[test]
    fn tri_state_is_never_guessed() {
        assert_eq!(tri_state(Some("true".into())), Some(true));
        assert_eq!(tri_state(Some("false".into())), Some(false));
        assert_eq!(tri_state(Some("maybe".into())), None);
        assert_eq!(tri_state(None), None);
    }
}
