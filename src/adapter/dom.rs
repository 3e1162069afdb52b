//! DOM adapter built on roxmltree.
//!
//! Converts the parsed document wholesale. The library-native shape is the
//! awkward one: a single text-only child collapses to a bare scalar, a
//! single element child stays unwrapped, and no text is coerced — the
//! canonicalizer is what makes this output usable downstream.

use super::SnapshotParser;
use crate::error::{AdapterError, ParseError};
use crate::tree::{Element, Node, Scalar};
use async_trait::async_trait;
use std::collections::BTreeMap;

pub struct DomAdapter;

impl DomAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DomAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotParser for DomAdapter {
    fn name(&self) -> &'static str {
        "dom"
    }

    async fn parse(&self, raw: &str) -> Result<Node, AdapterError> {
        let doc = roxmltree::Document::parse(raw)
            .map_err(|e| ParseError::new(format!("xml error: {e}")))?;
        let root = doc.root_element();

        let mut document = Element::default();
        document
            .children
            .insert(root.tag_name().name().to_string(), convert(root));
        Ok(Node::Elem(document))
    }
}

fn convert(node: roxmltree::Node<'_, '_>) -> Node {
    let attrs: BTreeMap<String, Scalar> = node
        .attributes()
        .map(|a| (a.name().to_string(), Scalar::Text(a.value().to_string())))
        .collect();

    let text: String = node
        .children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect::<String>()
        .trim()
        .to_string();

    let element_children: Vec<roxmltree::Node<'_, '_>> =
        node.children().filter(|c| c.is_element()).collect();

    // Attribute-less leaf: collapse to its text, empty or not
    if attrs.is_empty() && element_children.is_empty() {
        return Node::Scalar(Scalar::Text(text));
    }

    let mut grouped: BTreeMap<String, Vec<Node>> = BTreeMap::new();
    for child in element_children {
        grouped
            .entry(child.tag_name().name().to_string())
            .or_default()
            .push(convert(child));
    }

    let mut elem = Element {
        attrs,
        text: if text.is_empty() {
            None
        } else {
            Some(Scalar::Text(text))
        },
        ..Default::default()
    };
    for (name, mut nodes) in grouped {
        // Singleton children stay unwrapped — that is this library's shape
        let value = if nodes.len() == 1 {
            nodes.pop().expect("len checked")
        } else {
            Node::Seq(nodes)
        };
        elem.children.insert(name, value);
    }
    Node::Elem(elem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::canonicalize;

    #[tokio::test]
    async fn test_single_child_collapses_before_canonicalization() {
        let doc = DomAdapter::new()
            .parse(r#"<vmix><active>3</active><inputs><input key="1"/></inputs></vmix>"#)
            .await
            .unwrap();
        let vmix = match doc.as_elem().unwrap().children.get("vmix") {
            Some(Node::Elem(el)) => el,
            other => panic!("expected unwrapped root element, got {other:?}"),
        };

        // Text-only child collapsed to an un-coerced scalar
        assert_eq!(
            vmix.children.get("active"),
            Some(&Node::Scalar(Scalar::Text("3".to_string())))
        );
        // Single element child left unwrapped
        assert!(matches!(vmix.children.get("inputs"), Some(Node::Elem(_))));
    }

    #[tokio::test]
    async fn test_canonicalization_restores_uniform_shape() {
        let doc = DomAdapter::new()
            .parse(r#"<vmix recording="True"><active>3</active></vmix>"#)
            .await
            .unwrap();
        let canonical = canonicalize(doc);
        let vmix = canonical.as_elem().unwrap().first_elem("vmix").unwrap();

        assert_eq!(vmix.attr("recording"), Some(&Scalar::Bool(true)));
        assert_eq!(vmix.child_scalar("active"), Some(&Scalar::Number(3.0)));
        assert!(matches!(vmix.children.get("active"), Some(Node::Seq(_))));
    }

    #[tokio::test]
    async fn test_malformed_markup_is_a_parse_error() {
        let err = DomAdapter::new()
            .parse("<vmix><inputs></vmix>")
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Parse(_)));
    }
}
