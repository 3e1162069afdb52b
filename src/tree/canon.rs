//! Canonicalization: one stable tree shape for every adapter.
//!
//! After this pass every element's children are addressed as sequences —
//! whether the source markup had one occurrence or many — attribute tables
//! are left unwrapped, and scalar typing is applied once. Idempotent:
//! canonicalizing a canonical tree is the identity.

use super::{coerce, Element, Node, Scalar};

/// Normalize an adapter's raw tree into the canonical shape.
pub fn canonicalize(node: Node) -> Node {
    match node {
        Node::Null => Node::Null,
        // A bare scalar document still becomes a sequence so the read path
        // never branches on arity.
        Node::Scalar(s) => Node::Seq(vec![Node::Scalar(coerce_scalar(s))]),
        Node::Seq(items) => Node::Seq(items.into_iter().map(canon_item).collect()),
        Node::Elem(el) => Node::Elem(canon_elem(el)),
    }
}

/// Normalize a node that already sits inside a sequence. Scalars stay bare
/// here — re-wrapping them is what would break idempotence.
fn canon_item(node: Node) -> Node {
    match node {
        Node::Null => Node::Null,
        Node::Scalar(s) => Node::Scalar(coerce_scalar(s)),
        Node::Seq(items) => Node::Seq(items.into_iter().map(canon_item).collect()),
        Node::Elem(el) => Node::Elem(canon_elem(el)),
    }
}

fn canon_elem(el: Element) -> Element {
    let attrs = el
        .attrs
        .into_iter()
        .map(|(name, value)| (name, coerce_scalar(value)))
        .collect();

    let children = el
        .children
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                Node::Null => Node::Null,
                Node::Seq(items) => Node::Seq(items.into_iter().map(canon_item).collect()),
                Node::Scalar(s) => Node::Seq(vec![Node::Scalar(coerce_scalar(s))]),
                Node::Elem(child) => Node::Seq(vec![Node::Elem(canon_elem(child))]),
            };
            (name, value)
        })
        .collect();

    Element {
        attrs,
        children,
        text: el.text.map(coerce_scalar),
    }
}

fn coerce_scalar(s: Scalar) -> Scalar {
    match s {
        Scalar::Text(t) => coerce(&t),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn elem(children: Vec<(&str, Node)>) -> Element {
        Element {
            children: children
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_single_child_becomes_sequence() {
        let raw = Node::Elem(elem(vec![(
            "input",
            Node::Elem(Element::default()),
        )]));

        let canonical = canonicalize(raw);
        let el = canonical.as_elem().unwrap();
        assert!(matches!(el.children.get("input"), Some(Node::Seq(items)) if items.len() == 1));
    }

    #[test]
    fn test_scalar_child_wrapped_and_typed() {
        let raw = Node::Elem(elem(vec![(
            "recording",
            Node::Scalar(Scalar::Text("True".to_string())),
        )]));

        let canonical = canonicalize(raw);
        let el = canonical.as_elem().unwrap();
        assert_eq!(el.child_scalar("recording"), Some(&Scalar::Bool(true)));
        assert!(matches!(el.children.get("recording"), Some(Node::Seq(_))));
    }

    #[test]
    fn test_null_and_existing_sequence_pass_through() {
        let raw = Node::Elem(elem(vec![
            ("gone", Node::Null),
            (
                "mix",
                Node::Seq(vec![Node::Elem(Element::default()), Node::Null]),
            ),
        ]));

        let canonical = canonicalize(raw);
        let el = canonical.as_elem().unwrap();
        assert_eq!(el.children.get("gone"), Some(&Node::Null));
        assert!(matches!(el.children.get("mix"), Some(Node::Seq(items)) if items.len() == 2));
    }

    #[test]
    fn test_top_level_scalar_wrapped() {
        let canonical = canonicalize(Node::Scalar(Scalar::Text("12".to_string())));
        assert_eq!(
            canonical,
            Node::Seq(vec![Node::Scalar(Scalar::Number(12.0))])
        );
    }

    #[test]
    fn test_attributes_never_wrapped() {
        let raw = Node::Elem(Element {
            attrs: [
                ("muted".to_string(), Scalar::Text("False".to_string())),
                ("title".to_string(), Scalar::Text("Cam1".to_string())),
            ]
            .into(),
            ..Default::default()
        });

        let canonical = canonicalize(raw);
        let el = canonical.as_elem().unwrap();
        assert_eq!(el.attr("muted"), Some(&Scalar::Bool(false)));
        assert_eq!(el.attr("title"), Some(&Scalar::Text("Cam1".to_string())));
    }

    #[test]
    fn test_idempotent_on_nested_document() {
        let raw = Node::Elem(elem(vec![(
            "inputs",
            Node::Elem(elem(vec![(
                "input",
                Node::Seq(vec![
                    Node::Scalar(Scalar::Text("3".to_string())),
                    Node::Elem(Element::default()),
                ]),
            )])),
        )]));

        let once = canonicalize(raw);
        assert_eq!(canonicalize(once.clone()), once);
    }

    fn arb_scalar() -> impl Strategy<Value = Scalar> {
        prop_oneof![
            any::<bool>().prop_map(Scalar::Bool),
            (-1000i32..1000).prop_map(|n| Scalar::Number(f64::from(n))),
            "[A-Za-z0-9 ]{0,8}".prop_map(Scalar::Text),
        ]
    }

    fn arb_node() -> impl Strategy<Value = Node> {
        let leaf = prop_oneof![
            Just(Node::Null),
            arb_scalar().prop_map(Node::Scalar),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Node::Seq),
                (
                    prop::collection::btree_map("[a-z]{1,4}", arb_scalar(), 0..3),
                    prop::collection::btree_map("[a-z]{1,4}", inner, 0..3),
                    prop::option::of(arb_scalar()),
                )
                    .prop_map(|(attrs, children, text)| {
                        Node::Elem(Element {
                            attrs,
                            children,
                            text,
                        })
                    }),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_canonicalize_is_idempotent(node in arb_node()) {
            let once = canonicalize(node);
            prop_assert_eq!(canonicalize(once.clone()), once);
        }
    }
}
