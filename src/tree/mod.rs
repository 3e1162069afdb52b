//! Markup tree shared by all snapshot adapters.
//!
//! Every adapter emits these types; the canonicalizer (see [`canon`])
//! normalizes them into one stable shape so downstream code never
//! special-cases the source adapter.

pub mod canon;

use std::collections::BTreeMap;
use std::fmt;

pub use canon::canonicalize;

/// Typed leaf value. Adapters that coerce up front produce `Bool`/`Number`
/// directly; the canonicalizer coerces everything else so the builder sees
/// one typing.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    /// Boolean view. Text parses `true`/`false` case-insensitively so
    /// un-coerced adapter output reads the same as coerced output.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::Text(t) if t.eq_ignore_ascii_case("true") => Some(true),
            Scalar::Text(t) if t.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(t) => t.trim().parse().ok(),
            Scalar::Bool(_) => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        let n = self.as_f64()?;
        if n.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&n) {
            Some(n as u32)
        } else {
            None
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        let n = self.as_f64()?;
        if n.fract() == 0.0 && n >= 0.0 {
            Some(n as u64)
        } else {
            None
        }
    }

    /// Textual view, formatting numbers the same way they were coerced so
    /// `"1"` survives a round trip through `Number(1.0)`.
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Bool(true) => "True".to_string(),
            Scalar::Bool(false) => "False".to_string(),
            Scalar::Number(n) => n.to_string(),
            Scalar::Text(t) => t.clone(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

/// Coerce raw markup text into a typed scalar.
///
/// Only exact `True`/`False` (any case) become booleans, and only text that
/// round-trips through `f64` unchanged becomes a number — identifier-like
/// strings such as `007` or `1.50` stay text.
pub fn coerce(raw: &str) -> Scalar {
    if raw.eq_ignore_ascii_case("true") {
        return Scalar::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Scalar::Bool(false);
    }
    if let Ok(n) = raw.parse::<f64>() {
        if n.is_finite() && n.to_string() == raw {
            return Scalar::Number(n);
        }
    }
    Scalar::Text(raw.to_string())
}

/// One markup element: attributes, child elements keyed by tag name, and
/// optional text content. Attributes live apart from children and are never
/// sequence-wrapped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub attrs: BTreeMap<String, Scalar>,
    pub children: BTreeMap<String, Node>,
    pub text: Option<Scalar>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&Scalar> {
        self.attrs.get(name)
    }

    pub fn attr_str(&self, name: &str) -> Option<String> {
        self.attrs.get(name).map(Scalar::to_text)
    }

    pub fn attr_u32(&self, name: &str) -> Option<u32> {
        self.attrs.get(name).and_then(Scalar::as_u32)
    }

    pub fn attr_u64(&self, name: &str) -> Option<u64> {
        self.attrs.get(name).and_then(Scalar::as_u64)
    }

    pub fn attr_f64(&self, name: &str) -> Option<f64> {
        self.attrs.get(name).and_then(Scalar::as_f64)
    }

    pub fn attr_bool(&self, name: &str) -> Option<bool> {
        self.attrs.get(name).and_then(Scalar::as_bool)
    }

    /// Children under `name` as a slice, whether the source markup had one
    /// occurrence or many. This is the single non-branching read path the
    /// canonical shape exists for.
    pub fn child_slice(&self, name: &str) -> &[Node] {
        match self.children.get(name) {
            Some(Node::Seq(items)) => items,
            Some(other) => std::slice::from_ref(other),
            None => &[],
        }
    }

    /// First element child under `name`, skipping collapsed scalars.
    pub fn first_elem(&self, name: &str) -> Option<&Element> {
        self.child_slice(name).iter().find_map(Node::as_elem)
    }

    /// First scalar value under `name` — either a collapsed text child or
    /// a text-only element.
    pub fn child_scalar(&self, name: &str) -> Option<&Scalar> {
        self.child_slice(name).iter().find_map(Node::as_scalar)
    }

    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child_scalar(name).map(Scalar::to_text)
    }

    pub fn child_bool(&self, name: &str) -> Option<bool> {
        self.child_scalar(name).and_then(Scalar::as_bool)
    }
}

/// One tree node. `Null` passes through canonicalization unchanged.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Node {
    #[default]
    Null,
    Scalar(Scalar),
    Seq(Vec<Node>),
    Elem(Element),
}

impl Node {
    pub fn as_elem(&self) -> Option<&Element> {
        match self {
            Node::Elem(el) => Some(el),
            _ => None,
        }
    }

    /// Scalar view. A bare element carrying only text reads as its text, so
    /// `<active>1</active>` means the same thing whether an adapter emitted
    /// it as an element or collapsed it to a scalar.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Scalar(s) => Some(s),
            Node::Elem(el) if el.attrs.is_empty() && el.children.is_empty() => el.text.as_ref(),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Node]> {
        match self {
            Node::Seq(items) => Some(items),
            _ => None,
        }
    }
}
