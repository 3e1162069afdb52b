//! Event-reader adapter built on quick-xml.
//!
//! Walks the event stream once with an explicit element stack. Output is
//! already close to canonical: repeated elements land in sequences and
//! boolean/number-looking text is coerced up front.

use super::SnapshotParser;
use crate::error::{AdapterError, ParseError};
use crate::tree::{coerce, Element, Node};
use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

pub struct QuickXmlAdapter;

impl QuickXmlAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for QuickXmlAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotParser for QuickXmlAdapter {
    fn name(&self) -> &'static str {
        "quick-xml"
    }

    async fn parse(&self, raw: &str) -> Result<Node, AdapterError> {
        build_tree(raw).map_err(AdapterError::Parse)
    }
}

/// Open element being assembled while its subtree is read.
struct Frame {
    name: String,
    elem: Element,
    text: String,
}

fn build_tree(raw: &str) -> Result<Node, ParseError> {
    let mut reader = Reader::from_str(raw);
    reader.config_mut().trim_text(true);

    let mut doc = Element::default();
    let mut stack: Vec<Frame> = Vec::new();

    loop {
        match reader.read_event() {
            Err(e) => {
                return Err(ParseError::new(format!(
                    "xml error at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            Ok(Event::Eof) => break,
            Ok(Event::Start(start)) => {
                stack.push(open_frame(&start)?);
            }
            Ok(Event::Empty(start)) => {
                let frame = open_frame(&start)?;
                attach(&mut doc, &mut stack, frame);
            }
            Ok(Event::End(_)) => {
                // quick-xml has already verified the end tag matches
                let frame = stack
                    .pop()
                    .ok_or_else(|| ParseError::new("unexpected closing tag"))?;
                attach(&mut doc, &mut stack, frame);
            }
            Ok(Event::Text(text)) => {
                let text = text
                    .unescape()
                    .map_err(|e| ParseError::new(format!("bad text content: {e}")))?;
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text);
                }
            }
            Ok(Event::CData(cdata)) => {
                let bytes = cdata.into_inner();
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&bytes));
                }
            }
            // Declarations, comments, PIs, doctypes
            Ok(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err(ParseError::new("unexpected end of document"));
    }
    if doc.children.is_empty() {
        return Err(ParseError::new("document has no root element"));
    }
    Ok(Node::Elem(doc))
}

fn open_frame(start: &BytesStart<'_>) -> Result<Frame, ParseError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut elem = Element::default();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::new(format!("bad attribute in <{name}>: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ParseError::new(format!("bad attribute value in <{name}>: {e}")))?;
        elem.attrs.insert(key, coerce(&value));
    }
    Ok(Frame {
        name,
        elem,
        text: String::new(),
    })
}

/// Close a frame and hang it off its parent (or the document node). Every
/// child lands in a sequence keyed by tag name, so repeated elements come
/// out as sequences without a second pass.
fn attach(doc: &mut Element, stack: &mut Vec<Frame>, frame: Frame) {
    let Frame {
        name,
        mut elem,
        text,
    } = frame;
    let text = text.trim();
    if !text.is_empty() {
        elem.text = Some(coerce(text));
    }

    let parent = match stack.last_mut() {
        Some(parent) => &mut parent.elem,
        None => doc,
    };
    if let Node::Seq(items) = parent
        .children
        .entry(name)
        .or_insert_with(|| Node::Seq(Vec::new()))
    {
        items.push(Node::Elem(elem));
    }
}
