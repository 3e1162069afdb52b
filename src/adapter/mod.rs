//! Snapshot format adapters.
//!
//! Each variant turns one raw markup document into the shared tree type
//! (see [`crate::tree`]). One adapter is active per process — selection is
//! a configuration-time choice, not a per-call one.
//!
//! All adapters return a *document node*: an element whose single child is
//! the device root element, so the builder can tell an unexpected root from
//! a legitimately empty document.

use crate::config::{AdapterKind, MirrorConfig};
use crate::error::AdapterError;
use crate::tree::Node;
use async_trait::async_trait;
use std::sync::Arc;

pub mod dom;
pub mod native;
pub mod reader;

pub use dom::DomAdapter;
pub use native::NativeAdapter;
pub use reader::QuickXmlAdapter;

/// The single capability all adapters provide.
///
/// All methods take `&self` to support `Arc<dyn SnapshotParser>`; adapters
/// with internal state (the native variant's memoized library) use interior
/// mutability.
#[async_trait]
pub trait SnapshotParser: Send + Sync {
    /// Adapter name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Parse one raw snapshot document into a raw tree.
    ///
    /// The output is not required to be canonical — the engine runs the
    /// canonicalizer on every adapter's output.
    async fn parse(&self, raw: &str) -> Result<Node, AdapterError>;
}

/// Build the adapter selected by configuration.
///
/// Unknown variants are impossible here: they already failed when the
/// configuration was deserialized.
pub fn build_adapter(config: &MirrorConfig) -> Arc<dyn SnapshotParser> {
    match config.adapter {
        AdapterKind::QuickXml => Arc::new(QuickXmlAdapter::new()),
        AdapterKind::Dom => Arc::new(DomAdapter::new()),
        AdapterKind::Native => Arc::new(NativeAdapter::from_config(config.native.as_ref())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builder::build_snapshot;
    use crate::tree::canonicalize;

    const SAMPLE: &str = r#"<vmix>
        <version>27.0.0.49</version>
        <inputs>
            <input key="a1" number="1" title="Cam1" type="Camera" state="Running" muted="False" volume="100"/>
            <input key="b2" number="2" title="VT" type="Video" state="Paused" duration="90000" position="1500">
                <overlay index="0" key="a1"/>
            </input>
        </inputs>
        <overlays>
            <overlay number="1">2</overlay>
            <overlay number="2"/>
        </overlays>
        <active>1</active>
        <preview>2</preview>
        <recording>True</recording>
        <audio>
            <master volume="100" muted="False"/>
        </audio>
    </vmix>"#;

    /// The core equivalence property: the same raw document through two
    /// different library parsers builds a field-for-field identical
    /// snapshot once canonicalized.
    #[tokio::test]
    async fn test_adapter_equivalence() {
        let from_reader = QuickXmlAdapter::new().parse(SAMPLE).await.unwrap();
        let from_dom = DomAdapter::new().parse(SAMPLE).await.unwrap();

        let built_reader = build_snapshot(&canonicalize(from_reader)).unwrap();
        let built_dom = build_snapshot(&canonicalize(from_dom)).unwrap();

        assert_eq!(built_reader, built_dom);
        assert_eq!(built_reader.inputs.len(), 2);
    }
}
