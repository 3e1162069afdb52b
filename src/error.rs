//! Error taxonomy for the snapshot ingestion pipeline.
//!
//! Library code returns these typed errors; the binary wraps them with
//! anyhow context. A failed cycle never touches the current snapshot —
//! the commit step only runs on full success.

use std::path::PathBuf;
use thiserror::Error;

/// Malformed raw snapshot markup. The cycle is discarded and the previous
/// snapshot remains current.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The canonical tree exists but its document shape is unusable.
///
/// A missing section (e.g. no `inputs` list) is NOT structural — the device
/// may legitimately report zero inputs and the builder degrades to an empty
/// snapshot. Structural means the tree cannot be read as a device document
/// at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("canonical tree is not an element document")]
    NotADocument,
    #[error("unexpected document root `{0}`")]
    UnexpectedRoot(String),
}

/// The configured adapter variant could not be loaded. Fatal for that
/// adapter choice — there is no automatic fallback, since adapters are not
/// output-compatible without canonicalization.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AdapterUnavailableError {
    pub message: String,
    /// Every location that was probed before giving up.
    pub probed: Vec<PathBuf>,
}

impl AdapterUnavailableError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            probed: Vec::new(),
        }
    }
}

/// What a snapshot parser can fail with.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Unavailable(#[from] AdapterUnavailableError),
}

/// Everything `StateMirror::update` can fail with.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("snapshot parse failed: {0}")]
    Parse(#[from] ParseError),
    #[error("snapshot structure invalid: {0}")]
    Structural(#[from] StructuralError),
    #[error("snapshot adapter unavailable: {0}")]
    AdapterUnavailable(#[from] AdapterUnavailableError),
    /// Reject backpressure mode only: an ingestion cycle is already in
    /// flight and the new snapshot was turned away.
    #[error("an ingestion cycle is already in flight")]
    Busy,
}

impl From<AdapterError> for MirrorError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Parse(e) => MirrorError::Parse(e),
            AdapterError::Unavailable(e) => MirrorError::AdapterUnavailable(e),
        }
    }
}
