//! vMix Mirror - live state mirror for vMix-class production devices.
//!
//! The device periodically emits a full hierarchical XML snapshot of its
//! state (inputs, overlays, channel routing, audio buses) over a
//! persistent connection. This crate parses each snapshot through a
//! pluggable adapter, canonicalizes the tree into one stable shape, builds
//! an indexed typed snapshot in a single pass, diffs it against the
//! previous one by natural entity keys, and notifies subscribed listeners
//! — cheap enough to keep pace with snapshots every few hundred
//! milliseconds as productions grow into hundreds of inputs.
//!
//! Transport, reconnect logic and the feedback subsystem live outside this
//! crate; it consumes raw documents via [`StateMirror::update`] and emits
//! change sets via [`ChangeListener`].

pub mod adapter;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod model;
pub mod tree;

pub use config::{AdapterKind, BackpressureMode, MirrorConfig};
pub use diff::{ChangeKind, ChangeRecord, ChangeSet, EntityKind};
pub use engine::{ChangeListener, ConsoleListener, StateMirror, UpdateOutcome};
pub use error::MirrorError;
pub use model::Snapshot;
