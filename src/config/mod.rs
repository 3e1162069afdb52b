//! Configuration for the mirror engine.
//!
//! One recognized option selects the active snapshot adapter; unknown
//! values fail at deserialization, so construction fails fast.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorConfig {
    /// Which snapshot adapter parses raw device markup.
    #[serde(default)]
    pub adapter: AdapterKind,
    /// What happens when a snapshot arrives while a cycle is in flight.
    #[serde(default)]
    pub backpressure: BackpressureMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native: Option<NativeConfig>,
}

/// Snapshot adapter variant. One active per process.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterKind {
    /// Event-reader tree builder (quick-xml).
    #[default]
    QuickXml,
    /// DOM walker (roxmltree); depends on canonicalization.
    Dom,
    /// Natively compiled parser loaded at runtime.
    Native,
}

/// Backpressure policy for overlapping updates.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackpressureMode {
    /// Keep only the most recent pending snapshot; older pending ones are
    /// dropped and their callers resolve as superseded.
    #[default]
    Coalesce,
    /// Turn away new snapshots while a cycle is in flight.
    Reject,
}

/// Native adapter settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NativeConfig {
    /// Extra sibling directory probed after the standard locations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lib_dir: Option<PathBuf>,
}

/// Load configuration from a YAML file.
pub async fn load(path: &str) -> Result<MirrorConfig> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {path}"))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config file: {path}"))
}
