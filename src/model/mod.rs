//! Typed snapshot model and its derived indices.
//!
//! A [`Snapshot`] is one complete, immutable capture of device state. It is
//! superseded wholesale on every update — indices are rebuilt fresh by the
//! builder, never patched, so index and entity can never diverge.

pub mod builder;

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

pub use builder::build_snapshot;

/// Cross-reference to an input. Resolution happens at build time against
/// the snapshot's own indices; a target absent from the inputs list stays
/// recorded as dangling rather than failing the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InputRef {
    /// Resolved to an input key present in the same snapshot.
    Key(String),
    /// Target absent; the raw reference token is preserved.
    Dangling(String),
}

impl InputRef {
    /// The resolved key, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            InputRef::Key(key) => Some(key),
            InputRef::Dangling(_) => None,
        }
    }

    pub fn is_dangling(&self) -> bool {
        matches!(self, InputRef::Dangling(_))
    }
}

/// Playback state reported per input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum InputState {
    Running,
    #[default]
    Paused,
    Completed,
}

impl InputState {
    pub(crate) fn parse(raw: &str) -> Self {
        match raw {
            "Running" => InputState::Running,
            "Completed" => InputState::Completed,
            _ => InputState::Paused,
        }
    }
}

/// Overlay association carried by an input (`<overlay index=.. key=..>`
/// children of `<input>`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputOverlay {
    pub slot: u32,
    pub target: Option<InputRef>,
}

/// One production input. `key` is the stable identity; `number` is the
/// positional key and can be reassigned by device-side renumbering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Input {
    pub key: String,
    pub number: u32,
    pub title: String,
    pub short_title: Option<String>,
    pub kind: String,
    pub state: InputState,
    /// Playhead position in milliseconds.
    pub position: u64,
    /// Total duration in milliseconds (0 for live sources).
    pub duration: u64,
    pub muted: Option<bool>,
    pub volume: Option<f64>,
    pub balance: Option<f64>,
    pub solo: Option<bool>,
    /// Buses this input feeds, from the `audiobusses` attribute.
    pub bus_membership: Vec<BusKey>,
    pub overlays: Vec<InputOverlay>,
}

impl Input {
    /// Names of tracked fields that differ from `prev`. Field-level
    /// granularity lets consumers skip feedback recomputation for
    /// unrelated changes.
    pub(crate) fn changed_fields(&self, prev: &Self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.number != prev.number {
            fields.push("number");
        }
        if self.title != prev.title {
            fields.push("title");
        }
        if self.short_title != prev.short_title {
            fields.push("short_title");
        }
        if self.kind != prev.kind {
            fields.push("kind");
        }
        if self.state != prev.state {
            fields.push("state");
        }
        if self.position != prev.position {
            fields.push("position");
        }
        if self.duration != prev.duration {
            fields.push("duration");
        }
        if self.muted != prev.muted {
            fields.push("muted");
        }
        if self.volume != prev.volume {
            fields.push("volume");
        }
        if self.balance != prev.balance {
            fields.push("balance");
        }
        if self.solo != prev.solo {
            fields.push("solo");
        }
        if self.bus_membership != prev.bus_membership {
            fields.push("bus_membership");
        }
        if self.overlays != prev.overlays {
            fields.push("overlays");
        }
        fields
    }
}

/// One of the device's overlay slots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub slot: u32,
    /// Input shown in this slot; absent means the slot is inactive.
    pub target: Option<InputRef>,
    pub active: bool,
}

impl Overlay {
    pub(crate) fn changed_fields(&self, prev: &Self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.target != prev.target {
            fields.push("target");
        }
        if self.active != prev.active {
            fields.push("active");
        }
        fields
    }
}

/// Which side of a mix a channel assignment addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChannelRole {
    Program,
    Preview,
}

/// Natural key of a channel assignment: mix number plus role. The main mix
/// is number 1; additional `<mix>` elements carry their own numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChannelKey {
    pub mix: u32,
    pub role: ChannelRole,
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self.role {
            ChannelRole::Program => "program",
            ChannelRole::Preview => "preview",
        };
        write!(f, "mix{}/{role}", self.mix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelState {
    On,
    Off,
    /// Representable for transition-aware traces; the snapshot markup
    /// carries no explicit fade marker today.
    Fading,
}

/// Routing of one mix-bus channel to an input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelAssignment {
    pub channel: ChannelKey,
    pub input: Option<InputRef>,
    pub state: ChannelState,
}

impl ChannelAssignment {
    pub(crate) fn changed_fields(&self, prev: &Self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.input != prev.input {
            fields.push("input");
        }
        if self.state != prev.state {
            fields.push("state");
        }
        fields
    }
}

/// Audio bus identity: the master bus or one of the lettered buses A–G.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum BusKey {
    Master,
    Bus(char),
}

impl BusKey {
    /// Parse one token of an `audiobusses` attribute (`M`, `A`..`G`).
    pub fn parse_token(token: &str) -> Option<Self> {
        match token.trim() {
            "M" => Some(BusKey::Master),
            t => {
                let c = t.chars().next()?;
                if t.len() == 1 && c.is_ascii_uppercase() {
                    Some(BusKey::Bus(c))
                } else {
                    None
                }
            }
        }
    }

    /// Parse an `audio` section element name (`master`, `busA`..`busG`).
    pub fn parse_element_name(name: &str) -> Option<Self> {
        if name == "master" {
            return Some(BusKey::Master);
        }
        let letter = name.strip_prefix("bus")?;
        let c = letter.chars().next()?;
        if letter.len() == 1 && c.is_ascii_uppercase() {
            Some(BusKey::Bus(c))
        } else {
            None
        }
    }
}

impl fmt::Display for BusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusKey::Master => write!(f, "master"),
            BusKey::Bus(c) => write!(f, "bus{c}"),
        }
    }
}

/// Per-member level/mute inside a bus, derived from the member input's own
/// audio fields during the input walk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusMember {
    pub input: InputRef,
    pub volume: Option<f64>,
    pub muted: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioBus {
    pub key: BusKey,
    pub volume: f64,
    pub muted: bool,
    pub members: Vec<BusMember>,
}

impl AudioBus {
    pub(crate) fn changed_fields(&self, prev: &Self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.volume != prev.volume {
            fields.push("volume");
        }
        if self.muted != prev.muted {
            fields.push("muted");
        }
        if self.members != prev.members {
            fields.push("members");
        }
        fields
    }
}

/// Device-wide transport flags, diffed as one singleton entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Transport {
    pub recording: bool,
    pub streaming: bool,
    pub external: bool,
    pub fullscreen: bool,
    pub fade_to_black: bool,
    pub play_list: bool,
    pub multi_corder: bool,
}

impl Transport {
    pub(crate) fn changed_fields(&self, prev: &Self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.recording != prev.recording {
            fields.push("recording");
        }
        if self.streaming != prev.streaming {
            fields.push("streaming");
        }
        if self.external != prev.external {
            fields.push("external");
        }
        if self.fullscreen != prev.fullscreen {
            fields.push("fullscreen");
        }
        if self.fade_to_black != prev.fade_to_black {
            fields.push("fade_to_black");
        }
        if self.play_list != prev.play_list {
            fields.push("play_list");
        }
        if self.multi_corder != prev.multi_corder {
            fields.push("multi_corder");
        }
        fields
    }
}

/// Configured transition effect slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub effect: String,
    pub duration: u64,
}

/// One complete capture of device state. Built in a single pass, indexed
/// as it is built, then frozen — consumers only ever see it behind `Arc`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub version: String,
    pub edition: String,
    pub preset: Option<String>,
    /// Inputs in document order.
    pub inputs: Vec<Input>,
    pub overlays: Vec<Overlay>,
    pub channels: Vec<ChannelAssignment>,
    pub audio: HashMap<BusKey, AudioBus>,
    pub transport: Transport,
    pub transitions: Vec<Transition>,

    // Derived indices, filled during the same walk that builds `inputs`
    by_key: HashMap<String, usize>,
    by_number: HashMap<u32, usize>,
}

impl Snapshot {
    pub fn input_by_key(&self, key: &str) -> Option<&Input> {
        self.by_key.get(key).map(|&idx| &self.inputs[idx])
    }

    pub fn input_by_number(&self, number: u32) -> Option<&Input> {
        self.by_number.get(&number).map(|&idx| &self.inputs[idx])
    }

    /// Identifier behind a positional number, if any input holds it.
    pub fn key_for_number(&self, number: u32) -> Option<&str> {
        self.input_by_number(number).map(|input| input.key.as_str())
    }

    pub fn bus(&self, key: &BusKey) -> Option<&AudioBus> {
        self.audio.get(key)
    }

    pub fn channel(&self, key: &ChannelKey) -> Option<&ChannelAssignment> {
        self.channels.iter().find(|c| c.channel == *key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_key_parsing() {
        assert_eq!(BusKey::parse_token("M"), Some(BusKey::Master));
        assert_eq!(BusKey::parse_token("A"), Some(BusKey::Bus('A')));
        assert_eq!(BusKey::parse_token(" C "), Some(BusKey::Bus('C')));
        assert_eq!(BusKey::parse_token("AB"), None);
        assert_eq!(BusKey::parse_token(""), None);

        assert_eq!(BusKey::parse_element_name("master"), Some(BusKey::Master));
        assert_eq!(BusKey::parse_element_name("busG"), Some(BusKey::Bus('G')));
        assert_eq!(BusKey::parse_element_name("bus"), None);
        assert_eq!(BusKey::parse_element_name("headphones"), None);
    }

    #[test]
    fn test_input_state_parse_defaults_to_paused() {
        assert_eq!(InputState::parse("Running"), InputState::Running);
        assert_eq!(InputState::parse("Completed"), InputState::Completed);
        assert_eq!(InputState::parse("SomethingNew"), InputState::Paused);
    }

    #[test]
    fn test_changed_fields_names_exactly_what_differs() {
        let a = Input {
            key: "1".into(),
            number: 1,
            title: "Cam1".into(),
            short_title: None,
            kind: "Camera".into(),
            state: InputState::Running,
            position: 0,
            duration: 0,
            muted: Some(false),
            volume: Some(100.0),
            balance: None,
            solo: None,
            bus_membership: vec![BusKey::Master],
            overlays: Vec::new(),
        };
        let mut b = a.clone();
        assert!(a.changed_fields(&b).is_empty());

        b.title = "Cam1-HD".into();
        b.muted = Some(true);
        assert_eq!(a.changed_fields(&b), vec!["title", "muted"]);
    }
}
