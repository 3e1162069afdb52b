//! Single-pass snapshot construction from the canonical tree.
//!
//! Inputs are walked exactly once and the key/number indices are filled as
//! each input is constructed — cross-references (overlays, channels, bus
//! members) then resolve through those indices in O(1), keeping the total
//! cost linear in snapshot size regardless of how many references point at
//! the same inputs.

use super::{
    AudioBus, BusKey, BusMember, ChannelAssignment, ChannelKey, ChannelRole, ChannelState, Input,
    InputOverlay, InputRef, InputState, Overlay, Snapshot, Transition, Transport,
};
use crate::error::StructuralError;
use crate::tree::{Element, Node, Scalar};
use std::collections::HashMap;
use tracing::warn;

/// Build a snapshot from a canonical tree.
///
/// Absent sections degrade to empty entity lists — the device may
/// legitimately report zero of anything. Only an unreadable document shape
/// is an error.
pub fn build_snapshot(root: &Node) -> Result<Snapshot, StructuralError> {
    let doc = root.as_elem().ok_or(StructuralError::NotADocument)?;
    if !doc.children.contains_key("vmix") {
        let found = doc.children.keys().next().cloned().unwrap_or_default();
        return Err(StructuralError::UnexpectedRoot(found));
    }
    // A bare `<vmix/>` collapses to a scalar in some adapters: empty state
    let Some(vmix) = doc.first_elem("vmix") else {
        return Ok(Snapshot::default());
    };

    let mut snapshot = Snapshot {
        version: child_text(vmix, "version").unwrap_or_default(),
        edition: child_text(vmix, "edition").unwrap_or_default(),
        preset: child_text(vmix, "preset").filter(|p| !p.is_empty()),
        ..Default::default()
    };

    let mut bus_members: HashMap<BusKey, Vec<BusMember>> = HashMap::new();
    walk_inputs(vmix, &mut snapshot, &mut bus_members);
    resolve_input_overlays(&mut snapshot);
    walk_overlays(vmix, &mut snapshot);
    walk_channels(vmix, &mut snapshot);
    walk_audio(vmix, &mut snapshot, bus_members);

    snapshot.transport = Transport {
        recording: child_flag(vmix, "recording"),
        streaming: child_flag(vmix, "streaming"),
        external: child_flag(vmix, "external"),
        fullscreen: child_flag(vmix, "fullscreen"),
        fade_to_black: child_flag(vmix, "fadeToBlack"),
        play_list: child_flag(vmix, "playList"),
        multi_corder: child_flag(vmix, "multiCorder"),
    };

    if let Some(transitions) = vmix.first_elem("transitions") {
        for node in transitions.child_slice("transition") {
            let Some(el) = node.as_elem() else { continue };
            snapshot.transitions.push(Transition {
                effect: el.attr_str("effect").unwrap_or_default(),
                duration: el.attr_u64("duration").unwrap_or(0),
            });
        }
    }

    Ok(snapshot)
}

/// One pass over the inputs list. Indices are inserted alongside each
/// entity — never in a second pass over the built list — and bus
/// memberships accumulate into their own key table on the way through.
fn walk_inputs(
    vmix: &Element,
    snapshot: &mut Snapshot,
    bus_members: &mut HashMap<BusKey, Vec<BusMember>>,
) {
    let Some(inputs_el) = vmix.first_elem("inputs") else {
        return;
    };
    for node in inputs_el.child_slice("input") {
        let Some(el) = node.as_elem() else { continue };
        let Some(input) = build_input(el) else {
            warn!("skipping input without a key attribute");
            continue;
        };
        if snapshot.by_key.contains_key(&input.key) {
            warn!(key = %input.key, "duplicate input key, keeping first occurrence");
            continue;
        }

        let idx = snapshot.inputs.len();
        snapshot.by_key.insert(input.key.clone(), idx);
        snapshot.by_number.entry(input.number).or_insert(idx);
        for bus in &input.bus_membership {
            bus_members.entry(*bus).or_default().push(BusMember {
                input: InputRef::Key(input.key.clone()),
                volume: input.volume,
                muted: input.muted,
            });
        }
        snapshot.inputs.push(input);
    }
}

fn build_input(el: &Element) -> Option<Input> {
    let key = el.attr_str("key")?;

    let mut overlays = Vec::new();
    for node in el.child_slice("overlay") {
        let Some(ov) = node.as_elem() else { continue };
        overlays.push(InputOverlay {
            slot: ov.attr_u32("index").unwrap_or(0),
            // resolved against the key index after the walk; targets may
            // reference inputs that appear later in the list
            target: ov.attr_str("key").map(InputRef::Key),
        });
    }

    let bus_membership = el
        .attr_str("audiobusses")
        .map(|raw| {
            raw.split(',')
                .filter_map(BusKey::parse_token)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Some(Input {
        key,
        number: el.attr_u32("number").unwrap_or(0),
        title: el.attr_str("title").unwrap_or_default(),
        short_title: el.attr_str("shortTitle"),
        kind: el.attr_str("type").unwrap_or_default(),
        state: InputState::parse(&el.attr_str("state").unwrap_or_default()),
        position: el.attr_u64("position").unwrap_or(0),
        duration: el.attr_u64("duration").unwrap_or(0),
        muted: el.attr_bool("muted"),
        volume: el.attr_f64("volume"),
        balance: el.attr_f64("balance"),
        solo: el.attr_bool("solo"),
        bus_membership,
        overlays,
    })
}

/// Linear fix-up for input-embedded overlay targets, which may point
/// forward in the inputs list.
fn resolve_input_overlays(snapshot: &mut Snapshot) {
    let by_key = std::mem::take(&mut snapshot.by_key);
    for input in snapshot.inputs.iter_mut() {
        for overlay in input.overlays.iter_mut() {
            if let Some(InputRef::Key(key)) = &overlay.target {
                if !by_key.contains_key(key) {
                    let raw = key.clone();
                    warn!(reference = %raw, "overlay references an absent input");
                    overlay.target = Some(InputRef::Dangling(raw));
                }
            }
        }
    }
    snapshot.by_key = by_key;
}

fn walk_overlays(vmix: &Element, snapshot: &mut Snapshot) {
    let Some(overlays_el) = vmix.first_elem("overlays") else {
        return;
    };
    for node in overlays_el.child_slice("overlay") {
        let Some(el) = node.as_elem() else { continue };
        let Some(slot) = el.attr_u32("number") else {
            continue;
        };
        let target = el
            .text
            .as_ref()
            .map(|raw| resolve_number_ref(snapshot, &raw.to_text()));
        snapshot.overlays.push(Overlay {
            slot,
            active: target.is_some(),
            target,
        });
    }
}

fn walk_channels(vmix: &Element, snapshot: &mut Snapshot) {
    // Main mix routing lives directly on the root element
    push_mix_channels(vmix, 1, snapshot);
    for node in vmix.child_slice("mix") {
        let Some(el) = node.as_elem() else { continue };
        let Some(mix) = el.attr_u32("number") else {
            continue;
        };
        push_mix_channels(el, mix, snapshot);
    }
}

fn push_mix_channels(el: &Element, mix: u32, snapshot: &mut Snapshot) {
    for (role, name) in [
        (ChannelRole::Program, "active"),
        (ChannelRole::Preview, "preview"),
    ] {
        let Some(node) = el.child_slice(name).first() else {
            continue;
        };
        let raw = node_text(node).unwrap_or_default();
        let (input, state) = if raw.trim().is_empty() {
            (None, ChannelState::Off)
        } else {
            (
                Some(resolve_number_ref(snapshot, &raw)),
                ChannelState::On,
            )
        };
        snapshot.channels.push(ChannelAssignment {
            channel: ChannelKey { mix, role },
            input,
            state,
        });
    }
}

fn walk_audio(
    vmix: &Element,
    snapshot: &mut Snapshot,
    mut bus_members: HashMap<BusKey, Vec<BusMember>>,
) {
    if let Some(audio_el) = vmix.first_elem("audio") {
        for name in audio_el.children.keys() {
            let Some(key) = BusKey::parse_element_name(name) else {
                continue;
            };
            let el = audio_el.first_elem(name);
            snapshot.audio.insert(
                key,
                AudioBus {
                    key,
                    volume: el.and_then(|e| e.attr_f64("volume")).unwrap_or(100.0),
                    muted: el.and_then(|e| e.attr_bool("muted")).unwrap_or(false),
                    members: bus_members.remove(&key).unwrap_or_default(),
                },
            );
        }
    }
    // Membership can name a bus the audio section omits; materialize it so
    // the membership is not lost
    for (key, members) in bus_members {
        snapshot.audio.entry(key).or_insert(AudioBus {
            key,
            volume: 100.0,
            muted: false,
            members,
        });
    }
}

/// Resolve a positional reference (input number) against the number index.
fn resolve_number_ref(snapshot: &Snapshot, raw: &str) -> InputRef {
    if let Ok(number) = raw.trim().parse::<u32>() {
        if let Some(key) = snapshot.key_for_number(number) {
            return InputRef::Key(key.to_string());
        }
    }
    warn!(reference = raw, "dangling positional reference");
    InputRef::Dangling(raw.to_string())
}

/// Text of a child node, tolerating both the collapsed-scalar and the
/// element-with-text shape.
fn node_text(node: &Node) -> Option<String> {
    match node {
        Node::Scalar(s) => Some(s.to_text()),
        Node::Elem(el) => el.text.as_ref().map(Scalar::to_text),
        _ => None,
    }
}

fn child_text(el: &Element, name: &str) -> Option<String> {
    el.child_slice(name).first().and_then(node_text)
}

/// Boolean flag child, tolerant of extra attributes on the flag element
/// (`<recording duration="12">True</recording>`).
fn child_flag(el: &Element, name: &str) -> bool {
    match el.child_slice(name).first() {
        Some(Node::Scalar(s)) => s.as_bool().unwrap_or(false),
        Some(Node::Elem(e)) => e
            .text
            .as_ref()
            .and_then(Scalar::as_bool)
            .unwrap_or(false),
        _ => false,
    }
}
