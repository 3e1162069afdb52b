//! Change detection between two snapshots.
//!
//! Identity is always the natural key — input key, overlay slot, channel
//! key, bus key — never positional index, so device-side renumbering is
//! read as mutation, not wholesale removal/addition. Comparison is by
//! value: every snapshot is freshly rebuilt, so reference identity means
//! nothing.

use crate::model::{BusKey, ChannelKey, Snapshot};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Input,
    Overlay,
    Channel,
    AudioBus,
    Transport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Mutated,
}

/// Natural key of the changed entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKey {
    Input(String),
    Overlay(u32),
    Channel(ChannelKey),
    Bus(BusKey),
    Transport,
}

/// One per-entity difference between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub entity: EntityKind,
    pub key: EntityKey,
    pub change: ChangeKind,
    /// Names of the tracked fields that differ. Empty for added/removed.
    pub fields: Vec<&'static str>,
}

/// Minimal list of per-entity differences. Produced by [`diff`], consumed
/// immediately by the change listener, not retained.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
    pub records: Vec<ChangeRecord>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.records.iter()
    }

    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &ChangeRecord> {
        self.records.iter().filter(move |r| r.entity == kind)
    }
}

/// Compare two snapshots. Ordering is unspecified across entity kinds but
/// stable within a kind: new-snapshot document order for added/mutated,
/// old-snapshot document order for removed.
pub fn diff(old: &Snapshot, new: &Snapshot) -> ChangeSet {
    let mut set = ChangeSet::default();
    diff_inputs(old, new, &mut set);
    diff_overlays(old, new, &mut set);
    diff_channels(old, new, &mut set);
    diff_buses(old, new, &mut set);
    diff_transport(old, new, &mut set);
    set
}

fn diff_inputs(old: &Snapshot, new: &Snapshot, set: &mut ChangeSet) {
    for input in &new.inputs {
        match old.input_by_key(&input.key) {
            None => set.records.push(ChangeRecord {
                entity: EntityKind::Input,
                key: EntityKey::Input(input.key.clone()),
                change: ChangeKind::Added,
                fields: Vec::new(),
            }),
            Some(prev) => {
                let fields = input.changed_fields(prev);
                if !fields.is_empty() {
                    set.records.push(ChangeRecord {
                        entity: EntityKind::Input,
                        key: EntityKey::Input(input.key.clone()),
                        change: ChangeKind::Mutated,
                        fields,
                    });
                }
            }
        }
    }
    for input in &old.inputs {
        if new.input_by_key(&input.key).is_none() {
            set.records.push(ChangeRecord {
                entity: EntityKind::Input,
                key: EntityKey::Input(input.key.clone()),
                change: ChangeKind::Removed,
                fields: Vec::new(),
            });
        }
    }
}

fn diff_overlays(old: &Snapshot, new: &Snapshot, set: &mut ChangeSet) {
    let old_by_slot: HashMap<u32, &crate::model::Overlay> =
        old.overlays.iter().map(|o| (o.slot, o)).collect();
    let new_by_slot: HashMap<u32, &crate::model::Overlay> =
        new.overlays.iter().map(|o| (o.slot, o)).collect();

    for overlay in &new.overlays {
        match old_by_slot.get(&overlay.slot) {
            None => set.records.push(ChangeRecord {
                entity: EntityKind::Overlay,
                key: EntityKey::Overlay(overlay.slot),
                change: ChangeKind::Added,
                fields: Vec::new(),
            }),
            Some(prev) => {
                let fields = overlay.changed_fields(prev);
                if !fields.is_empty() {
                    set.records.push(ChangeRecord {
                        entity: EntityKind::Overlay,
                        key: EntityKey::Overlay(overlay.slot),
                        change: ChangeKind::Mutated,
                        fields,
                    });
                }
            }
        }
    }
    for overlay in &old.overlays {
        if !new_by_slot.contains_key(&overlay.slot) {
            set.records.push(ChangeRecord {
                entity: EntityKind::Overlay,
                key: EntityKey::Overlay(overlay.slot),
                change: ChangeKind::Removed,
                fields: Vec::new(),
            });
        }
    }
}

fn diff_channels(old: &Snapshot, new: &Snapshot, set: &mut ChangeSet) {
    let old_by_key: HashMap<ChannelKey, &crate::model::ChannelAssignment> =
        old.channels.iter().map(|c| (c.channel, c)).collect();
    let new_by_key: HashMap<ChannelKey, &crate::model::ChannelAssignment> =
        new.channels.iter().map(|c| (c.channel, c)).collect();

    for channel in &new.channels {
        match old_by_key.get(&channel.channel) {
            None => set.records.push(ChangeRecord {
                entity: EntityKind::Channel,
                key: EntityKey::Channel(channel.channel),
                change: ChangeKind::Added,
                fields: Vec::new(),
            }),
            Some(prev) => {
                let fields = channel.changed_fields(prev);
                if !fields.is_empty() {
                    set.records.push(ChangeRecord {
                        entity: EntityKind::Channel,
                        key: EntityKey::Channel(channel.channel),
                        change: ChangeKind::Mutated,
                        fields,
                    });
                }
            }
        }
    }
    for channel in &old.channels {
        if !new_by_key.contains_key(&channel.channel) {
            set.records.push(ChangeRecord {
                entity: EntityKind::Channel,
                key: EntityKey::Channel(channel.channel),
                change: ChangeKind::Removed,
                fields: Vec::new(),
            });
        }
    }
}

fn diff_buses(old: &Snapshot, new: &Snapshot, set: &mut ChangeSet) {
    // Bus tables are keyed maps; iterate sorted keys for stable order
    // (master first, then A..G — the document order)
    let mut new_keys: Vec<BusKey> = new.audio.keys().copied().collect();
    new_keys.sort();
    for key in new_keys {
        let bus = &new.audio[&key];
        match old.bus(&key) {
            None => set.records.push(ChangeRecord {
                entity: EntityKind::AudioBus,
                key: EntityKey::Bus(key),
                change: ChangeKind::Added,
                fields: Vec::new(),
            }),
            Some(prev) => {
                let fields = bus.changed_fields(prev);
                if !fields.is_empty() {
                    set.records.push(ChangeRecord {
                        entity: EntityKind::AudioBus,
                        key: EntityKey::Bus(key),
                        change: ChangeKind::Mutated,
                        fields,
                    });
                }
            }
        }
    }
    let mut removed: Vec<BusKey> = old
        .audio
        .keys()
        .filter(|key| !new.audio.contains_key(key))
        .copied()
        .collect();
    removed.sort();
    for key in removed {
        set.records.push(ChangeRecord {
            entity: EntityKind::AudioBus,
            key: EntityKey::Bus(key),
            change: ChangeKind::Removed,
            fields: Vec::new(),
        });
    }
}

fn diff_transport(old: &Snapshot, new: &Snapshot, set: &mut ChangeSet) {
    let fields = new.transport.changed_fields(&old.transport);
    if !fields.is_empty() {
        set.records.push(ChangeRecord {
            entity: EntityKind::Transport,
            key: EntityKey::Transport,
            change: ChangeKind::Mutated,
            fields,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{QuickXmlAdapter, SnapshotParser};
    use crate::model::builder::build_snapshot;
    use crate::tree::canonicalize;

    async fn build(raw: &str) -> Snapshot {
        let tree = QuickXmlAdapter::new().parse(raw).await.unwrap();
        build_snapshot(&canonicalize(tree)).unwrap()
    }

    #[tokio::test]
    async fn test_identical_snapshots_diff_empty() {
        let raw = r#"<vmix>
            <inputs><input key="1" number="1" title="Cam1"/></inputs>
            <active>1</active>
            <audio><master volume="100" muted="False"/></audio>
        </vmix>"#;
        let a = build(raw).await;
        let b = build(raw).await;
        assert!(diff(&a, &b).is_empty());
    }

    #[tokio::test]
    async fn test_one_field_change_yields_one_record() {
        let a = build(r#"<vmix><inputs><input key="1" number="1" title="Cam1"/></inputs></vmix>"#)
            .await;
        let b =
            build(r#"<vmix><inputs><input key="1" number="1" title="Cam1-HD"/></inputs></vmix>"#)
                .await;

        let set = diff(&a, &b);
        assert_eq!(set.len(), 1);
        let record = &set.records[0];
        assert_eq!(record.entity, EntityKind::Input);
        assert_eq!(record.key, EntityKey::Input("1".to_string()));
        assert_eq!(record.change, ChangeKind::Mutated);
        assert_eq!(record.fields, vec!["title"]);
    }

    #[tokio::test]
    async fn test_removed_input() {
        let a = build(r#"<vmix><inputs><input key="1" number="1" title="Cam1"/></inputs></vmix>"#)
            .await;
        let b = build(r#"<vmix><inputs/></vmix>"#).await;

        let set = diff(&a, &b);
        assert_eq!(set.len(), 1);
        assert_eq!(set.records[0].change, ChangeKind::Removed);
        assert_eq!(set.records[0].key, EntityKey::Input("1".to_string()));
        // No stale lookups after the removal
        assert!(b.input_by_key("1").is_none());
    }

    #[tokio::test]
    async fn test_renumbering_is_mutation_not_churn() {
        let a = build(
            r#"<vmix><inputs>
                <input key="a" number="1" title="A"/>
                <input key="b" number="2" title="B"/>
            </inputs></vmix>"#,
        )
        .await;
        let b = build(
            r#"<vmix><inputs>
                <input key="a" number="2" title="A"/>
                <input key="b" number="1" title="B"/>
            </inputs></vmix>"#,
        )
        .await;

        let set = diff(&a, &b);
        assert!(set
            .iter()
            .all(|r| r.change == ChangeKind::Mutated && r.fields == vec!["number"]));
        assert_eq!(set.len(), 2);

        // Positional lookups differ even though identity survived
        assert_eq!(a.input_by_number(1).unwrap().key, "a");
        assert_eq!(b.input_by_number(1).unwrap().key, "b");
    }

    #[tokio::test]
    async fn test_overlay_and_channel_changes() {
        let a = build(
            r#"<vmix>
                <inputs><input key="k1" number="1"/><input key="k2" number="2"/></inputs>
                <overlays><overlay number="1"/></overlays>
                <active>1</active>
            </vmix>"#,
        )
        .await;
        let b = build(
            r#"<vmix>
                <inputs><input key="k1" number="1"/><input key="k2" number="2"/></inputs>
                <overlays><overlay number="1">2</overlay></overlays>
                <active>2</active>
            </vmix>"#,
        )
        .await;

        let set = diff(&a, &b);
        let overlay: Vec<_> = set.of_kind(EntityKind::Overlay).collect();
        assert_eq!(overlay.len(), 1);
        assert_eq!(overlay[0].fields, vec!["target", "active"]);

        let channel: Vec<_> = set.of_kind(EntityKind::Channel).collect();
        assert_eq!(channel.len(), 1);
        assert_eq!(channel[0].fields, vec!["input"]);
    }

    #[tokio::test]
    async fn test_bus_and_transport_changes() {
        let a = build(
            r#"<vmix>
                <audio><master volume="100" muted="False"/></audio>
                <recording>False</recording>
            </vmix>"#,
        )
        .await;
        let b = build(
            r#"<vmix>
                <audio><master volume="80" muted="False"/><busA volume="50" muted="True"/></audio>
                <recording>True</recording>
            </vmix>"#,
        )
        .await;

        let set = diff(&a, &b);
        let buses: Vec<_> = set.of_kind(EntityKind::AudioBus).collect();
        assert_eq!(buses.len(), 2);
        assert_eq!(buses[0].key, EntityKey::Bus(BusKey::Master));
        assert_eq!(buses[0].fields, vec!["volume"]);
        assert_eq!(buses[1].change, ChangeKind::Added);

        let transport: Vec<_> = set.of_kind(EntityKind::Transport).collect();
        assert_eq!(transport.len(), 1);
        assert_eq!(transport[0].fields, vec!["recording"]);
    }

    #[tokio::test]
    async fn test_first_snapshot_is_all_added() {
        let empty = Snapshot::default();
        let first = build(
            r#"<vmix><inputs>
                <input key="a" number="1"/>
                <input key="b" number="2"/>
            </inputs></vmix>"#,
        )
        .await;

        let set = diff(&empty, &first);
        let inputs: Vec<_> = set.of_kind(EntityKind::Input).collect();
        assert_eq!(inputs.len(), 2);
        assert!(inputs.iter().all(|r| r.change == ChangeKind::Added));
        // Stable document order within the kind
        assert_eq!(inputs[0].key, EntityKey::Input("a".to_string()));
        assert_eq!(inputs[1].key, EntityKey::Input("b".to_string()));
    }
}
