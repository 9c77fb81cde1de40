// SPDX-License-Identifier: MIT OR Apache-2.0
//! Event bodies and the `{ "event", "body" }` frame envelope.

use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use srl_core::{Field, ScenePath, SpecData, SpecType};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// DeltaEvent
// ---------------------------------------------------------------------------

/// A batch of spec updates produced by one peer between two flushes.
///
/// `sequence` is `None` while the delta travels from a client to the
/// hub and carries the hub-assigned sequence once broadcast. The
/// update map is path-ordered so encoding is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireDelta", into = "WireDelta")]
pub struct DeltaEvent {
    /// Identifier of the layer the updates belong to.
    pub layer: String,
    /// Identity of the editing user.
    pub user: String,
    /// Hub-assigned sequence; `None` on the client-to-hub leg.
    pub sequence: Option<u64>,
    /// Per-path spec updates.
    pub updates: BTreeMap<ScenePath, SpecData>,
}

impl DeltaEvent {
    /// A delta not yet sequenced by the hub.
    #[must_use]
    pub fn unsequenced(
        layer: impl Into<String>,
        user: impl Into<String>,
        updates: BTreeMap<ScenePath, SpecData>,
    ) -> Self {
        Self {
            layer: layer.into(),
            user: user.into(),
            sequence: None,
            updates,
        }
    }

    /// The update's paths, in map order.
    #[must_use]
    pub fn paths(&self) -> Vec<ScenePath> {
        self.updates.keys().cloned().collect()
    }
}

#[derive(Serialize, Deserialize)]
struct WireUpdate {
    path: ScenePath,
    spec: SpecType,
    fields: Vec<Field>,
}

#[derive(Serialize, Deserialize)]
struct WireDelta {
    layer: String,
    user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sequence: Option<u64>,
    updates: Vec<WireUpdate>,
}

impl From<DeltaEvent> for WireDelta {
    fn from(event: DeltaEvent) -> Self {
        WireDelta {
            layer: event.layer,
            user: event.user,
            sequence: event.sequence,
            updates: event
                .updates
                .into_iter()
                .map(|(path, spec)| WireUpdate {
                    path,
                    spec: spec.spec_type,
                    fields: spec.fields,
                })
                .collect(),
        }
    }
}

impl TryFrom<WireDelta> for DeltaEvent {
    type Error = ProtocolError;

    fn try_from(wire: WireDelta) -> Result<Self, Self::Error> {
        let mut updates: BTreeMap<ScenePath, SpecData> = BTreeMap::new();
        for update in wire.updates {
            if update.spec == SpecType::Unknown {
                return Err(ProtocolError::Violation(format!(
                    "delta update for {} carries an unknown spec type",
                    update.path
                )));
            }
            if update.path.is_null() {
                return Err(ProtocolError::Violation(
                    "delta update carries a null path".to_string(),
                ));
            }
            let entry = updates
                .entry(update.path)
                .or_insert_with(|| SpecData::new(update.spec));
            entry.spec_type = update.spec;
            entry.fields.extend(update.fields);
        }
        Ok(DeltaEvent {
            layer: wire.layer,
            user: wire.user,
            sequence: wire.sequence,
            updates,
        })
    }
}

// ---------------------------------------------------------------------------
// Other bodies
// ---------------------------------------------------------------------------

/// The hub's receipt for a single accepted delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcknowledgeEvent {
    /// Layer the acknowledged delta targeted.
    pub layer: String,
    /// Paths of the acknowledged updates.
    pub paths: Vec<ScenePath>,
    /// Sequence the hub assigned to the delta.
    pub sequence: u64,
}

/// Terminator of the history replay a joiner receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistoryEvent {}

/// History reset for one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadEvent {
    /// Layer whose history is discarded.
    pub layer: String,
    /// Hub-assigned sequence; `None` on the client-to-hub leg.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

// ---------------------------------------------------------------------------
// Frame envelope
// ---------------------------------------------------------------------------

/// A wire frame: one of the four protocol events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "body")]
pub enum Event {
    /// A batch of spec updates.
    #[serde(rename = "Delta::Event")]
    Delta(DeltaEvent),
    /// The hub's receipt back to a delta's sender.
    #[serde(rename = "Acknowledge::Event")]
    Acknowledge(AcknowledgeEvent),
    /// History replay terminator.
    #[serde(rename = "History::Event")]
    History(HistoryEvent),
    /// History reset for a layer.
    #[serde(rename = "Reload::Event")]
    Reload(ReloadEvent),
}
