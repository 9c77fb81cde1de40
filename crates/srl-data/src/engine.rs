// SPDX-License-Identifier: MIT OR Apache-2.0
//! Applies queued remote frames in sequence order.

use crate::notice::Notice;
use crate::store::LayerStore;
use srl_core::{ScenePath, SpecData, SpecType, Token, Value, fields};
use std::collections::HashSet;
use tracing::debug;

/// Apply every contiguous pending frame starting at the layer's next
/// expected sequence.
///
/// Application stops at the first gap in sequence numbers; the gapped
/// frames stay queued until the missing one arrives. The whole pass
/// runs with the store's remote-apply flag set, so any write the apply
/// triggers never re-enters the local delta set.
///
/// Returns the change notices the pass produced, owner changes first
/// in encounter order, then per-prim change notices deduplicated by
/// path (a resync wins over a plain change).
pub fn process_remote_updates(store: &mut LayerStore) -> Vec<Notice> {
    store.processing_remote = true;

    let mut notices = Vec::new();
    let mut prim_changes: Vec<(ScenePath, bool)> = Vec::new();

    let mut next = store.latest_applied_sequence + 1;
    while let Some(frame) = store.pending_remote.remove(&next) {
        for (path, spec) in frame {
            // A spec without fields acknowledges the path instead of
            // updating it.
            if spec.is_ack_marker() {
                store.unacknowledged.remove(&path);
                continue;
            }

            for field in &spec.fields {
                apply_field(
                    store,
                    &mut notices,
                    &mut prim_changes,
                    &path,
                    &field.key,
                    &field.value,
                    spec.spec_type,
                );
            }

            prim_changes.push((path, false));
        }

        store.latest_applied_sequence = next;
        next += 1;
    }

    store.processing_remote = false;

    notices.extend(dedupe_prim_changes(prim_changes));
    notices
}

fn apply_field(
    store: &mut LayerStore,
    notices: &mut Vec<Notice>,
    prim_changes: &mut Vec<(ScenePath, bool)>,
    path: &ScenePath,
    key: &Token,
    value: &Value,
    spec_type: SpecType,
) {
    // Create the spec on first contact.
    if !store.data.contains_key(path) {
        store.data.insert(path.clone(), SpecData::new(spec_type));
        if path.is_prim_path() {
            prim_changes.push((path.clone(), true));
        }
    }

    // A customData.owner entry signals a prim lock handover.
    if *key == fields::CUSTOM_DATA {
        if let Some(owner_value) = value
            .as_dictionary()
            .and_then(|dict| dict.get(fields::OWNER))
        {
            if let Some(owner) = owner_value.as_string() {
                let owner = (owner != "None").then(|| owner.to_string());
                notices.push(Notice::OwnerChanged {
                    path: path.clone(),
                    owner,
                });
            }
        }
    }

    let unacknowledged = store.unacknowledged.contains(path);
    let force = key.as_str().contains(fields::XFORM_OP_PREFIX);
    let merge = *key == fields::PRIM_CHILDREN && unacknowledged;

    // A pending local edit wins over the remote value unless the field
    // must be merged or force-applied: our own edit is later in the
    // hub's history.
    if unacknowledged && !merge && !force {
        debug!(path = %path, field = %key, "skip unacknowledged remote update");
        return;
    }

    if merge {
        let local = store
            .get(path, key.as_str())
            .and_then(Value::as_token_vector)
            .cloned()
            .unwrap_or_default();
        let remote = value.as_token_vector().cloned().unwrap_or_default();

        // While our edit is unacknowledged the remote entries come
        // first; once acknowledged ours would already sit earlier in
        // the history.
        let combined: Vec<Token> = if unacknowledged {
            remote.into_iter().chain(local).collect()
        } else {
            local.into_iter().chain(remote).collect()
        };

        let mut seen = HashSet::new();
        let merged: Vec<Token> = combined
            .into_iter()
            .filter(|token| seen.insert(token.clone()))
            .collect();

        if let Some(spec) = store.data.get_mut(path) {
            spec.set_field(key.clone(), Value::TokenVector(merged));
        }
    } else if let Some(spec) = store.data.get_mut(path) {
        spec.set_field(key.clone(), value.clone());
    }

    if *key == fields::ACTIVE {
        prim_changes.push((path.clone(), true));
    }
}

fn dedupe_prim_changes(raw: Vec<(ScenePath, bool)>) -> Vec<Notice> {
    use std::collections::BTreeMap;

    let mut by_path: BTreeMap<ScenePath, bool> = BTreeMap::new();
    for (path, resynced) in raw {
        let Some(Notice::PrimitiveChanged { path, resynced }) =
            Notice::primitive_changed(&path, resynced)
        else {
            continue;
        };
        let entry = by_path.entry(path).or_insert(resynced);
        *entry = *entry || resynced;
    }

    by_path
        .into_iter()
        .map(|(path, resynced)| Notice::PrimitiveChanged { path, resynced })
        .collect()
}
