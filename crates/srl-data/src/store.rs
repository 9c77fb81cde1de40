// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-layer spec/field table with local-delta bookkeeping.

use srl_core::{ScenePath, SpecData, SpecType, TimeSampleMap, Token, Value, fields};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

/// One remote frame: the per-path updates sharing a hub sequence.
pub type DeltaFrame = BTreeMap<ScenePath, SpecData>;

/// Host contract violations surfaced by store operations.
///
/// These never originate from remote input; the delta engine ensures
/// specs exist before writing fields.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The addressed spec does not exist.
    #[error("no spec at <{0}>")]
    NoSuchSpec(ScenePath),
    /// A spec already exists at the path with a different type.
    #[error("spec at <{path}> already exists with a different type")]
    SpecTypeMismatch {
        /// The conflicting path.
        path: ScenePath,
    },
    /// The move destination is already occupied.
    #[error("spec already exists at <{0}>")]
    DestinationOccupied(ScenePath),
    /// Specs cannot be created with the `Unknown` type.
    #[error("cannot create a spec of unknown type at <{0}>")]
    UnknownSpecType(ScenePath),
}

/// Per-layer scene state: the authoritative mirror plus the
/// bookkeeping that drives synchronization.
///
/// Writes made while the layer is still loading, or while the delta
/// engine applies remote frames, update only the mirror; every other
/// write is additionally recorded in the local delta set and marks its
/// path unacknowledged until the hub confirms it.
#[derive(Debug)]
pub struct LayerStore {
    pub(crate) data: HashMap<ScenePath, SpecData>,
    pub(crate) local_deltas: DeltaFrame,
    pub(crate) unacknowledged: HashSet<ScenePath>,
    pub(crate) latest_applied_sequence: u64,
    pub(crate) pending_remote: BTreeMap<u64, DeltaFrame>,
    pub(crate) processing_remote: bool,
    pub(crate) loaded: bool,
}

impl Default for LayerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerStore {
    /// An empty, not-yet-loaded store holding only the pseudo-root.
    #[must_use]
    pub fn new() -> Self {
        let mut data = HashMap::new();
        data.insert(
            ScenePath::absolute_root(),
            SpecData::new(SpecType::PseudoRoot),
        );
        Self {
            data,
            local_deltas: BTreeMap::new(),
            unacknowledged: HashSet::new(),
            latest_applied_sequence: 0,
            pending_remote: BTreeMap::new(),
            processing_remote: false,
            loaded: false,
        }
    }

    // -----------------------------------------------------------------
    // Spec table
    // -----------------------------------------------------------------

    /// Returns `true` if a spec exists at `path`.
    #[must_use]
    pub fn has_spec(&self, path: &ScenePath) -> bool {
        self.data.contains_key(path)
    }

    /// The spec type at `path`, `Unknown` when absent.
    #[must_use]
    pub fn spec_type(&self, path: &ScenePath) -> SpecType {
        self.data
            .get(path)
            .map(|spec| spec.spec_type)
            .unwrap_or_default()
    }

    /// Create a spec. A no-op when one of the same type already
    /// exists.
    pub fn create_spec(&mut self, path: &ScenePath, spec_type: SpecType) -> Result<(), StoreError> {
        if spec_type == SpecType::Unknown {
            return Err(StoreError::UnknownSpecType(path.clone()));
        }
        match self.data.get(path) {
            Some(existing) if existing.spec_type == spec_type => Ok(()),
            Some(_) => Err(StoreError::SpecTypeMismatch { path: path.clone() }),
            None => {
                self.data.insert(path.clone(), SpecData::new(spec_type));
                Ok(())
            }
        }
    }

    /// Remove the spec at `path`.
    pub fn erase_spec(&mut self, path: &ScenePath) -> Result<(), StoreError> {
        self.data
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::NoSuchSpec(path.clone()))
    }

    /// Atomically rename a spec.
    pub fn move_spec(&mut self, from: &ScenePath, to: &ScenePath) -> Result<(), StoreError> {
        if !self.data.contains_key(from) {
            return Err(StoreError::NoSuchSpec(from.clone()));
        }
        if self.data.contains_key(to) {
            return Err(StoreError::DestinationOccupied(to.clone()));
        }
        if let Some(spec) = self.data.remove(from) {
            self.data.insert(to.clone(), spec);
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Fields
    // -----------------------------------------------------------------

    /// The value of `field` on `path`, if present.
    #[must_use]
    pub fn get(&self, path: &ScenePath, field: &str) -> Option<&Value> {
        self.data.get(path).and_then(|spec| spec.field(field))
    }

    /// Set `field` on `path`. Passing `None` erases the field.
    ///
    /// Outside the remote-apply window and after the initial load the
    /// write is also mirrored into the local delta set, and the path
    /// becomes unacknowledged.
    pub fn set(
        &mut self,
        path: &ScenePath,
        field: &Token,
        value: impl Into<Option<Value>>,
    ) -> Result<(), StoreError> {
        let Some(value) = value.into() else {
            self.erase(path, field.as_str());
            return Ok(());
        };

        let spec = self
            .data
            .get_mut(path)
            .ok_or_else(|| StoreError::NoSuchSpec(path.clone()))?;
        let spec_type = spec.spec_type;
        spec.set_field(field.clone(), value.clone());

        if self.processing_remote || !self.loaded {
            return Ok(());
        }

        let delta = self
            .local_deltas
            .entry(path.clone())
            .or_insert_with(|| SpecData::new(spec_type));
        delta.set_field(field.clone(), value);
        self.unacknowledged.insert(path.clone());
        Ok(())
    }

    /// Remove `field` from `path` if present.
    pub fn erase(&mut self, path: &ScenePath, field: &str) {
        if let Some(spec) = self.data.get_mut(path) {
            spec.remove_field(field);
        }
    }

    /// Field names of the spec at `path`, in insertion order.
    #[must_use]
    pub fn list(&self, path: &ScenePath) -> Vec<Token> {
        self.data
            .get(path)
            .map(SpecData::field_names)
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------
    // Time samples
    // -----------------------------------------------------------------

    fn time_samples(&self, path: &ScenePath) -> Option<&TimeSampleMap> {
        self.get(path, fields::TIME_SAMPLES)
            .and_then(Value::as_time_samples)
    }

    /// Sample times recorded for `path`, ascending.
    #[must_use]
    pub fn list_time_samples(&self, path: &ScenePath) -> Vec<f64> {
        self.time_samples(path)
            .map(TimeSampleMap::times)
            .unwrap_or_default()
    }

    /// The sample times bracketing `time` on `path`.
    #[must_use]
    pub fn get_bracketing_time_samples(
        &self,
        path: &ScenePath,
        time: f64,
    ) -> Option<(f64, f64)> {
        self.time_samples(path)?.bracketing(time)
    }

    /// The value sampled exactly at `time` on `path`.
    #[must_use]
    pub fn query_time_sample(&self, path: &ScenePath, time: f64) -> Option<&Value> {
        self.time_samples(path)?.get(time)
    }

    /// Insert or replace the sample at `time`. Passing `None` erases
    /// the sample.
    ///
    /// Creating the sample map goes through [`LayerStore::set`] and is
    /// therefore delta-tracked; in-place sample edits of an existing
    /// map are not (per-sample timeline merging across peers is out of
    /// scope).
    pub fn set_time_sample(
        &mut self,
        path: &ScenePath,
        time: f64,
        value: impl Into<Option<Value>>,
    ) -> Result<(), StoreError> {
        let Some(value) = value.into() else {
            self.erase_time_sample(path, time);
            return Ok(());
        };

        if let Some(field_value) = self
            .data
            .get_mut(path)
            .and_then(|spec| spec.field_mut(fields::TIME_SAMPLES))
        {
            if !matches!(field_value, Value::TimeSamples(_)) {
                *field_value = Value::TimeSamples(TimeSampleMap::new());
            }
            if let Value::TimeSamples(map) = field_value {
                map.set(time, value);
            }
            return Ok(());
        }

        let mut map = TimeSampleMap::new();
        map.set(time, value);
        self.set(
            path,
            &Token::new(fields::TIME_SAMPLES),
            Value::TimeSamples(map),
        )
    }

    /// Remove the sample at `time`; removing the last sample removes
    /// the whole field.
    pub fn erase_time_sample(&mut self, path: &ScenePath, time: f64) {
        let Some(field_value) = self
            .data
            .get_mut(path)
            .and_then(|spec| spec.field_mut(fields::TIME_SAMPLES))
        else {
            return;
        };
        let Value::TimeSamples(map) = field_value else {
            return;
        };
        map.erase(time);
        if map.is_empty() {
            self.erase(path, fields::TIME_SAMPLES);
        }
    }

    // -----------------------------------------------------------------
    // Synchronization bookkeeping
    // -----------------------------------------------------------------

    /// Drain the local delta set. The unacknowledged set is left
    /// untouched; only a remote acknowledge clears it.
    pub fn fetch_local_deltas(&mut self) -> DeltaFrame {
        std::mem::take(&mut self.local_deltas)
    }

    /// Queue a remote frame under its hub-assigned sequence.
    pub fn accumulate_remote(&mut self, frame: DeltaFrame, sequence: u64) {
        self.pending_remote.insert(sequence, frame);
    }

    /// The highest remote sequence applied so far.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.latest_applied_sequence
    }

    /// Mark the initial load as finished; writes from now on count as
    /// user edits.
    pub fn on_loaded(&mut self) {
        self.loaded = true;
    }

    /// Returns `true` while a local edit of `path` awaits its
    /// acknowledge.
    #[must_use]
    pub fn is_unacknowledged(&self, path: &ScenePath) -> bool {
        self.unacknowledged.contains(path)
    }

    /// Returns `true` if any remote frames are queued.
    #[must_use]
    pub fn has_pending_remote(&self) -> bool {
        !self.pending_remote.is_empty()
    }

    /// Forget all remote bookkeeping after the channel history was
    /// reset: queued frames, the applied-sequence counter and the
    /// unacknowledged set.
    pub fn clear_remote_state(&mut self) {
        self.pending_remote.clear();
        self.latest_applied_sequence = 0;
        self.unacknowledged.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ScenePath {
        ScenePath::new(s).unwrap()
    }

    fn loaded_store() -> LayerStore {
        let mut store = LayerStore::new();
        store.on_loaded();
        store
    }

    #[test]
    fn fresh_store_has_pseudo_root() {
        let store = LayerStore::new();
        assert!(store.has_spec(&ScenePath::absolute_root()));
        assert_eq!(
            store.spec_type(&ScenePath::absolute_root()),
            SpecType::PseudoRoot
        );
        assert_eq!(store.sequence(), 0);
    }

    #[test]
    fn create_spec_rules() {
        let mut store = loaded_store();
        let cube = path("/Cube");
        store.create_spec(&cube, SpecType::Prim).unwrap();
        // Same type again is a no-op.
        store.create_spec(&cube, SpecType::Prim).unwrap();
        assert_eq!(
            store.create_spec(&cube, SpecType::Attribute),
            Err(StoreError::SpecTypeMismatch { path: cube.clone() })
        );
        assert_eq!(
            store.create_spec(&path("/X"), SpecType::Unknown),
            Err(StoreError::UnknownSpecType(path("/X")))
        );
    }

    #[test]
    fn erase_and_move_spec() {
        let mut store = loaded_store();
        let a = path("/A");
        let b = path("/B");
        store.create_spec(&a, SpecType::Prim).unwrap();
        store.create_spec(&b, SpecType::Prim).unwrap();

        assert_eq!(
            store.move_spec(&a, &b),
            Err(StoreError::DestinationOccupied(b.clone()))
        );
        store.erase_spec(&b).unwrap();
        store.move_spec(&a, &b).unwrap();
        assert!(!store.has_spec(&a));
        assert!(store.has_spec(&b));
        assert_eq!(store.erase_spec(&a), Err(StoreError::NoSuchSpec(a)));
    }

    #[test]
    fn set_tracks_local_deltas_and_unacknowledged() {
        let mut store = loaded_store();
        let cube = path("/Cube");
        let active = Token::new(fields::ACTIVE);
        store.create_spec(&cube, SpecType::Prim).unwrap();
        store.set(&cube, &active, Value::Bool(true)).unwrap();

        assert_eq!(store.get(&cube, fields::ACTIVE), Some(&Value::Bool(true)));
        assert!(store.is_unacknowledged(&cube));

        let deltas = store.fetch_local_deltas();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[&cube].spec_type, SpecType::Prim);
        assert_eq!(deltas[&cube].field(fields::ACTIVE), Some(&Value::Bool(true)));

        // Drained, but still unacknowledged.
        assert!(store.fetch_local_deltas().is_empty());
        assert!(store.is_unacknowledged(&cube));
    }

    #[test]
    fn writes_before_load_are_not_deltas() {
        let mut store = LayerStore::new();
        let cube = path("/Cube");
        store.create_spec(&cube, SpecType::Prim).unwrap();
        store
            .set(&cube, &Token::new("size"), Value::Double(1.0))
            .unwrap();

        assert!(store.fetch_local_deltas().is_empty());
        assert!(!store.is_unacknowledged(&cube));

        store.on_loaded();
        store
            .set(&cube, &Token::new("size"), Value::Double(2.0))
            .unwrap();
        assert_eq!(store.fetch_local_deltas().len(), 1);
    }

    #[test]
    fn set_none_erases() {
        let mut store = loaded_store();
        let cube = path("/Cube");
        let size = Token::new("size");
        store.create_spec(&cube, SpecType::Prim).unwrap();
        store.set(&cube, &size, Value::Double(1.0)).unwrap();
        store.set(&cube, &size, None).unwrap();
        assert_eq!(store.get(&cube, "size"), None);
    }

    #[test]
    fn set_on_missing_spec_is_an_error() {
        let mut store = loaded_store();
        let err = store.set(&path("/Ghost"), &Token::new("x"), Value::Int(1));
        assert_eq!(err, Err(StoreError::NoSuchSpec(path("/Ghost"))));
    }

    #[test]
    fn list_returns_insertion_order() {
        let mut store = loaded_store();
        let cube = path("/Cube");
        store.create_spec(&cube, SpecType::Prim).unwrap();
        for name in ["c", "a", "b"] {
            store
                .set(&cube, &Token::new(name), Value::Int(0))
                .unwrap();
        }
        let names: Vec<_> = store
            .list(&cube)
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn time_sample_operations() {
        let mut store = loaded_store();
        let prop = path("/Cube.size");
        store.create_spec(&prop, SpecType::Attribute).unwrap();

        store.set_time_sample(&prop, 2.0, Value::Double(20.0)).unwrap();
        store.set_time_sample(&prop, 1.0, Value::Double(10.0)).unwrap();
        store.set_time_sample(&prop, 3.0, Value::Double(30.0)).unwrap();

        assert_eq!(store.list_time_samples(&prop), vec![1.0, 2.0, 3.0]);
        assert_eq!(
            store.query_time_sample(&prop, 2.0),
            Some(&Value::Double(20.0))
        );
        assert_eq!(store.query_time_sample(&prop, 2.5), None);
        assert_eq!(
            store.get_bracketing_time_samples(&prop, 2.5),
            Some((2.0, 3.0))
        );
        assert_eq!(
            store.get_bracketing_time_samples(&prop, 0.0),
            Some((1.0, 1.0))
        );

        // Erasing via an empty value.
        store.set_time_sample(&prop, 2.0, None).unwrap();
        assert_eq!(store.list_time_samples(&prop), vec![1.0, 3.0]);

        store.erase_time_sample(&prop, 1.0);
        store.erase_time_sample(&prop, 3.0);
        // Emptied map removes the field entirely.
        assert_eq!(store.get(&prop, fields::TIME_SAMPLES), None);
    }

    #[test]
    fn accumulate_remote_is_ordered_by_sequence() {
        let mut store = loaded_store();
        store.accumulate_remote(DeltaFrame::new(), 3);
        store.accumulate_remote(DeltaFrame::new(), 1);
        assert!(store.has_pending_remote());
        let sequences: Vec<_> = store.pending_remote.keys().copied().collect();
        assert_eq!(sequences, vec![1, 3]);
    }

    #[test]
    fn clear_remote_state_resets_bookkeeping() {
        let mut store = loaded_store();
        let cube = path("/Cube");
        store.create_spec(&cube, SpecType::Prim).unwrap();
        store.set(&cube, &Token::new("a"), Value::Int(1)).unwrap();
        store.accumulate_remote(DeltaFrame::new(), 5);
        store.latest_applied_sequence = 4;

        store.clear_remote_state();
        assert_eq!(store.sequence(), 0);
        assert!(!store.has_pending_remote());
        assert!(!store.is_unacknowledged(&cube));
    }
}
