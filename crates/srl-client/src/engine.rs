// SPDX-License-Identifier: MIT OR Apache-2.0
//! The host-facing engine handle.

use crate::SessionError;
use crate::config::SessionConfig;
use crate::session::{self, Command, SessionShared, SessionState};
use srl_core::{ScenePath, SpecData, SpecType, Token, Value};
use srl_data::{DeltaFrame, LayerStore, Notice, StoreError, process_remote_updates};
use srl_protocol::{DeltaEvent, Event, EventCodec, SessionUrl};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::runtime;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

const NOTICE_BUS_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// LayerHandle
// ---------------------------------------------------------------------------

/// A registered layer's store, shared between the host and the
/// session's reader task.
#[derive(Debug, Clone)]
pub struct LayerHandle {
    id: String,
    store: Arc<Mutex<LayerStore>>,
}

impl LayerHandle {
    /// The layer identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run `f` with the store locked. All store operations are
    /// available through this accessor.
    pub fn with<R>(&self, f: impl FnOnce(&mut LayerStore) -> R) -> R {
        let mut store = self
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut store)
    }

    /// Create a spec.
    pub fn create_spec(&self, path: &ScenePath, spec_type: SpecType) -> Result<(), StoreError> {
        self.with(|store| store.create_spec(path, spec_type))
    }

    /// Set a field; `None` erases it.
    pub fn set(
        &self,
        path: &ScenePath,
        field: &Token,
        value: impl Into<Option<Value>>,
    ) -> Result<(), StoreError> {
        let value = value.into();
        self.with(|store| store.set(path, field, value))
    }

    /// A clone of the field value, if present.
    #[must_use]
    pub fn get(&self, path: &ScenePath, field: &str) -> Option<Value> {
        self.with(|store| store.get(path, field).cloned())
    }

    /// Mark the initial load as finished.
    pub fn on_loaded(&self) {
        self.with(LayerStore::on_loaded);
    }

    /// The layer's applied remote sequence.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.with(|store| store.sequence())
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub(crate) struct EngineInner {
    config: SessionConfig,
    layers: RwLock<HashMap<String, Arc<Mutex<LayerStore>>>>,
    notices: broadcast::Sender<Notice>,
    session: Mutex<Option<Session>>,
}

struct Session {
    user: String,
    outbound: mpsc::UnboundedSender<Command>,
    shared: Arc<SessionShared>,
}

impl EngineInner {
    fn layer_store(&self, id: &str) -> Option<Arc<Mutex<LayerStore>>> {
        self.layers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub(crate) fn publish(&self, notice: Notice) {
        // Nobody listening is fine; the bus drops the notice.
        let _ = self.notices.send(notice);
    }

    /// Dispatch one inbound text frame. Malformed frames are logged
    /// and dropped; they never end the session.
    pub(crate) fn on_frame(&self, text: &str) {
        let event = match EventCodec::decode(text) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "dropping undecodable frame");
                return;
            }
        };

        match event {
            Event::Delta(delta) => {
                let Some(sequence) = delta.sequence else {
                    warn!(layer = %delta.layer, "dropping delta without a sequence");
                    return;
                };
                let Some(store) = self.layer_store(&delta.layer) else {
                    warn!(layer = %delta.layer, "dropping delta for unregistered layer");
                    return;
                };
                store
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .accumulate_remote(delta.updates, sequence);
            }
            Event::Acknowledge(ack) => {
                let Some(store) = self.layer_store(&ack.layer) else {
                    warn!(layer = %ack.layer, "dropping acknowledge for unregistered layer");
                    return;
                };
                // An acknowledge rides the sequence stream as a frame
                // of zero-field specs.
                let mut frame = DeltaFrame::new();
                for path in ack.paths {
                    frame.insert(path, SpecData::new(SpecType::Unknown));
                }
                store
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .accumulate_remote(frame, ack.sequence);
            }
            Event::History(_) => {
                // Replay finished; the session is now live.
                self.publish(Notice::LiveConnectionChanged(true));
            }
            Event::Reload(reload) => {
                if let Some(store) = self.layer_store(&reload.layer) {
                    store
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clear_remote_state();
                }
                self.publish(Notice::LayerReloaded {
                    layer: reload.layer,
                });
            }
        }
    }
}

/// The handle a host application owns: layer registry, session
/// control and the tick entry point.
///
/// The engine runs its socket I/O on a dedicated single-worker
/// runtime; `tick()` and the store accessors are synchronous and may
/// be called from the host's own thread.
pub struct Engine {
    inner: Arc<EngineInner>,
    runtime: Option<runtime::Runtime>,
}

impl Engine {
    /// An engine with default session timing.
    pub fn new() -> Result<Self, SessionError> {
        Self::with_config(SessionConfig::default())
    }

    /// An engine with explicit session timing.
    pub fn with_config(config: SessionConfig) -> Result<Self, SessionError> {
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("srl-client-io")
            .enable_all()
            .build()
            .map_err(|err| SessionError::Runtime(err.to_string()))?;

        let (notices, _) = broadcast::channel(NOTICE_BUS_CAPACITY);
        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                layers: RwLock::new(HashMap::new()),
                notices,
                session: Mutex::new(None),
            }),
            runtime: Some(runtime),
        })
    }

    // -----------------------------------------------------------------
    // Layer registry
    // -----------------------------------------------------------------

    /// Register a layer, creating its store on first registration.
    pub fn register_layer(&self, id: &str) -> LayerHandle {
        let store = self
            .inner
            .layers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(LayerStore::new())))
            .clone();
        LayerHandle {
            id: id.to_string(),
            store,
        }
    }

    /// Drop a layer. Returns `true` if it was registered.
    pub fn unregister_layer(&self, id: &str) -> bool {
        self.inner
            .layers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    /// Look up a registered layer.
    #[must_use]
    pub fn layer(&self, id: &str) -> Option<LayerHandle> {
        self.inner.layer_store(id).map(|store| LayerHandle {
            id: id.to_string(),
            store,
        })
    }

    /// Subscribe to the change-notice bus.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    // -----------------------------------------------------------------
    // Session control
    // -----------------------------------------------------------------

    /// Connect to `{ws|wss}://host[:port]/channel[?user=id]`,
    /// replacing any existing session.
    ///
    /// Without a `user` query parameter a random identity is
    /// generated.
    pub fn connect(&self, url: &str) -> Result<(), SessionError> {
        let url = SessionUrl::parse(url)?;
        self.disconnect();

        let Some(runtime) = &self.runtime else {
            return Err(SessionError::Runtime("engine runtime is gone".into()));
        };

        let user = url
            .user()
            .map(str::to_string)
            .unwrap_or_else(|| format!("user-{}", Uuid::new_v4()));
        let (outbound, inbound) = mpsc::unbounded_channel();
        let shared = Arc::new(SessionShared::new());

        info!(url = %url, user = %user, "connecting session");
        runtime.spawn(session::run(
            Arc::clone(&self.inner),
            url,
            self.inner.config.clone(),
            inbound,
            Arc::clone(&shared),
        ));

        *self
            .inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Session {
            user,
            outbound,
            shared,
        });
        Ok(())
    }

    /// Tear the session down gracefully. Safe to call when already
    /// disconnected.
    pub fn disconnect(&self) {
        let session = self
            .inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(session) = session {
            session.shared.shut_down();
            let _ = session.outbound.send(Command::Close);
        }
    }

    /// The current session state, `Disconnected` when no session
    /// exists.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.shared.state())
            .unwrap_or(SessionState::Disconnected)
    }

    /// Returns `true` while the socket is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session_state() == SessionState::Connected
    }

    // -----------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------

    /// One host-driven synchronization step.
    ///
    /// Flushes each layer's local deltas to the hub (when a session
    /// exists), then applies queued remote frames in sequence order.
    /// Returns `true` if any layer's applied sequence advanced.
    pub fn tick(&self) -> bool {
        let sender = self
            .inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| (session.user.clone(), session.outbound.clone()));

        let layers: Vec<(String, Arc<Mutex<LayerStore>>)> = self
            .inner
            .layers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, store)| (id.clone(), Arc::clone(store)))
            .collect();

        let mut changed = false;
        for (id, store) in layers {
            let (notices, advanced) = {
                let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);

                if let Some((user, outbound)) = &sender {
                    let deltas = store.fetch_local_deltas();
                    if !deltas.is_empty() {
                        let event =
                            Event::Delta(DeltaEvent::unsequenced(id.clone(), user.clone(), deltas));
                        match EventCodec::encode(&event) {
                            Ok(frame) => {
                                let _ = outbound.send(Command::Frame(frame));
                            }
                            Err(err) => {
                                warn!(error = %err, layer = %id, "failed to encode local deltas");
                            }
                        }
                    }
                }

                let before = store.sequence();
                let notices = process_remote_updates(&mut store);
                (notices, store.sequence() != before)
            };

            changed |= advanced;
            for notice in notices {
                self.inner.publish(notice);
            }
        }
        changed
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.disconnect();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srl_core::fields;
    use srl_protocol::{AcknowledgeEvent, HistoryEvent, ReloadEvent};
    use std::collections::BTreeMap;

    fn path(s: &str) -> ScenePath {
        ScenePath::new(s).unwrap()
    }

    fn engine() -> Engine {
        Engine::new().unwrap()
    }

    #[test]
    fn layer_registry_round_trip() {
        let engine = engine();
        let handle = engine.register_layer("shot.usda");
        assert_eq!(handle.id(), "shot.usda");
        assert!(engine.layer("shot.usda").is_some());

        // Re-registering returns the same store.
        handle.on_loaded();
        handle.create_spec(&path("/Cube"), SpecType::Prim).unwrap();
        let again = engine.register_layer("shot.usda");
        assert!(again.with(|store| store.has_spec(&path("/Cube"))));

        assert!(engine.unregister_layer("shot.usda"));
        assert!(!engine.unregister_layer("shot.usda"));
        assert!(engine.layer("shot.usda").is_none());
    }

    #[test]
    fn offline_tick_keeps_local_deltas_queued() {
        let engine = engine();
        let handle = engine.register_layer("l");
        handle.on_loaded();
        handle.create_spec(&path("/Cube"), SpecType::Prim).unwrap();
        handle
            .set(&path("/Cube"), &Token::new("size"), Value::Double(1.0))
            .unwrap();

        assert!(!engine.tick());
        // No session: the edit still waits for a flush.
        assert!(handle.with(|store| !store.fetch_local_deltas().is_empty()));
    }

    #[test]
    fn tick_applies_remote_frames_and_reports_change() {
        let engine = engine();
        let mut notices = engine.subscribe();
        let handle = engine.register_layer("l");
        handle.on_loaded();

        let mut spec = SpecData::new(SpecType::Prim);
        spec.set_field(Token::new(fields::ACTIVE), Value::Bool(true));
        let mut frame = BTreeMap::new();
        frame.insert(path("/Cube"), spec);
        handle.with(|store| store.accumulate_remote(frame, 1));

        assert!(engine.tick());
        assert_eq!(handle.sequence(), 1);
        assert!(!engine.tick());

        match notices.try_recv() {
            Ok(Notice::PrimitiveChanged { path: p, resynced }) => {
                assert_eq!(p, path("/Cube"));
                assert!(resynced);
            }
            other => panic!("expected a primitive notice, got {other:?}"),
        }
    }

    #[test]
    fn frame_dispatch_routes_events() {
        let engine = engine();
        let handle = engine.register_layer("l");
        handle.on_loaded();
        handle.create_spec(&path("/Cube"), SpecType::Prim).unwrap();
        handle
            .set(&path("/Cube"), &Token::new("size"), Value::Double(1.0))
            .unwrap();
        assert!(handle.with(|store| store.is_unacknowledged(&path("/Cube"))));

        // An acknowledge becomes a zero-field frame at its sequence.
        let ack = Event::Acknowledge(AcknowledgeEvent {
            layer: "l".into(),
            paths: vec![path("/Cube")],
            sequence: 1,
        });
        engine.inner.on_frame(&EventCodec::encode(&ack).unwrap());
        engine.tick();
        assert!(handle.with(|store| !store.is_unacknowledged(&path("/Cube"))));

        // History flips the live flag.
        let mut notices = engine.subscribe();
        engine
            .inner
            .on_frame(&EventCodec::encode(&Event::History(HistoryEvent {})).unwrap());
        assert!(matches!(
            notices.try_recv(),
            Ok(Notice::LiveConnectionChanged(true))
        ));

        // Reload clears remote bookkeeping and notifies.
        let reload = Event::Reload(ReloadEvent {
            layer: "l".into(),
            sequence: Some(2),
        });
        engine.inner.on_frame(&EventCodec::encode(&reload).unwrap());
        assert!(matches!(
            notices.try_recv(),
            Ok(Notice::LayerReloaded { layer }) if layer == "l"
        ));
        assert_eq!(handle.sequence(), 0);
    }

    #[test]
    fn undecodable_and_unsequenced_frames_are_dropped() {
        let engine = engine();
        let handle = engine.register_layer("l");
        handle.on_loaded();

        engine.inner.on_frame("definitely not json");
        engine.inner.on_frame(
            r#"{"event":"Delta::Event","body":{"layer":"l","user":"u","updates":[]}}"#,
        );
        assert!(!engine.tick());
        assert_eq!(handle.sequence(), 0);
    }

    #[test]
    fn session_state_defaults_to_disconnected() {
        let engine = engine();
        assert_eq!(engine.session_state(), SessionState::Disconnected);
        assert!(!engine.is_connected());
        // Disconnecting without a session is a no-op.
        engine.disconnect();
    }
}
