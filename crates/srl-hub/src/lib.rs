// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use axum::{
    Router,
    extract::{
        Path as AxPath, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use srl_protocol::{AcknowledgeEvent, DeltaEvent, Event, EventCodec, HistoryEvent, ReloadEvent};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

struct Connection {
    id: Uuid,
    user: String,
    outbound: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct Channel {
    connections: Vec<Connection>,
    history: BTreeMap<String, Vec<DeltaEvent>>,
}

impl Channel {
    /// The next per-layer sequence: 1-based over the stored history.
    fn next_sequence(&self, layer: &str) -> u64 {
        self.history.get(layer).map_or(0, Vec::len) as u64 + 1
    }

    /// Queue a frame for every connection except `sender`.
    fn broadcast_except(&self, sender: Uuid, frame: &str) {
        for connection in &self.connections {
            if connection.id == sender {
                continue;
            }
            let _ = connection.outbound.send(frame.to_string());
        }
    }

    /// Queue a frame for one connection.
    fn send_to(&self, target: Uuid, frame: &str) {
        if let Some(connection) = self.connections.iter().find(|c| c.id == target) {
            let _ = connection.outbound.send(frame.to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// All channel state of one hub process, guarded by a single mutex.
///
/// History lives in memory only; a restart or a reload starts the
/// affected layers from sequence 1 again.
pub struct Hub {
    channels: Mutex<HashMap<String, Channel>>,
    anonymous_counter: AtomicU64,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    /// An empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            anonymous_counter: AtomicU64::new(0),
        }
    }

    fn anonymous_user(&self) -> String {
        let n = self.anonymous_counter.fetch_add(1, Ordering::Relaxed);
        format!("anonymous-{n}")
    }

    /// Register a connection with a channel, creating the channel on
    /// first join, and queue the channel's history followed by the
    /// replay terminator.
    fn join(
        &self,
        channel_name: &str,
        user: &str,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Uuid {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let channel = channels.entry(channel_name.to_string()).or_insert_with(|| {
            info!(channel = channel_name, "created channel");
            Channel::default()
        });

        info!(user, channel = channel_name, "user joined");
        let id = Uuid::new_v4();
        channel.connections.push(Connection {
            id,
            user: user.to_string(),
            outbound: outbound.clone(),
        });

        for deltas in channel.history.values() {
            for delta in deltas {
                match EventCodec::encode(&Event::Delta(delta.clone())) {
                    Ok(frame) => {
                        let _ = outbound.send(frame);
                    }
                    Err(err) => warn!(error = %err, "failed to encode history entry"),
                }
            }
        }
        if let Ok(frame) = EventCodec::encode(&Event::History(HistoryEvent {})) {
            let _ = outbound.send(frame);
        }

        Self::log_stats(&channels);
        id
    }

    /// Remove a connection; the last one leaving destroys the channel.
    fn leave(&self, channel_name: &str, connection: Uuid) {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(channel) = channels.get_mut(channel_name) else {
            warn!(channel = channel_name, "disconnect from non-existent channel");
            return;
        };

        if let Some(index) = channel.connections.iter().position(|c| c.id == connection) {
            let gone = channel.connections.remove(index);
            info!(user = %gone.user, channel = channel_name, "user left");
        }
        if channel.connections.is_empty() {
            channels.remove(channel_name);
            info!(channel = channel_name, "removed channel");
        }

        Self::log_stats(&channels);
    }

    /// Handle one inbound text frame from a connection.
    fn on_message(&self, channel_name: &str, connection: Uuid, text: &str) {
        let event = match EventCodec::decode(text) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "dropping undecodable frame");
                return;
            }
        };

        match event {
            Event::Delta(delta) => self.on_delta(channel_name, connection, delta),
            Event::Reload(reload) => self.on_reload(channel_name, connection, reload),
            // Only clients receive history and acknowledges.
            Event::History(_) | Event::Acknowledge(_) => {}
        }
    }

    fn on_delta(&self, channel_name: &str, connection: Uuid, delta: DeltaEvent) {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(channel) = channels.get_mut(channel_name) else {
            warn!(channel = channel_name, "delta from non-existent channel");
            return;
        };

        let sequence = channel.next_sequence(&delta.layer);
        let mut acknowledged = delta;
        acknowledged.sequence = Some(sequence);

        let layer = acknowledged.layer.clone();
        let paths = acknowledged.paths();

        match EventCodec::encode(&Event::Delta(acknowledged.clone())) {
            Ok(frame) => channel.broadcast_except(connection, &frame),
            Err(err) => warn!(error = %err, layer = %layer, "failed to encode delta broadcast"),
        }
        channel
            .history
            .entry(layer.clone())
            .or_default()
            .push(acknowledged);

        let ack = Event::Acknowledge(AcknowledgeEvent {
            layer,
            paths,
            sequence,
        });
        match EventCodec::encode(&ack) {
            Ok(frame) => channel.send_to(connection, &frame),
            Err(err) => warn!(error = %err, "failed to encode acknowledge"),
        }
    }

    fn on_reload(&self, channel_name: &str, connection: Uuid, reload: ReloadEvent) {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(channel) = channels.get_mut(channel_name) else {
            warn!(channel = channel_name, "reload from non-existent channel");
            return;
        };

        let sequence = channel.next_sequence(&reload.layer);
        let mut acknowledged = reload;
        acknowledged.sequence = Some(sequence);

        channel.history.remove(&acknowledged.layer);
        info!(layer = %acknowledged.layer, channel = channel_name, "cleared layer history");

        match EventCodec::encode(&Event::Reload(acknowledged)) {
            Ok(frame) => channel.broadcast_except(connection, &frame),
            Err(err) => warn!(error = %err, "failed to encode reload broadcast"),
        }
    }

    fn log_stats(channels: &HashMap<String, Channel>) {
        for (name, channel) in channels {
            let layers: Vec<String> = channel
                .history
                .iter()
                .map(|(layer, deltas)| format!("(name: {layer}, history: {})", deltas.len()))
                .collect();
            debug!(
                channel = name,
                connections = channel.connections.len(),
                layers = layers.join(", "),
                "channel stats"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Websocket plumbing
// ---------------------------------------------------------------------------

/// Build the hub router: `GET /{channel}` upgrades to a websocket.
pub fn router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/{channel}", get(ws_handler))
        .with_state(hub)
}

async fn ws_handler(
    AxPath(channel): AxPath<String>,
    Query(params): Query<HashMap<String, String>>,
    State(hub): State<Arc<Hub>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let user = params
        .get("user")
        .cloned()
        .unwrap_or_else(|| hub.anonymous_user());
    ws.on_upgrade(move |socket| handle_socket(hub, channel, user, socket))
}

async fn handle_socket(hub: Arc<Hub>, channel: String, user: String, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut inbound) = mpsc::unbounded_channel::<String>();
    let id = hub.join(&channel, &user, outbound);

    // Single writer per connection: one task drains the queue.
    let writer = tokio::spawn(async move {
        while let Some(frame) = inbound.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => hub.on_message(&channel, id, text.as_str()),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    hub.leave(&channel, id);
    writer.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use srl_core::{ScenePath, SpecData, SpecType, Token, Value};
    use std::collections::BTreeMap as Map;

    fn delta(layer: &str, path: &str, key: &str, value: Value) -> DeltaEvent {
        let mut spec = SpecData::new(SpecType::Prim);
        spec.set_field(Token::new(key), value);
        let mut updates = Map::new();
        updates.insert(ScenePath::new(path).unwrap(), spec);
        DeltaEvent::unsequenced(layer, "tester", updates)
    }

    fn join(hub: &Hub, channel: &str, user: &str) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (hub.join(channel, user, tx), rx)
    }

    fn next_event(rx: &mut mpsc::UnboundedReceiver<String>) -> Event {
        let frame = rx.try_recv().expect("expected a queued frame");
        EventCodec::decode(&frame).expect("queued frame must decode")
    }

    #[test]
    fn sequences_are_per_layer_and_one_based() {
        let hub = Hub::new();
        let (a, mut rx_a) = join(&hub, "c", "a");
        assert!(matches!(next_event(&mut rx_a), Event::History(_)));

        hub.on_delta("c", a, delta("l1", "/X", "f", Value::Int(1)));
        hub.on_delta("c", a, delta("l1", "/X", "f", Value::Int(2)));
        hub.on_delta("c", a, delta("l2", "/X", "f", Value::Int(3)));

        let sequences: Vec<u64> = (0..3)
            .map(|_| match next_event(&mut rx_a) {
                Event::Acknowledge(ack) => ack.sequence,
                other => panic!("expected acknowledge, got {other:?}"),
            })
            .collect();
        assert_eq!(sequences, vec![1, 2, 1]);
    }

    #[test]
    fn sender_gets_acknowledge_not_echo() {
        let hub = Hub::new();
        let (a, mut rx_a) = join(&hub, "c", "a");
        let (_b, mut rx_b) = join(&hub, "c", "b");
        assert!(matches!(next_event(&mut rx_a), Event::History(_)));
        assert!(matches!(next_event(&mut rx_b), Event::History(_)));

        hub.on_delta("c", a, delta("l", "/Cube", "active", Value::Bool(true)));

        // The sender sees exactly one acknowledge with the path set.
        match next_event(&mut rx_a) {
            Event::Acknowledge(ack) => {
                assert_eq!(ack.layer, "l");
                assert_eq!(ack.sequence, 1);
                assert_eq!(ack.paths, vec![ScenePath::new("/Cube").unwrap()]);
            }
            other => panic!("expected acknowledge, got {other:?}"),
        }
        assert!(rx_a.try_recv().is_err());

        // The peer sees the sequenced delta.
        match next_event(&mut rx_b) {
            Event::Delta(delta) => assert_eq!(delta.sequence, Some(1)),
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[test]
    fn joiner_replays_history_in_order_then_terminator() {
        let hub = Hub::new();
        let (a, mut rx_a) = join(&hub, "c", "a");
        let _ = next_event(&mut rx_a);
        for value in 1..=3 {
            hub.on_delta("c", a, delta("l", "/X", "f", Value::Int(value)));
        }

        let (_c, mut rx_c) = join(&hub, "c", "c");
        for expected in 1..=3u64 {
            match next_event(&mut rx_c) {
                Event::Delta(delta) => assert_eq!(delta.sequence, Some(expected)),
                other => panic!("expected delta, got {other:?}"),
            }
        }
        assert!(matches!(next_event(&mut rx_c), Event::History(_)));
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn reload_clears_history_and_broadcasts() {
        let hub = Hub::new();
        let (a, mut rx_a) = join(&hub, "c", "a");
        let (_b, mut rx_b) = join(&hub, "c", "b");
        let _ = next_event(&mut rx_a);
        let _ = next_event(&mut rx_b);

        hub.on_delta("c", a, delta("l", "/X", "f", Value::Int(1)));
        hub.on_reload(
            "c",
            a,
            ReloadEvent {
                layer: "l".into(),
                sequence: None,
            },
        );

        // Peer: the delta, then the sequenced reload.
        assert!(matches!(next_event(&mut rx_b), Event::Delta(_)));
        match next_event(&mut rx_b) {
            Event::Reload(reload) => assert_eq!(reload.sequence, Some(2)),
            other => panic!("expected reload, got {other:?}"),
        }

        // A fresh joiner sees no history for the layer.
        let (_c, mut rx_c) = join(&hub, "c", "c");
        assert!(matches!(next_event(&mut rx_c), Event::History(_)));

        // Numbering starts over after the reload.
        hub.on_delta("c", a, delta("l", "/X", "f", Value::Int(2)));
        let _ack = next_event(&mut rx_a);
        match next_event(&mut rx_a) {
            Event::Acknowledge(ack) => assert_eq!(ack.sequence, 1),
            other => panic!("expected acknowledge, got {other:?}"),
        }
    }

    #[test]
    fn client_only_events_are_ignored() {
        let hub = Hub::new();
        let (a, mut rx_a) = join(&hub, "c", "a");
        let _ = next_event(&mut rx_a);

        hub.on_message("c", a, r#"{"event":"History::Event","body":{}}"#);
        hub.on_message(
            "c",
            a,
            r#"{"event":"Acknowledge::Event","body":{"layer":"l","paths":[],"sequence":1}}"#,
        );
        hub.on_message("c", a, "garbage");
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn last_connection_leaving_destroys_channel() {
        let hub = Hub::new();
        let (a, _rx_a) = join(&hub, "c", "a");
        hub.leave("c", a);

        let channels = hub.channels.lock().unwrap();
        assert!(channels.is_empty());
    }
}
