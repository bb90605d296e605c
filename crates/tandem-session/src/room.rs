//! Room - a shared document and awareness store with connected peers

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tandem_awareness::{Awareness, AwarenessEvent, Origin, SharedAwareness, SubscriptionId, Topic};
use tandem_core::{ClientId, Document, DocumentEngine};
use tandem_protocol::{create_awareness_message, create_update_message};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capacity of the room's broadcast channel
const BROADCAST_CAPACITY: usize = 1024;

/// A framed message to be sent to every peer but `origin`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    /// Peer the message came from; `None` for local changes
    pub origin: Option<String>,
    pub message: Vec<u8>,
}

/// A document, its awareness store and the peers connected to them.
///
/// Accepted awareness writes are re-broadcast to peers by a background task,
/// so a room must be created inside a tokio runtime.
pub struct Room<E: DocumentEngine = Document> {
    name: String,
    document: E,
    awareness: SharedAwareness,
    sender: broadcast::Sender<Broadcast>,
    /// Awareness client ids each peer has announced
    peers: DashMap<String, HashSet<ClientId>>,
    subscription: SubscriptionId,
    pump: JoinHandle<()>,
}

impl<E: DocumentEngine> Room<E> {
    /// Room with an empty awareness store owned by the document's client
    pub fn with_document(name: impl Into<String>, document: E) -> Self {
        let awareness = Awareness::for_document(&document);
        Self::new(name, document, awareness)
    }

    pub fn new(name: impl Into<String>, document: E, awareness: Awareness) -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let subscription = awareness.observe(move |event| {
            if event.topic == Topic::Update {
                let _ = event_tx.send(event.clone());
            }
        });
        let awareness = awareness.into_shared();
        let pump = tokio::spawn(pump_awareness(awareness.clone(), sender.clone(), event_rx));

        Self {
            name: name.into(),
            document,
            awareness,
            sender,
            peers: DashMap::new(),
            subscription,
            pump,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn document(&self) -> &E {
        &self.document
    }

    pub fn awareness(&self) -> &SharedAwareness {
        &self.awareness
    }

    /// Receive every broadcast of this room
    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.sender.subscribe()
    }

    /// Send a local document update to every peer
    pub fn publish_update(&self, update: &[u8]) {
        self.send(None, create_update_message(update));
    }

    /// Forward a message received from `origin` to the other peers
    pub fn relay(&self, origin: &str, message: Vec<u8>) {
        self.send(Some(origin.to_string()), message);
    }

    fn send(&self, origin: Option<String>, message: Vec<u8>) {
        // No receivers is not an error: nobody is connected yet
        let _ = self.sender.send(Broadcast { origin, message });
    }

    pub fn join(&self, peer_id: &str) {
        self.peers.entry(peer_id.to_string()).or_default();
        debug!(room = %self.name, peer = peer_id, "Peer joined");
    }

    /// Forget `peer_id`, returning the awareness clients it controlled
    pub fn leave(&self, peer_id: &str) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self
            .peers
            .remove(peer_id)
            .map(|(_, ids)| ids.into_iter().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        debug!(room = %self.name, peer = peer_id, clients = ?ids, "Peer left");
        ids
    }

    /// Record which awareness clients `peer_id` announced or withdrew
    pub fn track_clients(&self, peer_id: &str, online: &[ClientId], offline: &[ClientId]) {
        let mut entry = self.peers.entry(peer_id.to_string()).or_default();
        entry.extend(online.iter().copied());
        for id in offline {
            entry.remove(id);
        }
    }

    /// Awareness clients announced by `peer_id`
    pub fn controlled_clients(&self, peer_id: &str) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self
            .peers
            .get(peer_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

impl<E: DocumentEngine> Drop for Room<E> {
    fn drop(&mut self) {
        self.awareness.lock().unobserve(self.subscription);
        self.pump.abort();
    }
}

impl<E: DocumentEngine> std::fmt::Debug for Room<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("name", &self.name)
            .field("peers", &self.peers.len())
            .finish()
    }
}

/// Re-broadcast the clients touched by each awareness `update` event
async fn pump_awareness(
    awareness: SharedAwareness,
    sender: broadcast::Sender<Broadcast>,
    mut events: mpsc::UnboundedReceiver<AwarenessEvent>,
) {
    while let Some(event) = events.recv().await {
        let ids: Vec<ClientId> = event
            .added
            .iter()
            .chain(&event.updated)
            .chain(&event.removed)
            .copied()
            .collect();

        let encoded = awareness.lock().encode_awareness_update(&ids);
        match encoded {
            Ok(payload) => {
                let origin = match event.origin {
                    Origin::Peer(peer) => Some(peer),
                    Origin::Local | Origin::Timeout => None,
                };
                let _ = sender.send(Broadcast {
                    origin,
                    message: create_awareness_message(&payload),
                });
            }
            Err(e) => warn!(error = %e, "Failed to encode awareness update"),
        }
    }
}
