//! Session - one peer connection to a room

use std::sync::Arc;
use tandem_awareness::{is_awareness_disconnect_message, Origin};
use tandem_core::{ClientId, Document, DocumentEngine};
use tandem_protocol::sync::{self, apply};
use tandem_protocol::{
    create_awareness_message, create_sync_message, create_update_message, unwrap_outer, Decoder,
    Message, SyncMessage,
};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::{Result, SessionError};
use crate::room::{Broadcast, Room};

/// Progress of the document handshake with the peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Pending,
    /// Our STEP1 is out, waiting for the STEP2 answer
    Step1Sent,
    /// The peer's STEP2 was applied
    Synced,
}

/// Handles the byte stream of a single peer
pub struct Session<E: DocumentEngine = Document> {
    peer_id: String,
    room: Arc<Room<E>>,
    sync_state: SyncState,
    closed: bool,
}

impl<E: DocumentEngine> Session<E> {
    pub fn new(peer_id: impl Into<String>, room: Arc<Room<E>>) -> Self {
        let peer_id = peer_id.into();
        room.join(&peer_id);
        info!(room = room.name(), peer = %peer_id, "Session opened");

        Self {
            peer_id,
            room,
            sync_state: SyncState::Pending,
            closed: false,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn room(&self) -> &Arc<Room<E>> {
        &self.room
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    pub fn is_synced(&self) -> bool {
        self.sync_state == SyncState::Synced
    }

    /// Greeting for a new peer: our STEP1 and, if anyone is known, the full
    /// awareness state
    pub fn open(&mut self) -> Result<Vec<Vec<u8>>> {
        self.ensure_open()?;
        let mut messages = vec![self.step1()?];

        let awareness = self.room.awareness().lock();
        if !awareness.meta().is_empty() {
            messages.push(create_awareness_message(&awareness.encode_full_update()?));
        }
        Ok(messages)
    }

    /// Process a chunk of back-to-back messages from the peer, returning the
    /// replies to send back.
    ///
    /// Stops at the first malformed message; earlier messages stay applied.
    pub fn process(&mut self, data: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.ensure_open()?;
        let mut replies = Vec::new();
        let mut decoder = Decoder::new(data);

        while !decoder.is_empty() {
            let start = decoder.position();
            let message = Message::decode_from(&mut decoder)?;
            let raw = &data[start..decoder.position()];

            match message {
                Message::Sync(sync_message) => self.handle_sync(sync_message, &mut replies)?,
                Message::Awareness(payload) => self.handle_awareness(&payload, raw)?,
            }
        }

        Ok(replies)
    }

    fn handle_sync(&mut self, message: SyncMessage, replies: &mut Vec<Vec<u8>>) -> Result<()> {
        let document = self.room.document();
        match &message {
            SyncMessage::Step1(_) => {
                if let Some(reply) = sync::handle(&message, document)? {
                    replies.push(reply);
                }
                // Answer with our own state so the peer sends what we miss
                if self.sync_state == SyncState::Pending {
                    replies.push(self.step1()?);
                }
            }
            SyncMessage::Step2(update) | SyncMessage::Update(update) => {
                if apply(document, update)? {
                    self.room.relay(&self.peer_id, create_update_message(update));
                }
                if matches!(message, SyncMessage::Step2(_)) {
                    debug!(peer = %self.peer_id, "Document synced");
                    self.sync_state = SyncState::Synced;
                }
            }
        }
        Ok(())
    }

    fn handle_awareness(&mut self, payload: &[u8], raw: &[u8]) -> Result<()> {
        let (own, changes) = {
            let mut awareness = self.room.awareness().lock();
            let changes =
                awareness.apply_awareness_update(payload, Origin::Peer(self.peer_id.clone()))?;
            (awareness.client_id(), changes)
        };

        // Only entries the store took count as the peer's clients
        let online: Vec<ClientId> = changes
            .added
            .iter()
            .chain(&changes.updated)
            .copied()
            .filter(|id| *id != own)
            .collect();
        self.room.track_clients(&self.peer_id, &online, &changes.removed);

        if is_awareness_disconnect_message(unwrap_outer(raw)?)? {
            debug!(peer = %self.peer_id, clients = ?changes.removed, "Peer announced disconnect");
        }
        Ok(())
    }

    fn step1(&mut self) -> Result<Vec<u8>> {
        let message = create_sync_message(self.room.document())?;
        self.sync_state = SyncState::Step1Sent;
        Ok(message)
    }

    /// Broadcasts of the room; pass each through [`Session::should_forward`]
    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.room.subscribe()
    }

    /// Whether a room broadcast must be sent to this peer
    pub fn should_forward(&self, broadcast: &Broadcast) -> bool {
        !self.closed && broadcast.origin.as_deref() != Some(self.peer_id.as_str())
    }

    /// Leave the room and take the peer's awareness clients offline
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;

        let controlled = self.room.leave(&self.peer_id);
        if !controlled.is_empty() {
            self.room
                .awareness()
                .lock()
                .remove_awareness_states(&controlled, Origin::Peer(self.peer_id.clone()));
        }
        info!(room = self.room.name(), peer = %self.peer_id, "Session closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        Ok(())
    }
}

impl<E: DocumentEngine> Drop for Session<E> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

impl<E: DocumentEngine> std::fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer_id", &self.peer_id)
            .field("sync_state", &self.sync_state)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_awareness::encode_update;
    use tandem_core::{DocumentId, Value};
    use tandem_protocol::{frame_awareness, frame_sync, SyncMessageType, EMPTY_UPDATE};

    fn room(client_id: ClientId) -> Arc<Room> {
        let doc = Document::with_client_id(DocumentId::new("session:test").unwrap(), client_id);
        Arc::new(Room::with_document("session:test", doc))
    }

    fn presence(client_id: ClientId, clock: u64, state: Option<&Value>) -> Vec<u8> {
        frame_awareness(&encode_update([(client_id, clock, state)].into_iter()).unwrap())
    }

    #[tokio::test]
    async fn test_open_sends_step1() {
        let room = room(1);
        let mut session = Session::new("b", room.clone());

        let greeting = session.open().unwrap();
        assert_eq!(greeting.len(), 1);
        assert!(matches!(
            Message::decode(&greeting[0]).unwrap(),
            Message::Sync(SyncMessage::Step1(_))
        ));
        assert_eq!(session.sync_state(), SyncState::Step1Sent);

        room.awareness().lock().set_local_state(Some(Value::object()));
        assert_eq!(session.open().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_step1_from_fresh_session_gets_step2_and_step1() {
        let room = room(1);
        let mut session = Session::new("b", room);

        let replies = session.process(&frame_sync(SyncMessageType::Step1, &[0])).unwrap();
        assert_eq!(replies.len(), 2);
        assert!(matches!(
            Message::decode(&replies[0]).unwrap(),
            Message::Sync(SyncMessage::Step2(_))
        ));
        assert!(matches!(
            Message::decode(&replies[1]).unwrap(),
            Message::Sync(SyncMessage::Step1(_))
        ));
    }

    #[tokio::test]
    async fn test_step2_marks_synced_and_skips_empty_relay() {
        let room = room(1);
        let mut rx = room.subscribe();
        let mut session = Session::new("b", room);

        session.process(&frame_sync(SyncMessageType::Step2, &EMPTY_UPDATE)).unwrap();
        assert!(session.is_synced());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_updates_are_relayed_with_origin() {
        let room = room(1);
        let mut rx = room.subscribe();
        let mut session = Session::new("b", room.clone());

        let remote = Document::with_client_id(DocumentId::new("session:test").unwrap(), 2);
        let update = remote.replace_text("hello").unwrap();
        let framed = create_update_message(&update);
        assert!(session.process(&framed).unwrap().is_empty());

        assert_eq!(room.document().text().unwrap(), "hello");
        let broadcast = rx.recv().await.unwrap();
        assert_eq!(broadcast.origin.as_deref(), Some("b"));
        assert!(!session.should_forward(&broadcast));
    }

    #[tokio::test]
    async fn test_awareness_tracking_and_close() {
        let room = room(1);
        let mut session = Session::new("b", room.clone());

        let state = Value::object();
        let mut stream = presence(7, 1, Some(&state));
        stream.extend(presence(8, 1, Some(&state)));
        session.process(&stream).unwrap();
        assert_eq!(room.controlled_clients("b"), vec![7, 8]);

        session.process(&presence(8, 2, None)).unwrap();
        assert_eq!(room.controlled_clients("b"), vec![7]);

        session.close().unwrap();
        assert!(room.awareness().lock().states().is_empty());
        assert!(matches!(session.close(), Err(SessionError::Closed)));
        assert!(matches!(session.process(&[]), Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn test_stale_claim_does_not_take_over_client() {
        let room = room(1);
        let mut owner = Session::new("c", room.clone());
        let mut other = Session::new("b", room.clone());

        let state = Value::object();
        owner.process(&presence(9, 5, Some(&state))).unwrap();
        assert_eq!(room.controlled_clients("c"), vec![9]);

        // Replay of an older write for client 9 is ignored by the store
        other.process(&presence(9, 1, Some(&state))).unwrap();
        assert_eq!(room.awareness().lock().get_meta(9).map(|m| m.clock), Some(5));
        assert!(room.controlled_clients("b").is_empty());

        other.close().unwrap();
        assert!(room.awareness().lock().get_state(9).is_some());
        assert_eq!(room.controlled_clients("c"), vec![9]);
    }

    #[tokio::test]
    async fn test_rejected_removal_is_sent_back_to_sender() {
        let room = room(1);
        room.awareness().lock().set_local_state(Some(Value::object()));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let mut rx = room.subscribe();
        let mut session = Session::new("b", room.clone());
        session.process(&presence(1, 3, None)).unwrap();

        let broadcast = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(session.should_forward(&broadcast));
        match Message::decode(&broadcast.message).unwrap() {
            Message::Awareness(payload) => {
                let entries = tandem_awareness::decode_update(&payload).unwrap();
                assert_eq!(entries.len(), 1);
                assert_eq!((entries[0].client_id, entries[0].clock), (1, 4));
                assert!(entries[0].state.is_some());
            }
            other => panic!("expected awareness message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_peer_cannot_remove_room_client() {
        let room = room(1);
        room.awareness().lock().set_local_state(Some(Value::object()));
        let mut session = Session::new("b", room.clone());

        session.process(&presence(1, 0, None)).unwrap();
        assert!(room.awareness().lock().get_local_state().is_some());
        assert!(room.controlled_clients("b").is_empty());
    }

    #[tokio::test]
    async fn test_malformed_message_is_an_error() {
        let room = room(1);
        let mut session = Session::new("b", room);
        assert!(matches!(
            session.process(&[0x07, 0x00]),
            Err(SessionError::Protocol(_))
        ));
    }
}
