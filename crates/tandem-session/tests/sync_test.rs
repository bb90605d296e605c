//! Two rooms linked by a pair of sessions, with an in-memory "wire"

use std::sync::Arc;
use std::time::Duration;

use tandem_core::{Document, DocumentId, Value};
use tandem_session::{Broadcast, Room, Session, SyncState};
use tokio::sync::broadcast;

fn room(client_id: u64) -> Arc<Room> {
    let doc = Document::with_client_id(DocumentId::new("notes:1").unwrap(), client_id);
    Arc::new(Room::with_document("notes:1", doc))
}

/// Deliver `outgoing` to `to`, then bounce replies between the two sessions
/// until neither has anything left to say
fn exchange(mut outgoing: Vec<Vec<u8>>, to: &mut Session, back: &mut Session) {
    let mut receiver = to;
    let mut sender = back;
    while !outgoing.is_empty() {
        let mut replies = Vec::new();
        for message in &outgoing {
            replies.extend(receiver.process(message).unwrap());
        }
        outgoing = replies;
        std::mem::swap(&mut receiver, &mut sender);
    }
}

/// Send every pending broadcast of `local`'s room to the remote side
fn forward(
    rx: &mut broadcast::Receiver<Broadcast>,
    local: &mut Session,
    remote: &mut Session,
) -> usize {
    let mut sent = 0;
    while let Ok(broadcast) = rx.try_recv() {
        if local.should_forward(&broadcast) {
            exchange(vec![broadcast.message], remote, local);
            sent += 1;
        }
    }
    sent
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_handshake_converges_documents() {
    let room_a = room(1);
    let room_b = room(2);
    room_a.document().replace_text("hello from a").unwrap();

    // ab: room A's session for peer b; ba: room B's session for peer a
    let mut ab = Session::new("b", room_a.clone());
    let mut ba = Session::new("a", room_b.clone());

    let greeting = ab.open().unwrap();
    exchange(greeting, &mut ba, &mut ab);

    assert_eq!(room_b.document().text().unwrap(), "hello from a");
    assert_eq!(ab.sync_state(), SyncState::Synced);
    assert_eq!(ba.sync_state(), SyncState::Synced);
}

#[tokio::test]
async fn test_live_updates_after_sync() {
    let room_a = room(1);
    let room_b = room(2);
    let mut ab = Session::new("b", room_a.clone());
    let mut ba = Session::new("a", room_b.clone());
    let mut rx_a = ab.subscribe();
    let mut rx_b = ba.subscribe();

    let greeting = ab.open().unwrap();
    exchange(greeting, &mut ba, &mut ab);

    let update = room_a.document().replace_text("draft").unwrap();
    room_a.publish_update(&update);
    assert_eq!(forward(&mut rx_a, &mut ab, &mut ba), 1);
    assert_eq!(room_b.document().text().unwrap(), "draft");

    // B relayed the update with origin "a", so it is not echoed back
    assert_eq!(forward(&mut rx_b, &mut ba, &mut ab), 0);

    let update = room_b.document().replace_text("final").unwrap();
    room_b.publish_update(&update);
    forward(&mut rx_b, &mut ba, &mut ab);
    assert_eq!(room_a.document().text().unwrap(), "final");
}

#[tokio::test]
async fn test_awareness_propagates_and_is_removed_on_close() {
    let room_a = room(1);
    let room_b = room(2);
    let mut ab = Session::new("b", room_a.clone());
    let mut ba = Session::new("a", room_b.clone());
    let mut rx_a = ab.subscribe();
    let mut rx_b = ba.subscribe();

    let alice = Value::from_json(r#"{"name":"alice","cursor":3}"#).unwrap();
    room_a.awareness().lock().set_local_state(Some(alice.clone()));
    settle().await;
    assert_eq!(forward(&mut rx_a, &mut ab, &mut ba), 1);

    assert_eq!(room_b.awareness().lock().get_state(1), Some(&alice));
    assert_eq!(room_b.controlled_clients("a"), vec![1]);

    // B re-broadcasts with origin "a" and must not echo it to a
    settle().await;
    assert_eq!(forward(&mut rx_b, &mut ba, &mut ab), 0);

    ba.close().unwrap();
    let store = room_b.awareness().lock();
    assert!(store.get_state(1).is_none());
    assert!(store.get_meta(1).is_some());
}

#[tokio::test]
async fn test_late_joiner_receives_presence_in_greeting() {
    let room_a = room(1);
    let room_b = room(2);
    room_a
        .awareness()
        .lock()
        .set_local_state(Some(Value::from_json(r#"{"name":"alice"}"#).unwrap()));

    let mut ab = Session::new("b", room_a.clone());
    let mut ba = Session::new("a", room_b.clone());
    let greeting = ab.open().unwrap();
    assert_eq!(greeting.len(), 2);
    exchange(greeting, &mut ba, &mut ab);

    assert!(room_b.awareness().lock().get_state(1).is_some());
}
