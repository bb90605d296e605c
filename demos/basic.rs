//! Basic Tandem Example
//!
//! Two rooms, linked by a pair of sessions over an in-memory wire, share a
//! text document and presence. A reaper then evicts the remote user once they
//! stop sending heartbeats.
//!
//! Run with: RUST_LOG=debug cargo run --example basic

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tandem_awareness::{Awareness, AwarenessConfig, PresenceReaper, Topic};
use tandem_core::{Document, DocumentId, Value};
use tandem_session::{Broadcast, Room, Session};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Tandem Basic Example\n");

    let id = DocumentId::new("notes:shopping")?;
    let config = AwarenessConfig::default().with_outdated_timeout(Duration::from_millis(500));

    let doc_a = Document::with_client_id(id.clone(), 1);
    let doc_b = Document::with_client_id(id.clone(), 2);
    let room_a = Arc::new(Room::new(
        "alice",
        doc_a,
        Awareness::with_config(1, config.clone())?,
    ));
    let room_b = Arc::new(Room::new("bob", doc_b, Awareness::with_config(2, config)?));

    // Each room has a session for the other side
    let mut to_bob = Session::new("bob", room_a.clone());
    let mut to_alice = Session::new("alice", room_b.clone());
    let mut rx_a = to_bob.subscribe();
    let mut rx_b = to_alice.subscribe();

    println!("=== Document sync ===\n");

    room_a.document().replace_text("milk, eggs")?;
    let greeting = to_bob.open()?;
    exchange(greeting, &mut to_alice, &mut to_bob)?;
    println!("Bob after handshake: {:?}", room_b.document().text()?);

    let update = room_b.document().replace_text("milk, eggs, bread")?;
    room_b.publish_update(&update);
    forward(&mut rx_b, &mut to_alice, &mut to_bob)?;
    println!("Alice after Bob's edit: {:?}", room_a.document().text()?);

    println!("\n=== Presence ===\n");

    room_b.awareness().lock().observe(|event| {
        if event.topic == Topic::Change {
            println!(
                "Bob sees: added={:?} updated={:?} removed={:?} origin={}",
                event.added, event.updated, event.removed, event.origin
            );
        }
    });

    room_a
        .awareness()
        .lock()
        .set_local_state(Some(Value::from_json(r#"{"name":"alice","cursor":0}"#)?));
    settle().await;
    forward(&mut rx_a, &mut to_bob, &mut to_alice)?;

    room_a
        .awareness()
        .lock()
        .set_local_state_field("cursor", Value::from(10i64))?;
    settle().await;
    forward(&mut rx_a, &mut to_bob, &mut to_alice)?;

    println!("\n=== Timeout ===\n");

    // Alice goes quiet; Bob's reaper evicts her after the timeout
    let mut reaper = PresenceReaper::new(room_b.awareness().clone());
    reaper.start()?;
    tokio::time::sleep(Duration::from_millis(800)).await;
    reaper.stop().await?;

    let online: Vec<u64> = room_b.awareness().lock().states().keys().copied().collect();
    println!("Bob's online clients: {:?}", online);

    Ok(())
}

/// Deliver messages, bouncing replies until both sides are quiet
fn exchange(mut outgoing: Vec<Vec<u8>>, to: &mut Session, back: &mut Session) -> Result<()> {
    let mut receiver = to;
    let mut sender = back;
    while !outgoing.is_empty() {
        let mut replies = Vec::new();
        for message in &outgoing {
            replies.extend(receiver.process(message)?);
        }
        outgoing = replies;
        std::mem::swap(&mut receiver, &mut sender);
    }
    Ok(())
}

/// Send pending room broadcasts to the other side
fn forward(
    rx: &mut broadcast::Receiver<Broadcast>,
    local: &mut Session,
    remote: &mut Session,
) -> Result<()> {
    while let Ok(broadcast) = rx.try_recv() {
        if local.should_forward(&broadcast) {
            exchange(vec![broadcast.message], remote, local)?;
        }
    }
    Ok(())
}

/// Let the rooms' awareness pumps run
async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
