//! Tandem Session - rooms and peer connections
//!
//! A [`Room`] couples a document with its awareness store. Each connected
//! peer gets a [`Session`] that runs the sync handshake, merges awareness
//! updates and relays accepted changes to the other peers of the room.
//!
//! The transport is left to the caller: feed received bytes to
//! [`Session::process`], write back the replies, and forward room broadcasts
//! accepted by [`Session::should_forward`].

pub mod error;
pub mod room;
pub mod session;

pub use error::{Result, SessionError};
pub use room::{Broadcast, Room};
pub use session::{Session, SyncState};
