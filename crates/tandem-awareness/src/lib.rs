//! Tandem Awareness - ephemeral presence for collaborative sessions
//!
//! Every replica owns one [`Awareness`] store holding a JSON state per
//! client (cursor, user name, selection). Stores converge by exchanging
//! clock-stamped updates; a [`PresenceReaper`] evicts clients that stop
//! sending them.
//!
//! ```no_run
//! use tandem_awareness::{Awareness, Origin};
//! use tandem_core::Value;
//!
//! let mut alice = Awareness::new(1);
//! let mut bob = Awareness::new(2);
//!
//! alice.set_local_state(Some(Value::from_json(r#"{"name":"alice"}"#)?));
//! let update = alice.encode_awareness_update(&[1])?;
//! bob.apply_awareness_update(&update, Origin::peer("alice"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod reaper;
pub mod store;
pub mod wire;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AwarenessConfig, DEFAULT_OUTDATED_TIMEOUT_MS};
pub use error::{AwarenessError, Result};
pub use event::{
    AwarenessChanges, AwarenessEvent, EventEmitter, Origin, SubscriptionId, Topic,
};
pub use reaper::{sweep, PresenceReaper, ReaperState, Sweep};
pub use store::{Awareness, ClientMeta, SharedAwareness};
pub use wire::{decode_update, encode_update, is_awareness_disconnect_message, AwarenessEntry};
