//! Change notifications
//!
//! Observers subscribe to an [`EventEmitter`] owned by a store and get back a
//! [`SubscriptionId`] to unsubscribe with.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tandem_core::ClientId;
use uuid::Uuid;

/// Handle returned by [`EventEmitter::observe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Registry of callbacks for events of type `E`
pub struct EventEmitter<E> {
    subscribers: Mutex<Vec<(SubscriptionId, Callback<E>)>>,
}

impl<E> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn observe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    /// Returns false if `id` was not subscribed
    pub fn unobserve(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub, _)| *sub != id);
        subscribers.len() != before
    }

    /// Call every subscriber in subscription order
    pub fn emit(&self, event: &E) {
        // Callbacks may (un)subscribe, so don't hold the lock while calling them
        let callbacks: Vec<Callback<E>> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("subscribers", &self.len())
            .finish()
    }
}

/// Which stream an awareness event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A state was added, removed or actually changed value
    Change,
    /// Any accepted write, heartbeats included
    Update,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Change => f.write_str("change"),
            Topic::Update => f.write_str("update"),
        }
    }
}

/// Where a write came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// This replica's own API calls
    Local,
    /// Eviction by the presence reaper
    Timeout,
    /// An update received from the named peer
    Peer(String),
}

impl Origin {
    pub fn peer(id: impl Into<String>) -> Self {
        Origin::Peer(id.into())
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Local => f.write_str("local"),
            Origin::Timeout => f.write_str("timeout"),
            Origin::Peer(id) => write!(f, "peer:{}", id),
        }
    }
}

/// Client ids touched by one batch of writes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwarenessChanges {
    pub added: Vec<ClientId>,
    /// Every accepted write to a present client
    pub updated: Vec<ClientId>,
    /// Subset of `updated` whose value actually differs
    pub filtered_updated: Vec<ClientId>,
    pub removed: Vec<ClientId>,
}

impl AwarenessChanges {
    /// True when a `change` event is due
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.filtered_updated.is_empty() && self.removed.is_empty())
    }

    /// True when an `update` event is due
    pub fn has_updates(&self) -> bool {
        !(self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty())
    }

    /// All ids worth re-broadcasting: added, updated then removed
    pub fn touched(&self) -> Vec<ClientId> {
        self.added
            .iter()
            .chain(&self.updated)
            .chain(&self.removed)
            .copied()
            .collect()
    }
}

/// Payload passed to awareness observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwarenessEvent {
    pub topic: Topic,
    pub added: Vec<ClientId>,
    /// `filtered_updated` for [`Topic::Change`], `updated` for [`Topic::Update`]
    pub updated: Vec<ClientId>,
    pub removed: Vec<ClientId>,
    pub origin: Origin,
}

impl AwarenessEvent {
    pub fn change(changes: &AwarenessChanges, origin: Origin) -> Self {
        Self {
            topic: Topic::Change,
            added: changes.added.clone(),
            updated: changes.filtered_updated.clone(),
            removed: changes.removed.clone(),
            origin,
        }
    }

    pub fn update(changes: &AwarenessChanges, origin: Origin) -> Self {
        Self {
            topic: Topic::Update,
            added: changes.added.clone(),
            updated: changes.updated.clone(),
            removed: changes.removed.clone(),
            origin,
        }
    }
}
