//! Awareness store
//!
//! A last-writer-wins map of ephemeral per-client state. Every client has a
//! clock that only its owner advances; a remote write is accepted when it
//! carries a newer clock. Removed clients keep their metadata as a tombstone
//! so stale re-additions are rejected.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tandem_core::{ClientId, DocumentEngine, Value};
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::config::AwarenessConfig;
use crate::error::Result;
use crate::event::{AwarenessChanges, AwarenessEvent, EventEmitter, Origin, SubscriptionId};
use crate::wire::{self, AwarenessEntry};

/// Store shared between a connection handler and the presence reaper
pub type SharedAwareness = Arc<Mutex<Awareness>>;

/// Clock and timestamp of the last accepted write for a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientMeta {
    pub clock: u64,
    /// Milliseconds, as reported by the store's [`Clock`]
    pub last_updated: u64,
}

/// Presence state of every known client.
///
/// Observers are called synchronously from the mutating method, so a
/// callback must not lock the [`SharedAwareness`] it was registered on.
pub struct Awareness {
    client_id: ClientId,
    config: AwarenessConfig,
    meta: HashMap<ClientId, ClientMeta>,
    states: HashMap<ClientId, Value>,
    events: EventEmitter<AwarenessEvent>,
    clock: Arc<dyn Clock>,
}

impl Awareness {
    /// Empty store with the default configuration
    pub fn new(client_id: ClientId) -> Self {
        Self::empty(client_id, AwarenessConfig::default(), Arc::new(SystemClock))
    }

    /// Empty store using the document's client id
    pub fn for_document<E: DocumentEngine>(engine: &E) -> Self {
        Self::new(engine.client_id())
    }

    pub fn with_config(client_id: ClientId, config: AwarenessConfig) -> Result<Self> {
        Self::with_clock(client_id, config, Arc::new(SystemClock))
    }

    /// Store reading time from `clock`. The configured initial state, if
    /// any, becomes the first local write.
    pub fn with_clock(
        client_id: ClientId,
        config: AwarenessConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let initial_state = config.initial_state.clone();
        let mut awareness = Self::empty(client_id, config, clock);
        if initial_state.is_some() {
            awareness.set_local_state(initial_state);
        }
        Ok(awareness)
    }

    fn empty(client_id: ClientId, config: AwarenessConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            client_id,
            config,
            meta: HashMap::new(),
            states: HashMap::new(),
            events: EventEmitter::new(),
            clock,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn config(&self) -> &AwarenessConfig {
        &self.config
    }

    pub fn outdated_timeout(&self) -> Duration {
        self.config.outdated_timeout()
    }

    /// Current time according to the store's clock
    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Present clients only
    pub fn states(&self) -> &HashMap<ClientId, Value> {
        &self.states
    }

    /// Every client ever seen, tombstones included
    pub fn meta(&self) -> &HashMap<ClientId, ClientMeta> {
        &self.meta
    }

    pub fn get_state(&self, client_id: ClientId) -> Option<&Value> {
        self.states.get(&client_id)
    }

    pub fn get_meta(&self, client_id: ClientId) -> Option<&ClientMeta> {
        self.meta.get(&client_id)
    }

    pub fn get_local_state(&self) -> Option<&Value> {
        self.states.get(&self.client_id)
    }

    /// Ids of every known client, sorted
    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.meta.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Replace the local state; `None` marks this client offline.
    ///
    /// Every call advances the local clock, including writes of an unchanged
    /// value, and emits an `update` event.
    pub fn set_local_state(&mut self, state: Option<Value>) -> AwarenessChanges {
        let client_id = self.client_id;
        let clock = self.meta.get(&client_id).map_or(0, |m| m.clock.saturating_add(1));
        let now = self.now();

        let prev = match state {
            Some(value) => self.states.insert(client_id, value),
            None => self.states.remove(&client_id),
        };
        self.meta.insert(
            client_id,
            ClientMeta {
                clock,
                last_updated: now,
            },
        );

        let mut changes = AwarenessChanges::default();
        match (prev, self.states.get(&client_id)) {
            (None, Some(_)) => changes.added.push(client_id),
            (Some(_), None) => changes.removed.push(client_id),
            (Some(prev), Some(curr)) => {
                changes.updated.push(client_id);
                if prev != *curr {
                    changes.filtered_updated.push(client_id);
                }
            }
            (None, None) => {}
        }

        trace!(client_id, clock, "Local awareness write");
        if changes.has_changes() {
            self.events.emit(&AwarenessEvent::change(&changes, Origin::Local));
        }
        self.events.emit(&AwarenessEvent::update(&changes, Origin::Local));
        changes
    }

    /// Set one field of the local state, addressed by a dotted path such as
    /// `cursor.anchor`. Does nothing while there is no local state.
    pub fn set_local_state_field(&mut self, path: &str, value: Value) -> Result<()> {
        let Some(mut state) = self.get_local_state().cloned() else {
            return Ok(());
        };
        state.set_path(path, value)?;
        self.set_local_state(Some(state));
        Ok(())
    }

    /// Drop the states of `client_ids`. Metadata is kept as a tombstone; the
    /// local clock is advanced when the local client is among them.
    pub fn remove_awareness_states(
        &mut self,
        client_ids: &[ClientId],
        origin: Origin,
    ) -> AwarenessChanges {
        let now = self.now();
        let mut changes = AwarenessChanges::default();

        for &client_id in client_ids {
            if self.states.remove(&client_id).is_none() {
                continue;
            }
            if client_id == self.client_id {
                if let Some(meta) = self.meta.get_mut(&client_id) {
                    meta.clock = meta.clock.saturating_add(1);
                    meta.last_updated = now;
                }
            }
            changes.removed.push(client_id);
        }

        if !changes.removed.is_empty() {
            debug!(removed = ?changes.removed, %origin, "Removed awareness states");
            self.events.emit(&AwarenessEvent::change(&changes, origin.clone()));
            self.events.emit(&AwarenessEvent::update(&changes, origin));
        }
        changes
    }

    /// Encode the current clock and state of `client_ids`. Unknown ids are
    /// written with clock 0 and a null state.
    pub fn encode_awareness_update(&self, client_ids: &[ClientId]) -> Result<Vec<u8>> {
        wire::encode_update(client_ids.iter().map(|id| {
            let clock = self.meta.get(id).map_or(0, |m| m.clock);
            (*id, clock, self.states.get(id))
        }))
    }

    /// Encode every known client, tombstones included
    pub fn encode_full_update(&self) -> Result<Vec<u8>> {
        self.encode_awareness_update(&self.client_ids())
    }

    /// Merge a remote awareness update.
    ///
    /// The update is decoded completely before the store is touched. All
    /// entries are applied in order and reported as one batch.
    pub fn apply_awareness_update(
        &mut self,
        update: &[u8],
        origin: Origin,
    ) -> Result<AwarenessChanges> {
        let entries = wire::decode_update(update)?;
        let now = self.now();
        let mut changes = AwarenessChanges::default();
        let mut reasserted = false;

        for entry in entries {
            reasserted |= self.merge_entry(entry, now, &mut changes);
        }

        debug!(
            %origin,
            added = changes.added.len(),
            updated = changes.updated.len(),
            removed = changes.removed.len(),
            "Applied awareness update"
        );
        if changes.has_changes() {
            self.events.emit(&AwarenessEvent::change(&changes, origin.clone()));
        }
        if changes.has_updates() {
            self.events.emit(&AwarenessEvent::update(&changes, origin));
        }

        // The corrected local state goes out as a local write so it also
        // reaches the peer that sent the removal.
        if reasserted {
            let local = AwarenessChanges {
                updated: vec![self.client_id],
                ..AwarenessChanges::default()
            };
            self.events.emit(&AwarenessEvent::update(&local, Origin::Local));
            changes.updated.push(self.client_id);
        }
        Ok(changes)
    }

    /// Merge one entry into the store. Returns true when it was a removal of
    /// the local state that got rejected.
    fn merge_entry(
        &mut self,
        entry: AwarenessEntry,
        now: u64,
        changes: &mut AwarenessChanges,
    ) -> bool {
        let AwarenessEntry {
            client_id,
            clock,
            state,
        } = entry;
        let present = self.states.contains_key(&client_id);
        let current = self.meta.get(&client_id).map(|m| m.clock);

        // Nobody else may take the local client offline: keep the state and
        // move the clock past theirs so the next broadcast wins.
        if client_id == self.client_id && state.is_none() && present {
            let bumped = current.unwrap_or(0).max(clock).saturating_add(1);
            self.meta.insert(
                client_id,
                ClientMeta {
                    clock: bumped,
                    last_updated: now,
                },
            );
            debug!(client_id, clock = bumped, "Rejected remote removal of local state");
            return true;
        }

        let accept = match current {
            // First sighting. Stores start empty, so a client's first write
            // carries clock 0 and must still be taken; only an offline entry
            // at clock 0 for an unknown client says nothing new.
            None => clock > 0 || state.is_some(),
            // A tombstone at the same clock still applies once
            Some(current) => current < clock || (current == clock && state.is_none() && present),
        };
        if !accept {
            trace!(client_id, clock, current = ?current, "Ignored stale awareness entry");
            return false;
        }

        self.meta.insert(
            client_id,
            ClientMeta {
                clock,
                last_updated: now,
            },
        );

        match state {
            Some(value) => {
                let changed = self.states.get(&client_id) != Some(&value);
                match self.states.insert(client_id, value) {
                    None => changes.added.push(client_id),
                    Some(_) => {
                        changes.updated.push(client_id);
                        if changed {
                            changes.filtered_updated.push(client_id);
                        }
                    }
                }
            }
            None => {
                if self.states.remove(&client_id).is_some() {
                    changes.removed.push(client_id);
                }
            }
        }
        false
    }

    /// Subscribe to `change` and `update` events
    pub fn observe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&AwarenessEvent) + Send + Sync + 'static,
    {
        self.events.observe(callback)
    }

    pub fn unobserve(&self, id: SubscriptionId) -> bool {
        self.events.unobserve(id)
    }

    pub fn into_shared(self) -> SharedAwareness {
        Arc::new(Mutex::new(self))
    }
}

impl fmt::Debug for Awareness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Awareness")
            .field("client_id", &self.client_id)
            .field("config", &self.config)
            .field("meta", &self.meta)
            .field("states", &self.states)
            .field("events", &self.events)
            .finish()
    }
}
