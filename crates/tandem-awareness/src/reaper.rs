//! Presence reaper
//!
//! Background task that keeps the local client alive and evicts peers that
//! went silent. It wakes every tenth of the outdated timeout.

use std::time::Duration;
use tandem_core::ClientId;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AwarenessError, Result};
use crate::event::Origin;
use crate::store::{Awareness, SharedAwareness};

/// Lifecycle of a [`PresenceReaper`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaperState {
    Idle,
    Running,
    Stopped,
}

/// What one pass of the reaper did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sweep {
    /// The local state was re-written to refresh its clock
    pub heartbeat: bool,
    pub evicted: Vec<ClientId>,
}

/// One reaper pass over `awareness`.
///
/// Re-writes the unchanged local state once it is half a timeout old, then
/// removes every other present client silent for a full timeout.
pub fn sweep(awareness: &mut Awareness) -> Sweep {
    let timeout = awareness.outdated_timeout().as_millis() as u64;
    let now = awareness.now();
    let own = awareness.client_id();
    let mut result = Sweep::default();

    let local_age = awareness
        .get_meta(own)
        .map(|m| now.saturating_sub(m.last_updated));
    if let (Some(state), Some(age)) = (awareness.get_local_state().cloned(), local_age) {
        if age >= timeout / 2 {
            awareness.set_local_state(Some(state));
            result.heartbeat = true;
        }
    }

    let mut outdated: Vec<ClientId> = awareness
        .meta()
        .iter()
        .filter(|(id, meta)| {
            **id != own
                && now.saturating_sub(meta.last_updated) >= timeout
                && awareness.states().contains_key(*id)
        })
        .map(|(id, _)| *id)
        .collect();
    outdated.sort_unstable();

    if !outdated.is_empty() {
        result.evicted = awareness
            .remove_awareness_states(&outdated, Origin::Timeout)
            .removed;
    }
    result
}

/// Handle to the periodic sweep task
pub struct PresenceReaper {
    awareness: SharedAwareness,
    state: ReaperState,
    task: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl PresenceReaper {
    pub fn new(awareness: SharedAwareness) -> Self {
        Self {
            awareness,
            state: ReaperState::Idle,
            task: None,
        }
    }

    /// Current lifecycle state. A loop that ended on its own (it panicked)
    /// reports `Stopped`.
    pub fn state(&self) -> ReaperState {
        match &self.task {
            Some((_, handle)) if handle.is_finished() => ReaperState::Stopped,
            _ => self.state,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == ReaperState::Running
    }

    /// Spawn the sweep loop on the current tokio runtime
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(AwarenessError::AlreadyStarted);
        }

        if let Some((_, handle)) = self.task.take() {
            warn!("Presence reaper loop had exited, restarting");
            handle.abort();
        }

        let timeout = self.awareness.lock().outdated_timeout();
        let period = (timeout / 10).max(Duration::from_millis(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let awareness = self.awareness.clone();

        let handle = tokio::spawn(run(awareness, period, stop_rx));
        self.task = Some((stop_tx, handle));
        self.state = ReaperState::Running;

        info!(timeout_ms = timeout.as_millis() as u64, "Presence reaper started");
        Ok(())
    }

    /// Ask the loop to stop and wait for it to finish
    pub async fn stop(&mut self) -> Result<()> {
        let Some((stop_tx, handle)) = self.task.take() else {
            return Err(AwarenessError::NotStarted);
        };

        // The loop may already be gone if it panicked
        let _ = stop_tx.send(());
        if let Err(e) = handle.await {
            warn!(error = %e, "Presence reaper task failed");
        }

        self.state = ReaperState::Stopped;
        info!("Presence reaper stopped");
        Ok(())
    }
}

impl std::fmt::Debug for PresenceReaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceReaper")
            .field("state", &self.state())
            .finish()
    }
}

async fn run(awareness: SharedAwareness, period: Duration, mut stop_rx: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            // Also fires when the reaper handle is dropped
            _ = &mut stop_rx => break,
            _ = tokio::time::sleep(period) => {
                let result = sweep(&mut awareness.lock());
                if result.heartbeat || !result.evicted.is_empty() {
                    debug!(
                        heartbeat = result.heartbeat,
                        evicted = ?result.evicted,
                        "Presence sweep"
                    );
                }
            }
        }
    }
}
