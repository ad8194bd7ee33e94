use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

use crate::{AnalyserHandle, PlayerError, Result};

/// Opaque locator of playable audio content (URL or blob reference).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackRef(Arc<str>);

impl TrackRef {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(Arc::from(locator.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
}

impl PlaybackStatus {
    pub fn is_playing(self) -> bool {
        self == Self::Playing
    }
}

/// Notification delivered to subscribers after a store write.
#[derive(Debug, Clone)]
pub enum StoreChange {
    TrackSelected(TrackRef),
    AnalyserReady(AnalyserHandle),
    StatusChanged(PlaybackStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&StoreChange) + Send + Sync>;

#[derive(Default)]
struct StoreState {
    track: Option<TrackRef>,
    analyser: Option<AnalyserHandle>,
    status: PlaybackStatus,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(SubscriptionId, Listener)>,
}

/// Shared playback state through which decoupled surfaces communicate.
///
/// Cloning yields another handle to the same store. Listeners run
/// synchronously inside the writing call, after the write is visible, so a
/// listener may read the store it is notified from.
#[derive(Clone, Default)]
pub struct PlaybackStore {
    state: Arc<Mutex<StoreState>>,
    listeners: Arc<Mutex<Listeners>>,
}

impl PlaybackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the track to play. Every call notifies, so re-selecting the
    /// current track replays it.
    pub fn set_current_track(&self, track: TrackRef) -> Result<()> {
        self.lock_state()?.track = Some(track.clone());
        self.notify(&StoreChange::TrackSelected(track))
    }

    /// The most recently selected track.
    pub fn current_track(&self) -> Result<Option<TrackRef>> {
        Ok(self.lock_state()?.track.clone())
    }

    /// Publishes the session's analysis node. Only the first publication is
    /// kept; later calls return `false` and leave the store untouched.
    pub fn publish_analyser(&self, handle: AnalyserHandle) -> Result<bool> {
        {
            let mut state = self.lock_state()?;
            if let Some(existing) = &state.analyser {
                if !existing.same_node(&handle) {
                    tracing::warn!("ignoring a second analysis node for this session");
                }
                return Ok(false);
            }
            state.analyser = Some(handle.clone());
        }
        self.notify(&StoreChange::AnalyserReady(handle))?;
        Ok(true)
    }

    /// The session's analysis node, absent until the first confirmed play.
    pub fn analyser(&self) -> Result<Option<AnalyserHandle>> {
        Ok(self.lock_state()?.analyser.clone())
    }

    /// Updates the playback status, notifying only on an actual transition.
    pub fn set_status(&self, status: PlaybackStatus) -> Result<()> {
        {
            let mut state = self.lock_state()?;
            if state.status == status {
                return Ok(());
            }
            state.status = status;
        }
        tracing::debug!(?status, "playback status changed");
        self.notify(&StoreChange::StatusChanged(status))
    }

    /// The last confirmed playback status.
    pub fn status(&self) -> Result<PlaybackStatus> {
        Ok(self.lock_state()?.status)
    }

    /// Registers a listener called synchronously after every change.
    pub fn subscribe<F>(&self, listener: F) -> Result<SubscriptionId>
    where
        F: Fn(&StoreChange) + Send + Sync + 'static,
    {
        let mut listeners = self.lock_listeners()?;
        let id = SubscriptionId(listeners.next_id);
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(listener)));
        Ok(id)
    }

    /// Removes a listener. Returns `false` for an unknown id.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        let mut listeners = self.lock_listeners()?;
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry, _)| *entry != id);
        Ok(listeners.entries.len() != before)
    }

    fn notify(&self, change: &StoreChange) -> Result<()> {
        // Listeners are called without any lock held so they can re-enter.
        let listeners: Vec<Listener> = self
            .lock_listeners()?
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(change);
        }
        Ok(())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| PlayerError::msg("playback store has been poisoned"))
    }

    fn lock_listeners(&self) -> Result<MutexGuard<'_, Listeners>> {
        self.listeners
            .lock()
            .map_err(|_| PlayerError::msg("store listeners have been poisoned"))
    }
}

impl fmt::Debug for PlaybackStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackStore").finish_non_exhaustive()
    }
}
