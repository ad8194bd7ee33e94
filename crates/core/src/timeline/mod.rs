use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

use crate::{PlayerError, Result};

/// Identifies one scheduled display-refresh callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameToken(u64);

/// Source of display-refresh ticks.
pub trait FrameClock {
    /// Schedules one callback for the next display refresh.
    fn request_frame(&self) -> Result<FrameToken>;

    /// Cancels a pending tick. Cancelling an unknown or fired token is a no-op.
    fn cancel_frame(&self, token: FrameToken) -> Result<()>;
}

#[derive(Debug, Default)]
struct ClockState {
    next: u64,
    pending: BTreeSet<FrameToken>,
    vsyncs: u64,
}

/// Frame clock that only ticks when told to. Clones share the same queue, so
/// one clock can drive every mounted view.
#[derive(Debug, Clone, Default)]
pub struct ManualFrameClock {
    inner: Arc<Mutex<ClockState>>,
}

impl ManualFrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires one display refresh: every pending token is handed out exactly
    /// once, in request order.
    pub fn vsync(&self) -> Result<Vec<FrameToken>> {
        let mut state = self.lock()?;
        state.vsyncs += 1;
        Ok(std::mem::take(&mut state.pending).into_iter().collect())
    }

    /// Number of ticks waiting for the next refresh.
    pub fn pending(&self) -> Result<usize> {
        Ok(self.lock()?.pending.len())
    }

    /// Refreshes fired so far.
    pub fn vsyncs(&self) -> Result<u64> {
        Ok(self.lock()?.vsyncs)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ClockState>> {
        self.inner
            .lock()
            .map_err(|_| PlayerError::msg("frame clock has been poisoned"))
    }
}

impl FrameClock for ManualFrameClock {
    fn request_frame(&self) -> Result<FrameToken> {
        let mut state = self.lock()?;
        let token = FrameToken(state.next);
        state.next += 1;
        state.pending.insert(token);
        Ok(token)
    }

    fn cancel_frame(&self, token: FrameToken) -> Result<()> {
        self.lock()?.pending.remove(&token);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    Stopped,
    Running,
}

/// Counters kept by a [`RenderLoop`].
///
/// `scheduled == fired + cancelled + pending` holds at all times, and every
/// completed start/stop cycle cancels exactly one pending tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStats {
    pub scheduled: u64,
    pub fired: u64,
    pub cancelled: u64,
    pub cycles: u64,
}

/// Per-renderer animation loop with a single pending tick.
#[derive(Debug)]
pub struct RenderLoop<C> {
    clock: C,
    state: LoopState,
    pending: Option<FrameToken>,
    stats: LoopStats,
}

impl<C: FrameClock> RenderLoop<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            state: LoopState::Stopped,
            pending: None,
            stats: LoopStats::default(),
        }
    }

    /// Whether the loop is ticking.
    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// The single tick the loop is waiting on, if any.
    pub fn pending(&self) -> Option<FrameToken> {
        self.pending
    }

    /// Scheduling counters since creation.
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Clock the loop requests its ticks from.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Starts ticking. Returns `false` when the loop was already running.
    pub fn start(&mut self) -> Result<bool> {
        if self.is_running() {
            return Ok(false);
        }
        self.schedule()?;
        self.state = LoopState::Running;
        Ok(true)
    }

    /// Stops ticking and cancels the pending tick before returning. Returns
    /// `false` when the loop was already stopped.
    pub fn stop(&mut self) -> Result<bool> {
        if !self.is_running() {
            return Ok(false);
        }
        if let Some(token) = self.pending.take() {
            self.clock.cancel_frame(token)?;
            self.stats.cancelled += 1;
        }
        self.state = LoopState::Stopped;
        self.stats.cycles += 1;
        Ok(true)
    }

    /// Consumes a fired tick. Returns `true` when the tick belongs to this
    /// running loop, in which case the next tick has already been scheduled
    /// and the caller should paint. Foreign and stale tokens are ignored.
    pub fn accept(&mut self, token: FrameToken) -> Result<bool> {
        if !self.is_running() || self.pending != Some(token) {
            return Ok(false);
        }
        self.pending = None;
        self.stats.fired += 1;
        self.schedule()?;
        Ok(true)
    }

    fn schedule(&mut self) -> Result<()> {
        let token = self.clock.request_frame()?;
        self.pending = Some(token);
        self.stats.scheduled += 1;
        Ok(())
    }
}
