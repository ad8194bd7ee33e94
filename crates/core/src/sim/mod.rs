//! Deterministic stand-ins for the platform handles the engine drives: a
//! media element and an audio backend. Tests use them directly and the
//! command line host runs the whole engine on top of them.

use std::collections::{HashSet, VecDeque};

use crate::{
    audio::{Activation, AnalyserTap, AudioBackend, ContextInfo, GraphNode, MediaElementId, SourceId},
    player::{MediaElement, MediaEvent, PlayRejection},
    PlayerError, Result, TrackRef,
};

/// In-memory audio backend that records the graph it is asked to build.
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    sample_rate: u32,
    block_contexts: bool,
    fail_next_source: bool,
    fail_connect_after: Option<usize>,
    contexts_created: usize,
    sources_created: usize,
    bound_elements: HashSet<MediaElementId>,
    connections: Vec<(GraphNode, GraphNode)>,
    tap: Option<AnalyserTap>,
}

impl SimulatedBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Default::default()
        }
    }

    /// Makes context creation fail as if no user gesture were active.
    pub fn block_contexts(&mut self, block: bool) {
        self.block_contexts = block;
    }

    /// Makes the next source binding fail before the element is bound.
    pub fn fail_next_source(&mut self, fail: bool) {
        self.fail_next_source = fail;
    }

    /// Lets `links` more connections succeed, then fails the next one once.
    pub fn fail_connect_after(&mut self, links: usize) {
        self.fail_connect_after = Some(links);
    }

    pub fn contexts_created(&self) -> usize {
        self.contexts_created
    }

    pub fn sources_created(&self) -> usize {
        self.sources_created
    }

    pub fn connections(&self) -> &[(GraphNode, GraphNode)] {
        &self.connections
    }

    pub fn tap(&self) -> Option<&AnalyserTap> {
        self.tap.as_ref()
    }
}

impl AudioBackend for SimulatedBackend {
    fn create_context(&mut self, _activation: Activation) -> Result<ContextInfo> {
        if self.block_contexts {
            return Err(PlayerError::BlockedByPolicy);
        }
        self.contexts_created += 1;
        Ok(ContextInfo {
            sample_rate: self.sample_rate,
        })
    }

    fn create_media_source(&mut self, element: MediaElementId) -> Result<SourceId> {
        if std::mem::take(&mut self.fail_next_source) {
            return Err(PlayerError::msg("media source could not be created"));
        }
        if !self.bound_elements.insert(element) {
            return Err(PlayerError::msg(format!(
                "media element {} is already bound to a source",
                element.0
            )));
        }
        self.sources_created += 1;
        Ok(SourceId(self.sources_created as u64))
    }

    fn install_analyser(&mut self, tap: AnalyserTap) -> Result<()> {
        self.tap = Some(tap);
        Ok(())
    }

    fn connect(&mut self, from: GraphNode, to: GraphNode) -> Result<()> {
        if let Some(remaining) = self.fail_connect_after {
            if remaining == 0 {
                self.fail_connect_after = None;
                return Err(PlayerError::msg("transient connect failure"));
            }
            self.fail_connect_after = Some(remaining - 1);
        }
        self.connections.push((from, to));
        Ok(())
    }
}

/// Media element whose playback is advanced explicitly by the caller.
///
/// Play requests are answered asynchronously: the confirmation or rejection
/// is queued and handed out by [`SimulatedMedia::take_events`].
#[derive(Debug)]
pub struct SimulatedMedia {
    id: MediaElementId,
    source: Option<TrackRef>,
    track_duration: Option<f64>,
    duration: f64,
    current_time: f64,
    volume: f64,
    paused: bool,
    loads: usize,
    next_rejection: Option<PlayRejection>,
    next_load_failure: Option<String>,
    events: VecDeque<MediaEvent>,
}

impl SimulatedMedia {
    pub fn new(id: MediaElementId) -> Self {
        Self {
            id,
            source: None,
            track_duration: None,
            duration: f64::NAN,
            current_time: 0.0,
            volume: 1.0,
            paused: true,
            loads: 0,
            next_rejection: None,
            next_load_failure: None,
            events: VecDeque::new(),
        }
    }

    /// Duration reported once a track finishes loading. `None` keeps the
    /// duration unknown, as for a live stream whose metadata never arrives.
    pub fn with_track_duration(mut self, seconds: Option<f64>) -> Self {
        self.track_duration = seconds;
        self
    }

    pub fn reject_next_play(&mut self, rejection: PlayRejection) {
        self.next_rejection = Some(rejection);
    }

    pub fn fail_next_load(&mut self, reason: impl Into<String>) {
        self.next_load_failure = Some(reason.into());
    }

    /// Pauses from outside the controller, e.g. through a system media key.
    pub fn external_pause(&mut self) {
        if !self.paused {
            self.paused = true;
            self.events.push_back(MediaEvent::Paused);
        }
    }

    /// Moves playback forward and emits the resulting time signals.
    pub fn advance(&mut self, seconds: f64) {
        if self.paused || self.source.is_none() {
            return;
        }
        self.current_time += seconds;
        if self.duration.is_finite() && self.current_time >= self.duration {
            self.current_time = self.duration;
            self.paused = true;
            self.events.push_back(MediaEvent::TimeUpdate);
            self.events.push_back(MediaEvent::Ended);
        } else {
            self.events.push_back(MediaEvent::TimeUpdate);
        }
    }

    /// Drains the queued signals in emission order.
    pub fn take_events(&mut self) -> Vec<MediaEvent> {
        self.events.drain(..).collect()
    }

    pub fn source(&self) -> Option<&TrackRef> {
        self.source.as_ref()
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn loads(&self) -> usize {
        self.loads
    }

    /// A reload or pause supersedes any play request not yet answered.
    fn abort_pending_play(&mut self) {
        for event in self.events.iter_mut() {
            if matches!(event, MediaEvent::Playing) {
                *event = MediaEvent::PlayRejected(PlayRejection::Aborted);
            }
        }
    }
}

impl MediaElement for SimulatedMedia {
    fn id(&self) -> MediaElementId {
        self.id
    }

    fn set_source(&mut self, track: &TrackRef) {
        self.source = Some(track.clone());
    }

    fn load(&mut self) {
        self.loads += 1;
        self.paused = true;
        self.current_time = 0.0;
        self.duration = f64::NAN;

        self.abort_pending_play();

        if let Some(reason) = self.next_load_failure.take() {
            self.source = None;
            self.events.push_back(MediaEvent::LoadFailed(reason));
            return;
        }
        self.duration = self.track_duration.unwrap_or(f64::NAN);
    }

    fn request_play(&mut self) {
        if self.source.is_none() {
            self.events
                .push_back(MediaEvent::PlayRejected(PlayRejection::Unsupported(
                    "no source".to_string(),
                )));
            return;
        }
        match self.next_rejection.take() {
            Some(rejection) => self.events.push_back(MediaEvent::PlayRejected(rejection)),
            None => {
                self.paused = false;
                self.events.push_back(MediaEvent::Playing);
            }
        }
    }

    fn pause(&mut self) {
        self.paused = true;
        self.abort_pending_play();
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn set_current_time(&mut self, seconds: f64) {
        self.current_time = seconds;
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn set_volume(&mut self, level: f64) {
        self.volume = level;
    }
}
