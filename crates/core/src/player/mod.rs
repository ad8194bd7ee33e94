use serde::{Deserialize, Serialize};

use crate::{
    audio::{Activation, AudioBackend, AudioGraphManager, MediaElementId},
    config::AppConfig,
    PlaybackStatus, PlaybackStore, PlayerError, Result, TrackRef,
};

/// Platform media element the controller drives.
///
/// `request_play` only asks for playback; the outcome arrives later as a
/// [`MediaEvent`] that the host forwards to
/// [`PlaybackController::handle_media_event`].
pub trait MediaElement {
    fn id(&self) -> MediaElementId;
    fn set_source(&mut self, track: &TrackRef);
    fn load(&mut self);
    fn request_play(&mut self);
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64);
    /// Duration in seconds, NaN while unknown.
    fn duration(&self) -> f64;
    /// Linear gain in `0.0..=1.0`.
    fn set_volume(&mut self, level: f64);
}

/// Why the platform refused a play request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayRejection {
    /// Autoplay policy: no user gesture.
    NotAllowed,
    /// A newer load superseded the request.
    Aborted,
    /// The source cannot be played.
    Unsupported(String),
}

/// Signals emitted by the media element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaEvent {
    /// A play request was honoured and audio is flowing.
    Playing,
    PlayRejected(PlayRejection),
    LoadFailed(String),
    /// Paused from outside the controller.
    Paused,
    TimeUpdate,
    Ended,
}

/// Mediates transport calls against the media element and keeps the store's
/// playback status in step with what the platform confirms.
#[derive(Debug)]
pub struct PlaybackController<M, B> {
    media: M,
    graph: AudioGraphManager<B>,
    store: PlaybackStore,
    track: Option<TrackRef>,
    pending_play: Option<Activation>,
    seek_position: f64,
}

impl<M: MediaElement, B: AudioBackend> PlaybackController<M, B> {
    pub fn new(mut media: M, backend: B, store: PlaybackStore, config: &AppConfig) -> Self {
        if let Some(level) = volume_level(config.playback.initial_volume) {
            media.set_volume(level);
        }
        Self {
            media,
            graph: AudioGraphManager::new(backend, config.analyser.clone()),
            store,
            track: None,
            pending_play: None,
            seek_position: 0.0,
        }
    }

    /// Borrow the driven media element.
    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut M {
        &mut self.media
    }

    /// The manager owning the session's audio graph.
    pub fn graph(&self) -> &AudioGraphManager<B> {
        &self.graph
    }

    /// Track most recently handed to the media element.
    pub fn track(&self) -> Option<&TrackRef> {
        self.track.as_ref()
    }

    pub fn status(&self) -> Result<PlaybackStatus> {
        self.store.status()
    }

    /// Seek indicator position on the 0..100 scale.
    pub fn seek_position(&self) -> f64 {
        self.seek_position
    }

    /// Loads whatever track the store currently holds. A no-op when no track
    /// has been selected yet.
    pub fn load_current(&mut self, activation: Activation) -> Result<()> {
        match self.store.current_track()? {
            Some(track) => self.load_and_play(track, activation),
            None => Ok(()),
        }
    }

    /// Points the media element at `track` and asks it to play. Returns
    /// before playback is confirmed.
    pub fn load_and_play(&mut self, track: TrackRef, activation: Activation) -> Result<()> {
        tracing::info!(track = %track, "loading track");
        self.media.set_source(&track);
        self.media.load();
        self.track = Some(track);
        self.seek_position = 0.0;
        self.store.set_status(PlaybackStatus::Loading)?;
        self.request_play(activation);
        Ok(())
    }

    /// Pauses running playback, or asks paused media to play again.
    pub fn toggle_play_pause(&mut self, activation: Activation) -> Result<()> {
        if self.track.is_none() {
            return Ok(());
        }
        if self.media.is_paused() {
            self.request_play(activation);
            Ok(())
        } else {
            self.media.pause();
            self.pending_play = None;
            self.store.set_status(PlaybackStatus::Paused)
        }
    }

    /// Moves playback to `position` on the 0..100 scale. Ignored while the
    /// duration is unknown.
    pub fn seek(&mut self, position: f64) {
        match self.seek_target(position) {
            Ok(seconds) => self.media.set_current_time(seconds),
            Err(err) => tracing::debug!(position, %err, "ignoring seek"),
        }
    }

    /// Sets the volume from the 0..100 scale. Non-finite levels are ignored.
    pub fn set_volume(&mut self, level: f64) {
        match volume_level(level) {
            Some(level) => self.media.set_volume(level),
            None => tracing::debug!(level, "ignoring volume change"),
        }
    }

    /// Applies a signal from the media element to the store.
    pub fn handle_media_event(&mut self, event: MediaEvent) -> Result<()> {
        match event {
            MediaEvent::Playing => self.confirm_playing(),
            MediaEvent::PlayRejected(PlayRejection::Aborted) => {
                tracing::debug!("play request superseded by a newer load");
                Ok(())
            }
            MediaEvent::PlayRejected(PlayRejection::NotAllowed) => {
                self.pending_play = None;
                tracing::warn!("playback blocked until the user interacts");
                self.store.set_status(PlaybackStatus::Paused)?;
                Err(PlayerError::BlockedByPolicy)
            }
            MediaEvent::PlayRejected(PlayRejection::Unsupported(reason))
            | MediaEvent::LoadFailed(reason) => {
                self.pending_play = None;
                tracing::warn!(%reason, "media failed to load");
                self.store.set_status(PlaybackStatus::Idle)?;
                Err(PlayerError::LoadFailure(reason))
            }
            MediaEvent::Paused => {
                self.pending_play = None;
                self.store.set_status(PlaybackStatus::Paused)
            }
            MediaEvent::TimeUpdate => {
                let duration = self.media.duration();
                if duration.is_finite() && duration > 0.0 {
                    self.seek_position = self.media.current_time() * 100.0 / duration;
                }
                Ok(())
            }
            MediaEvent::Ended => {
                self.seek_position = 0.0;
                self.store.set_status(PlaybackStatus::Ended)
            }
        }
    }

    fn request_play(&mut self, activation: Activation) {
        self.pending_play = Some(activation);
        self.media.request_play();
    }

    /// The session is attached and published before the status flips to
    /// `playing`, so render loops never start ahead of the graph.
    fn confirm_playing(&mut self) -> Result<()> {
        if self.media.is_paused() {
            self.pending_play = None;
            tracing::debug!("ignoring play confirmation for paused media");
            return Ok(());
        }
        let activation = self.pending_play.take().unwrap_or(Activation::Programmatic);
        match self.graph.ensure_session(self.media.id(), activation) {
            Ok(handle) => {
                self.store.publish_analyser(handle)?;
                self.store.set_status(PlaybackStatus::Playing)
            }
            Err(err) => {
                self.media.pause();
                self.store.set_status(PlaybackStatus::Paused)?;
                Err(err)
            }
        }
    }

    fn seek_target(&self, position: f64) -> Result<f64> {
        let duration = self.media.duration();
        if !duration.is_finite() || !position.is_finite() {
            return Err(PlayerError::InvalidSeekTarget);
        }
        Ok(duration * position.clamp(0.0, 100.0) / 100.0)
    }
}

fn volume_level(level: f64) -> Option<f64> {
    level.is_finite().then(|| (level / 100.0).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        audio::SessionLifecycle,
        record::RecordingSurface,
        scene::{BarMeter, RadialBloom},
        sim::{SimulatedBackend, SimulatedMedia},
        timeline::{LoopState, ManualFrameClock},
        SpectrumView, StoreChange,
    };

    type Controller = PlaybackController<SimulatedMedia, SimulatedBackend>;

    fn controller_with(media: SimulatedMedia) -> (PlaybackStore, Controller) {
        let store = PlaybackStore::new();
        let controller = PlaybackController::new(
            media,
            SimulatedBackend::new(48_000),
            store.clone(),
            &AppConfig::default(),
        );
        (store, controller)
    }

    fn controller() -> (PlaybackStore, Controller) {
        controller_with(SimulatedMedia::new(MediaElementId(1)).with_track_duration(Some(200.0)))
    }

    fn pump(controller: &mut Controller) -> Vec<Result<()>> {
        let events = controller.media_mut().take_events();
        events
            .into_iter()
            .map(|event| controller.handle_media_event(event))
            .collect()
    }

    #[test]
    fn applies_initial_volume() {
        let (_, controller) = controller();
        assert!((controller.media().volume() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn loads_the_most_recent_selection() {
        let (store, mut controller) = controller();
        for locator in ["a.mp3", "b.mp3", "c.mp3"] {
            store.set_current_track(TrackRef::new(locator)).unwrap();
        }
        controller.load_current(Activation::UserGesture).unwrap();

        assert_eq!(controller.media().source(), Some(&TrackRef::new("c.mp3")));
        assert_eq!(controller.media().loads(), 1);
    }

    #[test]
    fn status_waits_for_confirmation() {
        let (store, mut controller) = controller();
        controller
            .load_and_play(TrackRef::new("a.mp3"), Activation::UserGesture)
            .unwrap();

        assert_eq!(store.status().unwrap(), PlaybackStatus::Loading);
        assert!(store.analyser().unwrap().is_none());

        assert!(pump(&mut controller).into_iter().all(|result| result.is_ok()));
        assert_eq!(store.status().unwrap(), PlaybackStatus::Playing);
        assert!(store.analyser().unwrap().is_some());
    }

    #[test]
    fn analyser_is_published_before_playing_is_announced() {
        let (store, mut controller) = controller();
        let order = Arc::new(Mutex::new(Vec::new()));
        let sink = order.clone();
        store
            .subscribe(move |change| {
                let label = match change {
                    StoreChange::AnalyserReady(_) => "analyser",
                    StoreChange::StatusChanged(PlaybackStatus::Playing) => "playing",
                    _ => return,
                };
                sink.lock().unwrap().push(label);
            })
            .unwrap();

        controller
            .load_and_play(TrackRef::new("a.mp3"), Activation::UserGesture)
            .unwrap();
        pump(&mut controller);
        assert_eq!(*order.lock().unwrap(), vec!["analyser", "playing"]);
    }

    #[test]
    fn track_change_rewires_nothing() {
        let (store, mut controller) = controller();
        controller
            .load_and_play(TrackRef::new("a.mp3"), Activation::UserGesture)
            .unwrap();
        pump(&mut controller);
        let first = store.analyser().unwrap().unwrap();

        controller
            .load_and_play(TrackRef::new("b.mp3"), Activation::UserGesture)
            .unwrap();
        pump(&mut controller);

        assert!(store.analyser().unwrap().unwrap().same_node(&first));
        assert_eq!(controller.graph().backend().contexts_created(), 1);
        assert_eq!(controller.graph().backend().sources_created(), 1);
        assert_eq!(controller.media().loads(), 2);
    }

    #[test]
    fn superseded_play_request_is_absorbed() {
        let (store, mut controller) = controller();
        controller
            .load_and_play(TrackRef::new("a.mp3"), Activation::UserGesture)
            .unwrap();
        controller
            .load_and_play(TrackRef::new("b.mp3"), Activation::UserGesture)
            .unwrap();

        let results = pump(&mut controller);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|result| result.is_ok()));
        assert_eq!(store.status().unwrap(), PlaybackStatus::Playing);
        assert_eq!(controller.track(), Some(&TrackRef::new("b.mp3")));
    }

    #[test]
    fn blocked_autoplay_pauses_and_reports() {
        let (store, mut controller) = controller();
        controller.media_mut().reject_next_play(PlayRejection::NotAllowed);
        controller
            .load_and_play(TrackRef::new("a.mp3"), Activation::Programmatic)
            .unwrap();

        let results = pump(&mut controller);
        assert!(matches!(results[0], Err(PlayerError::BlockedByPolicy)));
        assert_eq!(store.status().unwrap(), PlaybackStatus::Paused);
        assert_eq!(controller.media().loads(), 1);
        assert!(controller.media_mut().take_events().is_empty());
    }

    #[test]
    fn confirmation_without_gesture_cannot_build_the_graph() {
        let (store, mut controller) = controller();
        controller
            .load_and_play(TrackRef::new("a.mp3"), Activation::Programmatic)
            .unwrap();

        let results = pump(&mut controller);
        assert!(results[0].as_ref().unwrap_err().awaits_user_interaction());
        assert_eq!(store.status().unwrap(), PlaybackStatus::Paused);
        assert!(controller.media().is_paused());
        assert_eq!(controller.graph().lifecycle(), SessionLifecycle::Uninitialized);

        // tapping play retries with a gesture
        controller.toggle_play_pause(Activation::UserGesture).unwrap();
        assert!(pump(&mut controller)[0].is_ok());
        assert_eq!(store.status().unwrap(), PlaybackStatus::Playing);
        assert_eq!(controller.graph().lifecycle(), SessionLifecycle::Attached);
    }

    #[test]
    fn load_failure_returns_to_idle() {
        let (store, mut controller) = controller();
        controller.media_mut().fail_next_load("unsupported codec");
        controller
            .load_and_play(TrackRef::new("broken.xyz"), Activation::UserGesture)
            .unwrap();

        let results = pump(&mut controller);
        assert!(results
            .iter()
            .any(|result| matches!(result, Err(PlayerError::LoadFailure(reason)) if reason == "unsupported codec")));
        assert_eq!(store.status().unwrap(), PlaybackStatus::Idle);
    }

    #[test]
    fn toggle_without_track_is_a_no_op() {
        let (store, mut controller) = controller();
        controller.toggle_play_pause(Activation::UserGesture).unwrap();
        assert_eq!(store.status().unwrap(), PlaybackStatus::Idle);
        assert!(controller.media_mut().take_events().is_empty());
    }

    #[test]
    fn toggle_pauses_and_resumes() {
        let (store, mut controller) = controller();
        controller
            .load_and_play(TrackRef::new("a.mp3"), Activation::UserGesture)
            .unwrap();
        pump(&mut controller);

        controller.toggle_play_pause(Activation::UserGesture).unwrap();
        assert_eq!(store.status().unwrap(), PlaybackStatus::Paused);
        assert!(controller.media().is_paused());

        controller.toggle_play_pause(Activation::UserGesture).unwrap();
        assert_eq!(store.status().unwrap(), PlaybackStatus::Paused);
        pump(&mut controller);
        assert_eq!(store.status().unwrap(), PlaybackStatus::Playing);
    }

    #[test]
    fn seek_is_ignored_while_duration_is_unknown() {
        let (_, mut controller) =
            controller_with(SimulatedMedia::new(MediaElementId(1)).with_track_duration(None));
        controller
            .load_and_play(TrackRef::new("live.mp3"), Activation::UserGesture)
            .unwrap();
        pump(&mut controller);
        controller.media_mut().advance(3.0);

        controller.seek(50.0);
        assert_eq!(controller.media().current_time(), 3.0);

        pump(&mut controller);
        assert_eq!(controller.seek_position(), 0.0);
    }

    #[test]
    fn seek_and_volume_map_linearly() {
        let (_, mut controller) = controller();
        controller
            .load_and_play(TrackRef::new("a.mp3"), Activation::UserGesture)
            .unwrap();
        pump(&mut controller);

        controller.seek(25.0);
        assert_eq!(controller.media().current_time(), 50.0);
        controller.set_volume(35.0);
        assert!((controller.media().volume() - 0.35).abs() < 1e-9);
        controller.set_volume(140.0);
        assert_eq!(controller.media().volume(), 1.0);
    }

    #[test]
    fn pause_before_confirmation_keeps_playback_paused() {
        let (store, mut controller) = controller();
        controller
            .load_and_play(TrackRef::new("a.mp3"), Activation::UserGesture)
            .unwrap();
        pump(&mut controller);

        controller
            .load_and_play(TrackRef::new("b.mp3"), Activation::UserGesture)
            .unwrap();
        controller.toggle_play_pause(Activation::UserGesture).unwrap();

        assert!(pump(&mut controller).iter().all(|result| result.is_ok()));
        assert_eq!(store.status().unwrap(), PlaybackStatus::Paused);
        assert!(controller.media().is_paused());
    }

    #[test]
    fn pausing_before_the_first_confirmation_is_not_a_policy_block() {
        let (store, mut controller) = controller();
        controller
            .load_and_play(TrackRef::new("a.mp3"), Activation::UserGesture)
            .unwrap();
        controller.toggle_play_pause(Activation::UserGesture).unwrap();

        assert!(pump(&mut controller).iter().all(|result| result.is_ok()));
        assert_eq!(store.status().unwrap(), PlaybackStatus::Paused);
        assert_eq!(controller.graph().lifecycle(), SessionLifecycle::Uninitialized);

        // the next tap builds the graph as usual
        controller.toggle_play_pause(Activation::UserGesture).unwrap();
        assert!(pump(&mut controller)[0].is_ok());
        assert_eq!(store.status().unwrap(), PlaybackStatus::Playing);
    }

    #[test]
    fn late_confirmation_for_paused_media_is_ignored() {
        let (store, mut controller) = controller();
        controller
            .load_and_play(TrackRef::new("a.mp3"), Activation::UserGesture)
            .unwrap();
        // a confirmation already in flight when the media paused
        controller.media_mut().pause();

        assert!(controller.handle_media_event(MediaEvent::Playing).is_ok());
        assert_eq!(store.status().unwrap(), PlaybackStatus::Loading);
        assert!(store.analyser().unwrap().is_none());
    }

    #[test]
    fn non_finite_seek_and_volume_are_ignored() {
        let (_, mut controller) = controller();
        controller
            .load_and_play(TrackRef::new("a.mp3"), Activation::UserGesture)
            .unwrap();
        pump(&mut controller);
        controller.media_mut().advance(4.0);

        controller.seek(f64::NAN);
        controller.seek(f64::INFINITY);
        assert_eq!(controller.media().current_time(), 4.0);

        controller.set_volume(f64::NAN);
        assert!((controller.media().volume() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn time_updates_drive_the_seek_indicator_and_end_resets_it() {
        let (store, mut controller) = controller();
        controller
            .load_and_play(TrackRef::new("a.mp3"), Activation::UserGesture)
            .unwrap();
        pump(&mut controller);

        controller.media_mut().advance(50.0);
        pump(&mut controller);
        assert!((controller.seek_position() - 25.0).abs() < 1e-9);

        controller.media_mut().advance(500.0);
        pump(&mut controller);
        assert_eq!(controller.seek_position(), 0.0);
        assert_eq!(store.status().unwrap(), PlaybackStatus::Ended);
    }

    #[test]
    fn external_pause_is_reflected() {
        let (store, mut controller) = controller();
        controller
            .load_and_play(TrackRef::new("a.mp3"), Activation::UserGesture)
            .unwrap();
        pump(&mut controller);

        controller.media_mut().external_pause();
        pump(&mut controller);
        assert_eq!(store.status().unwrap(), PlaybackStatus::Paused);
    }

    type Radial = SpectrumView<RadialBloom, RecordingSurface, ManualFrameClock>;
    type Meter = SpectrumView<BarMeter, RecordingSurface, ManualFrameClock>;

    fn subscribe_view<R, S>(
        store: &PlaybackStore,
        view: &Arc<Mutex<SpectrumView<R, S, ManualFrameClock>>>,
    ) where
        R: crate::scene::SpectrumRenderer + Send + 'static,
        S: crate::render::Surface + Send + 'static,
    {
        let view = view.clone();
        store
            .subscribe(move |change| {
                view.lock().unwrap().handle_change(change).unwrap();
            })
            .unwrap();
    }

    #[test]
    fn end_to_end_playback_renders_both_variants() {
        let config = AppConfig::default();
        let clock = ManualFrameClock::new();
        let (store, mut controller) = controller();

        let radial: Arc<Mutex<Radial>> = Arc::new(Mutex::new(SpectrumView::new(
            RadialBloom::new(config.radial.clone()),
            RecordingSurface::new(config.radial.width, config.radial.height),
            clock.clone(),
        )));
        let meter_surface = RecordingSurface::new(config.meter.width, config.meter.height);
        let meter: Arc<Mutex<Meter>> = Arc::new(Mutex::new(SpectrumView::new(
            BarMeter::for_surface(config.meter.clone(), &meter_surface),
            meter_surface,
            clock.clone(),
        )));
        subscribe_view(&store, &radial);
        subscribe_view(&store, &meter);

        store.set_current_track(TrackRef::new("a.mp3")).unwrap();
        controller.load_current(Activation::UserGesture).unwrap();
        assert_eq!(radial.lock().unwrap().loop_state(), LoopState::Stopped);

        pump(&mut controller);
        assert_eq!(store.status().unwrap(), PlaybackStatus::Playing);
        assert!(store.analyser().unwrap().is_some());
        assert_eq!(radial.lock().unwrap().loop_state(), LoopState::Running);
        assert_eq!(meter.lock().unwrap().loop_state(), LoopState::Running);

        // no samples yet: ticks fire but nothing is drawn
        for token in clock.vsync().unwrap() {
            assert!(!radial.lock().unwrap().on_frame(token).unwrap());
            assert!(!meter.lock().unwrap().on_frame(token).unwrap());
        }
        assert!(radial.lock().unwrap().surface().unwrap().commands().is_empty());
        assert!(meter.lock().unwrap().surface().unwrap().commands().is_empty());

        let tap = controller.graph().tap().unwrap();
        let block: Vec<f32> = (0..256)
            .map(|n| 0.5 * (n as f32 * 0.3).sin() + 0.25 * (n as f32 * 1.7).sin())
            .collect();
        tap.push_samples(&block).unwrap();

        let mut painted = 0;
        for token in clock.vsync().unwrap() {
            painted += radial.lock().unwrap().on_frame(token).unwrap() as usize;
            painted += meter.lock().unwrap().on_frame(token).unwrap() as usize;
        }
        assert_eq!(painted, 2);
        assert!(radial.lock().unwrap().surface().unwrap().fill_count() > 0);
        assert!(meter.lock().unwrap().surface().unwrap().fill_count() > 0);

        // pausing stops both loops and leaves no tick behind
        controller.toggle_play_pause(Activation::UserGesture).unwrap();
        assert_eq!(clock.pending().unwrap(), 0);
        assert_eq!(radial.lock().unwrap().loop_state(), LoopState::Stopped);
        assert_eq!(meter.lock().unwrap().loop_stats().cycles, 1);
    }

    #[test]
    fn unmounted_view_receives_no_further_ticks() {
        let clock = ManualFrameClock::new();
        let (store, mut controller) = controller();
        let mut view = SpectrumView::new(
            RadialBloom::default(),
            RecordingSurface::new(296, 296),
            clock.clone(),
        );

        controller
            .load_and_play(TrackRef::new("a.mp3"), Activation::UserGesture)
            .unwrap();
        pump(&mut controller);
        view.sync(&store).unwrap();
        assert_eq!(view.loop_state(), LoopState::Running);

        let surface = view.unmount().unwrap();
        assert!(surface.is_some());
        assert_eq!(clock.pending().unwrap(), 0);
        assert!(clock.vsync().unwrap().is_empty());
        assert!(!view.draw_frame().unwrap());

        // status changes after unmount do not restart the loop
        view.handle_change(&StoreChange::StatusChanged(PlaybackStatus::Playing))
            .unwrap();
        assert_eq!(view.loop_state(), LoopState::Stopped);
    }
}
