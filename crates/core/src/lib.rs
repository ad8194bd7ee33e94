//! Core engine of the Spectrum Player.
//!
//! A [`PlaybackStore`] decouples the track-selection surface from the
//! playback surface. The [`PlaybackController`] drives the media element and
//! lazily builds the single audio graph through the [`AudioGraphManager`];
//! every mounted [`SpectrumView`] reads the shared analysis node and paints
//! once per display refresh while playback is confirmed.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod player;
pub mod record;
pub mod render;
pub mod scene;
pub mod sim;
pub mod store;
pub mod timeline;

pub use analysis::Analyser;
pub use audio::{
    Activation, AnalyserHandle, AnalyserTap, AudioBackend, AudioGraphManager, MediaElementId,
    SessionLifecycle,
};
pub use config::{AnalyserConfig, AppConfig, MeterConfig, PlaybackConfig, RadialConfig};
pub use error::{PlayerError, Result};
pub use player::{MediaElement, MediaEvent, PlayRejection, PlaybackController};
pub use record::{DrawCommand, RecordedFrame, Recorder, RecordingSurface};
pub use render::{SpectrumView, Surface};
pub use scene::{BarMeter, RadialBloom, SceneKind, SpectrumRenderer};
pub use store::{PlaybackStatus, PlaybackStore, StoreChange, SubscriptionId, TrackRef};
pub use timeline::{FrameClock, FrameToken, LoopState, ManualFrameClock, RenderLoop};
