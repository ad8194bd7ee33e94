use serde::{Deserialize, Serialize};

use crate::{
    scene::{SceneKind, SpectrumRenderer},
    timeline::{FrameClock, FrameToken, LoopState, LoopStats, RenderLoop},
    AnalyserHandle, PlaybackStatus, PlaybackStore, Result, StoreChange,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 1.0)
    }
}

/// Hue in degrees (not wrapped), saturation and lightness in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hsla {
    pub h: f32,
    pub s: f32,
    pub l: f32,
    pub a: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub offset: f32,
    pub color: Rgba,
}

/// Vertical gradient running from `y0` (offset 0) to `y1` (offset 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearGradient {
    pub y0: f32,
    pub y1: f32,
    pub stops: Vec<ColorStop>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Paint {
    Solid(Rgba),
    Hsla(Hsla),
    Gradient(LinearGradient),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// 2D drawing target supplied by the hosting UI.
pub trait Surface {
    /// Width in pixels, read fresh on every frame.
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Erases every pixel of the surface.
    fn clear(&mut self);
    /// Repaints the host's backdrop layer after a clear.
    fn restore_background(&mut self);
    fn fill_rect(&mut self, rect: Rect, paint: &Paint);
    fn fill_circle(&mut self, center: Point, radius: f32, paint: &Paint);
}

/// A spectrum renderer mounted on a surface, with its own render loop.
///
/// The view follows the store: it picks up the analysis node when it is
/// published, runs its loop while the status is `playing` and stops it on
/// any other status. Without an analysis node, a surface, or samples, a
/// frame paints nothing.
#[derive(Debug)]
pub struct SpectrumView<R, S, C> {
    renderer: R,
    surface: Option<S>,
    analyser: Option<AnalyserHandle>,
    frame_loop: RenderLoop<C>,
    buffer: Vec<u8>,
    frames_painted: u64,
}

impl<R, S, C> SpectrumView<R, S, C>
where
    R: SpectrumRenderer,
    S: Surface,
    C: FrameClock,
{
    pub fn new(renderer: R, surface: S, clock: C) -> Self {
        Self {
            renderer,
            surface: Some(surface),
            analyser: None,
            frame_loop: RenderLoop::new(clock),
            buffer: Vec::new(),
            frames_painted: 0,
        }
    }

    /// Which visualiser this view paints.
    pub fn kind(&self) -> SceneKind {
        self.renderer.kind()
    }

    /// Borrow the mounted renderer.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// The drawing surface, `None` once unmounted.
    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.surface.as_mut()
    }

    pub fn loop_state(&self) -> LoopState {
        self.frame_loop.state()
    }

    /// Scheduling counters of the view's render loop.
    pub fn loop_stats(&self) -> LoopStats {
        self.frame_loop.stats()
    }

    /// Frames that actually reached the surface.
    pub fn frames_painted(&self) -> u64 {
        self.frames_painted
    }

    pub fn attach_analyser(&mut self, handle: AnalyserHandle) {
        self.analyser = Some(handle);
    }

    /// Catches up with the store on mount.
    pub fn sync(&mut self, store: &PlaybackStore) -> Result<()> {
        if let Some(handle) = store.analyser()? {
            self.attach_analyser(handle);
        }
        self.follow_status(store.status()?)
    }

    /// Follows one store notification.
    pub fn handle_change(&mut self, change: &StoreChange) -> Result<()> {
        match change {
            StoreChange::AnalyserReady(handle) => {
                self.attach_analyser(handle.clone());
                Ok(())
            }
            StoreChange::StatusChanged(status) => self.follow_status(*status),
            StoreChange::TrackSelected(_) => Ok(()),
        }
    }

    fn follow_status(&mut self, status: PlaybackStatus) -> Result<()> {
        if self.surface.is_none() {
            return Ok(());
        }
        if status.is_playing() {
            self.frame_loop.start()?;
        } else {
            self.frame_loop.stop()?;
        }
        Ok(())
    }

    /// Handles a fired tick; paints when the tick belongs to this view.
    pub fn on_frame(&mut self, token: FrameToken) -> Result<bool> {
        if !self.frame_loop.accept(token)? {
            return Ok(false);
        }
        self.draw_frame()
    }

    /// Paints one frame immediately. Returns whether anything was painted.
    pub fn draw_frame(&mut self) -> Result<bool> {
        let (Some(analyser), Some(surface)) = (&self.analyser, self.surface.as_mut()) else {
            return Ok(false);
        };
        if !analyser.byte_frequency_data(&mut self.buffer)? {
            return Ok(false);
        }
        self.renderer.render(&self.buffer, surface);
        self.frames_painted += 1;
        Ok(true)
    }

    /// Stops the loop, cancelling any pending tick, and releases the surface.
    pub fn unmount(&mut self) -> Result<Option<S>> {
        self.frame_loop.stop()?;
        Ok(self.surface.take())
    }
}
