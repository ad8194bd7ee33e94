use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::{
    render::{Paint, Point, Rect, Surface},
    scene::SceneKind,
    Result,
};

/// One recorded drawing operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    Clear,
    RestoreBackground,
    FillRect { rect: Rect, paint: Paint },
    FillCircle { center: Point, radius: f32, paint: Paint },
}

impl DrawCommand {
    /// Whether the command puts a shape on the surface.
    pub fn is_fill(&self) -> bool {
        matches!(self, Self::FillRect { .. } | Self::FillCircle { .. })
    }
}

/// Surface that keeps a display list instead of pixels.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Drains the display list recorded so far.
    pub fn take_commands(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn fill_count(&self) -> usize {
        self.commands.iter().filter(|command| command.is_fill()).count()
    }
}

impl Surface for RecordingSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn clear(&mut self) {
        self.commands.push(DrawCommand::Clear);
    }

    fn restore_background(&mut self) {
        self.commands.push(DrawCommand::RestoreBackground);
    }

    fn fill_rect(&mut self, rect: Rect, paint: &Paint) {
        self.commands.push(DrawCommand::FillRect {
            rect,
            paint: paint.clone(),
        });
    }

    fn fill_circle(&mut self, center: Point, radius: f32, paint: &Paint) {
        self.commands.push(DrawCommand::FillCircle {
            center,
            radius,
            paint: paint.clone(),
        });
    }
}

/// Display list captured for one surface at one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub frame: u64,
    pub scene: SceneKind,
    pub commands: Vec<DrawCommand>,
}

/// Collects recorded frames and writes them out as JSON.
#[derive(Debug, Default)]
pub struct Recorder {
    frames: Vec<RecordedFrame>,
    is_recording: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts accepting captured frames.
    pub fn start(&mut self) {
        self.is_recording = true;
    }

    pub fn stop(&mut self) {
        self.is_recording = false;
    }

    /// Moves the surface's pending display list into the recording. Frames
    /// without any commands are skipped.
    pub fn capture(&mut self, frame: u64, scene: SceneKind, surface: &mut RecordingSurface) {
        let commands = surface.take_commands();
        if !self.is_recording || commands.is_empty() {
            return;
        }
        self.frames.push(RecordedFrame {
            frame,
            scene,
            commands,
        });
    }

    /// Frames captured so far, in capture order.
    pub fn frames(&self) -> &[RecordedFrame] {
        &self.frames
    }

    /// Writes every captured frame as a pretty-printed JSON array.
    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, &self.frames)?;
        Ok(())
    }
}
