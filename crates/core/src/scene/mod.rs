//! Spectrum renderers. Each one turns a byte spectrum into draw calls on a
//! [`Surface`](crate::render::Surface), painting every frame from a blank
//! surface.

use serde::{Deserialize, Serialize};

use crate::render::Surface;

mod meter;
mod radial;

pub use meter::BarMeter;
pub use radial::RadialBloom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneKind {
    RadialBloom,
    BarMeter,
}

pub trait SpectrumRenderer {
    fn kind(&self) -> SceneKind;

    /// Paints one frame. `spectrum` holds one amplitude in `0..=255` per
    /// frequency bin.
    fn render(&mut self, spectrum: &[u8], surface: &mut dyn Surface);
}
