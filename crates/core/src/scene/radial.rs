use crate::{
    config::RadialConfig,
    render::{Hsla, Paint, Point, Surface},
};

use super::{SceneKind, SpectrumRenderer};

/// Concentric bloom: one filled disk per frequency bin, centred on the
/// surface, radius following the bin amplitude and hue following its index.
#[derive(Debug, Clone)]
pub struct RadialBloom {
    config: RadialConfig,
}

impl RadialBloom {
    pub fn new(config: RadialConfig) -> Self {
        Self { config }
    }

    pub fn radius(&self, amplitude: u8, surface_height: u32) -> f32 {
        amplitude as f32 * surface_height as f32 / 255.0 / self.config.damping
    }

    /// Hue in degrees for bin `index`. Deliberately exceeds 360 towards the
    /// top of the spectrum.
    pub fn hue(&self, index: usize, bins: usize) -> f32 {
        index as f32 * (360.0 / (bins as f32 * self.config.hue_spread))
    }
}

impl Default for RadialBloom {
    fn default() -> Self {
        Self::new(RadialConfig::default())
    }
}

impl SpectrumRenderer for RadialBloom {
    fn kind(&self) -> SceneKind {
        SceneKind::RadialBloom
    }

    fn render(&mut self, spectrum: &[u8], surface: &mut dyn Surface) {
        surface.clear();
        surface.restore_background();

        let height = surface.height();
        let center = Point {
            x: surface.width() as f32 / 2.0,
            y: height as f32 / 2.0,
        };
        let bins = spectrum.len();

        for (index, amplitude) in spectrum.iter().enumerate() {
            let radius = self.radius(*amplitude, height);
            if radius <= 0.0 {
                continue;
            }
            let paint = Paint::Hsla(Hsla {
                h: self.hue(index, bins),
                s: self.config.saturation,
                l: self.config.lightness,
                a: 1.0,
            });
            surface.fill_circle(center, radius, &paint);
        }
    }
}
