use crate::{
    config::MeterConfig,
    render::{ColorStop, LinearGradient, Paint, Rect, Rgba, Surface},
};

use super::{SceneKind, SpectrumRenderer};

const GRADIENT_BOTTOM: Rgba = Rgba::opaque(0xff, 0x3c, 0xac);
const GRADIENT_MIDDLE: Rgba = Rgba::opaque(0x78, 0x4b, 0xa0);
const GRADIENT_TOP: Rgba = Rgba::opaque(0x2b, 0x86, 0xc5);

/// Vertical bar meter with falling peak caps.
///
/// The slot count is derived from the surface width once, at construction,
/// and never changes afterwards; if the surface grows the extra width stays
/// blank. Each slot keeps a peak that snaps up to a louder sample and
/// otherwise falls by one unit per frame. A slot has no peak until its first
/// frame, which adopts the sample as the peak.
#[derive(Debug, Clone)]
pub struct BarMeter {
    config: MeterConfig,
    slots: usize,
    peaks: Box<[Option<u8>]>,
}

impl BarMeter {
    /// Creates a meter sized for a surface `surface_width` pixels wide.
    pub fn new(config: MeterConfig, surface_width: u32) -> Self {
        let slots = match config.bar_width.checked_add(config.gap) {
            Some(pitch) if pitch > 0 => (surface_width / pitch) as usize,
            _ => 0,
        };
        Self {
            config,
            slots,
            peaks: vec![None; slots].into_boxed_slice(),
        }
    }

    /// Creates a meter sized for the current width of `surface`.
    pub fn for_surface(config: MeterConfig, surface: &dyn Surface) -> Self {
        Self::new(config, surface.width())
    }

    /// Number of bars drawn per frame.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Current peak of every slot, `None` before its first frame.
    pub fn peaks(&self) -> &[Option<u8>] {
        &self.peaks
    }

    /// Advances the peak of `slot` by one frame and returns the cap height.
    fn update_peak(&mut self, slot: usize, value: u8) -> u8 {
        let peak = &mut self.peaks[slot];
        match *peak {
            Some(previous) if value < previous => {
                let fallen = previous - 1;
                *peak = Some(fallen);
                fallen
            }
            _ => {
                *peak = Some(value);
                value
            }
        }
    }

    fn gradient(surface_height: f32) -> Paint {
        Paint::Gradient(LinearGradient {
            y0: surface_height,
            y1: 0.0,
            stops: vec![
                ColorStop {
                    offset: 0.0,
                    color: GRADIENT_BOTTOM,
                },
                ColorStop {
                    offset: 0.5,
                    color: GRADIENT_MIDDLE,
                },
                ColorStop {
                    offset: 1.0,
                    color: GRADIENT_TOP,
                },
            ],
        })
    }
}

impl SpectrumRenderer for BarMeter {
    fn kind(&self) -> SceneKind {
        SceneKind::BarMeter
    }

    fn render(&mut self, spectrum: &[u8], surface: &mut dyn Surface) {
        surface.clear();
        if self.slots == 0 {
            return;
        }

        let height = surface.height() as f32;
        let cap_height = self.config.cap_height as f32;
        let bar_width = self.config.bar_width as f32;
        let pitch = self.config.bar_width as f32 + self.config.gap as f32;
        let baseline = height - cap_height;
        let stride = spectrum.len() / self.slots;
        let cap_paint = Paint::Solid(self.config.cap_color);
        let bar_paint = Self::gradient(height);

        for slot in 0..self.slots {
            let value = spectrum.get(slot * stride).copied().unwrap_or(0);
            let cap = self.update_peak(slot, value);
            let x = slot as f32 * pitch;

            surface.fill_rect(
                Rect {
                    x,
                    y: baseline - cap as f32,
                    width: bar_width,
                    height: cap_height,
                },
                &cap_paint,
            );

            let top = (baseline - value as f32 + cap_height).max(0.0);
            let bar_height = height - top;
            if value > 0 && bar_height > 0.0 {
                surface.fill_rect(
                    Rect {
                        x,
                        y: top,
                        width: bar_width,
                        height: bar_height,
                    },
                    &bar_paint,
                );
            }
        }
    }
}
