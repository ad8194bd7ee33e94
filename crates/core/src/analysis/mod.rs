use std::{collections::VecDeque, f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{config::AnalyserConfig, PlayerError, Result};

const BLACKMAN_A0: f32 = 0.42;
const BLACKMAN_A1: f32 = 0.5;
const BLACKMAN_A2: f32 = 0.08;

/// Live frequency analyser backing the session's analysis node.
///
/// Samples are appended by the audio tap as they are played. The byte
/// spectrum is derived lazily from the most recent `fft_size` samples and is
/// recomputed at most once per pushed block, so every reader in the same
/// frame observes identical data.
pub struct Analyser {
    config: AnalyserConfig,
    sample_rate: u32,
    window: VecDeque<f32>,
    received_samples: bool,
    dirty: bool,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
    fft: FftResources,
}

impl Analyser {
    pub fn new(config: AnalyserConfig, sample_rate: u32) -> Result<Self> {
        config.validate()?;
        if sample_rate == 0 {
            return Err(PlayerError::InvalidConfig("sample rate must be positive"));
        }

        let size = config.fft_size;
        let bins = config.frequency_bin_count();
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);
        let fft = FftResources {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            blackman: (0..size).map(|i| blackman_value(i, size)).collect(),
            plan,
        };

        Ok(Self {
            config,
            sample_rate,
            window: std::iter::repeat(0.0).take(size).collect(),
            received_samples: false,
            dirty: false,
            smoothed: vec![0.0; bins],
            bytes: vec![0; bins],
            fft,
        })
    }

    pub fn config(&self) -> &AnalyserConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.config.frequency_bin_count()
    }

    /// Centre frequency in Hz of the bin at `index`.
    pub fn frequency_of_bin(&self, index: usize) -> f32 {
        index as f32 * self.sample_rate as f32 / self.config.fft_size as f32
    }

    pub fn has_samples(&self) -> bool {
        self.received_samples
    }

    /// Appends mono samples, keeping only the most recent transform window.
    pub fn push_samples(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let size = self.config.fft_size;
        let fresh = &samples[samples.len().saturating_sub(size)..];
        let overflow = (self.window.len() + fresh.len()).saturating_sub(size);
        self.window.drain(..overflow);
        self.window.extend(fresh.iter().copied());

        self.received_samples = true;
        self.dirty = true;
    }

    /// Copies the current byte spectrum into `out`, resizing it to the bin
    /// count. Returns `false` and leaves `out` empty while no samples have
    /// been received yet.
    pub fn byte_frequency_data(&mut self, out: &mut Vec<u8>) -> Result<bool> {
        out.clear();
        if !self.received_samples {
            return Ok(false);
        }
        if self.dirty {
            self.update_spectrum()?;
            self.dirty = false;
        }
        out.extend_from_slice(&self.bytes);
        Ok(true)
    }

    fn update_spectrum(&mut self) -> Result<()> {
        let size = self.config.fft_size;
        let fft = &mut self.fft;

        for (index, (slot, sample)) in fft.input.iter_mut().zip(self.window.iter()).enumerate() {
            *slot = *sample * fft.blackman[index];
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let tau = self.config.smoothing_time_constant;
        let min_db = self.config.min_decibels;
        let range = self.config.max_decibels - min_db;
        let scale = 1.0 / size as f32;

        for (index, bin) in fft.spectrum.iter().take(self.smoothed.len()).enumerate() {
            let magnitude = bin.norm() * scale;
            let smoothed = tau * self.smoothed[index] + (1.0 - tau) * magnitude;
            let smoothed = if smoothed.is_finite() { smoothed } else { 0.0 };
            self.smoothed[index] = smoothed;
            self.bytes[index] = decibels_to_byte(to_decibels(smoothed), min_db, range);
        }

        Ok(())
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
    blackman: Vec<f32>,
}

impl fmt::Debug for Analyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyser")
            .field("config", &self.config)
            .field("sample_rate", &self.sample_rate)
            .field("received_samples", &self.received_samples)
            .field("dirty", &self.dirty)
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    let phase = 2.0 * PI * index as f32 / len as f32;
    BLACKMAN_A0 - BLACKMAN_A1 * phase.cos() + BLACKMAN_A2 * (2.0 * phase).cos()
}

fn to_decibels(magnitude: f32) -> f32 {
    if magnitude <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * magnitude.log10()
    }
}

fn decibels_to_byte(db: f32, min_db: f32, range: f32) -> u8 {
    let scaled = (255.0 / range) * (db - min_db);
    if scaled.is_nan() {
        return 0;
    }
    scaled.floor().clamp(0.0, 255.0) as u8
}
