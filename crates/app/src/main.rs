use std::{
    f32::consts::PI,
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
};

use clap::{Parser, Subcommand};
use spectrum_player_core::{
    sim::{SimulatedBackend, SimulatedMedia},
    Activation, AppConfig, BarMeter, ManualFrameClock, MediaElementId, PlaybackController,
    PlaybackStore, PlayerError, RadialBloom, Recorder, RecordingSurface, SpectrumRenderer,
    SpectrumView, TrackRef,
};
use tracing_subscriber::EnvFilter;

const REFRESH_HZ: u32 = 60;
const SAMPLE_RATE: u32 = 48_000;

type View<R> = SpectrumView<R, RecordingSurface, ManualFrameClock>;
type Controller = PlaybackController<SimulatedMedia, SimulatedBackend>;

fn main() -> spectrum_player_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            frames,
            config,
            output,
            track,
            volume,
        } => {
            let config = match config {
                Some(path) => AppConfig::load(path)?,
                None => AppConfig::default(),
            };
            run_demo(&config, frames, &track, volume, output.as_ref())
        }
        Commands::Config => {
            println!("{}", AppConfig::default().to_json_pretty()?);
            Ok(())
        }
    }
}

fn run_demo(
    config: &AppConfig,
    frames: u64,
    track: &str,
    volume: Option<f64>,
    output: Option<&PathBuf>,
) -> spectrum_player_core::Result<()> {
    tracing::info!(frames, track, "starting demo session");

    let store = PlaybackStore::new();
    let clock = ManualFrameClock::new();

    let radial: Arc<Mutex<View<RadialBloom>>> = Arc::new(Mutex::new(SpectrumView::new(
        RadialBloom::new(config.radial.clone()),
        RecordingSurface::new(config.radial.width, config.radial.height),
        clock.clone(),
    )));
    let meter_surface = RecordingSurface::new(config.meter.width, config.meter.height);
    let meter: Arc<Mutex<View<BarMeter>>> = Arc::new(Mutex::new(SpectrumView::new(
        BarMeter::for_surface(config.meter.clone(), &meter_surface),
        meter_surface,
        clock.clone(),
    )));
    mount(&store, &radial)?;
    mount(&store, &meter)?;

    let track_seconds = frames as f64 / REFRESH_HZ as f64 + 1.0;
    let media = SimulatedMedia::new(MediaElementId(1)).with_track_duration(Some(track_seconds));
    let mut controller = PlaybackController::new(
        media,
        SimulatedBackend::new(SAMPLE_RATE),
        store.clone(),
        config,
    );
    if let Some(volume) = volume {
        controller.set_volume(volume);
    }

    store.set_current_track(TrackRef::new(track))?;
    controller.load_current(Activation::UserGesture)?;
    dispatch_media_events(&mut controller);

    let tap = controller
        .graph()
        .tap()
        .ok_or_else(|| PlayerError::msg("audio session was not attached"))?;

    let mut recorder = Recorder::new();
    recorder.start();
    let mut tone = ToneSweep::new(SAMPLE_RATE, track_seconds as f32);
    let block_len = (SAMPLE_RATE / REFRESH_HZ) as usize;

    for frame in 0..frames {
        tap.push_samples(&tone.next_block(block_len))?;
        controller.media_mut().advance(1.0 / REFRESH_HZ as f64);
        dispatch_media_events(&mut controller);

        for token in clock.vsync()? {
            lock(&radial)?.on_frame(token)?;
            lock(&meter)?.on_frame(token)?;
        }

        capture(&mut recorder, frame, &radial)?;
        capture(&mut recorder, frame, &meter)?;
    }
    recorder.stop();

    tracing::info!(
        status = ?controller.status()?,
        seek = controller.seek_position(),
        radial_frames = lock(&radial)?.frames_painted(),
        meter_frames = lock(&meter)?.frames_painted(),
        recorded = recorder.frames().len(),
        "demo finished"
    );

    lock(&radial)?.unmount()?;
    lock(&meter)?.unmount()?;

    if let Some(path) = output {
        let mut writer = BufWriter::new(File::create(path)?);
        recorder.write_json(&mut writer)?;
        writer.flush()?;
        tracing::info!(?path, "wrote recorded frames");
    }
    Ok(())
}

/// Subscribes a view to the store and lets it catch up with current state.
fn mount<R>(store: &PlaybackStore, view: &Arc<Mutex<View<R>>>) -> spectrum_player_core::Result<()>
where
    R: SpectrumRenderer + Send + 'static,
{
    lock(view)?.sync(store)?;
    let listener = view.clone();
    store.subscribe(move |change| {
        let result = lock(&listener).and_then(|mut view| view.handle_change(change));
        if let Err(err) = result {
            tracing::error!(%err, "view failed to follow store change");
        }
    })?;
    Ok(())
}

fn dispatch_media_events(controller: &mut Controller) {
    for event in controller.media_mut().take_events() {
        match controller.handle_media_event(event) {
            Ok(()) => {}
            Err(err) if err.awaits_user_interaction() => {
                tracing::warn!("tap to play");
            }
            Err(err) => tracing::error!(%err, "playback error"),
        }
    }
}

fn capture<R: SpectrumRenderer>(
    recorder: &mut Recorder,
    frame: u64,
    view: &Mutex<View<R>>,
) -> spectrum_player_core::Result<()> {
    let mut view = lock(view)?;
    let scene = view.kind();
    if let Some(surface) = view.surface_mut() {
        recorder.capture(frame, scene, surface);
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> spectrum_player_core::Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| PlayerError::msg("view has been poisoned"))
}

/// Exponential sine sweep with one overtone, standing in for decoded audio.
struct ToneSweep {
    sample_rate: f32,
    duration: f32,
    elapsed: f32,
    phase: f32,
}

impl ToneSweep {
    const START_HZ: f32 = 110.0;
    const END_HZ: f32 = 8_000.0;

    fn new(sample_rate: u32, duration: f32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            duration: duration.max(f32::EPSILON),
            elapsed: 0.0,
            phase: 0.0,
        }
    }

    fn next_block(&mut self, len: usize) -> Vec<f32> {
        let step = 1.0 / self.sample_rate;
        (0..len)
            .map(|_| {
                let progress = (self.elapsed / self.duration).min(1.0);
                let frequency = Self::START_HZ * (Self::END_HZ / Self::START_HZ).powf(progress);
                self.phase = (self.phase + 2.0 * PI * frequency * step) % (2.0 * PI);
                self.elapsed += step;
                0.6 * self.phase.sin() + 0.2 * (3.0 * self.phase).sin()
            })
            .collect()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Spectrum player host shell", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a synthesised track through the engine and record both visualisers.
    Demo {
        /// Number of display refreshes to simulate.
        #[arg(short, long, default_value_t = 120)]
        frames: u64,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Where to write the recorded frames as JSON.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Track locator handed to the store.
        #[arg(short, long, default_value = "demo://sweep")]
        track: String,
        /// Volume on the 0..100 scale.
        #[arg(long)]
        volume: Option<f64>,
    },
    /// Print the default configuration as JSON.
    Config,
}
