mod offline;
mod profile;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use cwtrainer_engine::{AudioCore, EngineKind, Trainer, create_engine};
use cwtrainer_messages::{AudioConfig, Event, Hertz, PlaybackOutcome, Wpm};
use log::{LevelFilter, info, warn};

use crate::offline::{OfflineSession, write_wav};
use crate::profile::Profile;

#[derive(Parser)]
#[command(name = "cwtrainer")]
#[command(about = "Half-duplex CW transceiver simulator for Morse practice")]
struct Cli {
    #[command(flatten)]
    options: CommonOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonOptions {
    /// JSON practice profile (frequency, effective speed, band conditions)
    #[arg(short, long, global = true, value_name = "PROFILE.JSON")]
    profile: Option<PathBuf>,

    /// Tone frequency in Hz, clamped to 400-800
    #[arg(short, long, global = true)]
    frequency: Option<f32>,

    /// Farnsworth effective speed in WPM, clamped to 10-18
    #[arg(short, long, global = true)]
    wpm: Option<u32>,

    /// Seed for the band-condition noise
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Play through the default output device instead of the null backend
    #[arg(long, global = true)]
    real: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Preview a single clean tone
    Tone {
        /// Tone length in milliseconds
        #[arg(short, long, default_value = "500")]
        duration_ms: u64,
    },

    /// Send text as clean sidetone, one tone at a time
    Send {
        /// Text to send
        text: String,
    },

    /// Receive text through simulated band conditions in a live session
    Listen {
        /// Text to receive
        text: String,

        /// Keep the session open this many seconds after the text ends
        #[arg(long, default_value = "1")]
        tail_secs: u64,
    },

    /// Render received text to a WAV file without an output device
    Render {
        /// Text to render
        text: String,

        /// Output WAV file
        #[arg(short, long, value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Render clean transmit sidetone instead of the received signal
        #[arg(long)]
        transmit: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .format(|buf, record| {
            writeln!(
                buf,
                "{:<5} - mod path |{}| - target | {} | args: |{}|",
                record.level(),
                record.module_path().unwrap_or(""),
                record.target(),
                record.args()
            )
        })
        .filter_level(LevelFilter::Debug)
        .filter_module("cwtrainer_engine", LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let profile = match &cli.options.profile {
        Some(path) => Profile::load(path)?,
        None => Profile::default(),
    };

    match cli.command {
        Commands::Tone { duration_ms } => {
            tone_command(&cli.options, &profile, Duration::from_millis(duration_ms))
        }
        Commands::Send { text } => send_command(&cli.options, &profile, &text),
        Commands::Listen { text, tail_secs } => {
            listen_command(&cli.options, &profile, &text, Duration::from_secs(tail_secs))
        }
        Commands::Render {
            text,
            output,
            transmit,
        } => render_command(&cli.options, &profile, &text, &output, transmit),
    }
}

fn audio_config(options: &CommonOptions) -> AudioConfig {
    AudioConfig {
        seed: options.seed,
        ..AudioConfig::default()
    }
}

/// Build the core with the profile applied and command-line overrides on top.
fn build_core(options: &CommonOptions, profile: &Profile) -> AudioCore {
    let audio = audio_config(options);
    let kind = if options.real {
        EngineKind::Real
    } else {
        EngineKind::Null
    };

    let core = AudioCore::new(audio, create_engine(kind, audio));
    profile.apply(&core);
    if let Some(hz) = options.frequency {
        core.set_frequency(Hertz(hz));
    }
    if let Some(wpm) = options.wpm {
        core.set_effective_speed(Wpm(wpm));
    }
    core
}

/// Spawn the worker with a thread that logs its events.
fn spawn_trainer(core: AudioCore) -> (Trainer, thread::JoinHandle<()>) {
    let (event_tx, event_rx) = flume::unbounded::<Event>();
    let trainer = Trainer::spawn(core.with_events(event_tx.clone()), event_tx);

    let logger = thread::spawn(move || {
        for event in event_rx.iter() {
            match event {
                Event::StateSnapshot(state) => info!(
                    "{} at {}, {} ({})",
                    state.radio.mode, state.frequency, state.effective_speed, state.audio.sample_rate
                ),
                Event::PlaybackFinished(PlaybackOutcome::Failed(reason)) => {
                    warn!("playback failed: {}", reason)
                }
                other => info!("{:?}", other),
            }
        }
    });

    (trainer, logger)
}

fn finish(trainer: Trainer, logger: thread::JoinHandle<()>) -> anyhow::Result<()> {
    trainer.shutdown()?;
    logger
        .join()
        .map_err(|_| anyhow::anyhow!("event logger panicked"))
}

fn report(outcome: PlaybackOutcome) -> anyhow::Result<()> {
    match outcome {
        PlaybackOutcome::Completed => Ok(()),
        PlaybackOutcome::Stopped => {
            info!("playback stopped");
            Ok(())
        }
        PlaybackOutcome::Failed(reason) => Err(anyhow::anyhow!(reason)),
    }
}

fn tone_command(options: &CommonOptions, profile: &Profile, duration: Duration) -> anyhow::Result<()> {
    let core = build_core(options, profile);
    let frequency = core.frequency();
    let (trainer, logger) = spawn_trainer(core);

    let outcome = trainer.play_tone(frequency, duration)?;
    finish(trainer, logger)?;
    report(outcome)
}

fn send_command(options: &CommonOptions, profile: &Profile, text: &str) -> anyhow::Result<()> {
    let (trainer, logger) = spawn_trainer(build_core(options, profile));

    info!("sending {:?} at {}", text, trainer.core().effective_speed());
    let outcome = trainer.play_group(text)?;
    finish(trainer, logger)?;
    report(outcome)
}

fn listen_command(
    options: &CommonOptions,
    profile: &Profile,
    text: &str,
    tail: Duration,
) -> anyhow::Result<()> {
    let (trainer, logger) = spawn_trainer(build_core(options, profile));

    trainer
        .core()
        .start_session()
        .context("starting listening session")?;
    let outcome = trainer.play_group(text)?;
    thread::sleep(tail);
    trainer.core().end_session();

    finish(trainer, logger)?;
    report(outcome)
}

fn render_command(
    options: &CommonOptions,
    profile: &Profile,
    text: &str,
    output: &Path,
    transmit: bool,
) -> anyhow::Result<()> {
    let core = build_core(options, profile);
    let session = OfflineSession {
        audio: core.audio_config(),
        frequency: core.frequency(),
        effective_speed: core.effective_speed(),
        band: core.band_conditions(),
        transmit,
        padding: Duration::from_millis(250),
    };

    let samples = session.render(text)?;
    write_wav(output, &samples, session.audio.sample_rate)
}
