// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use audiosys::audio::cpal::{OutputDevice, OutputStream};
use audiosys::audio::tone::{ToneGenerator, Waveform};
use audiosys::audio::{self, MAX_SOURCE_CHANNELS};
use audiosys::config;
use audiosys::engine::{AudioEngine, AudioSource, Writer};
use clap::{crate_version, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How often to check whether playback has finished.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Time given to the device to play out what is already staged.
const DRAIN_DELAY: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A real-time audio mixing engine."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Plays an audio file through an output device.
    Play {
        /// The audio file to play.
        path: PathBuf,
        /// Loop the file until interrupted.
        #[arg(short, long)]
        repeat: bool,
        /// The path to an engine config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The device name to play through. Overrides the config file.
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Plays a generated tone through an output device.
    Tone {
        /// The tone frequency in Hz.
        #[arg(short, long, default_value_t = 440.0)]
        frequency: f64,
        /// The tone amplitude, from 0.0 to 1.0.
        #[arg(short, long, default_value_t = 0.25)]
        amplitude: f64,
        /// The waveform: sine or square.
        #[arg(short, long, default_value_t = Waveform::Sine)]
        waveform: Waveform,
        /// How long to play the tone for.
        #[arg(short, long, default_value_t = 2.0)]
        seconds: f64,
        /// The device name to play through.
        #[arg(short, long)]
        device: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                match device.default_format {
                    Some(format) => println!("- {} [{}]", device, format),
                    None => println!("- {}", device),
                }
            }
        }
        Commands::Play {
            path,
            repeat,
            config,
            device,
        } => {
            let engine_config = match config {
                Some(config_path) => config::Engine::deserialize(&config_path)?,
                None => config::Engine::default(),
            };

            let device = OutputDevice::open(device.as_deref().or(engine_config.device()))?;
            let format = device.native_format(engine_config.explicit_format()?)?;
            let (engine, writer) = AudioEngine::init_with(
                format,
                engine_config.mix_mode(),
                engine_config.master_volume()?,
            )?;

            let source = engine.load_file_source(&path)?;
            println!(
                "Playing {} ({}, {:.1}s) on {} [{}]",
                path.display(),
                source.format(),
                source.duration().as_secs_f64(),
                device.name(),
                format
            );
            play_until_done(&engine, &device, writer, &source, repeat)?;
        }
        Commands::Tone {
            frequency,
            amplitude,
            waveform,
            seconds,
            device,
        } => {
            if !(0.0..=1.0).contains(&amplitude) {
                return Err(format!("amplitude must be between 0 and 1, got {}", amplitude).into());
            }

            let device = OutputDevice::open(device.as_deref())?;
            let format = device.native_format(None)?;
            let (engine, writer) = AudioEngine::init(format)?;

            let mut tone = ToneGenerator::new(waveform, frequency, amplitude);
            let frames = (seconds.max(0.0) * format.sample_rate as f64) as usize;
            let source = engine.generate_source(
                &mut tone,
                format.channels.min(MAX_SOURCE_CHANNELS),
                format.sample_rate,
                frames,
            )?;
            println!(
                "Playing {}Hz {} tone for {:.1}s on {} [{}]",
                frequency,
                waveform,
                seconds,
                device.name(),
                format
            );
            play_until_done(&engine, &device, writer, &source, false)?;
        }
    }

    Ok(())
}

/// Plays a source and blocks until the queue empties.
fn play_until_done(
    engine: &AudioEngine,
    device: &OutputDevice,
    writer: Writer,
    source: &Arc<AudioSource>,
    repeat: bool,
) -> Result<(), Box<dyn Error>> {
    let play_id = engine.play_source(source, repeat)?;
    let stream: OutputStream = device.start(writer)?;

    while engine.is_playing() {
        thread::sleep(POLL_INTERVAL);
    }
    thread::sleep(DRAIN_DELAY);

    let writer = stream.stop()?;
    info!(play_id = %play_id, "Playback finished");
    engine.clone().shutdown(writer);
    Ok(())
}
