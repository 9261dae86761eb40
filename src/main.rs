// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
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
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use studio_mixer::audio::{
    self, mixdown::mixdown, sample_provider, Engine, SampleProvider, Stream, VoiceOptions,
};
use studio_mixer::config::Audio;
use studio_mixer::util::{duration_minutes_seconds, filename_display, frames_to_duration};

/// How often `play` reports voice positions.
const STATUS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A real-time voice mixer."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Plays audio files together through an output device.
    Play {
        /// The audio files to play, one voice each.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// The path to an audio config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The device name to play through. Overrides the config file.
        #[arg(short, long)]
        device: Option<String>,
        /// The master volume, 0.0 to 1.0.
        #[arg(short, long)]
        volume: Option<f32>,
        /// Loop every file until interrupted.
        #[arg(short, long = "loop")]
        looping: bool,
    },
    /// Renders audio files together into a 16-bit WAV file.
    Mixdown {
        /// The audio files to mix, one voice each.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// The WAV file to write.
        #[arg(short, long)]
        output: PathBuf,
        /// How many seconds to render. Defaults to the longest file.
        #[arg(short, long)]
        seconds: Option<f64>,
        /// The path to an audio config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<Audio, Box<dyn Error>> {
    Ok(match path {
        Some(path) => Audio::deserialize(path)?,
        None => Audio::default(),
    })
}

/// Loads every file and adds it to the engine as a playing voice.
fn add_files(engine: &Engine, files: &[PathBuf], looping: bool) -> Result<(), Box<dyn Error>> {
    for file in files {
        let provider = sample_provider::load_file(file, engine.sample_rate())?;
        let name = filename_display(file);
        info!(
            file = name,
            duration = %duration_minutes_seconds(provider.duration()),
            "Loaded file"
        );
        engine.add_voice_with(
            Arc::new(provider),
            name,
            VoiceOptions {
                playing: true,
                looping,
                ..Default::default()
            },
        )?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
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
                println!("- {}", device);
            }
        }
        Commands::Play {
            files,
            config,
            device,
            volume,
            looping,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(device) = device {
                config = config.with_device(&device);
            }
            if let Some(volume) = volume {
                config = config.with_master_volume(volume);
            }

            let (engine, callback) = Engine::new(config.engine_settings()?)?;
            add_files(&engine, &files, looping)?;

            let mut stream = Stream::new(config, callback);
            stream.start()?;
            println!("Playing {} file(s) through {}", files.len(), stream);

            while stream.is_running() && (looping || !engine.all_voices_idle()) {
                thread::sleep(STATUS_INTERVAL);
                for voice in engine.voices() {
                    println!("{}", voice);
                }
            }

            let stats = engine.callback_stats();
            stream.stop();
            println!(
                "Callbacks: {}, stream time {:?}, average {:?}, max {:?}",
                stats.count(),
                engine.stream_time(),
                stats.average_duration(),
                stats.max_duration()
            );
        }
        Commands::Mixdown {
            files,
            output,
            seconds,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let (engine, mut callback) = Engine::new(config.engine_settings()?)?;
            add_files(&engine, &files, false)?;

            let frames = mixdown(
                &engine,
                &mut callback,
                &output,
                seconds.map(|s| Duration::from_secs_f64(s.max(0.0))),
            )?;
            println!(
                "Wrote {} ({})",
                output.display(),
                duration_minutes_seconds(frames_to_duration(frames as i64, engine.sample_rate()))
            );
        }
    }

    Ok(())
}
