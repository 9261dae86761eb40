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

//! Offline rendering of an engine into a WAV file.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

use hound::{WavSpec, WavWriter};
use thiserror::Error;
use tracing::info;

use super::callback::{Callback, CallbackResult};
use super::engine::Engine;

/// Upper bound for renders that run until every voice is idle.
pub const MAX_IDLE_RENDER: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum MixdownError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("the callback refused to render {channels} channels")]
    Stopped { channels: usize },
}

/// Drives `callback` as fast as possible and writes the mix to `path` as a
/// 16-bit WAV in the engine's format.
///
/// With a `length` exactly that much audio is written. Without one, rendering
/// stops after the first block in which no voice is playing any more, or at
/// [`MAX_IDLE_RENDER`]. Returns the number of frames written.
pub fn mixdown<P: AsRef<Path>>(
    engine: &Engine,
    callback: &mut Callback,
    path: P,
    length: Option<Duration>,
) -> Result<u64, MixdownError> {
    let channels = engine.channel_count();
    let sample_rate = engine.sample_rate();
    let block_frames = engine.settings().max_buffer_frames;
    let total_frames = crate::util::seconds_to_frames(
        length.unwrap_or(MAX_IDLE_RENDER).as_secs_f64(),
        sample_rate,
    )
    .max(0) as u64;

    let spec = WavSpec {
        channels: channels as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::new(BufWriter::new(File::create(path.as_ref())?), spec)?;
    info!(
        path = %path.as_ref().display(),
        channels,
        sample_rate,
        length = ?length,
        "Starting mixdown"
    );

    let mut buffer = vec![0i16; block_frames * channels];
    let mut written = 0u64;
    while written < total_frames {
        let frames = (total_frames - written).min(block_frames as u64) as usize;
        let block = &mut buffer[..frames * channels];
        if callback.render_i16(block, channels) == CallbackResult::Stop {
            return Err(MixdownError::Stopped { channels });
        }

        for &sample in block.iter() {
            writer.write_sample(sample)?;
        }
        written += frames as u64;

        if length.is_none() && engine.all_voices_idle() {
            break;
        }
    }
    writer.finalize()?;

    info!(frames = written, "Mixdown finished");
    Ok(written)
}
