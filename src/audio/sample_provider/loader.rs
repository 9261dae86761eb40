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

//! Decoding of audio files into in-memory sample providers.
//!
//! Files are decoded entirely up front on the calling (control) thread so the
//! audio thread only ever copies from memory.

use std::fs::File;
use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info, warn};

use super::error::SampleProviderError;
use super::memory::MemorySampleProvider;
use super::traits::SampleProvider;

/// Input block size for the sinc resampler.
const RESAMPLE_CHUNK_FRAMES: usize = 1024;

/// Loads an audio file (WAV, FLAC, OGG, MP3, ...) into memory.
///
/// If the file's sample rate differs from `target_sample_rate` the samples are
/// resampled so that voices play back at the right speed on the output stream.
pub fn load_file<P: AsRef<Path>>(
    path: P,
    target_sample_rate: u32,
) -> Result<MemorySampleProvider, SampleProviderError> {
    let path = path.as_ref();
    let file_name = path.display().to_string();
    let file = File::open(path).map_err(|e| {
        SampleProviderError::IoError(std::io::Error::new(e.kind(), format!("{}: {}", file_name, e)))
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SampleProviderError::NoAudioTrack(file_name.clone()))?;
    let track_id = track.id;
    let source_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SampleProviderError::MissingSampleRate(file_name.clone()))?;
    let declared_channels = track.codec_params.channels.map(|c| c.count() as u32);
    let mut channels = None;

    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<i16> = Vec::new();
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                // Malformed packets become a gap rather than failing the load.
                warn!(file = %file_name, error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        packet_channels(&mut channels, spec.channels.count() as u32, &file_name)?;
        let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    let channels = match (channels, declared_channels) {
        (Some(decoded), Some(declared)) if decoded != declared => {
            warn!(
                file = %file_name,
                declared,
                decoded,
                "Track header disagrees with decoded channel count"
            );
            decoded
        }
        (Some(decoded), _) => decoded,
        // Nothing decoded, so trust the header.
        (None, Some(declared)) => declared,
        (None, None) => 0,
    };
    if channels == 0 {
        return Err(SampleProviderError::MissingChannels(file_name));
    }

    let samples = if source_rate != target_sample_rate && target_sample_rate > 0 {
        info!(
            file = %file_name,
            source_rate,
            target_rate = target_sample_rate,
            "Resampling audio file"
        );
        resample(&samples, channels as usize, source_rate, target_sample_rate)?
    } else {
        samples
    };

    let provider = MemorySampleProvider::new(samples, channels, target_sample_rate.max(1));
    debug!(
        file = %file_name,
        channels,
        frames = provider.frame_count(),
        memory_kb = provider.memory_size() / 1024,
        "Audio file loaded"
    );
    Ok(provider)
}

/// Records the channel count of the first decoded packet and checks every later
/// packet against it.
fn packet_channels(
    established: &mut Option<u32>,
    found: u32,
    file_name: &str,
) -> Result<u32, SampleProviderError> {
    match *established {
        None => {
            *established = Some(found);
            Ok(found)
        }
        Some(expected) if expected == found => Ok(expected),
        Some(expected) => Err(SampleProviderError::ChannelCountChanged {
            file: file_name.to_string(),
            expected,
            found,
        }),
    }
}

/// Resamples interleaved 16-bit samples with a sinc resampler.
pub fn resample(
    interleaved: &[i16],
    channels: usize,
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<i16>, SampleProviderError> {
    if channels == 0 || interleaved.is_empty() || source_rate == target_rate {
        return Ok(interleaved.to_vec());
    }

    let in_frames = interleaved.len() / channels;
    let ratio = target_rate as f64 / source_rate as f64;
    let expected_frames = (in_frames as f64 * ratio).round() as usize;

    let mut planar = vec![Vec::with_capacity(in_frames); channels];
    for frame in interleaved.chunks_exact(channels) {
        for (channel, &sample) in planar.iter_mut().zip(frame) {
            channel.push(sample as f32 / 32768.0);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK_FRAMES, channels)?;
    let delay = resampler.output_delay();

    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected_frames + delay); channels];
    let append = |output: &mut Vec<Vec<f32>>, chunk: Vec<Vec<f32>>| {
        for (out, chunk) in output.iter_mut().zip(chunk) {
            out.extend_from_slice(&chunk);
        }
    };

    let mut position = 0;
    while in_frames - position >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let chunk: Vec<&[f32]> = planar
            .iter()
            .map(|c| &c[position..position + needed])
            .collect();
        append(&mut output, resampler.process(&chunk, None)?);
        position += needed;
    }

    if position < in_frames {
        let chunk: Vec<&[f32]> = planar.iter().map(|c| &c[position..]).collect();
        append(&mut output, resampler.process_partial(Some(chunk.as_slice()), None)?);
    }

    // Flush the resampler's delay line.
    while output[0].len() < delay + expected_frames {
        let tail = resampler.process_partial(None::<&[Vec<f32>]>, None)?;
        if tail.first().map_or(true, |c| c.is_empty()) {
            break;
        }
        append(&mut output, tail);
    }

    let available = output[0].len().saturating_sub(delay).min(expected_frames);
    let mut result = Vec::with_capacity(available * channels);
    for frame in delay..delay + available {
        for channel in &output {
            let scaled = (channel[frame] * 32768.0).round();
            result.push(scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16);
        }
    }

    Ok(result)
}
