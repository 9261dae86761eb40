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
use std::sync::Arc;

use super::traits::{clamp_read_range, SampleProvider};

/// A sample provider backed by decoded PCM held in memory.
///
/// The interleaved samples live in an `Arc` so any number of providers and
/// voices can share one decoded buffer without copying it.
#[derive(Clone)]
pub struct MemorySampleProvider {
    /// Interleaved samples.
    samples: Arc<[i16]>,
    channel_count: u32,
    sample_rate: u32,
    /// Cached frame count (samples / channels).
    frame_count: i64,
}

impl MemorySampleProvider {
    /// Creates a new memory provider from interleaved samples. Trailing samples
    /// that don't make up a whole frame are ignored.
    pub fn new(interleaved_samples: Vec<i16>, channel_count: u32, sample_rate: u32) -> Self {
        Self::from_shared(Arc::from(interleaved_samples), channel_count, sample_rate)
    }

    /// Creates a memory provider that shares an already decoded buffer.
    pub fn from_shared(samples: Arc<[i16]>, channel_count: u32, sample_rate: u32) -> Self {
        debug_assert!(channel_count > 0, "providers need at least one channel");
        let frame_count = if channel_count > 0 {
            (samples.len() / channel_count as usize) as i64
        } else {
            0
        };

        Self {
            samples,
            channel_count,
            sample_rate,
            frame_count,
        }
    }

    /// Returns the shared sample buffer.
    pub fn shared_samples(&self) -> Arc<[i16]> {
        self.samples.clone()
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.samples.len() * std::mem::size_of::<i16>()
    }
}

impl SampleProvider for MemorySampleProvider {
    fn read_samples(
        &self,
        output: &mut [i16],
        frame_offset: i64,
        frames_to_read: usize,
        channels_to_fill: u32,
    ) -> usize {
        let out_channels = channels_to_fill as usize;
        let src_channels = self.channel_count as usize;
        let sample_count = (frames_to_read * out_channels).min(output.len());
        let output = &mut output[..sample_count];

        output.fill(0);
        if src_channels == 0 || out_channels == 0 {
            return 0;
        }

        let (leading, first_frame, frames_to_copy) =
            clamp_read_range(frame_offset, frames_to_read, self.frame_count);
        if frames_to_copy == 0 {
            return 0;
        }

        // Don't write past a short output buffer.
        let frames_to_copy = frames_to_copy.min((sample_count / out_channels).saturating_sub(leading));
        let src_start = first_frame * src_channels;
        let dst_start = leading * out_channels;

        if src_channels == out_channels {
            let len = frames_to_copy * src_channels;
            output[dst_start..dst_start + len]
                .copy_from_slice(&self.samples[src_start..src_start + len]);
        } else {
            let shared = src_channels.min(out_channels);
            let src = &self.samples[src_start..src_start + frames_to_copy * src_channels];
            let dst = &mut output[dst_start..dst_start + frames_to_copy * out_channels];
            for (src_frame, dst_frame) in src
                .chunks_exact(src_channels)
                .zip(dst.chunks_exact_mut(out_channels))
            {
                dst_frame[..shared].copy_from_slice(&src_frame[..shared]);
            }
        }

        frames_to_copy
    }

    fn frame_count(&self) -> i64 {
        self.frame_count
    }

    fn channel_count(&self) -> u32 {
        self.channel_count
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl std::fmt::Debug for MemorySampleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySampleProvider")
            .field("frames", &self.frame_count)
            .field("channels", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
