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
use std::time::Duration;

/// A random-access source of interleaved 16-bit PCM frames.
///
/// Providers are read from the audio callback thread, possibly by several
/// voices at once, so implementations must not keep a read cursor and must
/// never block. The frame offset of every read is passed in explicitly.
pub trait SampleProvider: Send + Sync {
    /// Fills `output` with `frames_to_read * channels_to_fill` interleaved samples
    /// starting at `frame_offset`.
    ///
    /// Every sample of the requested region is written. Frames before 0 or at or
    /// after `frame_count()` are written as exact zeros. `frame_offset` may be
    /// negative. If `channels_to_fill` differs from `channel_count()`, each output
    /// frame receives the first shared channels and any extra output channels are
    /// zero.
    ///
    /// Returns the number of frames that carried real data.
    fn read_samples(
        &self,
        output: &mut [i16],
        frame_offset: i64,
        frames_to_read: usize,
        channels_to_fill: u32,
    ) -> usize;

    /// Total number of playable frames.
    fn frame_count(&self) -> i64;

    /// Number of interleaved channels per frame.
    fn channel_count(&self) -> u32;

    /// Sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Playable length of the provider.
    fn duration(&self) -> Duration {
        crate::util::frames_to_duration(self.frame_count(), self.sample_rate())
    }
}

/// Splits a read request into its silent prefix, its in-range body and its
/// silent tail, all in frames. Shared by providers that store their frames
/// contiguously.
///
/// Returns `(leading_silence, first_source_frame, frames_to_copy)`.
pub(crate) fn clamp_read_range(
    frame_offset: i64,
    frames_to_read: usize,
    frame_count: i64,
) -> (usize, usize, usize) {
    let end = frame_offset.saturating_add(frames_to_read as i64);

    // Entirely before the start or entirely after the end.
    if end <= 0 || frame_offset >= frame_count || frame_count <= 0 {
        return (frames_to_read, 0, 0);
    }

    let leading_silence = if frame_offset < 0 {
        (-frame_offset) as usize
    } else {
        0
    };
    let first_source_frame = frame_offset.max(0);
    let last_source_frame = end.min(frame_count);
    let frames_to_copy = (last_source_frame - first_source_frame) as usize;

    (leading_silence, first_source_frame as usize, frames_to_copy)
}
