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
use super::traits::SampleProvider;

/// A provider that produces a fixed length of silence. Useful as a placeholder
/// source and for scheduling voices that only need a timeline.
#[derive(Clone, Debug)]
pub struct SilenceSampleProvider {
    frame_count: i64,
    channel_count: u32,
    sample_rate: u32,
}

impl SilenceSampleProvider {
    /// Creates a silent provider with the given length in frames.
    pub fn new(frame_count: i64, channel_count: u32, sample_rate: u32) -> Self {
        Self {
            frame_count: frame_count.max(0),
            channel_count,
            sample_rate,
        }
    }
}

impl SampleProvider for SilenceSampleProvider {
    fn read_samples(
        &self,
        output: &mut [i16],
        _frame_offset: i64,
        frames_to_read: usize,
        channels_to_fill: u32,
    ) -> usize {
        let sample_count = (frames_to_read * channels_to_fill as usize).min(output.len());
        output[..sample_count].fill(0);
        0
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
