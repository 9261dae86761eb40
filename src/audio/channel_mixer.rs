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
use std::{error::Error, fmt, str::FromStr};

use serde::Deserialize;

use super::sample_mix::mix_samples;

/// How a provider with four or more channels is folded down to stereo.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMixing {
    /// Soft-mix channels 0+2 into left and 1+3 into right.
    #[default]
    Mix,
    /// Keep channels 0 and 1.
    IgnoreTrailing,
    /// Keep channels 2 and 3.
    IgnoreLeading,
}

impl FromStr for ChannelMixing {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mix" => Ok(ChannelMixing::Mix),
            "ignore_trailing" => Ok(ChannelMixing::IgnoreTrailing),
            "ignore_leading" => Ok(ChannelMixing::IgnoreLeading),
            _ => Err(format!("Unsupported channel mixing: {}", s).into()),
        }
    }
}

impl ChannelMixing {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelMixing::Mix => "mix",
            ChannelMixing::IgnoreTrailing => "ignore_trailing",
            ChannelMixing::IgnoreLeading => "ignore_leading",
        }
    }

    /// Encoding used to share the behaviour with the audio thread.
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            ChannelMixing::Mix => 0,
            ChannelMixing::IgnoreTrailing => 1,
            ChannelMixing::IgnoreLeading => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ChannelMixing::IgnoreTrailing,
            2 => ChannelMixing::IgnoreLeading,
            _ => ChannelMixing::Mix,
        }
    }
}

impl fmt::Display for ChannelMixing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Converts interleaved frames between channel layouts.
///
/// Up-mixing repeats the source channels across the output (mono becomes
/// dual mono). Down-mixing to stereo from four or more channels follows the
/// configured [`ChannelMixing`]; every other down-mix keeps the leading
/// channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelMixer {
    mixing: ChannelMixing,
}

impl ChannelMixer {
    pub fn new(mixing: ChannelMixing) -> Self {
        Self { mixing }
    }

    pub fn mixing(&self) -> ChannelMixing {
        self.mixing
    }

    /// Converts `frames` frames of `source_channels` wide input into
    /// `target_channels` wide output. Both slices must hold at least `frames`
    /// frames of their layout.
    pub fn convert(
        &self,
        input: &[i16],
        source_channels: usize,
        output: &mut [i16],
        target_channels: usize,
        frames: usize,
    ) {
        if source_channels == 0 || target_channels == 0 {
            return;
        }
        debug_assert!(input.len() >= frames * source_channels);
        debug_assert!(output.len() >= frames * target_channels);

        let input = input[..frames * source_channels].chunks_exact(source_channels);
        let output = output[..frames * target_channels].chunks_exact_mut(target_channels);

        if source_channels == target_channels {
            for (src, dst) in input.zip(output) {
                dst.copy_from_slice(src);
            }
        } else if source_channels < target_channels {
            for (src, dst) in input.zip(output) {
                for (c, sample) in dst.iter_mut().enumerate() {
                    *sample = src[c % source_channels];
                }
            }
        } else if target_channels == 2 && source_channels >= 4 {
            match self.mixing {
                ChannelMixing::IgnoreTrailing => {
                    for (src, dst) in input.zip(output) {
                        dst.copy_from_slice(&src[..2]);
                    }
                }
                ChannelMixing::IgnoreLeading => {
                    for (src, dst) in input.zip(output) {
                        dst.copy_from_slice(&src[2..4]);
                    }
                }
                ChannelMixing::Mix => {
                    for (src, dst) in input.zip(output) {
                        dst[0] = mix_samples(src[0], src[2]);
                        dst[1] = mix_samples(src[1], src[3]);
                    }
                }
            }
        } else {
            for (src, dst) in input.zip(output) {
                dst.copy_from_slice(&src[..target_channels]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_to_stereo_duplicates() {
        let mixer = ChannelMixer::default();
        let mut output = vec![0i16; 6];
        mixer.convert(&[1, 2, 3], 1, &mut output, 2, 3);
        assert_eq!(output, vec![1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_stereo_to_quad_repeats() {
        let mixer = ChannelMixer::default();
        let mut output = vec![0i16; 4];
        mixer.convert(&[1, 2], 2, &mut output, 4, 1);
        assert_eq!(output, vec![1, 2, 1, 2]);
    }

    #[test]
    fn test_quad_to_stereo_behaviours() {
        let input = [100i16, 200, 300, 400];
        let mut output = vec![0i16; 2];

        ChannelMixer::new(ChannelMixing::IgnoreTrailing).convert(&input, 4, &mut output, 2, 1);
        assert_eq!(output, vec![100, 200]);

        ChannelMixer::new(ChannelMixing::IgnoreLeading).convert(&input, 4, &mut output, 2, 1);
        assert_eq!(output, vec![300, 400]);

        ChannelMixer::new(ChannelMixing::Mix).convert(&input, 4, &mut output, 2, 1);
        assert_eq!(
            output,
            vec![mix_samples(100, 300), mix_samples(200, 400)]
        );
    }

    #[test]
    fn test_other_downmix_keeps_leading() {
        let mixer = ChannelMixer::new(ChannelMixing::IgnoreLeading);
        let mut output = vec![0i16; 2];
        mixer.convert(&[1, 2, 3, 4, 5, 6], 3, &mut output, 1, 2);
        assert_eq!(output, vec![1, 4]);

        let mut output = vec![0i16; 4];
        mixer.convert(&[1, 2, 3, 4, 5, 6], 3, &mut output, 2, 2);
        assert_eq!(output, vec![1, 2, 4, 5]);
    }

    #[test]
    fn test_channel_mixing_from_str() {
        assert_eq!(ChannelMixing::from_str("mix").unwrap(), ChannelMixing::Mix);
        assert_eq!(
            ChannelMixing::from_str("ignore_leading").unwrap(),
            ChannelMixing::IgnoreLeading
        );
        assert!(ChannelMixing::from_str("surround").is_err());
        assert_eq!(ChannelMixing::IgnoreTrailing.to_string(), "ignore_trailing");
    }

    #[test]
    fn test_channel_mixing_encoding() {
        for mixing in [
            ChannelMixing::Mix,
            ChannelMixing::IgnoreTrailing,
            ChannelMixing::IgnoreLeading,
        ] {
            assert_eq!(ChannelMixing::from_u8(mixing.as_u8()), mixing);
        }
        assert_eq!(ChannelMixing::from_u8(200), ChannelMixing::Mix);
    }
}
