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
/// Error types for loading sample providers.
#[derive(Debug, thiserror::Error)]
pub enum SampleProviderError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Audio file error: {0}")]
    AudioError(#[from] symphonia::core::errors::Error),

    #[error("No audio track found in {0}")]
    NoAudioTrack(String),

    #[error("Sample rate not specified in {0}")]
    MissingSampleRate(String),

    #[error("Channel count not specified in {0}")]
    MissingChannels(String),

    #[error("Channel count of {file} changed from {expected} to {found}")]
    ChannelCountChanged {
        file: String,
        expected: u32,
        found: u32,
    },

    #[error("Failed to create resampler: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),

    #[error("Resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
}
