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

use thiserror::Error;

/// Errors from opening or running an output stream. They are reported once,
/// when the stream is opened; nothing is propagated out of the audio callback.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("no output device found with name {0}")]
    DeviceNotFound(String),

    #[error("no default output device available")]
    NoDefaultDevice,

    #[error("device {device} supports {available} channels, {requested} requested")]
    TooManyChannels {
        device: String,
        requested: u16,
        available: u16,
    },

    #[error("audio host error: {0}")]
    Host(String),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("invalid output configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("output thread exited before the stream started")]
    ThreadExited,
}
