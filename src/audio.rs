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
use std::fmt;

use crate::config;

pub mod callback;
pub mod channel_mixer;
pub mod cpal;
pub mod engine;
pub mod error;
pub mod format;
pub mod mixdown;
pub mod mixer;
pub mod mock;
pub mod sample_mix;
pub mod sample_provider;
pub mod stream;
pub mod thread_priority;
pub mod voice;

pub use callback::{
    Callback, CallbackInfo, CallbackReceiver, CallbackResult, CallbackStats, SharedCallback,
};
pub use channel_mixer::{ChannelMixer, ChannelMixing};
pub use engine::{Engine, EngineError, EngineSettings, ReceiverId};
pub use error::OutputError;
pub use format::SampleFormat;
pub use sample_provider::{
    MemorySampleProvider, SampleProvider, SampleProviderError, SilenceSampleProvider,
};
pub use stream::Stream;
pub use voice::{Voice, VoiceHandle, VoiceInfo, VoiceOptions};

/// Quietest volume a voice or the master can be set to.
pub const MIN_VOLUME: f32 = 0.0;

/// Loudest volume a voice or the master can be set to.
pub const MAX_VOLUME: f32 = 1.0;

/// A running output stream that drives an engine callback.
pub trait Output: fmt::Display + Send {
    /// Stops the stream and waits for its thread to exit.
    fn stop(&mut self);

    /// False once the stream has been stopped, or stopped itself because the
    /// callback could not render what the device asked for.
    fn is_running(&self) -> bool;
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::DeviceInfo>, OutputError> {
    cpal::list_devices()
}

/// Opens the configured output and starts it playing `callback`.
pub fn open_output(
    config: &config::Audio,
    callback: SharedCallback,
) -> Result<Box<dyn Output>, OutputError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Box::new(mock::Output::start(config, callback)?));
    };

    Ok(Box::new(cpal::Output::open(config, callback)?))
}
