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
use std::path::Path;
use std::str::FromStr;

use config::{Config, File, FileFormat};
use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::{ChannelMixing, EngineSettings, SampleFormat};

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_BUFFER_SIZE: usize = 64;
const DEFAULT_MAX_BUFFER_SIZE: usize = 1024;
const DEFAULT_MAX_VOICES: usize = 64;
const DEFAULT_MASTER_VOLUME: f32 = 1.0;
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// A YAML representation of the audio output and engine configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Audio {
    /// The output device. "default" picks the host's default output, names
    /// starting with "mock" select the software device.
    device: Option<String>,

    /// Output sample rate in Hz (default: 44100)
    sample_rate: Option<u32>,

    /// Output channel count (default: 2)
    channels: Option<u16>,

    /// Frames requested from the device per callback (default: 64)
    buffer_size: Option<usize>,

    /// Largest number of frames mixed in one pass (default: 1024)
    max_buffer_size: Option<usize>,

    /// Voice pool capacity (default: 64)
    max_voices: Option<usize>,

    /// Output sample format, "int" or "float" (default: "int")
    sample_format: Option<String>,

    /// How four channel sources are folded to stereo (default: "mix")
    channel_mixing: Option<String>,

    /// Master volume (default: 1.0)
    master_volume: Option<f32>,

    /// Capacity of the pending operation queue (default: 256)
    queue_capacity: Option<usize>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    /// Parses an audio configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Audio, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .build()?
            .try_deserialize::<Audio>()?)
    }

    /// Parses an audio configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Audio, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Audio>()?)
    }

    /// Overrides the output device.
    pub fn with_device(mut self, device: &str) -> Audio {
        self.device = Some(device.to_string());
        self
    }

    /// Overrides the master volume.
    pub fn with_master_volume(mut self, master_volume: f32) -> Audio {
        self.master_volume = Some(master_volume);
        self
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the output sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// Returns the output channel count (default: 2)
    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS)
    }

    /// Returns the device buffer size in frames (default: 64)
    pub fn buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }

    /// Returns the mixing pass size in frames (default: 1024). Never smaller
    /// than the device buffer size.
    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
            .unwrap_or(DEFAULT_MAX_BUFFER_SIZE)
            .max(self.buffer_size())
    }

    /// Returns the voice pool capacity (default: 64)
    pub fn max_voices(&self) -> usize {
        self.max_voices.unwrap_or(DEFAULT_MAX_VOICES)
    }

    /// Returns the output sample format (default: Int)
    pub fn sample_format(&self) -> Result<SampleFormat, ConfigError> {
        match self.sample_format.as_deref() {
            Some(format) => {
                SampleFormat::from_str(format).map_err(|e| ConfigError::Invalid(e.to_string()))
            }
            None => Ok(SampleFormat::Int),
        }
    }

    /// Returns the channel mixing behaviour (default: Mix)
    pub fn channel_mixing(&self) -> Result<ChannelMixing, ConfigError> {
        match self.channel_mixing.as_deref() {
            Some(mixing) => {
                ChannelMixing::from_str(mixing).map_err(|e| ConfigError::Invalid(e.to_string()))
            }
            None => Ok(ChannelMixing::default()),
        }
    }

    /// Returns the master volume (default: 1.0)
    pub fn master_volume(&self) -> f32 {
        self.master_volume.unwrap_or(DEFAULT_MASTER_VOLUME)
    }

    /// Returns the pending operation queue capacity (default: 256)
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }

    /// Builds the engine settings described by this configuration.
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        if self.buffer_size() == 0 {
            return Err(ConfigError::Invalid(
                "buffer_size must be greater than 0".to_string(),
            ));
        }

        Ok(EngineSettings {
            sample_rate: self.sample_rate(),
            channels: self.channels() as usize,
            max_buffer_frames: self.max_buffer_size(),
            max_voices: self.max_voices(),
            queue_capacity: self.queue_capacity(),
            master_volume: self.master_volume(),
            channel_mixing: self.channel_mixing()?,
        })
    }
}
