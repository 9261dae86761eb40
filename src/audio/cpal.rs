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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, span, Level};

use super::callback::{CallbackResult, SharedCallback};
use super::error::OutputError;
use super::thread_priority::AudioThreadPriority;
use super::SampleFormat;
use crate::config;

/// How often the output thread checks whether it should shut the stream down.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An output device as seen by cpal.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// Lists output devices on every available host.
pub fn list_devices() -> Result<Vec<DeviceInfo>, OutputError> {
    Ok(list_cpal_devices()?
        .into_iter()
        .map(|(info, _)| info)
        .collect())
}

fn list_cpal_devices() -> Result<Vec<(DeviceInfo, cpal::Device)>, OutputError> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(e) => {
                error!(err = %e, host = host_id.name(), "Unable to open host");
                continue;
            }
        };
        let host_devices = match host.output_devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = %e,
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let Ok(output_configs) = device.supported_output_configs() else {
                continue;
            };
            let max_channels = output_configs
                .map(|config| config.channels())
                .max()
                .unwrap_or(0);
            if max_channels == 0 {
                continue;
            }

            let Ok(name) = device.name() else {
                continue;
            };
            devices.push((
                DeviceInfo {
                    name,
                    host: host_id.name().to_string(),
                    max_channels,
                },
                device,
            ));
        }
    }

    devices.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name));
    Ok(devices)
}

/// Finds the named device, or the default output device for "default".
fn find_device(name: &str) -> Result<(DeviceInfo, cpal::Device), OutputError> {
    if name == "default" {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(OutputError::NoDefaultDevice)?;
        let max_channels = device
            .supported_output_configs()
            .map_err(|e| OutputError::Host(e.to_string()))?
            .map(|config| config.channels())
            .max()
            .unwrap_or(0);
        let info = DeviceInfo {
            name: device
                .name()
                .map_err(|e| OutputError::Host(e.to_string()))?,
            host: host.id().name().to_string(),
            max_channels,
        };
        return Ok((info, device));
    }

    list_cpal_devices()?
        .into_iter()
        .find(|(info, _)| info.name.trim() == name)
        .ok_or_else(|| OutputError::DeviceNotFound(name.to_string()))
}

/// A running cpal output stream driving an engine callback.
///
/// The stream is created and owned by a dedicated output thread, since cpal
/// streams can't move between threads on every platform.
pub struct Output {
    name: String,
    running: Arc<AtomicBool>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl Output {
    /// Opens the configured device and starts playing `callback` through it.
    /// Returns once the stream is running, or with the error that stopped it
    /// from starting.
    pub fn open(config: &config::Audio, callback: SharedCallback) -> Result<Output, OutputError> {
        let device_name = config.device().to_string();
        let channels = config.channels();
        let sample_rate = config.sample_rate();
        let buffer_size = config.buffer_size() as u32;
        let sample_format = config.sample_format()?;
        let priority = AudioThreadPriority::from_env();

        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<String, OutputError>>(1);

        let output_thread = {
            let running = running.clone();
            thread::Builder::new()
                .name("studio-mixer-output".to_string())
                .spawn(move || {
                    let span = span!(Level::INFO, "output stream (cpal)", device = %device_name);
                    let _enter = span.enter();

                    let stream = match build_stream(
                        &device_name,
                        channels,
                        sample_rate,
                        buffer_size,
                        sample_format,
                        callback,
                        priority,
                        running.clone(),
                    ) {
                        Ok((stream, name)) => {
                            let _ = ready_tx.send(Ok(name));
                            stream
                        }
                        Err(e) => {
                            error!(err = %e, "Failed to start output stream");
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                    info!(
                        channels,
                        sample_rate,
                        buffer_size,
                        format = %sample_format,
                        "Output stream started"
                    );
                    while running.load(Ordering::Acquire) {
                        thread::park_timeout(STOP_POLL_INTERVAL);
                    }
                    drop(stream);
                    info!("Output stream stopped");
                })?
        };

        match ready_rx.recv() {
            Ok(Ok(name)) => Ok(Output {
                name,
                running,
                output_thread: Some(output_thread),
            }),
            Ok(Err(e)) => {
                let _ = output_thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = output_thread.join();
                Err(OutputError::ThreadExited)
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_stream(
    device_name: &str,
    channels: u16,
    sample_rate: u32,
    buffer_size: u32,
    sample_format: SampleFormat,
    callback: SharedCallback,
    priority: AudioThreadPriority,
    running: Arc<AtomicBool>,
) -> Result<(cpal::Stream, String), OutputError> {
    let (info, device) = find_device(device_name)?;
    if info.max_channels < channels {
        return Err(OutputError::TooManyChannels {
            device: info.name,
            requested: channels,
            available: info.max_channels,
        });
    }

    let config = cpal::StreamConfig {
        channels,
        sample_rate: sample_rate,
        buffer_size: cpal::BufferSize::Fixed(buffer_size),
    };
    let channel_count = channels as usize;
    let mut priority_set = false;
    let error_callback = |err: cpal::StreamError| error!(err = %err, "Output stream error");

    let stream = match sample_format {
        SampleFormat::Int => device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                if !priority_set {
                    priority.apply();
                    priority_set = true;
                }
                if callback.render_i16(data, channel_count) == CallbackResult::Stop {
                    running.store(false, Ordering::Release);
                }
            },
            error_callback,
            None,
        )?,
        SampleFormat::Float => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if !priority_set {
                    priority.apply();
                    priority_set = true;
                }
                if callback.render_f32(data, channel_count) == CallbackResult::Stop {
                    running.store(false, Ordering::Release);
                }
            },
            error_callback,
            None,
        )?,
    };
    stream.play()?;
    Ok((stream, info.name))
}

impl super::Output for Output {
    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(output_thread) = self.output_thread.take() {
            output_thread.thread().unpark();
            let _ = output_thread.join();
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        super::Output::stop(self);
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (cpal)", self.name)
    }
}
