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
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use tracing::{info, span, Level};

use super::callback::{CallbackResult, SharedCallback};
use super::error::OutputError;
use super::SampleFormat;
use crate::config;

/// A software output. Doesn't actually play anything, but calls the engine
/// callback from its own thread at the pace a real device would.
pub struct Output {
    name: String,
    running: Arc<AtomicBool>,
    frames_rendered: Arc<AtomicU64>,
    callbacks: Arc<AtomicU64>,
    pacer: Option<thread::JoinHandle<()>>,
}

impl Output {
    /// Starts pacing `callback` with the configured buffer size, rate and
    /// channel count.
    pub fn start(config: &config::Audio, callback: SharedCallback) -> Result<Output, OutputError> {
        let name = config.device().to_string();
        let channels = config.channels() as usize;
        let buffer_frames = config.buffer_size().max(1);
        let sample_rate = config.sample_rate().max(1);
        let sample_format = config.sample_format()?;
        let period = Duration::from_secs_f64(buffer_frames as f64 / sample_rate as f64);

        let running = Arc::new(AtomicBool::new(true));
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let callbacks = Arc::new(AtomicU64::new(0));

        let pacer = {
            let name = name.clone();
            let running = running.clone();
            let frames_rendered = frames_rendered.clone();
            let callbacks = callbacks.clone();
            thread::Builder::new()
                .name("studio-mixer-mock".to_string())
                .spawn(move || {
                    let span = span!(Level::INFO, "output stream (mock)", device = %name);
                    let _enter = span.enter();
                    info!(channels, sample_rate, buffer_frames, "Mock output started");

                    let mut pace = Pacer::new(period);
                    let mut render = Renderer::new(callback, sample_format, buffer_frames * channels);
                    while running.load(Ordering::Acquire) {
                        if render.render(channels) == CallbackResult::Stop {
                            running.store(false, Ordering::Release);
                            break;
                        }
                        frames_rendered.fetch_add(buffer_frames as u64, Ordering::AcqRel);
                        callbacks.fetch_add(1, Ordering::AcqRel);
                        pace.wait();
                    }

                    info!("Mock output stopped");
                })?
        };

        Ok(Output {
            name,
            running,
            frames_rendered,
            callbacks,
            pacer: Some(pacer),
        })
    }

    /// Frames rendered since the output started.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Acquire)
    }

    /// Number of callbacks made.
    pub fn callbacks(&self) -> u64 {
        self.callbacks.load(Ordering::Acquire)
    }
}

/// Holds the buffer for the configured output format.
enum Renderer {
    Int(SharedCallback, Vec<i16>),
    Float(SharedCallback, Vec<f32>),
}

impl Renderer {
    fn new(callback: SharedCallback, sample_format: SampleFormat, samples: usize) -> Self {
        match sample_format {
            SampleFormat::Int => Renderer::Int(callback, vec![0; samples]),
            SampleFormat::Float => Renderer::Float(callback, vec![0.0; samples]),
        }
    }

    fn render(&mut self, channels: usize) -> CallbackResult {
        match self {
            Renderer::Int(callback, buffer) => callback.render_i16(buffer, channels),
            Renderer::Float(callback, buffer) => callback.render_f32(buffer, channels),
        }
    }
}

/// Sleeps until fixed deadlines so the average callback rate matches the
/// device period even when individual callbacks run late.
struct Pacer {
    period: Duration,
    next: Instant,
}

impl Pacer {
    fn new(period: Duration) -> Self {
        Self {
            period,
            next: Instant::now(),
        }
    }

    fn wait(&mut self) {
        self.next += self.period;
        let now = Instant::now();
        if self.next > now {
            spin_sleep::sleep(self.next - now);
        } else {
            // Too far behind to catch up; start over from now.
            self.next = now;
        }
    }
}

impl super::Output for Output {
    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(pacer) = self.pacer.take() {
            let _ = pacer.join();
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
        write!(f, "{} (Mock)", self.name)
    }
}
