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

//! The real-time entry point driven by the output backends.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::mixer::Mixer;
use super::sample_mix::i16_to_f32;

/// Number of callback durations kept by [`CallbackStats`].
pub const CALLBACK_HISTORY_LEN: usize = 64;

/// What the backend should do after a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CallbackResult {
    Continue = 0,
    /// The request could never be satisfied; the buffer was silenced.
    Stop = 1,
}

impl CallbackResult {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// What a [`CallbackReceiver`] is told about the callback being mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackInfo {
    /// Stream clock, in output frames, at the start of the callback.
    pub stream_frame: i64,
    pub frames: usize,
    pub channels: usize,
}

/// Runs on the audio thread at the start of every callback, before any voice
/// is mixed. Implementations must not block.
pub trait CallbackReceiver: Send {
    fn on_audio_callback(&mut self, info: &CallbackInfo);
}

impl<F> CallbackReceiver for F
where
    F: FnMut(&CallbackInfo) + Send,
{
    fn on_audio_callback(&mut self, info: &CallbackInfo) {
        self(info)
    }
}

/// Timing of recent callbacks, written by the audio thread and readable from
/// anywhere.
pub struct CallbackStats {
    count: AtomicU64,
    /// Output frames rendered since the stream clock was last set.
    stream_frames: AtomicI64,
    last_duration_nanos: AtomicU64,
    max_duration_nanos: AtomicU64,
    last_frames: AtomicU64,
    history: [AtomicU64; CALLBACK_HISTORY_LEN],
    history_next: AtomicUsize,
}

impl CallbackStats {
    pub(crate) fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            stream_frames: AtomicI64::new(0),
            last_duration_nanos: AtomicU64::new(0),
            max_duration_nanos: AtomicU64::new(0),
            last_frames: AtomicU64::new(0),
            history: std::array::from_fn(|_| AtomicU64::new(0)),
            history_next: AtomicUsize::new(0),
        }
    }

    fn record(&self, duration: Duration, frames: usize) {
        self.stream_frames
            .fetch_add(frames as i64, Ordering::AcqRel);
        let nanos = duration.as_nanos().min(u64::MAX as u128) as u64;
        self.last_duration_nanos.store(nanos, Ordering::Relaxed);
        self.max_duration_nanos.fetch_max(nanos, Ordering::Relaxed);
        self.last_frames.store(frames as u64, Ordering::Relaxed);

        let next = self.history_next.load(Ordering::Relaxed);
        self.history[next % CALLBACK_HISTORY_LEN].store(nanos, Ordering::Relaxed);
        self.history_next
            .store((next + 1) % CALLBACK_HISTORY_LEN, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Release);
    }

    /// The stream clock in output frames.
    pub fn stream_frames(&self) -> i64 {
        self.stream_frames.load(Ordering::Acquire)
    }

    pub(crate) fn set_stream_frames(&self, frames: i64) {
        self.stream_frames.store(frames, Ordering::Release);
    }

    /// Number of callbacks processed.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn last_duration(&self) -> Duration {
        Duration::from_nanos(self.last_duration_nanos.load(Ordering::Relaxed))
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_nanos(self.max_duration_nanos.load(Ordering::Relaxed))
    }

    /// Frames rendered by the last callback.
    pub fn last_frames(&self) -> u64 {
        self.last_frames.load(Ordering::Relaxed)
    }

    /// Recorded durations, oldest first.
    pub fn recent_durations(&self) -> Vec<Duration> {
        let count = self.count().min(CALLBACK_HISTORY_LEN as u64) as usize;
        let next = self.history_next.load(Ordering::Relaxed);
        let start = (next + CALLBACK_HISTORY_LEN - count) % CALLBACK_HISTORY_LEN;
        (0..count)
            .map(|i| {
                let nanos = self.history[(start + i) % CALLBACK_HISTORY_LEN].load(Ordering::Relaxed);
                Duration::from_nanos(nanos)
            })
            .collect()
    }

    pub fn average_duration(&self) -> Duration {
        let recent = self.recent_durations();
        if recent.is_empty() {
            return Duration::ZERO;
        }
        recent.iter().sum::<Duration>() / recent.len() as u32
    }
}

/// The audio thread half of an engine. Backends call one of the `render`
/// methods whenever the device wants more samples.
pub struct Callback {
    mixer: Mixer,
    stats: Arc<CallbackStats>,
    /// Mix target for float output.
    scratch: Vec<i16>,
}

impl Callback {
    pub(crate) fn new(mixer: Mixer, stats: Arc<CallbackStats>) -> Self {
        let scratch = vec![0; mixer.max_frames() * mixer.max_channels()];
        Self {
            mixer,
            stats,
            scratch,
        }
    }

    pub fn stats(&self) -> Arc<CallbackStats> {
        self.stats.clone()
    }

    /// Largest channel count the callback can render.
    pub fn max_channels(&self) -> usize {
        self.mixer.max_channels()
    }

    fn accepts(&self, len: usize, channels: usize) -> bool {
        channels > 0 && channels <= self.mixer.max_channels() && len % channels == 0
    }

    /// Applies pending operations and runs the callback receivers.
    fn begin(&mut self, frames: usize, channels: usize) {
        self.mixer.drain_commands();
        self.mixer.notify_receivers(&CallbackInfo {
            stream_frame: self.stats.stream_frames(),
            frames,
            channels,
        });
    }

    /// Renders interleaved 16-bit samples into `output`.
    pub fn render_i16(&mut self, output: &mut [i16], channels: usize) -> CallbackResult {
        if !self.accepts(output.len(), channels) {
            output.fill(0);
            return CallbackResult::Stop;
        }

        let start = Instant::now();
        self.begin(output.len() / channels, channels);
        let chunk_len = self.mixer.max_frames() * channels;
        for chunk in output.chunks_mut(chunk_len) {
            self.mixer.process(chunk, channels);
        }
        self.stats.record(start.elapsed(), output.len() / channels);
        CallbackResult::Continue
    }

    /// Renders interleaved float samples into `output`.
    pub fn render_f32(&mut self, output: &mut [f32], channels: usize) -> CallbackResult {
        if !self.accepts(output.len(), channels) {
            output.fill(0.0);
            return CallbackResult::Stop;
        }

        let start = Instant::now();
        self.begin(output.len() / channels, channels);
        let chunk_len = self.mixer.max_frames() * channels;
        for chunk in output.chunks_mut(chunk_len) {
            let mixed = &mut self.scratch[..chunk.len()];
            self.mixer.process(mixed, channels);
            for (out, &sample) in chunk.iter_mut().zip(mixed.iter()) {
                *out = i16_to_f32(sample);
            }
        }
        self.stats.record(start.elapsed(), output.len() / channels);
        CallbackResult::Continue
    }
}

/// A [`Callback`] that can be handed to one output after another.
///
/// Renders are silent while another thread holds the callback, which only
/// happens while outputs are being swapped.
#[derive(Clone)]
pub struct SharedCallback(Arc<Mutex<Callback>>);

impl SharedCallback {
    pub fn new(callback: Callback) -> Self {
        Self(Arc::new(Mutex::new(callback)))
    }

    pub fn max_channels(&self) -> usize {
        self.0.lock().max_channels()
    }

    pub fn render_i16(&self, output: &mut [i16], channels: usize) -> CallbackResult {
        match self.0.try_lock() {
            Some(mut callback) => callback.render_i16(output, channels),
            None => {
                output.fill(0);
                CallbackResult::Continue
            }
        }
    }

    pub fn render_f32(&self, output: &mut [f32], channels: usize) -> CallbackResult {
        match self.0.try_lock() {
            Some(mut callback) => callback.render_f32(output, channels),
            None => {
                output.fill(0.0);
                CallbackResult::Continue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::audio::engine::{Engine, EngineSettings};
    use crate::audio::sample_provider::{MemorySampleProvider, SampleProvider};

    fn engine(max_buffer_frames: usize) -> (Engine, Callback) {
        Engine::new(EngineSettings {
            channels: 1,
            max_buffer_frames,
            ..Default::default()
        })
        .unwrap()
    }

    fn ramp(frames: usize) -> Arc<dyn SampleProvider> {
        Arc::new(MemorySampleProvider::new(
            (0..frames).map(|i| i as i16).collect(),
            1,
            44100,
        ))
    }

    #[test]
    fn test_oversized_buffer_is_chunked() {
        let (engine, mut callback) = engine(16);
        let handle = engine.add_voice(ramp(100), "ramp", true).unwrap();

        let mut output = vec![0i16; 50];
        assert_eq!(callback.render_i16(&mut output, 1), CallbackResult::Continue);
        let expected: Vec<i16> = (0..50).collect();
        assert_eq!(output, expected);
        assert_eq!(engine.position_frames(handle), 50);
        assert_eq!(callback.stats().last_frames(), 50);
    }

    #[test]
    fn test_f32_conversion() {
        let (engine, mut callback) = engine(8);
        engine
            .add_voice(
                Arc::new(MemorySampleProvider::new(
                    vec![0, 16384, -16384, i16::MIN],
                    1,
                    44100,
                )),
                "float",
                true,
            )
            .unwrap();

        let mut output = vec![1.0f32; 6];
        assert_eq!(callback.render_f32(&mut output, 1), CallbackResult::Continue);
        assert_eq!(output, vec![0.0, 0.5, -0.5, -1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_invalid_requests_stop_with_silence() {
        let (_engine, mut callback) = engine(8);

        let mut output = vec![7i16; 8];
        assert_eq!(callback.render_i16(&mut output, 0), CallbackResult::Stop);
        assert!(output.iter().all(|&s| s == 0));

        let mut output = vec![7i16; 8];
        assert_eq!(callback.render_i16(&mut output, 3), CallbackResult::Stop);
        assert!(output.iter().all(|&s| s == 0));

        let mut output = vec![7.0f32; 9];
        assert_eq!(callback.render_f32(&mut output, 2), CallbackResult::Stop);
        assert!(output.iter().all(|&s| s == 0.0));

        assert_eq!(CallbackResult::Stop.code(), 1);
        assert_eq!(CallbackResult::Continue.code(), 0);
        assert_eq!(callback.stats().count(), 0);
    }

    #[test]
    fn test_stream_clock_and_receivers() {
        let (engine, mut callback) = engine(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        engine
            .register_callback_receiver(move |info: &CallbackInfo| log.lock().push(*info))
            .unwrap();

        let mut output = vec![0i16; 20];
        callback.render_i16(&mut output, 1);
        let mut output = vec![0.0f32; 6];
        callback.render_f32(&mut output, 1);
        assert_eq!(callback.stats().stream_frames(), 26);

        assert_eq!(
            *seen.lock(),
            vec![
                CallbackInfo {
                    stream_frame: 0,
                    frames: 20,
                    channels: 1,
                },
                CallbackInfo {
                    stream_frame: 20,
                    frames: 6,
                    channels: 1,
                },
            ]
        );
    }

    #[test]
    fn test_shared_callback_silent_while_held() {
        let (engine, callback) = engine(8);
        engine.add_voice(ramp(100), "ramp", true).unwrap();
        let shared = SharedCallback::new(callback);
        assert_eq!(shared.max_channels(), 1);

        let held = shared.0.lock();
        let mut output = vec![5i16; 4];
        assert_eq!(shared.render_i16(&mut output, 1), CallbackResult::Continue);
        assert_eq!(output, vec![0; 4]);
        drop(held);

        assert_eq!(shared.render_i16(&mut output, 1), CallbackResult::Continue);
        assert_eq!(output, vec![0, 1, 2, 3]);
        let mut output = vec![0.0f32; 2];
        shared.render_f32(&mut output, 1);
        assert_eq!(engine.callback_stats().stream_frames(), 6);
    }

    #[test]
    fn test_stats_history() {
        let (_engine, mut callback) = engine(8);
        let stats = callback.stats();
        let mut output = vec![0i16; 8];
        for _ in 0..(CALLBACK_HISTORY_LEN + 10) {
            callback.render_i16(&mut output, 1);
        }
        assert_eq!(stats.count(), (CALLBACK_HISTORY_LEN + 10) as u64);
        assert_eq!(stats.recent_durations().len(), CALLBACK_HISTORY_LEN);
        assert!(stats.max_duration() >= stats.last_duration());
        assert_eq!(stats.last_frames(), 8);
    }
}
