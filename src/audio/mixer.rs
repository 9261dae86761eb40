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

//! The audio thread half of the engine.
//!
//! The mixer owns every provider binding the audio thread reads from. It never
//! locks, allocates or frees: bindings arrive over the engine's pending
//! operation queue and replaced or retired providers are handed back to the
//! control thread over the release channel.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use super::callback::{CallbackInfo, CallbackReceiver};
use super::channel_mixer::{ChannelMixer, ChannelMixing};
use super::sample_mix::mix_into;
use super::sample_provider::SampleProvider;
use super::voice::{flags, state, VoiceSlot};

/// Most callback receivers an engine holds at once.
pub const MAX_CALLBACK_RECEIVERS: usize = 16;

/// Operations queued by the control thread for the audio thread.
pub(crate) enum Command {
    /// Binds (or rebinds) the provider of the voice with the given generation.
    Bind {
        index: u16,
        generation: u32,
        provider: Arc<dyn SampleProvider>,
    },
    /// Drops the provider of the voice with the given generation. The voice
    /// keeps its slot and goes on advancing in silence.
    Unbind { index: u16, generation: u32 },
    Register {
        id: u64,
        receiver: Box<dyn CallbackReceiver>,
    },
    Unregister { id: u64 },
}

/// Something the audio thread let go of. Dropped on the control thread.
pub(crate) enum Released {
    Provider(Arc<dyn SampleProvider>),
    Receiver(Box<dyn CallbackReceiver>),
}

/// The provider the audio thread reads for one slot.
#[derive(Default)]
struct Binding {
    provider: Option<Arc<dyn SampleProvider>>,
    generation: u32,
}

/// Mixes the voice pool into interleaved 16-bit output.
pub struct Mixer {
    slots: Arc<[VoiceSlot]>,
    bindings: Vec<Binding>,
    receivers: Vec<(u64, Box<dyn CallbackReceiver>)>,
    commands: Receiver<Command>,
    release: Sender<Released>,
    /// f32 bits.
    master_volume: Arc<AtomicU32>,
    channel_mixing: Arc<AtomicU8>,
    max_frames: usize,
    max_channels: usize,
    /// Provider-layout samples, before channel conversion.
    read_buffer: Vec<i16>,
    /// Output-layout samples for the voice currently being mixed.
    voice_buffer: Vec<i16>,
}

impl Mixer {
    pub(crate) fn new(
        slots: Arc<[VoiceSlot]>,
        commands: Receiver<Command>,
        release: Sender<Released>,
        master_volume: Arc<AtomicU32>,
        channel_mixing: Arc<AtomicU8>,
        max_frames: usize,
        max_channels: usize,
    ) -> Self {
        let bindings = (0..slots.len()).map(|_| Binding::default()).collect();
        Self {
            slots,
            bindings,
            receivers: Vec::with_capacity(MAX_CALLBACK_RECEIVERS),
            commands,
            release,
            master_volume,
            channel_mixing,
            max_frames,
            max_channels,
            read_buffer: vec![0; max_frames * max_channels],
            voice_buffer: vec![0; max_frames * max_channels],
        }
    }

    /// Largest number of frames a single [`Mixer::process`] call accepts.
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Largest channel count a single [`Mixer::process`] call accepts.
    pub fn max_channels(&self) -> usize {
        self.max_channels
    }

    /// Applies every queued operation without blocking.
    pub fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Bind {
                    index,
                    generation,
                    provider,
                } => self.bind(index as usize, generation, provider),
                Command::Unbind { index, generation } => {
                    self.unbind(index as usize, generation)
                }
                Command::Register { id, receiver } => {
                    if self.receivers.len() < self.receivers.capacity() {
                        self.receivers.push((id, receiver));
                    } else {
                        self.release(Released::Receiver(receiver));
                    }
                }
                Command::Unregister { id } => {
                    if let Some(i) = self.receivers.iter().position(|(r, _)| *r == id) {
                        let (_, receiver) = self.receivers.swap_remove(i);
                        self.release(Released::Receiver(receiver));
                    }
                }
            }
        }
    }

    /// Tells every registered receiver a callback is about to be mixed.
    pub fn notify_receivers(&mut self, info: &CallbackInfo) {
        for (_, receiver) in self.receivers.iter_mut() {
            receiver.on_audio_callback(info);
        }
    }

    fn bind(&mut self, index: usize, generation: u32, provider: Arc<dyn SampleProvider>) {
        let Some(slot) = self.slots.get(index) else {
            self.release(Released::Provider(provider));
            return;
        };

        if slot.generation.load(Ordering::Acquire) != generation
            || slot.state.load(Ordering::Acquire) == state::FREE
        {
            // The voice went away before its binding arrived.
            self.release(Released::Provider(provider));
            return;
        }

        let binding = &mut self.bindings[index];
        binding.generation = generation;
        if let Some(previous) = binding.provider.replace(provider) {
            self.release(Released::Provider(previous));
        }
    }

    fn unbind(&mut self, index: usize, generation: u32) {
        let Some(binding) = self.bindings.get_mut(index) else {
            return;
        };
        if binding.generation != generation {
            return;
        }
        if let Some(provider) = binding.provider.take() {
            self.release(Released::Provider(provider));
        }
    }

    /// Hands something back to the control thread.
    fn release(&self, released: Released) {
        if let Err(e) = self.release.try_send(released) {
            // The release channel is sized for every outstanding reference, so
            // this only happens if the engine has been dropped.
            debug_assert!(e.is_disconnected(), "release channel overflowed");
            drop(e.into_inner());
        }
    }

    /// Unbinds the slot and hands it back to the control thread.
    fn reclaim(&mut self, index: usize) {
        if let Some(provider) = self.bindings[index].provider.take() {
            self.release(Released::Provider(provider));
        }
        let slot = &self.slots[index];
        slot.flags.store(0, Ordering::Release);
        slot.take_seek();
        slot.state.store(state::FREE, Ordering::Release);
    }

    /// Mixes one buffer of `output.len() / channels` frames.
    ///
    /// The frame count must not exceed [`Mixer::max_frames`] and `channels` must
    /// not exceed [`Mixer::max_channels`]; the callback bridge chunks larger
    /// requests.
    pub fn process(&mut self, output: &mut [i16], channels: usize) {
        output.fill(0);
        if channels == 0 {
            return;
        }
        let frames = output.len() / channels;
        debug_assert!(frames <= self.max_frames);
        debug_assert!(channels <= self.max_channels);

        let master_volume = f32::from_bits(self.master_volume.load(Ordering::Acquire));
        let channel_mixer =
            ChannelMixer::new(ChannelMixing::from_u8(self.channel_mixing.load(Ordering::Acquire)));

        for index in 0..self.slots.len() {
            match self.slots[index].state.load(Ordering::Acquire) {
                state::FREE => continue,
                state::RETIRING => {
                    self.reclaim(index);
                    continue;
                }
                _ => {}
            }

            let slot = &self.slots[index];
            let binding = &self.bindings[index];
            if binding.generation != slot.generation.load(Ordering::Acquire) {
                // Bound, but the binding hasn't been drained yet.
                continue;
            }

            // Read before the seek so that any later control write makes the
            // end-of-stream stop below fail.
            let voice_flags = slot.flags.load(Ordering::Acquire);
            let mut position = slot.position.load(Ordering::Acquire);
            if let Some(seek) = slot.take_seek() {
                position = seek;
            }
            let playing = voice_flags & flags::PLAYING != 0;

            let Some(provider) = &binding.provider else {
                // Unloaded: no end, so only the clock moves.
                if playing {
                    position = position.saturating_add(frames as i64);
                }
                slot.position.store(position, Ordering::Release);
                continue;
            };

            let frame_count = provider.frame_count();
            let looping = voice_flags & flags::LOOPING != 0;
            let play_past_end = voice_flags & flags::PLAY_PAST_END != 0;
            let reached_end = position >= frame_count;

            if voice_flags & flags::REMOVE_ON_END != 0 && !play_past_end && reached_end {
                self.reclaim(index);
                continue;
            }

            if !playing {
                slot.position.store(position, Ordering::Release);
                continue;
            }

            if reached_end && !play_past_end && looping {
                position = 0;
            }

            let gain = slot.volume() * master_volume;
            if looping && frame_count > 0 {
                // Wrap inside the buffer so loops stay seamless.
                let mut done = 0;
                while done < frames {
                    let count = frame_count
                        .saturating_sub(position)
                        .clamp(1, (frames - done) as i64) as usize;
                    render_voice(
                        provider.as_ref(),
                        position,
                        count,
                        channels,
                        gain,
                        &channel_mixer,
                        &mut self.read_buffer,
                        &mut self.voice_buffer,
                        &mut output[done * channels..(done + count) * channels],
                    );
                    done += count;
                    position += count as i64;
                    if position >= frame_count {
                        position = 0;
                    }
                }
                slot.position.store(position, Ordering::Release);
                continue;
            }

            render_voice(
                provider.as_ref(),
                position,
                frames,
                channels,
                gain,
                &channel_mixer,
                &mut self.read_buffer,
                &mut self.voice_buffer,
                output,
            );

            position = position.saturating_add(frames as i64);
            if position >= frame_count {
                if looping {
                    position = 0;
                } else if !play_past_end {
                    slot.stop_at_end(voice_flags);
                    position = frame_count.max(0);
                }
            }
            slot.position.store(position, Ordering::Release);
        }
    }
}

/// Reads one voice's frames, scales them and soft-mixes them into `output`.
///
/// Providers wider than the scratch buffers are read in smaller passes.
#[allow(clippy::too_many_arguments)]
fn render_voice(
    provider: &dyn SampleProvider,
    position: i64,
    frames: usize,
    channels: usize,
    gain: f32,
    channel_mixer: &ChannelMixer,
    read_buffer: &mut [i16],
    voice_buffer: &mut [i16],
    output: &mut [i16],
) {
    let source_channels = provider.channel_count() as usize;
    if source_channels == 0 || gain == 0.0 {
        return;
    }

    let pass_frames = (read_buffer.len() / source_channels)
        .min(voice_buffer.len() / channels)
        .min(frames);
    if pass_frames == 0 {
        return;
    }

    let mut done = 0;
    while done < frames {
        let count = pass_frames.min(frames - done);
        let offset = position.saturating_add(done as i64);
        let voice = &mut voice_buffer[..count * channels];

        if source_channels == channels {
            provider.read_samples(voice, offset, count, channels as u32);
        } else {
            let read = &mut read_buffer[..count * source_channels];
            provider.read_samples(read, offset, count, source_channels as u32);
            channel_mixer.convert(read, source_channels, voice, channels, count);
        }

        mix_into(
            &mut output[done * channels..(done + count) * channels],
            voice,
            gain,
        );
        done += count;
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::bounded;

    use super::*;
    use crate::audio::channel_mixer::ChannelMixing;
    use crate::audio::sample_provider::{MemorySampleProvider, SilenceSampleProvider};
    use crate::audio::voice::VoiceHandle;

    struct Harness {
        mixer: Mixer,
        slots: Arc<[VoiceSlot]>,
        commands: Sender<Command>,
        released: Receiver<Released>,
        master_volume: Arc<AtomicU32>,
        channel_mixing: Arc<AtomicU8>,
    }

    fn harness(voices: usize, max_frames: usize, max_channels: usize) -> Harness {
        let slots: Arc<[VoiceSlot]> = (0..voices).map(|_| VoiceSlot::new()).collect();
        let (commands, command_rx) = bounded(16);
        let (release_tx, released) = bounded(16 + voices);
        let master_volume = Arc::new(AtomicU32::new(1.0f32.to_bits()));
        let channel_mixing = Arc::new(AtomicU8::new(ChannelMixing::Mix.as_u8()));
        let mixer = Mixer::new(
            slots.clone(),
            command_rx,
            release_tx,
            master_volume.clone(),
            channel_mixing.clone(),
            max_frames,
            max_channels,
        );
        Harness {
            mixer,
            slots,
            commands,
            released,
            master_volume,
            channel_mixing,
        }
    }

    impl Harness {
        fn add(
            &self,
            index: usize,
            provider: Arc<dyn SampleProvider>,
            volume: f32,
            voice_flags: u32,
        ) -> VoiceHandle {
            let slot = &self.slots[index];
            let generation = slot.prepare(volume, voice_flags, 0);
            slot.state.store(state::BOUND, Ordering::Release);
            self.commands
                .send(Command::Bind {
                    index: index as u16,
                    generation,
                    provider,
                })
                .unwrap();
            VoiceHandle::new(index as u16, generation)
        }
    }

    fn ramp(frames: usize) -> Arc<dyn SampleProvider> {
        Arc::new(MemorySampleProvider::new(
            (0..frames).map(|i| (i as i16 + 1) * 10).collect(),
            1,
            48000,
        ))
    }

    #[test]
    fn test_silence_without_voices() {
        let mut h = harness(4, 64, 2);
        let mut output = vec![123i16; 128];
        h.mixer.drain_commands();
        h.mixer.process(&mut output, 2);
        assert!(output.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_single_voice_reproduced_exactly_then_stops() {
        let mut h = harness(4, 480, 1);
        let provider = ramp(480);
        let mut expected = vec![0i16; 480];
        provider.read_samples(&mut expected, 0, 480, 1);
        h.add(0, provider, 1.0, flags::PLAYING);

        let mut output = vec![0i16; 480];
        h.mixer.drain_commands();
        h.mixer.process(&mut output, 1);
        assert_eq!(output, expected);
        assert_eq!(h.slots[0].position.load(Ordering::Acquire), 480);
        assert!(!h.slots[0].flag(flags::PLAYING));

        h.mixer.process(&mut output, 1);
        assert!(output.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_unbound_voice_is_silent() {
        let mut h = harness(2, 32, 1);
        let slot = &h.slots[0];
        slot.prepare(1.0, flags::PLAYING, 0);
        slot.state.store(state::BOUND, Ordering::Release);

        let mut output = vec![5i16; 32];
        h.mixer.process(&mut output, 1);
        assert!(output.iter().all(|&s| s == 0));
        assert_eq!(h.slots[0].position.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_looping_wraps_position() {
        let mut h = harness(1, 300, 1);
        h.add(0, ramp(1000), 1.0, flags::PLAYING | flags::LOOPING);
        h.mixer.drain_commands();

        let mut output = vec![0i16; 300];
        for _ in 0..4 {
            h.mixer.process(&mut output, 1);
        }
        assert_eq!(h.slots[0].position.load(Ordering::Acquire), 200);
        assert!(h.slots[0].flag(flags::PLAYING));
    }

    #[test]
    fn test_short_loop_repeats_within_one_buffer() {
        let mut h = harness(1, 10, 1);
        h.add(0, ramp(4), 1.0, flags::PLAYING | flags::LOOPING);
        h.mixer.drain_commands();

        let mut output = vec![0i16; 10];
        h.mixer.process(&mut output, 1);
        assert_eq!(output, vec![10, 20, 30, 40, 10, 20, 30, 40, 10, 20]);
        assert_eq!(h.slots[0].position.load(Ordering::Acquire), 2);

        h.mixer.process(&mut output, 1);
        assert_eq!(output, vec![30, 40, 10, 20, 30, 40, 10, 20, 30, 40]);
        assert_eq!(h.slots[0].position.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_delayed_loop_wraps_after_first_pass() {
        let mut h = harness(1, 8, 1);
        h.add(0, ramp(3), 1.0, flags::PLAYING | flags::LOOPING);
        h.slots[0].request_seek(-2);
        h.mixer.drain_commands();

        let mut output = vec![0i16; 8];
        h.mixer.process(&mut output, 1);
        assert_eq!(output, vec![0, 0, 10, 20, 30, 10, 20, 30]);
        assert_eq!(h.slots[0].position.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_play_past_end_keeps_playing() {
        let mut h = harness(1, 64, 1);
        h.add(0, ramp(10), 1.0, flags::PLAYING | flags::PLAY_PAST_END);
        h.mixer.drain_commands();

        let mut output = vec![0i16; 64];
        h.mixer.process(&mut output, 1);
        h.mixer.process(&mut output, 1);
        assert_eq!(h.slots[0].position.load(Ordering::Acquire), 128);
        assert!(h.slots[0].flag(flags::PLAYING));
        assert!(output.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_negative_position_delays_start() {
        let mut h = harness(1, 8, 1);
        h.add(0, ramp(8), 1.0, flags::PLAYING);
        h.slots[0].request_seek(-4);
        h.mixer.drain_commands();

        let mut output = vec![0i16; 8];
        h.mixer.process(&mut output, 1);
        assert_eq!(output, vec![0, 0, 0, 0, 10, 20, 30, 40]);
        assert_eq!(h.slots[0].position.load(Ordering::Acquire), 4);
    }

    #[test]
    fn test_volume_scaling_precedes_mixing() {
        let mut h = harness(2, 4, 1);
        let provider: Arc<dyn SampleProvider> = Arc::new(MemorySampleProvider::new(
            vec![20000, -20000, 20000, 1],
            1,
            48000,
        ));
        h.add(0, provider.clone(), 0.5, flags::PLAYING);
        h.add(1, provider, 0.5, flags::PLAYING);
        h.mixer.drain_commands();

        let mut output = vec![0i16; 4];
        h.mixer.process(&mut output, 1);
        // 10000 + 10000 - (10000 * 10000 / 32767) = 20000 - 3051
        assert_eq!(output[0], 16949);
        // -10000 + -10000 - (100000000 / -32768) = -20000 + 3051
        assert_eq!(output[1], -16949);
        assert_eq!(output[3], 0);
    }

    #[test]
    fn test_master_volume_applies() {
        let mut h = harness(1, 2, 1);
        h.add(
            0,
            Arc::new(MemorySampleProvider::new(vec![1000, -1000], 1, 48000)),
            1.0,
            flags::PLAYING,
        );
        h.master_volume.store(0.25f32.to_bits(), Ordering::Release);
        h.mixer.drain_commands();

        let mut output = vec![0i16; 2];
        h.mixer.process(&mut output, 1);
        assert_eq!(output, vec![250, -250]);
    }

    #[test]
    fn test_retiring_slot_is_reclaimed_and_released() {
        let mut h = harness(2, 16, 1);
        h.add(1, ramp(100), 1.0, flags::PLAYING);
        h.mixer.drain_commands();
        h.slots[1].state.store(state::RETIRING, Ordering::Release);

        let mut output = vec![0i16; 16];
        h.mixer.process(&mut output, 1);
        assert!(output.iter().all(|&s| s == 0));
        assert_eq!(h.slots[1].state.load(Ordering::Acquire), state::FREE);
        assert_eq!(h.released.try_iter().count(), 1);
    }

    #[test]
    fn test_remove_on_end_reclaims_after_finishing() {
        let mut h = harness(1, 16, 1);
        h.add(0, ramp(16), 1.0, flags::PLAYING | flags::REMOVE_ON_END);
        h.mixer.drain_commands();

        let mut output = vec![0i16; 16];
        h.mixer.process(&mut output, 1);
        assert_eq!(h.slots[0].state.load(Ordering::Acquire), state::BOUND);
        h.mixer.process(&mut output, 1);
        assert_eq!(h.slots[0].state.load(Ordering::Acquire), state::FREE);
        assert_eq!(h.released.try_iter().count(), 1);
    }

    #[test]
    fn test_stale_bind_is_released() {
        let mut h = harness(1, 16, 1);
        h.commands
            .send(Command::Bind {
                index: 0,
                generation: 7,
                provider: ramp(4),
            })
            .unwrap();
        h.mixer.drain_commands();
        assert_eq!(h.released.try_iter().count(), 1);
    }

    #[test]
    fn test_rebind_releases_previous_and_keeps_position() {
        let mut h = harness(1, 4, 1);
        let handle = h.add(0, ramp(100), 1.0, flags::PLAYING);
        h.mixer.drain_commands();
        let mut output = vec![0i16; 4];
        h.mixer.process(&mut output, 1);

        h.commands
            .send(Command::Bind {
                index: 0,
                generation: handle.generation(),
                provider: Arc::new(SilenceSampleProvider::new(100, 1, 48000)),
            })
            .unwrap();
        h.mixer.drain_commands();
        assert_eq!(h.released.try_iter().count(), 1);

        h.mixer.process(&mut output, 1);
        assert!(output.iter().all(|&s| s == 0));
        assert_eq!(h.slots[0].position.load(Ordering::Acquire), 8);
    }

    #[test]
    fn test_unbind_keeps_voice_advancing_in_silence() {
        let mut h = harness(1, 16, 1);
        let handle = h.add(0, ramp(20), 1.0, flags::PLAYING | flags::REMOVE_ON_END);
        h.mixer.drain_commands();
        let mut output = vec![0i16; 16];
        h.mixer.process(&mut output, 1);

        h.commands
            .send(Command::Unbind {
                index: 0,
                generation: handle.generation(),
            })
            .unwrap();
        h.mixer.drain_commands();
        assert_eq!(h.released.try_iter().count(), 1);

        // Past the old provider's end without stopping or being removed.
        for _ in 0..3 {
            h.mixer.process(&mut output, 1);
            assert!(output.iter().all(|&s| s == 0));
        }
        assert_eq!(h.slots[0].position.load(Ordering::Acquire), 64);
        assert!(h.slots[0].flag(flags::PLAYING));
        assert_eq!(h.slots[0].state.load(Ordering::Acquire), state::BOUND);

        h.slots[0].set_flag(flags::PLAYING, false);
        h.mixer.process(&mut output, 1);
        assert_eq!(h.slots[0].position.load(Ordering::Acquire), 64);
    }

    #[test]
    fn test_stale_unbind_is_ignored() {
        let mut h = harness(1, 4, 1);
        let handle = h.add(0, ramp(100), 1.0, flags::PLAYING);
        h.commands
            .send(Command::Unbind {
                index: 0,
                generation: handle.generation() + 1,
            })
            .unwrap();
        h.mixer.drain_commands();
        assert_eq!(h.released.try_iter().count(), 0);

        let mut output = vec![0i16; 4];
        h.mixer.process(&mut output, 1);
        assert_eq!(output, vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_restart_after_end_plays_again() {
        let mut h = harness(1, 8, 1);
        h.add(0, ramp(8), 1.0, flags::PLAYING);
        h.mixer.drain_commands();

        let mut output = vec![0i16; 8];
        h.mixer.process(&mut output, 1);
        assert!(!h.slots[0].flag(flags::PLAYING));
        h.slots[0].request_seek(0);
        h.slots[0].set_flag(flags::PLAYING, true);
        h.mixer.process(&mut output, 1);
        assert_eq!(output, vec![10, 20, 30, 40, 50, 60, 70, 80]);
        assert!(!h.slots[0].flag(flags::PLAYING));
        assert_eq!(h.slots[0].position.load(Ordering::Acquire), 8);
    }

    #[test]
    fn test_channel_mixing_changes_at_runtime() {
        let mut h = harness(1, 1, 4);
        h.add(
            0,
            Arc::new(MemorySampleProvider::new(vec![100, 200, 300, 400, 1, 2, 3, 4], 4, 48000)),
            1.0,
            flags::PLAYING,
        );
        h.mixer.drain_commands();

        h.channel_mixing
            .store(ChannelMixing::IgnoreLeading.as_u8(), Ordering::Release);
        let mut output = vec![0i16; 2];
        h.mixer.process(&mut output, 2);
        assert_eq!(output, vec![300, 400]);

        h.channel_mixing
            .store(ChannelMixing::IgnoreTrailing.as_u8(), Ordering::Release);
        h.mixer.process(&mut output, 2);
        assert_eq!(output, vec![1, 2]);
    }

    #[test]
    fn test_receivers_registered_and_released() {
        let mut h = harness(1, 4, 1);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        h.commands
            .send(Command::Register {
                id: 1,
                receiver: Box::new(move |info: &CallbackInfo| {
                    assert_eq!(info.frames, 4);
                    counter.fetch_add(1, Ordering::Relaxed);
                }),
            })
            .unwrap();
        h.mixer.drain_commands();

        let info = CallbackInfo {
            stream_frame: 0,
            frames: 4,
            channels: 1,
        };
        h.mixer.notify_receivers(&info);
        h.mixer.notify_receivers(&info);
        assert_eq!(calls.load(Ordering::Relaxed), 2);

        h.commands.send(Command::Unregister { id: 2 }).unwrap();
        h.commands.send(Command::Unregister { id: 1 }).unwrap();
        h.mixer.drain_commands();
        h.mixer.notify_receivers(&info);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        assert!(matches!(
            h.released.try_recv(),
            Ok(Released::Receiver(_))
        ));
        assert_eq!(Arc::strong_count(&calls), 1);
    }

    #[test]
    fn test_mono_voice_upmixed_to_stereo() {
        let mut h = harness(1, 3, 2);
        h.add(
            0,
            Arc::new(MemorySampleProvider::new(vec![1, 2, 3], 1, 48000)),
            1.0,
            flags::PLAYING,
        );
        h.mixer.drain_commands();

        let mut output = vec![0i16; 6];
        h.mixer.process(&mut output, 2);
        assert_eq!(output, vec![1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_wide_provider_read_in_passes() {
        // 8 channels into stereo with scratch for only 2 channels: one frame per pass.
        let mut h = harness(1, 4, 2);
        let samples: Vec<i16> = (0..32).map(|i| i as i16).collect();
        h.add(
            0,
            Arc::new(MemorySampleProvider::new(samples, 8, 48000)),
            1.0,
            flags::PLAYING,
        );
        h.mixer.drain_commands();

        let mut output = vec![0i16; 8];
        h.mixer.process(&mut output, 2);
        let expected: Vec<i16> = (0..4)
            .flat_map(|f| {
                let base = f * 8;
                [
                    crate::audio::sample_mix::mix_samples(base, base + 2),
                    crate::audio::sample_mix::mix_samples(base + 1, base + 3),
                ]
            })
            .collect();
        assert_eq!(output, expected);
    }
}
