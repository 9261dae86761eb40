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

//! The control-plane half of the engine.
//!
//! [`Engine`] is a cheap, cloneable handle used by application threads to add,
//! remove and adjust voices. Every change is either a single atomic store on
//! the voice's slot or a provider binding pushed onto a bounded queue that the
//! audio thread drains at the start of its next callback, so no call here ever
//! waits on the audio thread.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::callback::{Callback, CallbackReceiver, CallbackStats};
use super::channel_mixer::ChannelMixing;
use super::mixer::{Command, Mixer, Released, MAX_CALLBACK_RECEIVERS};
use super::sample_provider::SampleProvider;
use super::voice::{
    clamp_volume, flags, state, truncate_name, Voice, VoiceHandle, VoiceInfo, VoiceOptions,
    VoiceSlot, INVALID_VOICE_NAME,
};
use crate::util::{frames_to_duration, frames_to_seconds, seconds_to_frames};

/// Control-plane errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("no free voice available (capacity {0})")]
    NoFreeVoice(usize),

    #[error("pending operation queue is full")]
    QueueFull,

    #[error("invalid engine settings: {0}")]
    InvalidSettings(String),

    #[error("too many callback receivers (limit {0})")]
    TooManyReceivers(usize),
}

/// Identifies a registered [`CallbackReceiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverId(u64);

impl fmt::Display for ReceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "receiver {}", self.0)
    }
}

/// Fixed parameters of an engine, chosen when it is built.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output channel count; also the widest buffer the callback accepts.
    pub channels: usize,
    /// Largest number of frames mixed in one pass. Bigger requests are chunked.
    pub max_buffer_frames: usize,
    /// Voice pool capacity.
    pub max_voices: usize,
    /// Capacity of the pending operation queue.
    pub queue_capacity: usize,
    pub master_volume: f32,
    pub channel_mixing: ChannelMixing,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            max_buffer_frames: 1024,
            max_voices: 64,
            queue_capacity: 256,
            master_volume: 1.0,
            channel_mixing: ChannelMixing::Mix,
        }
    }
}

impl EngineSettings {
    fn validate(&self) -> Result<(), EngineError> {
        let invalid = |message: &str| Err(EngineError::InvalidSettings(message.to_string()));
        if self.sample_rate == 0 {
            return invalid("sample rate must be greater than 0");
        }
        if self.channels == 0 {
            return invalid("channel count must be greater than 0");
        }
        if self.max_buffer_frames == 0 {
            return invalid("max buffer size must be greater than 0");
        }
        if self.max_voices == 0 || self.max_voices > u16::MAX as usize + 1 {
            return invalid("max voices must be between 1 and 65536");
        }
        if self.queue_capacity == 0 {
            return invalid("queue capacity must be greater than 0");
        }
        Ok(())
    }
}

/// Control-side bookkeeping for one slot.
#[derive(Default)]
struct RegistryEntry {
    provider: Option<Arc<dyn SampleProvider>>,
    name: String,
}

struct Shared {
    settings: EngineSettings,
    slots: Arc<[VoiceSlot]>,
    /// Only ever locked by control threads.
    registry: Mutex<Vec<RegistryEntry>>,
    commands: Sender<Command>,
    released: Receiver<Released>,
    /// Receivers the audio thread holds or will hold.
    receivers: Mutex<Vec<ReceiverId>>,
    next_receiver_id: AtomicU64,
    /// f32 bits.
    master_volume: Arc<AtomicU32>,
    channel_mixing: Arc<AtomicU8>,
    stats: Arc<CallbackStats>,
}

/// Thread-safe handle for controlling playback.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    /// Builds an engine and the callback that must be handed to an output
    /// backend (or driven manually) to hear it.
    pub fn new(settings: EngineSettings) -> Result<(Engine, Callback), EngineError> {
        settings.validate()?;

        let slots: Arc<[VoiceSlot]> = (0..settings.max_voices).map(|_| VoiceSlot::new()).collect();
        let (commands, command_rx) = bounded(settings.queue_capacity);
        // Everything the audio thread can hold at once fits.
        let (release_tx, released) = bounded(
            settings.queue_capacity + settings.max_voices + MAX_CALLBACK_RECEIVERS,
        );
        let master_volume = Arc::new(AtomicU32::new(
            clamp_volume(settings.master_volume).to_bits(),
        ));
        let channel_mixing = Arc::new(AtomicU8::new(settings.channel_mixing.as_u8()));
        let stats = Arc::new(CallbackStats::new());

        let mixer = Mixer::new(
            slots.clone(),
            command_rx,
            release_tx,
            master_volume.clone(),
            channel_mixing.clone(),
            settings.max_buffer_frames,
            settings.channels,
        );
        let callback = Callback::new(mixer, stats.clone());

        info!(
            sample_rate = settings.sample_rate,
            channels = settings.channels,
            max_voices = settings.max_voices,
            max_buffer_frames = settings.max_buffer_frames,
            "Audio engine created"
        );

        let registry = (0..settings.max_voices)
            .map(|_| RegistryEntry::default())
            .collect();
        let engine = Engine {
            shared: Arc::new(Shared {
                settings,
                slots,
                registry: Mutex::new(registry),
                commands,
                released,
                receivers: Mutex::new(Vec::with_capacity(MAX_CALLBACK_RECEIVERS)),
                next_receiver_id: AtomicU64::new(1),
                master_volume,
                channel_mixing,
                stats,
            }),
        };
        Ok((engine, callback))
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.shared.settings
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.settings.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.shared.settings.channels
    }

    /// Size of the voice pool.
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }

    /// Timing statistics of the audio callback.
    pub fn callback_stats(&self) -> Arc<CallbackStats> {
        self.shared.stats.clone()
    }

    /// Position of the stream clock: the output time rendered so far.
    pub fn stream_time(&self) -> Duration {
        frames_to_duration(self.shared.stats.stream_frames(), self.sample_rate())
    }

    /// Stream clock in output frames.
    pub fn stream_frames(&self) -> i64 {
        self.shared.stats.stream_frames()
    }

    /// Moves the stream clock. Callbacks count on from the new time.
    pub fn set_stream_time(&self, time: Duration) {
        self.shared
            .stats
            .set_stream_frames(seconds_to_frames(time.as_secs_f64(), self.sample_rate()));
    }

    /// Stream time covered by the last callback.
    pub fn callback_frequency(&self) -> Duration {
        frames_to_duration(
            self.shared.stats.last_frames() as i64,
            self.sample_rate(),
        )
    }

    /// Behaviour used when folding four or more channels down to stereo.
    pub fn channel_mixing(&self) -> ChannelMixing {
        ChannelMixing::from_u8(self.shared.channel_mixing.load(Ordering::Acquire))
    }

    /// Changes the fold-down behaviour from the next callback on.
    pub fn set_channel_mixing(&self, mixing: ChannelMixing) {
        self.shared
            .channel_mixing
            .store(mixing.as_u8(), Ordering::Release);
        debug!(%mixing, "Channel mixing changed");
    }

    /// Registers a receiver to be run on the audio thread at the start of
    /// every callback.
    pub fn register_callback_receiver(
        &self,
        receiver: impl CallbackReceiver + 'static,
    ) -> Result<ReceiverId, EngineError> {
        self.collect_garbage();
        let mut receivers = self.shared.receivers.lock();
        if receivers.len() >= MAX_CALLBACK_RECEIVERS {
            warn!(limit = MAX_CALLBACK_RECEIVERS, "Too many callback receivers");
            return Err(EngineError::TooManyReceivers(MAX_CALLBACK_RECEIVERS));
        }

        let id = ReceiverId(self.shared.next_receiver_id.fetch_add(1, Ordering::Relaxed));
        self.shared
            .commands
            .try_send(Command::Register {
                id: id.0,
                receiver: Box::new(receiver),
            })
            .map_err(|_| EngineError::QueueFull)?;
        receivers.push(id);
        debug!(%id, "Registered callback receiver");
        Ok(id)
    }

    /// Unregisters a receiver. It is dropped on the control thread once the
    /// audio thread has let go of it. Returns false for unknown ids.
    pub fn unregister_callback_receiver(&self, id: ReceiverId) -> Result<bool, EngineError> {
        self.collect_garbage();
        let mut receivers = self.shared.receivers.lock();
        let Some(index) = receivers.iter().position(|r| *r == id) else {
            return Ok(false);
        };
        self.shared
            .commands
            .try_send(Command::Unregister { id: id.0 })
            .map_err(|_| EngineError::QueueFull)?;
        receivers.swap_remove(index);
        debug!(%id, "Unregistered callback receiver");
        Ok(true)
    }

    /// Drops every voice's use of `provider`. The voices stay, silent, with
    /// their clocks still running until they get a new provider or are
    /// removed. Returns how many voices were using it.
    pub fn unload_provider(&self, provider: &Arc<dyn SampleProvider>) -> Result<usize, EngineError> {
        self.collect_garbage();
        let shared = &self.shared;
        let mut registry = shared.registry.lock();
        let target = Arc::as_ptr(provider) as *const ();

        let users: Vec<usize> = registry
            .iter()
            .enumerate()
            .filter(|(index, entry)| {
                shared.slots[*index].state.load(Ordering::Acquire) == state::BOUND
                    && entry
                        .provider
                        .as_ref()
                        .is_some_and(|p| Arc::as_ptr(p) as *const () == target)
            })
            .map(|(index, _)| index)
            .collect();
        if shared.commands.len() + users.len() > shared.settings.queue_capacity {
            warn!(voices = users.len(), "Pending operation queue is full");
            return Err(EngineError::QueueFull);
        }

        for &index in &users {
            let generation = shared.slots[index].generation.load(Ordering::Acquire);
            shared
                .commands
                .try_send(Command::Unbind {
                    index: index as u16,
                    generation,
                })
                .map_err(|_| EngineError::QueueFull)?;
            registry[index].provider = None;
        }
        debug!(voices = users.len(), "Unloaded provider");
        Ok(users.len())
    }

    /// Drops what the audio thread has let go of, along with the bookkeeping
    /// of voices it reclaimed on its own. Returns how many items the audio
    /// thread handed back. Every control operation does this implicitly.
    pub fn collect_garbage(&self) -> usize {
        let released = self.shared.released.try_iter().count();
        let mut registry = self.shared.registry.lock();
        for (slot, entry) in self.shared.slots.iter().zip(registry.iter_mut()) {
            if (entry.provider.is_some() || !entry.name.is_empty())
                && slot.state.load(Ordering::Acquire) == state::FREE
            {
                *entry = RegistryEntry::default();
            }
        }
        released
    }

    /// Adds a voice with default options, optionally playing immediately.
    pub fn add_voice(
        &self,
        provider: Arc<dyn SampleProvider>,
        name: &str,
        playing: bool,
    ) -> Result<VoiceHandle, EngineError> {
        self.add_voice_with(
            provider,
            name,
            VoiceOptions {
                playing,
                ..Default::default()
            },
        )
    }

    /// Plays a provider once. The voice removes itself when it reaches the end.
    pub fn play_sound(
        &self,
        provider: Arc<dyn SampleProvider>,
        name: &str,
        volume: f32,
    ) -> Result<VoiceHandle, EngineError> {
        self.add_voice_with(
            provider,
            name,
            VoiceOptions {
                playing: true,
                volume,
                remove_on_end: true,
                ..Default::default()
            },
        )
    }

    pub fn add_voice_with(
        &self,
        provider: Arc<dyn SampleProvider>,
        name: &str,
        options: VoiceOptions,
    ) -> Result<VoiceHandle, EngineError> {
        self.collect_garbage();
        let shared = &self.shared;
        let mut registry = shared.registry.lock();

        if shared.commands.is_full() {
            warn!(voice = name, "Pending operation queue is full");
            return Err(EngineError::QueueFull);
        }

        let Some(index) = shared
            .slots
            .iter()
            .position(|slot| slot.state.load(Ordering::Acquire) == state::FREE)
        else {
            warn!(voice = name, capacity = shared.slots.len(), "No free voice");
            return Err(EngineError::NoFreeVoice(shared.slots.len()));
        };

        let slot = &shared.slots[index];
        let start_frame = seconds_to_frames(options.start_position, provider.sample_rate());
        let generation = slot.prepare(options.volume, options.flags(), start_frame);
        slot.state.store(state::BOUND, Ordering::Release);
        let handle = VoiceHandle::new(index as u16, generation);

        registry[index] = RegistryEntry {
            provider: Some(provider.clone()),
            name: truncate_name(name),
        };

        if shared
            .commands
            .try_send(Command::Bind {
                index: index as u16,
                generation,
                provider,
            })
            .is_err()
        {
            // Hand the slot back through the audio thread like any removal.
            slot.state.store(state::RETIRING, Ordering::Release);
            registry[index] = RegistryEntry::default();
            return Err(EngineError::QueueFull);
        }

        debug!(
            voice = name,
            index,
            generation,
            playing = options.playing,
            volume = slot.volume(),
            "Added voice"
        );
        Ok(handle)
    }

    /// Removes a voice. The handle is stale as soon as this returns; the slot
    /// becomes reusable once the audio thread has let go of it. Returns false
    /// if the handle was already stale.
    pub fn remove_voice(&self, handle: VoiceHandle) -> bool {
        self.collect_garbage();
        let mut registry = self.shared.registry.lock();
        let Some(slot) = self.shared.slots.get(handle.index() as usize) else {
            return false;
        };
        if slot.generation.load(Ordering::Acquire) != handle.generation()
            || slot
                .state
                .compare_exchange(
                    state::BOUND,
                    state::RETIRING,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_err()
        {
            return false;
        }

        let entry = std::mem::take(&mut registry[handle.index() as usize]);
        debug!(voice = %entry.name, %handle, "Removed voice");
        true
    }

    /// A view for calling several operations on one voice.
    pub fn voice(&self, handle: VoiceHandle) -> Voice<'_> {
        Voice::new(self, handle)
    }

    /// Runs `f` with the slot and registry entry of a live voice.
    fn with_voice<R>(
        &self,
        handle: VoiceHandle,
        f: impl FnOnce(&VoiceSlot, &mut RegistryEntry) -> R,
    ) -> Option<R> {
        self.collect_garbage();
        let mut registry = self.shared.registry.lock();
        let index = handle.index() as usize;
        let slot = self.shared.slots.get(index)?;
        if !slot.is(handle) {
            return None;
        }
        Some(f(slot, &mut registry[index]))
    }

    pub fn is_valid(&self, handle: VoiceHandle) -> bool {
        self.with_voice(handle, |_, _| ()).is_some()
    }

    /// Rebinds a voice to another provider, keeping its position.
    pub fn set_sample_provider(
        &self,
        handle: VoiceHandle,
        provider: Arc<dyn SampleProvider>,
    ) -> Result<(), EngineError> {
        let commands = &self.shared.commands;
        self.with_voice(handle, |_, entry| {
            commands
                .try_send(Command::Bind {
                    index: handle.index(),
                    generation: handle.generation(),
                    provider: provider.clone(),
                })
                .map_err(|_| EngineError::QueueFull)?;
            entry.provider = Some(provider);
            Ok(())
        })
        .unwrap_or(Ok(()))
    }

    /// Position in seconds. Reflects a pending seek immediately.
    pub fn position(&self, handle: VoiceHandle) -> f64 {
        let engine_rate = self.sample_rate();
        self.with_voice(handle, |slot, entry| {
            let rate = entry
                .provider
                .as_ref()
                .map_or(engine_rate, |p| p.sample_rate());
            frames_to_seconds(slot.effective_position(), rate)
        })
        .unwrap_or(0.0)
    }

    /// Position in frames of the bound provider.
    pub fn position_frames(&self, handle: VoiceHandle) -> i64 {
        self.with_voice(handle, |slot, _| slot.effective_position())
            .unwrap_or(0)
    }

    /// Seeks to `seconds`, which may be negative to delay the start.
    pub fn set_position(&self, handle: VoiceHandle, seconds: f64) {
        let engine_rate = self.sample_rate();
        self.with_voice(handle, |slot, entry| {
            let rate = entry
                .provider
                .as_ref()
                .map_or(engine_rate, |p| p.sample_rate());
            slot.request_seek(seconds_to_frames(seconds, rate));
        });
    }

    pub fn restart(&self, handle: VoiceHandle) {
        self.set_position(handle, 0.0);
    }

    pub fn duration(&self, handle: VoiceHandle) -> Duration {
        self.with_voice(handle, |_, entry| {
            entry
                .provider
                .as_ref()
                .map_or(Duration::ZERO, |p| p.duration())
        })
        .unwrap_or(Duration::ZERO)
    }

    /// True once the position is at or past the provider's last frame. Stale
    /// handles always report true; voices without a provider never end.
    pub fn has_reached_end(&self, handle: VoiceHandle) -> bool {
        self.with_voice(handle, |slot, entry| {
            entry
                .provider
                .as_ref()
                .is_some_and(|p| slot.effective_position() >= p.frame_count())
        })
        .unwrap_or(true)
    }

    pub fn volume(&self, handle: VoiceHandle) -> f32 {
        self.with_voice(handle, |slot, _| slot.volume())
            .unwrap_or(0.0)
    }

    /// Sets the voice volume, clamped to the supported range.
    pub fn set_volume(&self, handle: VoiceHandle, volume: f32) {
        self.with_voice(handle, |slot, _| slot.set_volume(volume));
    }

    fn flag(&self, handle: VoiceHandle, flag: u32) -> bool {
        self.with_voice(handle, |slot, _| slot.flag(flag))
            .unwrap_or(false)
    }

    fn set_flag(&self, handle: VoiceHandle, flag: u32, on: bool) {
        self.with_voice(handle, |slot, _| slot.set_flag(flag, on));
    }

    pub fn is_playing(&self, handle: VoiceHandle) -> bool {
        self.flag(handle, flags::PLAYING)
    }

    pub fn set_playing(&self, handle: VoiceHandle, playing: bool) {
        self.set_flag(handle, flags::PLAYING, playing);
    }

    pub fn is_looping(&self, handle: VoiceHandle) -> bool {
        self.flag(handle, flags::LOOPING)
    }

    /// Looping voices wrap to the start inside the buffer that reaches the
    /// end, so the loop is seamless.
    pub fn set_looping(&self, handle: VoiceHandle, looping: bool) {
        self.set_flag(handle, flags::LOOPING, looping);
    }

    pub fn plays_past_end(&self, handle: VoiceHandle) -> bool {
        self.flag(handle, flags::PLAY_PAST_END)
    }

    pub fn set_play_past_end(&self, handle: VoiceHandle, play_past_end: bool) {
        self.set_flag(handle, flags::PLAY_PAST_END, play_past_end);
    }

    pub fn removes_on_end(&self, handle: VoiceHandle) -> bool {
        self.flag(handle, flags::REMOVE_ON_END)
    }

    pub fn set_remove_on_end(&self, handle: VoiceHandle, remove_on_end: bool) {
        self.set_flag(handle, flags::REMOVE_ON_END, remove_on_end);
    }

    pub fn name(&self, handle: VoiceHandle) -> String {
        self.with_voice(handle, |_, entry| entry.name.clone())
            .unwrap_or_else(|| INVALID_VOICE_NAME.to_string())
    }

    pub fn master_volume(&self) -> f32 {
        f32::from_bits(self.shared.master_volume.load(Ordering::Acquire))
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.shared
            .master_volume
            .store(clamp_volume(volume).to_bits(), Ordering::Release);
    }

    /// Snapshot of every live voice, in slot order.
    pub fn voices(&self) -> Vec<VoiceInfo> {
        self.collect_garbage();
        let registry = self.shared.registry.lock();
        self.shared
            .slots
            .iter()
            .zip(registry.iter())
            .enumerate()
            .filter(|(_, (slot, _))| slot.state.load(Ordering::Acquire) == state::BOUND)
            .map(|(index, (slot, entry))| {
                let (rate, duration) = entry.provider.as_ref().map_or(
                    (self.sample_rate(), Duration::ZERO),
                    |p| (p.sample_rate(), p.duration()),
                );
                VoiceInfo {
                    handle: VoiceHandle::new(
                        index as u16,
                        slot.generation.load(Ordering::Acquire),
                    ),
                    name: entry.name.clone(),
                    playing: slot.flag(flags::PLAYING),
                    looping: slot.flag(flags::LOOPING),
                    volume: slot.volume(),
                    position: frames_to_seconds(slot.effective_position(), rate),
                    duration,
                }
            })
            .collect()
    }

    /// True when no live voice is playing.
    pub fn all_voices_idle(&self) -> bool {
        self.shared.slots.iter().all(|slot| {
            slot.state.load(Ordering::Acquire) != state::BOUND || !slot.flag(flags::PLAYING)
        })
    }
}
