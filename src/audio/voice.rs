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

//! Voice slots and the handles that address them.
//!
//! A voice is one entry in the engine's fixed pool. Its playback state lives in
//! atomics so the control thread and the audio thread can share it without
//! locking. The provider binding itself is owned by the audio thread and is
//! only changed through the engine's pending operation queue.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::engine::{Engine, EngineError};
use super::sample_provider::SampleProvider;
use super::{MAX_VOLUME, MIN_VOLUME};

/// Longest diagnostic name kept for a voice, in bytes.
pub const MAX_NAME_LEN: usize = 63;

/// Name reported for handles that no longer refer to a live voice.
pub const INVALID_VOICE_NAME: &str = "<invalid voice>";

/// Identifies a voice in an engine's pool.
///
/// Handles are generation checked: once the voice is removed (explicitly or
/// because it finished with remove-on-end set) the handle goes stale and every
/// operation on it becomes a no-op, even after the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    index: u16,
    generation: u32,
}

impl VoiceHandle {
    pub(crate) fn new(index: u16, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the voice pool.
    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for VoiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice {}.{}", self.index, self.generation)
    }
}

/// Flag bits stored in the low half of [`VoiceSlot::flags`]. The high half
/// counts control-thread writes so the audio thread can tell whether the word
/// changed since it read it.
pub(crate) mod flags {
    pub const PLAYING: u32 = 1 << 0;
    pub const LOOPING: u32 = 1 << 1;
    pub const PLAY_PAST_END: u32 = 1 << 2;
    pub const REMOVE_ON_END: u32 = 1 << 3;

    pub const MASK: u32 = 0xffff;
    pub const WRITE_STEP: u32 = 1 << 16;
}

/// Lifecycle of a slot. `Free -> Bound` happens on control threads only,
/// `Bound | Retiring -> Free` on the audio thread only.
pub(crate) mod state {
    pub const FREE: u8 = 0;
    pub const BOUND: u8 = 1;
    pub const RETIRING: u8 = 2;
}

/// Marks the absence of a pending seek.
pub(crate) const NO_SEEK: i64 = i64::MIN;

/// Clamps a volume into the supported range. NaN becomes the minimum.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        MIN_VOLUME
    } else {
        volume.clamp(MIN_VOLUME, MAX_VOLUME)
    }
}

/// Truncates a name to [`MAX_NAME_LEN`] bytes on a character boundary.
pub(crate) fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_NAME_LEN {
        return name.to_string();
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// Playback state of one slot, shared between the control and audio threads.
pub(crate) struct VoiceSlot {
    pub generation: AtomicU32,
    pub state: AtomicU8,
    pub flags: AtomicU32,
    /// f32 bits.
    volume: AtomicU32,
    /// Frame position, published by the audio thread after every pass.
    pub position: AtomicI64,
    /// Frame position requested by the control thread, or [`NO_SEEK`].
    seek_request: AtomicI64,
}

impl VoiceSlot {
    pub fn new() -> Self {
        Self {
            generation: AtomicU32::new(0),
            state: AtomicU8::new(state::FREE),
            flags: AtomicU32::new(0),
            volume: AtomicU32::new(MAX_VOLUME.to_bits()),
            position: AtomicI64::new(0),
            seek_request: AtomicI64::new(NO_SEEK),
        }
    }

    /// Whether the handle still refers to the voice bound in this slot.
    pub fn is(&self, handle: VoiceHandle) -> bool {
        self.state.load(Ordering::Acquire) == state::BOUND
            && self.generation.load(Ordering::Acquire) == handle.generation
    }

    pub fn flag(&self, flag: u32) -> bool {
        self.flags.load(Ordering::Acquire) & flags::MASK & flag != 0
    }

    /// Sets or clears a flag. Control thread only.
    pub fn set_flag(&self, flag: u32, on: bool) {
        let _ = self
            .flags
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let word = if on { word | flag } else { word & !flag };
                Some(word.wrapping_add(flags::WRITE_STEP))
            });
    }

    /// Counts a control write that doesn't touch the flag bits.
    fn note_write(&self) {
        self.flags.fetch_add(flags::WRITE_STEP, Ordering::AcqRel);
    }

    /// Stops a voice that played to its end, unless the control thread wrote
    /// to it after `snapshot` was read or has a seek pending. Audio thread only.
    pub fn stop_at_end(&self, snapshot: u32) -> bool {
        if self.seek_request.load(Ordering::Acquire) != NO_SEEK {
            return false;
        }
        self.flags
            .compare_exchange(
                snapshot,
                snapshot & !flags::PLAYING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Acquire))
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume
            .store(clamp_volume(volume).to_bits(), Ordering::Release);
    }

    pub fn request_seek(&self, frame: i64) {
        // i64::MIN is reserved; nobody seeks that far back.
        self.seek_request
            .store(frame.max(NO_SEEK + 1), Ordering::Release);
        self.note_write();
    }

    /// Takes the pending seek, if any. Audio thread only.
    pub fn take_seek(&self) -> Option<i64> {
        match self.seek_request.swap(NO_SEEK, Ordering::AcqRel) {
            NO_SEEK => None,
            frame => Some(frame),
        }
    }

    /// The pending seek if there is one, otherwise the published position.
    pub fn effective_position(&self) -> i64 {
        match self.seek_request.load(Ordering::Acquire) {
            NO_SEEK => self.position.load(Ordering::Acquire),
            frame => frame,
        }
    }

    /// Prepares a free slot for a new voice and returns its new generation.
    /// Control thread only, while the slot is still free.
    pub fn prepare(&self, volume: f32, flags: u32, start_frame: i64) -> u32 {
        let generation = self.generation.load(Ordering::Acquire).wrapping_add(1);
        self.generation.store(generation, Ordering::Release);
        self.set_volume(volume);
        self.flags.store(flags, Ordering::Release);
        self.position.store(start_frame, Ordering::Release);
        self.seek_request.store(NO_SEEK, Ordering::Release);
        generation
    }
}

/// Options for [`Engine::add_voice_with`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceOptions {
    pub playing: bool,
    pub volume: f32,
    pub looping: bool,
    pub play_past_end: bool,
    pub remove_on_end: bool,
    /// Start position in seconds. Negative values delay the start.
    pub start_position: f64,
}

impl Default for VoiceOptions {
    fn default() -> Self {
        Self {
            playing: false,
            volume: MAX_VOLUME,
            looping: false,
            play_past_end: false,
            remove_on_end: false,
            start_position: 0.0,
        }
    }
}

impl VoiceOptions {
    pub(crate) fn flags(&self) -> u32 {
        let mut bits = 0;
        if self.playing {
            bits |= flags::PLAYING;
        }
        if self.looping {
            bits |= flags::LOOPING;
        }
        if self.play_past_end {
            bits |= flags::PLAY_PAST_END;
        }
        if self.remove_on_end {
            bits |= flags::REMOVE_ON_END;
        }
        bits
    }
}

/// A snapshot of a live voice for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceInfo {
    pub handle: VoiceHandle,
    pub name: String,
    pub playing: bool,
    pub looping: bool,
    pub volume: f32,
    /// Position in seconds.
    pub position: f64,
    pub duration: Duration,
}

impl fmt::Display for VoiceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} \"{}\" {} {:.2}s/{:.2}s vol {:.2}{}",
            self.handle,
            self.name,
            if self.playing { "playing" } else { "stopped" },
            self.position,
            self.duration.as_secs_f64(),
            self.volume,
            if self.looping { " (looping)" } else { "" },
        )
    }
}

/// A borrowed view of one voice, for calling several operations on it.
pub struct Voice<'a> {
    engine: &'a Engine,
    handle: VoiceHandle,
}

impl<'a> Voice<'a> {
    pub(crate) fn new(engine: &'a Engine, handle: VoiceHandle) -> Self {
        Self { engine, handle }
    }

    pub fn handle(&self) -> VoiceHandle {
        self.handle
    }

    pub fn is_valid(&self) -> bool {
        self.engine.is_valid(self.handle)
    }

    pub fn set_sample_provider(&self, provider: Arc<dyn SampleProvider>) -> Result<(), EngineError> {
        self.engine.set_sample_provider(self.handle, provider)
    }

    pub fn position(&self) -> f64 {
        self.engine.position(self.handle)
    }

    pub fn set_position(&self, seconds: f64) {
        self.engine.set_position(self.handle, seconds);
    }

    pub fn restart(&self) {
        self.engine.restart(self.handle);
    }

    pub fn duration(&self) -> Duration {
        self.engine.duration(self.handle)
    }

    pub fn volume(&self) -> f32 {
        self.engine.volume(self.handle)
    }

    pub fn set_volume(&self, volume: f32) {
        self.engine.set_volume(self.handle, volume);
    }

    pub fn is_playing(&self) -> bool {
        self.engine.is_playing(self.handle)
    }

    pub fn set_playing(&self, playing: bool) {
        self.engine.set_playing(self.handle, playing);
    }

    pub fn is_looping(&self) -> bool {
        self.engine.is_looping(self.handle)
    }

    pub fn set_looping(&self, looping: bool) {
        self.engine.set_looping(self.handle, looping);
    }

    pub fn plays_past_end(&self) -> bool {
        self.engine.plays_past_end(self.handle)
    }

    pub fn set_play_past_end(&self, play_past_end: bool) {
        self.engine.set_play_past_end(self.handle, play_past_end);
    }

    pub fn removes_on_end(&self) -> bool {
        self.engine.removes_on_end(self.handle)
    }

    pub fn set_remove_on_end(&self, remove_on_end: bool) {
        self.engine.set_remove_on_end(self.handle, remove_on_end);
    }

    pub fn has_reached_end(&self) -> bool {
        self.engine.has_reached_end(self.handle)
    }

    pub fn name(&self) -> String {
        self.engine.name(self.handle)
    }

    /// Removes the voice. The view is stale afterwards.
    pub fn remove(self) {
        self.engine.remove_voice(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_volume() {
        assert_eq!(clamp_volume(0.5), 0.5);
        assert_eq!(clamp_volume(-1.0), MIN_VOLUME);
        assert_eq!(clamp_volume(7.0), MAX_VOLUME);
        assert_eq!(clamp_volume(f32::NAN), MIN_VOLUME);
        assert_eq!(clamp_volume(f32::INFINITY), MAX_VOLUME);
        for v in [-3.0, 0.0, 0.25, 1.0, 2.0] {
            assert_eq!(clamp_volume(clamp_volume(v)), clamp_volume(v));
        }
    }

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("kick"), "kick");
        let long = "x".repeat(100);
        assert_eq!(truncate_name(&long).len(), MAX_NAME_LEN);
        // A multi-byte character straddling the limit is dropped whole.
        let multi = format!("{}é", "a".repeat(62));
        assert_eq!(truncate_name(&multi), "a".repeat(62));
    }

    #[test]
    fn test_slot_seek_request() {
        let slot = VoiceSlot::new();
        slot.position.store(100, Ordering::Release);
        assert_eq!(slot.effective_position(), 100);
        assert_eq!(slot.take_seek(), None);

        slot.request_seek(-50);
        assert_eq!(slot.effective_position(), -50);
        assert_eq!(slot.take_seek(), Some(-50));
        assert_eq!(slot.take_seek(), None);
        assert_eq!(slot.effective_position(), 100);
    }

    #[test]
    fn test_slot_prepare_bumps_generation() {
        let slot = VoiceSlot::new();
        slot.set_flag(flags::LOOPING, true);
        slot.request_seek(12);

        let generation = slot.prepare(0.25, flags::PLAYING, -10);
        assert_eq!(generation, 1);
        assert_eq!(slot.volume(), 0.25);
        assert!(slot.flag(flags::PLAYING));
        assert!(!slot.flag(flags::LOOPING));
        assert_eq!(slot.effective_position(), -10);

        // Not bound yet.
        assert!(!slot.is(VoiceHandle::new(0, generation)));
        slot.state.store(state::BOUND, Ordering::Release);
        assert!(slot.is(VoiceHandle::new(0, generation)));
        assert!(!slot.is(VoiceHandle::new(0, generation - 1)));
    }

    #[test]
    fn test_stop_at_end_without_control_writes() {
        let slot = VoiceSlot::new();
        slot.prepare(1.0, flags::PLAYING | flags::LOOPING, 0);
        let snapshot = slot.flags.load(Ordering::Acquire);
        assert!(slot.stop_at_end(snapshot));
        assert!(!slot.flag(flags::PLAYING));
        assert!(slot.flag(flags::LOOPING));
    }

    #[test]
    fn test_stop_at_end_yields_to_later_play() {
        let slot = VoiceSlot::new();
        slot.prepare(1.0, flags::PLAYING, 0);
        let snapshot = slot.flags.load(Ordering::Acquire);

        // Already playing, so only the write count changes.
        slot.set_flag(flags::PLAYING, true);
        assert!(!slot.stop_at_end(snapshot));
        assert!(slot.flag(flags::PLAYING));
    }

    #[test]
    fn test_stop_at_end_yields_to_pending_seek() {
        let slot = VoiceSlot::new();
        slot.prepare(1.0, flags::PLAYING, 0);
        slot.request_seek(0);
        let snapshot = slot.flags.load(Ordering::Acquire);
        assert!(!slot.stop_at_end(snapshot));
        assert!(slot.flag(flags::PLAYING));

        // A seek taken before the stop still counts as a later write.
        let snapshot = slot.flags.load(Ordering::Acquire);
        slot.request_seek(5);
        slot.take_seek();
        assert!(!slot.stop_at_end(snapshot));
        assert!(slot.stop_at_end(slot.flags.load(Ordering::Acquire)));
    }

    #[test]
    fn test_flag_writes_keep_other_bits() {
        let slot = VoiceSlot::new();
        slot.prepare(1.0, flags::LOOPING, 0);
        for _ in 0..70000 {
            slot.set_flag(flags::PLAYING, true);
        }
        slot.set_flag(flags::PLAYING, false);
        assert!(slot.flag(flags::LOOPING));
        assert!(!slot.flag(flags::PLAYING));
        assert!(!slot.flag(flags::REMOVE_ON_END));
    }

    #[test]
    fn test_options_flags() {
        let options = VoiceOptions {
            playing: true,
            remove_on_end: true,
            ..Default::default()
        };
        assert_eq!(options.flags(), flags::PLAYING | flags::REMOVE_ON_END);
        assert_eq!(VoiceOptions::default().flags(), 0);
    }
}
