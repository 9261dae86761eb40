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

//! A real-time voice mixing and playback engine.
//!
//! An [`audio::Engine`] owns a fixed pool of voices, each playing a shared
//! [`audio::SampleProvider`]. Application threads control voices through the
//! engine while an output backend drives the matching [`audio::Callback`] on
//! its own real-time thread.

pub mod audio;
pub mod config;
pub mod util;

#[cfg(test)]
mod testutil;
