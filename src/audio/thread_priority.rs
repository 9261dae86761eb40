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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Priority used for the audio thread when STUDIO_MIXER_THREAD_PRIORITY is unset.
const DEFAULT_AUDIO_THREAD_PRIORITY: u8 = 70;

const PRIORITY_ENV: &str = "STUDIO_MIXER_THREAD_PRIORITY";
const DISABLE_RT_ENV: &str = "STUDIO_MIXER_DISABLE_RT_AUDIO";

/// How the thread that drives the callback should be scheduled. Read from the
/// environment once, before the audio thread starts, so the hot path never
/// touches the environment.
#[derive(Debug, Clone, Copy)]
pub struct AudioThreadPriority {
    priority: ThreadPriority,
    realtime: bool,
}

impl AudioThreadPriority {
    /// Reads STUDIO_MIXER_THREAD_PRIORITY (0-99) and STUDIO_MIXER_DISABLE_RT_AUDIO.
    pub fn from_env() -> Self {
        Self {
            priority: ThreadPriorityValue::try_from(parse_priority(
                std::env::var(PRIORITY_ENV).ok().as_deref(),
            ))
            .map(ThreadPriority::Crossplatform)
            .unwrap_or(ThreadPriority::Max),
            realtime: !parse_flag(std::env::var(DISABLE_RT_ENV).ok().as_deref()),
        }
    }

    pub fn realtime(&self) -> bool {
        self.realtime
    }

    /// Raises the calling thread's priority and, on unix, asks for SCHED_FIFO
    /// unless real-time scheduling was disabled. Failures are logged and
    /// otherwise ignored.
    pub fn apply(&self) {
        let priority = self.priority;
        if let Err(e) = set_current_thread_priority(priority) {
            warn!(error = ?e, "Unable to raise audio thread priority");
        }

        #[cfg(unix)]
        if self.realtime {
            use thread_priority::unix::{
                set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
                ThreadSchedulePolicy,
            };
            match set_thread_priority_and_policy(
                thread_native_id(),
                priority,
                ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
            ) {
                Ok(()) => info!("Enabled RT SCHED_FIFO for audio thread"),
                Err(e) => warn!(error = %e, "Failed to set RT SCHED_FIFO for audio thread"),
            }
        }
    }
}

fn parse_priority(value: Option<&str>) -> u8 {
    value
        .and_then(|v| v.trim().parse::<u8>().ok())
        .filter(|&n| n < 100)
        .unwrap_or(DEFAULT_AUDIO_THREAD_PRIORITY)
}

fn parse_flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        v == "1"
            || v.eq_ignore_ascii_case("true")
            || v.eq_ignore_ascii_case("yes")
            || v.eq_ignore_ascii_case("on")
    })
}
