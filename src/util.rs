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
use std::time::Duration;

/// Extracts a displayable file name from a path, returning a fallback if the name is unreadable.
pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
}

/// Outputs the given duration in a minutes:seconds format.
pub fn duration_minutes_seconds(duration: Duration) -> String {
    let minutes = duration.as_secs() / 60;
    let secs = duration.as_secs() - minutes * 60;
    format!("{}:{:02}", minutes, secs)
}

/// Converts seconds to the nearest frame at the given rate. Negative seconds
/// give negative frames.
pub fn seconds_to_frames(seconds: f64, sample_rate: u32) -> i64 {
    (seconds * sample_rate as f64).round() as i64
}

/// Converts a frame index to seconds. A zero rate reads as 0.
pub fn frames_to_seconds(frames: i64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    frames as f64 / sample_rate as f64
}

/// Converts a frame count to a duration. Negative counts and a zero rate give
/// zero.
pub fn frames_to_duration(frames: i64, sample_rate: u32) -> Duration {
    if frames <= 0 || sample_rate == 0 {
        return Duration::ZERO;
    }
    let nanos = frames as u128 * 1_000_000_000 / sample_rate as u128;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

#[cfg(test)]
mod test {
    use std::path::Path;
    use std::time::Duration;

    use crate::util::{
        duration_minutes_seconds, filename_display, frames_to_duration, frames_to_seconds,
        seconds_to_frames,
    };

    #[test]
    fn test_duration_minutes_strings() {
        assert_eq!("0:00", duration_minutes_seconds(Duration::new(0, 0)));
        assert_eq!("0:05", duration_minutes_seconds(Duration::new(5, 0)));
        assert_eq!("0:55", duration_minutes_seconds(Duration::new(55, 0)));
        assert_eq!("1:00", duration_minutes_seconds(Duration::new(60, 0)));
        assert_eq!("2:05", duration_minutes_seconds(Duration::new(125, 0)));
        assert_eq!("60:06", duration_minutes_seconds(Duration::new(3606, 0)));
    }

    #[test]
    fn test_filename_display() {
        assert_eq!("kick.wav", filename_display(Path::new("/samples/kick.wav")));
    }

    #[test]
    fn test_seconds_to_frames_rounds() {
        assert_eq!(seconds_to_frames(1.0, 44100), 44100);
        assert_eq!(seconds_to_frames(0.5, 48000), 24000);
        assert_eq!(seconds_to_frames(-0.25, 48000), -12000);
        // 0.00001 * 44100 = 0.441 rounds down, 0.00002 * 44100 = 0.882 rounds up.
        assert_eq!(seconds_to_frames(0.00001, 44100), 0);
        assert_eq!(seconds_to_frames(0.00002, 44100), 1);
        assert_eq!(seconds_to_frames(f64::NAN, 44100), 0);
    }

    #[test]
    fn test_frames_to_seconds() {
        assert_eq!(frames_to_seconds(22050, 44100), 0.5);
        assert_eq!(frames_to_seconds(-48000, 48000), -1.0);
        assert_eq!(frames_to_seconds(100, 0), 0.0);
    }

    #[test]
    fn test_frames_to_duration() {
        assert_eq!(frames_to_duration(22050, 44100), Duration::from_millis(500));
        assert_eq!(frames_to_duration(1, 1_000_000_000), Duration::from_nanos(1));
        assert_eq!(frames_to_duration(-5, 44100), Duration::ZERO);
        assert_eq!(frames_to_duration(5, 0), Duration::ZERO);
    }
}
