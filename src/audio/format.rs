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

use std::{error::Error, fmt, str::FromStr};

/// Sample format of the output stream. The mixer always works in 16-bit
/// integers; float output is converted at the end of each callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Signed 16-bit samples.
    #[default]
    Int,
    /// 32-bit float samples in -1.0..1.0.
    Float,
}

impl FromStr for SampleFormat {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float" | "Float" | "f32" => Ok(SampleFormat::Float),
            "int" | "Int" | "i16" => Ok(SampleFormat::Int),
            _ => Err(format!("Unsupported sample format: {}", s).into()),
        }
    }
}

impl SampleFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::Float => "float",
            SampleFormat::Int => "int",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_format_from_str() {
        assert_eq!(SampleFormat::from_str("float").unwrap(), SampleFormat::Float);
        assert_eq!(SampleFormat::from_str("f32").unwrap(), SampleFormat::Float);
        assert_eq!(SampleFormat::from_str("Int").unwrap(), SampleFormat::Int);
        assert_eq!(SampleFormat::from_str("i16").unwrap(), SampleFormat::Int);
        assert!(SampleFormat::from_str("double").is_err());
        assert!(SampleFormat::from_str("").is_err());
    }

    #[test]
    fn test_sample_format_display() {
        assert_eq!(SampleFormat::Float.to_string(), "float");
        assert_eq!(SampleFormat::default().to_string(), "int");
    }
}
