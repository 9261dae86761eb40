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

//! Sample level mixing primitives shared by the mixer and the channel mixer.

/// Mixes two samples, softly compressing the result as it nears full scale.
///
/// When both samples have the same sign the product term pulls the sum back
/// towards the limit instead of hard clipping; samples of opposite signs
/// cannot overflow and are simply added.
#[inline]
pub fn mix_samples(a: i16, b: i16) -> i16 {
    let a = a as i32;
    let b = b as i32;
    let mixed = if a < 0 && b < 0 {
        a + b - (a * b) / i16::MIN as i32
    } else if a > 0 && b > 0 {
        a + b - (a * b) / i16::MAX as i32
    } else {
        a + b
    };
    mixed.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Scales a sample by a gain, truncating toward zero.
#[inline]
pub fn scale_sample(sample: i16, gain: f32) -> i16 {
    (sample as f32 * gain) as i16
}

/// Scales `input` by `gain` and soft-mixes it into `output`, sample by sample.
#[inline]
pub fn mix_into(output: &mut [i16], input: &[i16], gain: f32) {
    if gain == 1.0 {
        for (out, &sample) in output.iter_mut().zip(input) {
            *out = mix_samples(*out, sample);
        }
    } else {
        for (out, &sample) in output.iter_mut().zip(input) {
            *out = mix_samples(*out, scale_sample(sample, gain));
        }
    }
}

/// Converts a 16-bit sample into the -1.0..1.0 float range.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}
