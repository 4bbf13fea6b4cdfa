/*
 *  generator.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Test tone with optional noise, interleaved stereo i16
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;

#[derive(Debug)]
pub struct ToneGenerator {
    sample_rate: u32,
    freq_hz: f32,
    level: f32,
    noise: f32,
    phase: f32,
    rng: StdRng,
}

impl ToneGenerator {
    /// `level` and `noise` are fractions of full scale.
    pub fn new(sample_rate: u32, freq_hz: f32, level: f32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            freq_hz,
            level: level.clamp(0.0, 1.0),
            noise: 0.0,
            phase: 0.0,
            rng: StdRng::from_rng(&mut rand::rng()),
        }
    }

    pub fn with_noise(mut self, noise: f32) -> Self {
        self.noise = noise.clamp(0.0, 1.0);
        self
    }

    /// Deterministic noise, for tests
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn sample_rate(&self) -> u32 { self.sample_rate }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
    }

    pub fn set_frequency(&mut self, freq_hz: f32) {
        self.freq_hz = freq_hz;
    }

    /// Fill `out` (interleaved L/R) with whole frames; both channels carry
    /// the same sample.
    pub fn fill(&mut self, out: &mut [i16]) {
        let step = TAU * self.freq_hz / self.sample_rate as f32;
        for frame in out.chunks_mut(2) {
            let mut v = self.level * self.phase.sin();
            if self.noise > 0.0 {
                v += self.noise * self.rng.random_range(-1.0f32..1.0);
            }
            let s = (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            frame.fill(s);
            self.phase = (self.phase + step) % TAU;
        }
    }

    pub fn frames(&mut self, frames: usize) -> Vec<i16> {
        let mut out = vec![0; frames * 2];
        self.fill(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_is_bounded_and_stereo() {
        let mut g = ToneGenerator::new(48_000, 1_000.0, 0.5);
        let pcm = g.frames(480);
        assert_eq!(pcm.len(), 960);
        let peak = pcm.iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!(peak > 16_000 && peak <= 16_384);
        assert!(pcm.chunks(2).all(|f| f[0] == f[1]));
    }

    #[test]
    fn test_noise_is_seeded_and_clipped() {
        let a = ToneGenerator::new(8_000, 0.0, 1.0).with_noise(1.0).with_seed(7).frames(64);
        let b = ToneGenerator::new(8_000, 0.0, 1.0).with_noise(1.0).with_seed(7).frames(64);
        assert_eq!(a, b);
        assert!(a.iter().any(|&s| s != 0));
    }

    #[test]
    fn test_silent_generator() {
        let mut g = ToneGenerator::new(8_000, 440.0, 0.0);
        assert!(g.frames(32).iter().all(|&s| s == 0));
    }
}
