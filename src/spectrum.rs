/*
 *  spectrum.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Windowed FFT power spectrum, single-sided dBFS per bin
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

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

const EPS: f32 = 1e-12;
pub const FFT_MIN: usize = 64;
pub const FFT_MAX: usize = 16384;

pub struct PowerSpectrum {
    nfft: usize,
    fft: Arc<dyn Fft<f32> + Send + Sync>,
    window: Vec<f32>,
    p_scale: f32,       // (2 / win_sum)^2, peak amplitude normalisation
    buf: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl std::fmt::Debug for PowerSpectrum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerSpectrum").field("nfft", &self.nfft).finish()
    }
}

impl PowerSpectrum {
    /// `fft_size` is rounded up to a power of two within FFT_MIN..=FFT_MAX.
    pub fn new(fft_size: usize) -> Self {
        let nfft = fft_size.clamp(FFT_MIN, FFT_MAX).next_power_of_two().min(FFT_MAX);

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(nfft);

        // Hann
        let window = (0..nfft)
            .map(|i| 0.5f32 * (1.0 - (2.0 * std::f32::consts::PI * (i as f32) / (nfft as f32)).cos()))
            .collect::<Vec<_>>();

        let win_sum: f32 = window.iter().copied().sum();
        let p_scale = (2.0 / win_sum).powi(2);

        let buf = vec![Complex::new(0.0, 0.0); nfft];
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self { nfft, fft, window, p_scale, buf, scratch }
    }

    pub fn fft_size(&self) -> usize { self.nfft }

    /// Output frame length
    pub fn bins(&self) -> usize { self.nfft / 2 }

    /// dBFS per bin for the most recent `fft_size` samples of `pcm`; shorter
    /// input is zero padded. A full-scale sine centred on a bin reads ~0 dB.
    pub fn compute_db(&mut self, pcm: &[i16]) -> Vec<f32> {
        let need = self.nfft.min(pcm.len());
        let start = pcm.len() - need;

        for (i, c) in self.buf.iter_mut().enumerate() {
            let s = if i < need { pcm[start + i] as f32 / i16::MAX as f32 } else { 0.0 };
            *c = Complex::new(s * self.window[i], 0.0);
        }

        self.fft.process_with_scratch(&mut self.buf, &mut self.scratch);

        // p_scale already folds the negative half into each bin
        let half = self.nfft / 2;
        self.buf[..half]
            .iter()
            .map(|c| 10.0 * (c.norm_sqr() * self.p_scale).max(EPS).log10())
            .collect()
    }

    /// Left channel of interleaved stereo
    pub fn compute_db_stereo(&mut self, interleaved: &[i16]) -> Vec<f32> {
        let mono: Vec<i16> = interleaved.iter().step_by(2).copied().collect();
        self.compute_db(&mono)
    }
}
