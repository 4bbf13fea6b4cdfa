/*
 *  audio/fifo.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Sample sources feeding the mixer
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

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::lock::lock_blocking;

/// Anything the mixer can pull interleaved stereo i16 frames from.
///
/// Implementations are shared with the mixer through `Arc` and called from
/// the audio thread, so `read` must not block for long.
pub trait SampleSource: Send + Sync {
    /// Negotiated output rate, 0 when the mixer is stopped
    fn set_sample_rate(&self, rate: u32);

    /// A stopped source is skipped by the mix pass
    fn is_stopped(&self) -> bool;

    /// Copy up to `frames` frames into `out` (2 samples each), returning the
    /// number of frames written.
    fn read(&self, out: &mut [i16], frames: usize) -> usize;
}

/// Bounded stereo queue between a producer thread and the mixer.
#[derive(Debug)]
pub struct AudioFifo {
    rate: AtomicU32,
    capacity_frames: usize,
    samples: Mutex<VecDeque<i16>>,
}

impl AudioFifo {
    pub fn new(capacity_frames: usize) -> Self {
        Self {
            rate: AtomicU32::new(0),
            capacity_frames,
            samples: Mutex::new(VecDeque::with_capacity(capacity_frames * 2)),
        }
    }

    pub fn capacity_frames(&self) -> usize { self.capacity_frames }

    pub fn sample_rate(&self) -> u32 {
        self.rate.load(Ordering::Acquire)
    }

    pub fn fill_frames(&self) -> usize {
        lock_blocking(&self.samples).len() / 2
    }

    /// Queue whole frames from `pcm`. Never blocks on a full queue: frames
    /// that do not fit are dropped. Discarded entirely while stopped.
    /// Returns the frames queued.
    pub fn write(&self, pcm: &[i16]) -> usize {
        if self.is_stopped() {
            return 0;
        }
        let mut q = lock_blocking(&self.samples);
        let room = self.capacity_frames.saturating_sub(q.len() / 2);
        let frames = (pcm.len() / 2).min(room);
        q.extend(&pcm[..frames * 2]);
        frames
    }
}

impl SampleSource for AudioFifo {
    fn set_sample_rate(&self, rate: u32) {
        self.rate.store(rate, Ordering::Release);
        if rate == 0 {
            lock_blocking(&self.samples).clear();
        }
    }

    fn is_stopped(&self) -> bool {
        self.sample_rate() == 0
    }

    fn read(&self, out: &mut [i16], frames: usize) -> usize {
        let mut q = lock_blocking(&self.samples);
        let frames = frames.min(out.len() / 2).min(q.len() / 2);
        for (dst, src) in out[..frames * 2].iter_mut().zip(q.drain(..frames * 2)) {
            *dst = src;
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopped_fifo_discards_writes() {
        let f = AudioFifo::new(8);
        assert!(f.is_stopped());
        assert_eq!(f.write(&[1, 1, 2, 2]), 0);
        assert_eq!(f.fill_frames(), 0);
    }

    #[test]
    fn test_write_drops_overflow() {
        let f = AudioFifo::new(3);
        f.set_sample_rate(48_000);
        assert_eq!(f.write(&[1, 1, 2, 2]), 2);
        assert_eq!(f.write(&[3, 3, 4, 4, 5, 5]), 1);
        assert_eq!(f.fill_frames(), 3);

        let mut out = [0i16; 8];
        assert_eq!(f.read(&mut out, 4), 3);
        assert_eq!(&out[..6], &[1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_partial_read_and_odd_sample() {
        let f = AudioFifo::new(16);
        f.set_sample_rate(8_000);
        // trailing half frame is ignored
        assert_eq!(f.write(&[7, 8, 9]), 1);
        let mut out = [0i16; 8];
        assert_eq!(f.read(&mut out, 4), 1);
        assert_eq!(out, [7, 8, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_stop_clears_queue() {
        let f = AudioFifo::new(4);
        f.set_sample_rate(8_000);
        f.write(&[1, 1]);
        f.set_sample_rate(0);
        assert_eq!(f.fill_frames(), 0);
        assert_eq!(f.sample_rate(), 0);
    }
}
