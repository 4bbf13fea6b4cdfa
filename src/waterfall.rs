/*
 *  waterfall.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Staged scrolling waterfall rows feeding a circular texture
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
//! The producer stages one row of palette indices per spectrum frame; the
//! renderer drains staged rows and copies them into its own circular texture
//! of `ring_height` rows. When the stage is full further frames are dropped
//! until the next drain.

use crate::error::{try_alloc_grid, BufferError};
use crate::palette::{waterfall_palette, Rgba, PALETTE_MAX_INDEX};

/// Rows the stage can hold between two drains
pub const DEFAULT_STAGE_ROWS: usize = 256;

const WATERFALL_DB_OFFSET: f32 = 99.0;
const WATERFALL_DB_SCALE: f32 = 2.4;

/// dB value -> waterfall palette index, saturating at both ends.
#[inline]
pub fn waterfall_index(db: f32) -> u8 {
    let v = (WATERFALL_DB_SCALE * (db + WATERFALL_DB_OFFSET)).round();
    // NaN casts to 0
    v.clamp(0.0, PALETTE_MAX_INDEX as f32) as u8
}

/// Rows handed to the renderer by one drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaterfallDrain {
    /// Staged rows, oldest first
    pub rows: Vec<Vec<Rgba>>,
    /// Ring slot the first row belongs in
    pub ring_start: usize,
    /// Ring positions to advance (== rows drained)
    pub ring_advance: usize,
    /// Ring position after the advance
    pub ring_pos: usize,
    pub ring_height: usize,
}

impl WaterfallDrain {
    /// Pairs each drained row with its slot in the circular texture.
    pub fn ring_rows(&self) -> impl Iterator<Item = (usize, &[Rgba])> + '_ {
        let h = self.ring_height.max(1);
        self.rows
            .iter()
            .enumerate()
            .map(move |(i, row)| ((self.ring_start + i) % h, row.as_slice()))
    }
}

/// Staged palette-index rows for one frame length, plus the write cursor of
/// the renderer's circular texture. Rows are `width` bins wide. At most
/// `stage_rows` wait between drains and each drain advances the cursor by the
/// rows it returns. Not synchronised; `SpectrumView` owns one behind its lock.
#[derive(Debug)]
pub struct WaterfallBuffer {
    width: usize,
    stage: Vec<u8>,
    stage_rows: usize,
    stage_pos: usize,
    ring_height: usize,
    ring_pos: usize,
    dropped: u64,
}

impl WaterfallBuffer {
    pub fn new(width: usize, stage_rows: usize, ring_height: usize) -> Result<Self, BufferError> {
        let stage = try_alloc_grid("waterfall stage", stage_rows, width, 0)?;
        Ok(Self {
            width,
            stage,
            stage_rows,
            stage_pos: 0,
            ring_height,
            ring_pos: 0,
            dropped: 0,
        })
    }

    pub fn width(&self) -> usize { self.width }
    pub fn stage_rows(&self) -> usize { self.stage_rows }
    pub fn staged(&self) -> usize { self.stage_pos }
    pub fn ring_height(&self) -> usize { self.ring_height }
    pub fn ring_pos(&self) -> usize { self.ring_pos }
    /// Frames lost to a full stage since this buffer was built. The view
    /// keeps its own total across rebuilds.
    pub fn dropped_rows(&self) -> u64 { self.dropped }

    /// Stage one frame. Returns false when the stage is full and the frame
    /// was dropped.
    pub fn ingest(&mut self, frame: &[f32]) -> bool {
        if self.stage_pos >= self.stage_rows {
            self.dropped += 1;
            return false;
        }
        let start = self.stage_pos * self.width;
        let row = &mut self.stage[start..start + self.width];
        let mut bins = frame.iter();
        for cell in row.iter_mut() {
            *cell = bins.next().map_or(0, |&db| waterfall_index(db));
        }
        self.stage_pos += 1;
        true
    }

    /// Hand every staged row to the renderer and reopen the stage.
    pub fn drain(&mut self) -> WaterfallDrain {
        let palette = waterfall_palette();
        let rows = self.stage[..self.stage_pos * self.width]
            .chunks_exact(self.width.max(1))
            .map(|row| row.iter().map(|&i| palette[i as usize]).collect())
            .collect::<Vec<Vec<Rgba>>>();

        let n = self.stage_pos;
        let ring_start = self.ring_pos;
        if self.ring_height > 0 {
            self.ring_pos = (self.ring_pos + n) % self.ring_height;
        }
        self.stage_pos = 0;

        WaterfallDrain {
            rows,
            ring_start,
            ring_advance: n,
            ring_pos: self.ring_pos,
            ring_height: self.ring_height,
        }
    }

    /// Display height changed: the ring restarts at the top, staged rows are kept.
    pub fn resize_ring(&mut self, ring_height: usize) {
        self.ring_height = ring_height;
        self.ring_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_mapping_saturates() {
        assert_eq!(waterfall_index(-99.0), 0);
        assert_eq!(waterfall_index(-150.0), 0);
        assert_eq!(waterfall_index(100.0), 239);
        assert_eq!(waterfall_index(f32::INFINITY), 239);
        assert_eq!(waterfall_index(f32::NAN), 0);
        // 2.4 * 50 = 120
        assert_eq!(waterfall_index(-49.0), 120);
        for db in (-200..200).map(|d| d as f32 * 0.5) {
            assert!(waterfall_index(db) <= 239);
        }
    }

    #[test]
    fn test_drain_returns_rows_in_order() {
        let mut wf = WaterfallBuffer::new(4, 8, 100).unwrap();
        assert!(wf.ingest(&[-99.0; 4]));
        assert!(wf.ingest(&[100.0; 4]));
        let d = wf.drain();
        assert_eq!(d.rows.len(), 2);
        assert_eq!(d.rows[0], vec![waterfall_palette()[0]; 4]);
        assert_eq!(d.rows[1], vec![waterfall_palette()[239]; 4]);
        assert_eq!(d.ring_start, 0);
        assert_eq!(d.ring_advance, 2);
        assert_eq!(d.ring_pos, 2);
        assert_eq!(wf.staged(), 0);
    }

    #[test]
    fn test_overflow_drops_excess_until_drain() {
        let mut wf = WaterfallBuffer::new(2, 4, 100).unwrap();
        for i in 0..6 {
            let accepted = wf.ingest(&[-99.0 + i as f32 * 10.0; 2]);
            assert_eq!(accepted, i < 4);
        }
        assert_eq!(wf.dropped_rows(), 2);

        let d = wf.drain();
        assert_eq!(d.rows.len(), 4);
        // last staged row is the fourth frame, not the sixth
        let idx = waterfall_index(-99.0 + 30.0) as usize;
        assert_eq!(d.rows[3][0], waterfall_palette()[idx]);

        assert!(wf.ingest(&[0.0; 2]));
        assert_eq!(wf.staged(), 1);
    }

    #[test]
    fn test_ring_wraps_by_drained_count() {
        let mut wf = WaterfallBuffer::new(1, 16, 5).unwrap();
        for _ in 0..3 { wf.ingest(&[0.0]); }
        assert_eq!(wf.drain().ring_pos, 3);
        for _ in 0..4 { wf.ingest(&[0.0]); }
        let d = wf.drain();
        assert_eq!(d.ring_start, 3);
        assert_eq!(d.ring_pos, 2);
        let slots: Vec<usize> = d.ring_rows().map(|(slot, _)| slot).collect();
        assert_eq!(slots, vec![3, 4, 0, 1]);
    }

    #[test]
    fn test_stage_may_exceed_ring_height() {
        let mut wf = WaterfallBuffer::new(1, 10, 3).unwrap();
        for _ in 0..7 { wf.ingest(&[0.0]); }
        let d = wf.drain();
        assert_eq!(d.rows.len(), 7);
        assert_eq!(d.ring_pos, 7 % 3);
    }

    #[test]
    fn test_short_frame_pads_with_floor() {
        let mut wf = WaterfallBuffer::new(3, 2, 4).unwrap();
        wf.ingest(&[100.0]);
        let d = wf.drain();
        assert_eq!(d.rows[0][0], waterfall_palette()[239]);
        assert_eq!(d.rows[0][2], waterfall_palette()[0]);
    }

    #[test]
    fn test_resize_ring_resets_position() {
        let mut wf = WaterfallBuffer::new(1, 4, 10).unwrap();
        wf.ingest(&[0.0]);
        wf.drain();
        wf.resize_ring(20);
        assert_eq!(wf.ring_pos(), 0);
        assert_eq!(wf.ring_height(), 20);
    }

    #[test]
    fn test_oversized_stage_is_an_error() {
        assert!(WaterfallBuffer::new(usize::MAX / 8, 256, 10).is_err());
    }
}
