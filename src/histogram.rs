/*
 *  histogram.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Persistence histogram: per (bin, power level) hit counts with afterglow
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

use serde::{Deserialize, Serialize};

use crate::error::{try_alloc_grid, BufferError};
use crate::palette::{histogram_palette, Rgba, PALETTE_MAX_INDEX};

/// Power levels per bin (1 dB each, -99..=0 dB)
pub const POWER_LEVELS: usize = 100;
const HISTOGRAM_DB_OFFSET: f32 = 99.0;

/// Tuning for growth and decay of the persistence cells.
/// These are visual constants, tweak to taste.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceParams {
    /// Ingests between two decay passes
    pub holdoff_base: u32,
    /// Afterglow hold (decay passes) re-armed on each slow decrement
    pub late_holdoff: u8,
    /// Holdoff value of a freshly allocated grid
    pub initial_holdoff: u8,
    /// Cells above this fade every decay pass
    pub fade_threshold: u8,
    /// Increment while below `fast_ceiling`
    pub fast_step: u8,
    pub fast_ceiling: u8,
    /// Hard cap, must fit the palette
    pub ceiling: u8,
}

impl Default for PersistenceParams {
    fn default() -> Self {
        Self {
            holdoff_base: 4,
            late_holdoff: 20,
            initial_holdoff: 7,
            fade_threshold: 20,
            fast_step: 4,
            fast_ceiling: 220,
            ceiling: PALETTE_MAX_INDEX,
        }
    }
}

impl PersistenceParams {
    /// Pull every value back into a range the grid invariants can hold.
    pub fn sanitized(mut self) -> Self {
        self.ceiling = self.ceiling.min(PALETTE_MAX_INDEX);
        self.fast_ceiling = self.fast_ceiling.min(self.ceiling);
        self.initial_holdoff = self.initial_holdoff.min(self.late_holdoff);
        self.holdoff_base = self.holdoff_base.max(1);
        self
    }
}

/// Vertical orientation of a histogram snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowOrder {
    /// Row 0 is the loudest level (screen orientation)
    #[default]
    HighestFirst,
    /// Row 0 is the quietest level
    LowestFirst,
}

/// Colour-mapped copy of the grid, row-major, `width` bins by `height` levels.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<Rgba>,
}

impl HistogramImage {
    pub fn row(&self, y: usize) -> &[Rgba] {
        &self.pixels[y * self.width..(y + 1) * self.width]
    }

    pub fn pixel(&self, x: usize, y: usize) -> Rgba {
        self.pixels[y * self.width + x]
    }
}

#[derive(Debug)]
pub struct PersistenceHistogram {
    bins: usize,
    // bin-major: cell (bin, level) lives at bin * POWER_LEVELS + level
    cells: Vec<u8>,
    holdoff: Vec<u8>,
    holdoff_count: u32,
    params: PersistenceParams,
}

impl PersistenceHistogram {
    pub fn new(bins: usize, params: PersistenceParams) -> Result<Self, BufferError> {
        let params = params.sanitized();
        let cells = try_alloc_grid("histogram", bins, POWER_LEVELS, 0)?;
        let holdoff = try_alloc_grid("histogram holdoff", bins, POWER_LEVELS, params.initial_holdoff)?;
        Ok(Self {
            bins,
            cells,
            holdoff,
            holdoff_count: params.holdoff_base,
            params,
        })
    }

    pub fn bins(&self) -> usize { self.bins }
    pub fn params(&self) -> &PersistenceParams { &self.params }

    pub fn cell(&self, bin: usize, level: usize) -> u8 {
        self.cells[bin * POWER_LEVELS + level]
    }

    pub fn holdoff_at(&self, bin: usize, level: usize) -> u8 {
        self.holdoff[bin * POWER_LEVELS + level]
    }

    /// Gated decay pass followed by accumulation of `frame`.
    pub fn ingest(&mut self, frame: &[f32]) {
        self.holdoff_count = self.holdoff_count.saturating_sub(1);
        if self.holdoff_count == 0 {
            self.decay();
            self.holdoff_count = self.params.holdoff_base;
        }
        self.accumulate(frame);
    }

    fn decay(&mut self) {
        let PersistenceParams { fade_threshold, late_holdoff, .. } = self.params;
        for (b, h) in self.cells.iter_mut().zip(self.holdoff.iter_mut()) {
            if *b > fade_threshold {
                *b -= 1;
            } else if *b > 0 {
                if *h > 0 {
                    *h -= 1;
                } else {
                    *h = late_holdoff;
                    *b -= 1;
                }
            }
        }
    }

    fn accumulate(&mut self, frame: &[f32]) {
        let PersistenceParams { fast_step, fast_ceiling, ceiling, .. } = self.params;
        for (bin, &db) in frame.iter().enumerate().take(self.bins) {
            let level = (db + HISTOGRAM_DB_OFFSET).round();
            // also rejects NaN
            if !(0.0..=(POWER_LEVELS - 1) as f32).contains(&level) {
                continue;
            }
            let c = &mut self.cells[bin * POWER_LEVELS + level as usize];
            if *c < fast_ceiling {
                *c = c.saturating_add(fast_step).min(ceiling);
            } else if *c < ceiling {
                *c += 1;
            }
        }
    }

    /// Map every cell through the histogram palette.
    pub fn snapshot(&self, order: RowOrder) -> HistogramImage {
        let palette = histogram_palette();
        let mut pixels = Vec::with_capacity(self.bins * POWER_LEVELS);
        for y in 0..POWER_LEVELS {
            let level = match order {
                RowOrder::HighestFirst => POWER_LEVELS - 1 - y,
                RowOrder::LowestFirst => y,
            };
            pixels.extend(
                (0..self.bins).map(|bin| palette[self.cells[bin * POWER_LEVELS + level] as usize]),
            );
        }
        HistogramImage { width: self.bins, height: POWER_LEVELS, pixels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params_without_decay() -> PersistenceParams {
        PersistenceParams { holdoff_base: u32::MAX, ..Default::default() }
    }

    fn set(h: &mut PersistenceHistogram, bin: usize, level: usize, cell: u8, hold: u8) {
        h.cells[bin * POWER_LEVELS + level] = cell;
        h.holdoff[bin * POWER_LEVELS + level] = hold;
    }

    #[test]
    fn test_new_grid_is_empty_with_initial_holdoff() {
        let h = PersistenceHistogram::new(8, PersistenceParams::default()).unwrap();
        assert!(h.cells.iter().all(|&c| c == 0));
        assert!(h.holdoff.iter().all(|&c| c == 7));
        assert_eq!(h.cells.len(), 8 * POWER_LEVELS);
    }

    #[test]
    fn test_two_speed_growth_to_ceiling() {
        let mut h = PersistenceHistogram::new(1, params_without_decay()).unwrap();
        // -49 dB -> level 50
        for i in 1..=55 {
            h.ingest(&[-49.0]);
            assert_eq!(h.cell(0, 50), (i * 4) as u8);
        }
        assert_eq!(h.cell(0, 50), 220);
        for i in 1..=19 {
            h.ingest(&[-49.0]);
            assert_eq!(h.cell(0, 50), 220 + i as u8);
        }
        for _ in 0..50 {
            h.ingest(&[-49.0]);
        }
        assert_eq!(h.cell(0, 50), 239);
    }

    #[test]
    fn test_out_of_range_levels_ignored() {
        let mut h = PersistenceHistogram::new(3, params_without_decay()).unwrap();
        h.ingest(&[-120.0, 5.0, f32::NAN]);
        assert!(h.cells.iter().all(|&c| c == 0));
        h.ingest(&[-99.0, 0.0, -0.4]);
        assert_eq!(h.cell(0, 0), 4);
        assert_eq!(h.cell(1, 99), 4);
        assert_eq!(h.cell(2, 99), 4);
    }

    #[test]
    fn test_fast_fade_above_threshold() {
        let params = PersistenceParams { holdoff_base: 1, ..Default::default() };
        let mut h = PersistenceHistogram::new(1, params).unwrap();
        set(&mut h, 0, 10, 225, 0);
        h.ingest(&[]);
        assert_eq!(h.cell(0, 10), 224);
        assert_eq!(h.holdoff_at(0, 10), 0);
    }

    #[test]
    fn test_afterglow_holdoff_cycle() {
        let params = PersistenceParams { holdoff_base: 1, ..Default::default() };
        let mut h = PersistenceHistogram::new(1, params).unwrap();
        set(&mut h, 0, 10, 15, 0);

        h.ingest(&[]);
        assert_eq!(h.cell(0, 10), 14);
        assert_eq!(h.holdoff_at(0, 10), 20);

        for left in (0..20).rev() {
            h.ingest(&[]);
            assert_eq!(h.cell(0, 10), 14);
            assert_eq!(h.holdoff_at(0, 10), left);
        }
        h.ingest(&[]);
        assert_eq!(h.cell(0, 10), 13);
        assert_eq!(h.holdoff_at(0, 10), 20);
    }

    #[test]
    fn test_decay_gated_by_holdoff_base() {
        let mut h = PersistenceHistogram::new(1, PersistenceParams::default()).unwrap();
        set(&mut h, 0, 3, 100, 0);
        for _ in 0..3 {
            h.ingest(&[]);
            assert_eq!(h.cell(0, 3), 100);
        }
        h.ingest(&[]);
        assert_eq!(h.cell(0, 3), 99);
        for _ in 0..4 {
            h.ingest(&[]);
        }
        assert_eq!(h.cell(0, 3), 98);
    }

    #[test]
    fn test_bounds_hold_under_mixed_traffic() {
        let params = PersistenceParams { holdoff_base: 2, ..Default::default() };
        let mut h = PersistenceHistogram::new(16, params).unwrap();
        for n in 0..2000 {
            let frame: Vec<f32> = (0..16)
                .map(|b| -99.0 + ((n * 7 + b * 13) % 110) as f32)
                .collect();
            h.ingest(&frame);
            assert!(h.cells.iter().all(|&c| c <= 239));
            assert!(h.holdoff.iter().all(|&c| c <= 20));
        }
    }

    #[test]
    fn test_sanitized_params() {
        let p = PersistenceParams {
            holdoff_base: 0,
            late_holdoff: 5,
            initial_holdoff: 9,
            fast_ceiling: 250,
            ceiling: 255,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(p.holdoff_base, 1);
        assert_eq!(p.initial_holdoff, 5);
        assert_eq!(p.ceiling, 239);
        assert_eq!(p.fast_ceiling, 239);
    }

    #[test]
    fn test_snapshot_orientation() {
        let mut h = PersistenceHistogram::new(2, params_without_decay()).unwrap();
        h.ingest(&[0.0, -99.0]);
        let pal = histogram_palette();

        let img = h.snapshot(RowOrder::HighestFirst);
        assert_eq!((img.width, img.height), (2, POWER_LEVELS));
        assert_eq!(img.pixel(0, 0), pal[4]);
        assert_eq!(img.pixel(1, 99), pal[4]);
        assert_eq!(img.pixel(1, 0), pal[0]);

        let img = h.snapshot(RowOrder::LowestFirst);
        assert_eq!(img.pixel(0, 99), pal[4]);
        assert_eq!(img.row(0)[1], pal[4]);
    }
}
