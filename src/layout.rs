/*
 *  layout.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Waterfall/histogram split and axis ranges for the spectrum view
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

/// Splitter limits for the waterfall share of the widget height
pub const WATERFALL_SHARE_MIN: f32 = 0.1;
pub const WATERFALL_SHARE_MAX: f32 = 0.8;
pub const DEFAULT_WATERFALL_SHARE: f32 = 0.5;

/// Fixed power axis of the histogram
pub const POWER_FLOOR_DB: f32 = -100.0;
pub const POWER_CEIL_DB: f32 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayGeometry {
    pub height_px: u32,
    pub waterfall_share: f32,
}

impl Default for DisplayGeometry {
    fn default() -> Self {
        Self { height_px: 0, waterfall_share: DEFAULT_WATERFALL_SHARE }
    }
}

impl DisplayGeometry {
    pub fn new(height_px: u32, waterfall_share: f32) -> Self {
        let share = if waterfall_share.is_finite() {
            waterfall_share.clamp(WATERFALL_SHARE_MIN, WATERFALL_SHARE_MAX)
        } else {
            DEFAULT_WATERFALL_SHARE
        };
        Self { height_px, waterfall_share: share }
    }

    /// Rows of the circular waterfall texture
    pub fn waterfall_height(&self) -> usize {
        (self.height_px as f32 * self.waterfall_share) as usize
    }
}

/// Everything the renderer needs to label the two panes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpectrumLayout {
    pub waterfall_height: usize,
    /// History covered by the waterfall, seconds (axis runs -span..0)
    pub time_span_secs: f32,
    pub freq_start_hz: f64,
    pub freq_end_hz: f64,
    pub power_floor_db: f32,
    pub power_ceil_db: f32,
}

impl SpectrumLayout {
    pub fn compute(
        geometry: &DisplayGeometry,
        fft_size: usize,
        center_frequency_hz: u64,
        sample_rate: u32,
    ) -> Self {
        let waterfall_height = geometry.waterfall_height();
        let time_span_secs = if sample_rate > 0 {
            (waterfall_height * fft_size) as f32 / sample_rate as f32
        } else {
            0.0
        };
        let half = sample_rate as f64 / 2.0;
        Self {
            waterfall_height,
            time_span_secs,
            freq_start_hz: center_frequency_hz as f64 - half,
            freq_end_hz: center_frequency_hz as f64 + half,
            power_floor_db: POWER_FLOOR_DB,
            power_ceil_db: POWER_CEIL_DB,
        }
    }
}
