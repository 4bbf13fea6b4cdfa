/*
 *  palette.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Waterfall and persistence colour lookup tables
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

use once_cell::sync::Lazy;

/// Number of entries in each lookup table
pub const PALETTE_SIZE: usize = 240;
/// Highest valid palette index
pub const PALETTE_MAX_INDEX: u8 = (PALETTE_SIZE - 1) as u8;

/// One RGBA pixel as uploaded to the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

pub type Palette = [Rgba; PALETTE_SIZE];

impl Rgba {
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque colour from hue in degrees and saturation/value in 0..=255.
    pub fn from_hsv(hue: u16, sat: u8, val: u8) -> Self {
        let v = val as f32 / 255.0;
        if sat == 0 {
            return Rgba::new(val, val, val, 255);
        }
        let s = sat as f32 / 255.0;
        let h = (hue % 360) as f32 / 60.0;
        let sector = h.floor() as u32;
        let f = h - sector as f32;

        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));

        let (r, g, b) = match sector {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };
        Rgba::new(unit_to_u8(r), unit_to_u8(g), unit_to_u8(b), 255)
    }

    /// Packed as 0xAARRGGBB
    #[inline]
    pub fn to_argb32(self) -> u32 {
        (self.a as u32) << 24 | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }
}

#[inline]
fn unit_to_u8(x: f32) -> u8 {
    (x * 255.0).round().clamp(0.0, 255.0) as u8
}

static WATERFALL: Lazy<Palette> = Lazy::new(build_waterfall);
static HISTOGRAM: Lazy<Palette> = Lazy::new(|| build_histogram(&WATERFALL));

/// Blue (quiet) through red (loud) hue ramp with rising brightness.
pub fn waterfall_palette() -> &'static Palette {
    &WATERFALL
}

/// Persistence ramp; the first entries fade out through a dim violet.
pub fn histogram_palette() -> &'static Palette {
    &HISTOGRAM
}

fn build_waterfall() -> Palette {
    let mut p = [Rgba::BLACK; PALETTE_SIZE];
    for (i, c) in p.iter_mut().enumerate() {
        let i = i as u16;
        *c = Rgba::from_hsv(239 - i, 255, (15 + i) as u8);
    }
    p
}

fn build_histogram(waterfall: &Palette) -> Palette {
    let mut p = [Rgba::BLACK; PALETTE_SIZE];
    p[0] = waterfall[0];
    for i in 1..PALETTE_SIZE as u16 {
        let sat = 255 - if i < 200 { 0 } else { (i - 200) * 3 };
        let val = 150 + i.min(100);
        p[i as usize] = Rgba::from_hsv(239 - i, sat as u8, val as u8);
    }
    // ghost tail for cells that are almost gone
    for i in 1..16u16 {
        p[i as usize] = Rgba::from_hsv(270, 128, (48 + i * 4) as u8);
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(Rgba::from_hsv(0, 255, 255), Rgba::new(255, 0, 0, 255));
        assert_eq!(Rgba::from_hsv(120, 255, 255), Rgba::new(0, 255, 0, 255));
        assert_eq!(Rgba::from_hsv(240, 255, 255), Rgba::new(0, 0, 255, 255));
        assert_eq!(Rgba::from_hsv(77, 0, 90), Rgba::new(90, 90, 90, 255));
    }

    #[test]
    fn test_waterfall_ramp_ends() {
        let p = waterfall_palette();
        assert_eq!(p[0], Rgba::new(0, 0, 15, 255));
        assert_eq!(p[239], Rgba::new(254, 0, 0, 255));
        assert!(p.iter().all(|c| c.a == 255));
    }

    #[test]
    fn test_histogram_shares_floor_and_has_violet_tail() {
        let h = histogram_palette();
        assert_eq!(h[0], waterfall_palette()[0]);
        for c in &h[1..16] {
            // violet: blue dominant, red above green
            assert!(c.b >= c.r && c.r > c.g, "{c:?}");
        }
        // tail brightens with index
        assert!(h[15].b > h[1].b);
        // top of the ramp desaturates towards white-ish red
        assert!(h[239].g > 0 && h[239].r > h[239].g);
    }

    #[test]
    fn test_argb_packing() {
        assert_eq!(Rgba::new(0x11, 0x22, 0x33, 0xff).to_argb32(), 0xff112233);
    }
}
