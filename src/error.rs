/*
 *  error.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Error types for the spectrum and audio engines
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

use thiserror::Error;

/// Failures raised while starting or driving the audio output.
#[derive(Debug, Error)]
pub enum MixerError {
    /// A named output device did not match any enumerated device
    #[error("Audio output device {0} not available")]
    DeviceNotFound(String),

    /// No device name given and the host has no default output
    #[error("No default audio output device")]
    NoDefaultDevice,

    /// Negotiated format is not 16 bit signed interleaved stereo
    #[error("Audio output {device} doesn't support 16 bit stereo samples: {detail}")]
    UnsupportedFormat { device: String, detail: String },

    /// Anything the host audio layer reports that we cannot classify
    #[error("Audio backend error: {0}")]
    Backend(String),
}

/// Buffer (re)allocation failures in the spectrum engines.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("cannot allocate {what} buffer of {cells} cells")]
    Allocation { what: &'static str, cells: usize },
}

/// Allocate a zero-filled (or `fill`-filled) buffer of `rows * cols` cells,
/// reporting overflow and allocator refusal instead of aborting.
pub(crate) fn try_alloc_grid(
    what: &'static str,
    rows: usize,
    cols: usize,
    fill: u8,
) -> Result<Vec<u8>, BufferError> {
    let cells = rows
        .checked_mul(cols)
        .ok_or(BufferError::Allocation { what, cells: usize::MAX })?;
    let mut v = Vec::new();
    v.try_reserve_exact(cells)
        .map_err(|_| BufferError::Allocation { what, cells })?;
    v.resize(cells, fill);
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_alloc_fill() {
        let g = try_alloc_grid("test", 3, 4, 7).unwrap();
        assert_eq!(g.len(), 12);
        assert!(g.iter().all(|&c| c == 7));
    }

    #[test]
    fn test_grid_alloc_overflow_is_reported() {
        let err = try_alloc_grid("test", usize::MAX / 2, 3, 0).unwrap_err();
        assert_eq!(err, BufferError::Allocation { what: "test", cells: usize::MAX });
    }

    #[test]
    fn test_mixer_error_messages() {
        let e = MixerError::DeviceNotFound("hw:9".into());
        assert_eq!(e.to_string(), "Audio output device hw:9 not available");
    }
}
