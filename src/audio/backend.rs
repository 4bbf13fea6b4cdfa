/*
 *  audio/backend.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Output backend abstraction for the mixer
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

use std::fmt;

use crate::error::MixerError;

/// Sample encodings a backend may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleEncoding {
    #[default]
    I16,
    U16,
    I32,
    F32,
    Other,
}

impl SampleEncoding {
    pub fn bits(&self) -> u16 {
        match self {
            SampleEncoding::I16 | SampleEncoding::U16 => 16,
            SampleEncoding::I32 | SampleEncoding::F32 => 32,
            SampleEncoding::Other => 0,
        }
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SampleEncoding::I16 => "i16",
            SampleEncoding::U16 => "u16",
            SampleEncoding::I32 => "i32",
            SampleEncoding::F32 => "f32",
            SampleEncoding::Other => "unknown",
        };
        f.write_str(s)
    }
}

/// What a device agreed to play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedOutput {
    pub device_name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: SampleEncoding,
}

impl NegotiatedOutput {
    /// The mixer only produces interleaved stereo i16
    pub fn check_mixable(&self) -> Result<(), MixerError> {
        if self.channels == 2 && self.encoding == SampleEncoding::I16 {
            return Ok(());
        }
        Err(MixerError::UnsupportedFormat {
            device: self.device_name.clone(),
            detail: format!(
                "{} channel(s) of {} ({} bit)",
                self.channels,
                self.encoding,
                self.encoding.bits()
            ),
        })
    }
}

/// Fills one interleaved output buffer per call, on the audio thread.
pub type MixCallback = Box<dyn FnMut(&mut [i16]) + Send + 'static>;

/// A running output. Dropping it stops playback and releases the device.
pub trait OutputStream: Send {
    fn device_name(&self) -> &str;
}

/// Host audio layer seam: real hardware (cpal) or the mock used in tests.
pub trait OutputBackend: Send + Sync {
    /// Output device names, default device first where known
    fn device_names(&self) -> Result<Vec<String>, MixerError>;

    /// Pick a device (empty name = default) and the nearest supported format.
    fn negotiate(&self, device_name: &str, requested_rate: u32) -> Result<NegotiatedOutput, MixerError>;

    fn open(
        &self,
        output: &NegotiatedOutput,
        callback: MixCallback,
    ) -> Result<Box<dyn OutputStream>, MixerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(channels: u16, encoding: SampleEncoding) -> NegotiatedOutput {
        NegotiatedOutput { device_name: "dev".into(), sample_rate: 48_000, channels, encoding }
    }

    #[test]
    fn test_only_stereo_i16_is_mixable() {
        assert!(output(2, SampleEncoding::I16).check_mixable().is_ok());
        assert!(matches!(
            output(2, SampleEncoding::F32).check_mixable(),
            Err(MixerError::UnsupportedFormat { .. })
        ));
        let err = output(1, SampleEncoding::I16).check_mixable().unwrap_err();
        assert!(err.to_string().contains("1 channel(s) of i16"));
    }
}
