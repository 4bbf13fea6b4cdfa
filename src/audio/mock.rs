/*
 *  audio/mock.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Mock output backend for testing without sound hardware
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

use std::sync::{Arc, Mutex};

use crate::audio::backend::{
    MixCallback, NegotiatedOutput, OutputBackend, OutputStream, SampleEncoding,
};
use crate::error::MixerError;
use crate::lock::lock_blocking;

/// Mock output backend
///
/// Plays nothing. The mix callback handed to `open` is kept so tests can
/// drive mix cycles with [`MockBackend::pump`]. Clones share state, so keep
/// one clone for inspection after handing the other to the mixer.
#[derive(Debug, Clone)]
pub struct MockBackend {
    shared: Arc<MockShared>,
}

struct MockShared {
    state: Mutex<MockBackendState>,
    callback: Mutex<Option<MixCallback>>,
}

impl std::fmt::Debug for MockShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockShared").field("state", &self.state).finish()
    }
}

/// Inspectable backend state
#[derive(Debug, Clone, Default)]
pub struct MockBackendState {
    /// First entry is the default device
    pub devices: Vec<String>,
    pub channels: u16,
    pub encoding: SampleEncoding,
    pub min_rate: u32,
    pub max_rate: u32,

    /// Number of times open() succeeded
    pub open_count: usize,

    /// Number of streams dropped
    pub close_count: usize,

    /// Device of the open stream
    pub open_device: Option<String>,

    /// Simulate open failures (for error testing)
    pub simulate_open_failure: bool,
}

impl MockBackend {
    /// Stereo i16 devices accepting 8 kHz to 192 kHz
    pub fn new(devices: &[&str]) -> Self {
        let state = MockBackendState {
            devices: devices.iter().map(|d| d.to_string()).collect(),
            channels: 2,
            encoding: SampleEncoding::I16,
            min_rate: 8_000,
            max_rate: 192_000,
            ..Default::default()
        };
        Self {
            shared: Arc::new(MockShared {
                state: Mutex::new(state),
                callback: Mutex::new(None),
            }),
        }
    }

    pub fn with_format(self, channels: u16, encoding: SampleEncoding) -> Self {
        {
            let mut st = lock_blocking(&self.shared.state);
            st.channels = channels;
            st.encoding = encoding;
        }
        self
    }

    pub fn with_rate_range(self, min_rate: u32, max_rate: u32) -> Self {
        {
            let mut st = lock_blocking(&self.shared.state);
            st.min_rate = min_rate;
            st.max_rate = max_rate.max(min_rate);
        }
        self
    }

    pub fn set_open_failure(&self, fail: bool) {
        lock_blocking(&self.shared.state).simulate_open_failure = fail;
    }

    pub fn state(&self) -> MockBackendState {
        lock_blocking(&self.shared.state).clone()
    }

    pub fn open_count(&self) -> usize {
        lock_blocking(&self.shared.state).open_count
    }

    pub fn close_count(&self) -> usize {
        lock_blocking(&self.shared.state).close_count
    }

    pub fn is_open(&self) -> bool {
        lock_blocking(&self.shared.callback).is_some()
    }

    /// Run one mix cycle of `frames` frames the way the audio thread would.
    /// None when no stream is open.
    pub fn pump(&self, frames: usize) -> Option<Vec<i16>> {
        let mut slot = lock_blocking(&self.shared.callback);
        let callback = slot.as_mut()?;
        let mut out = vec![0i16; frames * 2];
        callback(&mut out);
        Some(out)
    }
}

impl OutputBackend for MockBackend {
    fn device_names(&self) -> Result<Vec<String>, MixerError> {
        Ok(lock_blocking(&self.shared.state).devices.clone())
    }

    fn negotiate(&self, device_name: &str, requested_rate: u32) -> Result<NegotiatedOutput, MixerError> {
        let st = lock_blocking(&self.shared.state);
        let device = if device_name.is_empty() {
            st.devices.first().cloned().ok_or(MixerError::NoDefaultDevice)?
        } else {
            st.devices
                .iter()
                .find(|d| *d == device_name)
                .cloned()
                .ok_or_else(|| MixerError::DeviceNotFound(device_name.to_string()))?
        };
        Ok(NegotiatedOutput {
            device_name: device,
            sample_rate: requested_rate.clamp(st.min_rate, st.max_rate),
            channels: st.channels,
            encoding: st.encoding,
        })
    }

    fn open(
        &self,
        output: &NegotiatedOutput,
        callback: MixCallback,
    ) -> Result<Box<dyn OutputStream>, MixerError> {
        {
            let mut st = lock_blocking(&self.shared.state);
            if st.simulate_open_failure {
                return Err(MixerError::Backend(format!("cannot open {}", output.device_name)));
            }
            st.open_count += 1;
            st.open_device = Some(output.device_name.clone());
        }
        *lock_blocking(&self.shared.callback) = Some(callback);
        Ok(Box::new(MockStream {
            shared: Arc::clone(&self.shared),
            device_name: output.device_name.clone(),
        }))
    }
}

struct MockStream {
    shared: Arc<MockShared>,
    device_name: String,
}

impl OutputStream for MockStream {
    fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        *lock_blocking(&self.shared.callback) = None;
        let mut st = lock_blocking(&self.shared.state);
        st.close_count += 1;
        st.open_device = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_picks_default_and_clamps_rate() {
        let b = MockBackend::new(&["A", "B"]).with_rate_range(44_100, 48_000);
        let n = b.negotiate("", 96_000).unwrap();
        assert_eq!(n.device_name, "A");
        assert_eq!(n.sample_rate, 48_000);
        assert!(matches!(b.negotiate("C", 48_000), Err(MixerError::DeviceNotFound(_))));
        assert!(matches!(
            MockBackend::new(&[]).negotiate("", 48_000),
            Err(MixerError::NoDefaultDevice)
        ));
    }

    #[test]
    fn test_open_and_drop_stream() {
        let b = MockBackend::new(&["A"]);
        let n = b.negotiate("A", 48_000).unwrap();
        let stream = b
            .open(&n, Box::new(|out: &mut [i16]| out.fill(3)))
            .unwrap();
        assert_eq!(stream.device_name(), "A");
        assert_eq!(b.pump(2).unwrap(), vec![3; 4]);
        assert_eq!(b.state().open_device.as_deref(), Some("A"));
        drop(stream);
        assert!(b.pump(2).is_none());
        assert_eq!(b.close_count(), 1);
    }

    #[test]
    fn test_simulated_open_failure() {
        let b = MockBackend::new(&["A"]);
        b.set_open_failure(true);
        let n = b.negotiate("A", 48_000).unwrap();
        assert!(b.open(&n, Box::new(|_: &mut [i16]| {})).is_err());
        assert_eq!(b.open_count(), 0);
    }
}
