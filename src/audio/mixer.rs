/*
 *  audio/mixer.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Saturating mixer over registered sample sources
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
//! The roster lock is held for a whole mix cycle, so a source added or
//! removed from a control thread takes effect on the next cycle. The output
//! stream slot has its own lock which serialises start/stop; the stream is
//! always dropped with the roster lock released because its audio thread
//! may be waiting for that lock inside a mix cycle.

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};

use crate::audio::backend::{MixCallback, NegotiatedOutput, OutputBackend, OutputStream};
use crate::audio::cpal_backend::CpalBackend;
use crate::audio::fifo::SampleSource;
use crate::error::MixerError;
use crate::lock::lock_blocking;

/// Accumulator samples allocated by `AudioMixer::new` (4096 stereo frames).
/// A larger callback request grows it once, inside that callback.
const ACCUMULATOR_RESERVE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixerStatus {
    #[default]
    Stopped,
    Started,
}

struct Registration {
    source: Arc<dyn SampleSource>,
    last_rate: u32,
}

impl Registration {
    fn tell(&mut self, rate: u32) {
        self.source.set_sample_rate(rate);
        self.last_rate = rate;
    }
}

#[derive(Default)]
struct MixerState {
    sources: Vec<Registration>,
    rate: u32,
    status: MixerStatus,
    device_name: String,
    last_error: Option<String>,
    accumulator: Vec<i32>,
}

/// Roster and scratch shared with the audio callback.
struct MixerShared {
    state: Mutex<MixerState>,
}

impl MixerShared {
    fn mix(&self, out: &mut [i16], frames: usize) -> usize {
        let frames = frames.min(out.len() / 2);
        let samples = frames * 2;

        let mut guard = lock_blocking(&self.state);
        let st = &mut *guard;
        if st.accumulator.len() < samples {
            st.accumulator.resize(samples, 0);
        }
        let acc = &mut st.accumulator[..samples];
        acc.fill(0);

        for reg in st.sources.iter() {
            if reg.source.is_stopped() {
                continue;
            }
            // out doubles as the read buffer; it is overwritten below
            let got = reg.source.read(&mut out[..samples], frames).min(frames);
            for (a, &s) in acc.iter_mut().zip(&out[..got * 2]) {
                *a = a.saturating_add(i32::from(s));
            }
        }

        for (o, &a) in out.iter_mut().zip(acc.iter()) {
            *o = a.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        }
        out[samples..].fill(0);
        frames
    }
}

/// Sums every registered [`SampleSource`] into one 16-bit stereo output
/// stream, clipping instead of wrapping.
///
/// The roster is locked for a whole mix cycle, so sources added or removed
/// mid-cycle take effect on the next one. The output stream is owned here
/// and closed by `stop()` or on drop.
pub struct AudioMixer {
    shared: Arc<MixerShared>,
    output: Mutex<Option<Box<dyn OutputStream>>>,
    backend: Arc<dyn OutputBackend>,
}

impl Default for AudioMixer {
    fn default() -> Self {
        Self::new(Arc::new(CpalBackend::new()))
    }
}

impl AudioMixer {
    pub fn new(backend: Arc<dyn OutputBackend>) -> Self {
        Self {
            shared: Arc::new(MixerShared {
                state: Mutex::new(MixerState {
                    accumulator: vec![0; ACCUMULATOR_RESERVE],
                    ..MixerState::default()
                }),
            }),
            output: Mutex::new(None),
            backend,
        }
    }

    /// Register `source`. It is told the current rate straight away (0 while
    /// stopped). Returns false if it was already registered.
    pub fn add_source(&self, source: Arc<dyn SampleSource>) -> bool {
        let mut st = lock_blocking(&self.shared.state);
        if st.sources.iter().any(|r| std::ptr::addr_eq(Arc::as_ptr(&r.source), Arc::as_ptr(&source))) {
            return false;
        }
        let rate = match st.status {
            MixerStatus::Started => st.rate,
            MixerStatus::Stopped => 0,
        };
        let mut reg = Registration { source, last_rate: 0 };
        reg.tell(rate);
        st.sources.push(reg);
        debug!("mixer: source added ({} registered)", st.sources.len());
        true
    }

    /// Stop and unregister `source`. Returns false if it was not registered.
    pub fn remove_source<S: SampleSource + ?Sized>(&self, source: &Arc<S>) -> bool {
        let mut st = lock_blocking(&self.shared.state);
        let Some(pos) = st
            .sources
            .iter()
            .position(|r| std::ptr::addr_eq(Arc::as_ptr(&r.source), Arc::as_ptr(source)))
        else {
            return false;
        };
        let mut reg = st.sources.swap_remove(pos);
        reg.tell(0);
        debug!("mixer: source removed ({} registered)", st.sources.len());
        true
    }

    /// Open `device_name` (empty = default) near `requested_rate`. On failure
    /// the mixer stays stopped and the reason is kept for [`last_error`].
    ///
    /// [`last_error`]: AudioMixer::last_error
    pub fn start(&self, device_name: &str, requested_rate: u32) -> bool {
        self.try_start(device_name, requested_rate).is_ok()
    }

    /// As [`start`](AudioMixer::start), with the typed error. Restarts when
    /// already started.
    pub fn try_start(&self, device_name: &str, requested_rate: u32) -> Result<NegotiatedOutput, MixerError> {
        let mut slot = lock_blocking(&self.output);
        self.stop_locked(&mut slot);

        match self.open_output(device_name, requested_rate) {
            Ok((negotiated, stream)) => {
                {
                    let mut st = lock_blocking(&self.shared.state);
                    st.rate = negotiated.sample_rate;
                    st.status = MixerStatus::Started;
                    st.device_name = negotiated.device_name.clone();
                    st.last_error = None;
                    for reg in st.sources.iter_mut() {
                        reg.tell(negotiated.sample_rate);
                    }
                }
                *slot = Some(stream);
                info!(
                    "mixer started on {} at {} Hz",
                    negotiated.device_name, negotiated.sample_rate
                );
                Ok(negotiated)
            }
            Err(e) => {
                warn!("mixer start failed: {e}");
                lock_blocking(&self.shared.state).last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn open_output(
        &self,
        device_name: &str,
        requested_rate: u32,
    ) -> Result<(NegotiatedOutput, Box<dyn OutputStream>), MixerError> {
        let negotiated = self.backend.negotiate(device_name, requested_rate)?;
        negotiated.check_mixable()?;

        let shared = Arc::clone(&self.shared);
        let callback: MixCallback = Box::new(move |out: &mut [i16]| {
            let frames = out.len() / 2;
            shared.mix(out, frames);
        });
        let stream = self.backend.open(&negotiated, callback)?;
        Ok((negotiated, stream))
    }

    /// Tell every source rate 0 and release the output device.
    pub fn stop(&self) {
        let mut slot = lock_blocking(&self.output);
        self.stop_locked(&mut slot);
    }

    fn stop_locked(&self, slot: &mut Option<Box<dyn OutputStream>>) {
        let stream = slot.take();
        let was_started = {
            let mut st = lock_blocking(&self.shared.state);
            let was = st.status == MixerStatus::Started;
            st.rate = 0;
            st.status = MixerStatus::Stopped;
            for reg in st.sources.iter_mut() {
                reg.tell(0);
            }
            was
        };
        // roster lock released first
        drop(stream);
        if was_started {
            info!("mixer stopped");
        }
    }

    /// Fill `out` with `frames` interleaved stereo frames (clamped to what
    /// `out` holds) summed across all running sources. Always returns the
    /// frame count written; missing source data is silence.
    pub fn mix(&self, out: &mut [i16], frames: usize) -> usize {
        self.shared.mix(out, frames)
    }

    /// Negotiated rate, 0 while stopped
    pub fn current_rate(&self) -> u32 {
        lock_blocking(&self.shared.state).rate
    }

    pub fn status(&self) -> MixerStatus {
        lock_blocking(&self.shared.state).status
    }

    pub fn last_error(&self) -> Option<String> {
        lock_blocking(&self.shared.state).last_error.clone()
    }

    /// Device of the running (or last) output
    pub fn device_name(&self) -> String {
        lock_blocking(&self.shared.state).device_name.clone()
    }

    pub fn source_count(&self) -> usize {
        lock_blocking(&self.shared.state).sources.len()
    }

    /// Rate most recently told to each source, in no particular order
    pub fn source_rates(&self) -> Vec<u32> {
        lock_blocking(&self.shared.state).sources.iter().map(|r| r.last_rate).collect()
    }

    pub fn device_names(&self) -> Result<Vec<String>, MixerError> {
        self.backend.device_names()
    }
}

impl Drop for AudioMixer {
    fn drop(&mut self) {
        self.stop();
    }
}
