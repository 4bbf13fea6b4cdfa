/*
 *  audio/cpal_backend.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Host audio output via cpal
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
//! A cpal `Stream` may not leave the thread that built it, so each open
//! output gets a small owner thread. The handle returned to the mixer only
//! holds a command channel and the join handle.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, Host, SampleFormat, SampleRate, StreamConfig, SupportedStreamConfigRange};
use log::{debug, error, info};

use crate::audio::backend::{
    MixCallback, NegotiatedOutput, OutputBackend, OutputStream, SampleEncoding,
};
use crate::error::MixerError;

fn backend_err<E: std::fmt::Display>(e: E) -> MixerError {
    MixerError::Backend(e.to_string())
}

fn encoding_of(fmt: SampleFormat) -> SampleEncoding {
    match fmt {
        SampleFormat::I16 => SampleEncoding::I16,
        SampleFormat::U16 => SampleEncoding::U16,
        SampleFormat::I32 => SampleEncoding::I32,
        SampleFormat::F32 => SampleEncoding::F32,
        _ => SampleEncoding::Other,
    }
}

/// Distance from `rate` to the range, 0 when inside
fn rate_distance(range: &SupportedStreamConfigRange, rate: u32) -> u32 {
    let (lo, hi) = (range.min_sample_rate().0, range.max_sample_rate().0);
    if rate < lo {
        lo - rate
    } else {
        rate.saturating_sub(hi)
    }
}

/// Output devices of the default cpal host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }

    fn find_device(host: &Host, device_name: &str) -> Result<Device, MixerError> {
        if device_name.is_empty() {
            return host.default_output_device().ok_or(MixerError::NoDefaultDevice);
        }
        host.output_devices()
            .map_err(backend_err)?
            .find(|d| d.name().map(|n| n == device_name).unwrap_or(false))
            .ok_or_else(|| MixerError::DeviceNotFound(device_name.to_string()))
    }
}

impl OutputBackend for CpalBackend {
    fn device_names(&self) -> Result<Vec<String>, MixerError> {
        let host = cpal::default_host();
        let mut names: Vec<String> = host
            .output_devices()
            .map_err(backend_err)?
            .filter_map(|d| d.name().ok())
            .collect();
        if let Some(default) = host.default_output_device().and_then(|d| d.name().ok()) {
            names.retain(|n| *n != default);
            names.insert(0, default);
        }
        Ok(names)
    }

    fn negotiate(&self, device_name: &str, requested_rate: u32) -> Result<NegotiatedOutput, MixerError> {
        let host = cpal::default_host();
        let device = Self::find_device(&host, device_name)?;
        let name = device.name().unwrap_or_else(|_| device_name.to_string());

        let ranges: Vec<SupportedStreamConfigRange> =
            device.supported_output_configs().map_err(backend_err)?.collect();
        let stereo_i16 = ranges
            .iter()
            .filter(|r| r.channels() == 2 && r.sample_format() == SampleFormat::I16)
            .min_by_key(|r| rate_distance(r, requested_rate));

        let negotiated = match stereo_i16 {
            Some(r) => NegotiatedOutput {
                device_name: name,
                sample_rate: requested_rate.clamp(r.min_sample_rate().0, r.max_sample_rate().0),
                channels: 2,
                encoding: SampleEncoding::I16,
            },
            None => {
                // report what the device would actually give us
                let def = device.default_output_config().map_err(backend_err)?;
                NegotiatedOutput {
                    device_name: name,
                    sample_rate: def.sample_rate().0,
                    channels: def.channels(),
                    encoding: encoding_of(def.sample_format()),
                }
            }
        };
        debug!("negotiated {:?}", negotiated);
        Ok(negotiated)
    }

    fn open(
        &self,
        output: &NegotiatedOutput,
        callback: MixCallback,
    ) -> Result<Box<dyn OutputStream>, MixerError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), MixerError>>();
        let (cmd_tx, cmd_rx) = mpsc::channel::<StreamCommand>();
        let target = output.clone();

        let join = thread::Builder::new()
            .name("glowfall-audio".into())
            .spawn(move || stream_owner(target, callback, ready_tx, cmd_rx))
            .map_err(backend_err)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("audio output open: {} @ {} Hz", output.device_name, output.sample_rate);
                Ok(Box::new(CpalStream {
                    device_name: output.device_name.clone(),
                    cmd_tx,
                    join: Some(join),
                }))
            }
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(MixerError::Backend("audio thread exited during open".into()))
            }
        }
    }
}

enum StreamCommand {
    Shutdown,
}

fn build_stream(output: &NegotiatedOutput, mut callback: MixCallback) -> Result<cpal::Stream, MixerError> {
    let host = cpal::default_host();
    let device = CpalBackend::find_device(&host, &output.device_name)?;
    let config = StreamConfig {
        channels: output.channels,
        sample_rate: SampleRate(output.sample_rate),
        buffer_size: BufferSize::Default,
    };
    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| callback(data),
            |err| error!("audio output stream error: {err}"),
            None,
        )
        .map_err(backend_err)?;
    stream.play().map_err(backend_err)?;
    Ok(stream)
}

fn stream_owner(
    output: NegotiatedOutput,
    callback: MixCallback,
    ready_tx: Sender<Result<(), MixerError>>,
    cmd_rx: Receiver<StreamCommand>,
) {
    let stream = match build_stream(&output, callback) {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    // a dropped sender also ends playback
    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            StreamCommand::Shutdown => break,
        }
    }
    drop(stream);
    debug!("audio output closed: {}", output.device_name);
}

struct CpalStream {
    device_name: String,
    cmd_tx: Sender<StreamCommand>,
    join: Option<JoinHandle<()>>,
}

impl OutputStream for CpalStream {
    fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(StreamCommand::Shutdown);
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}
