/*
 *  audio/mod.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Audio mixing: sample sources, output backends, the mixer
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

pub mod backend;
pub mod cpal_backend;
pub mod fifo;
pub mod mixer;
pub mod mock;

pub use backend::{MixCallback, NegotiatedOutput, OutputBackend, OutputStream, SampleEncoding};
pub use cpal_backend::CpalBackend;
pub use fifo::{AudioFifo, SampleSource};
pub use mixer::{AudioMixer, MixerStatus};
pub use mock::MockBackend;
