/*
 *  lib.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Spectrum waterfall/persistence engine and saturating audio mixer
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

pub mod audio;
pub mod config;
pub mod error;
pub mod generator;
pub mod histogram;
pub mod layout;
pub mod lock;
pub mod palette;
pub mod spectrum;
pub mod visualizer;
pub mod waterfall;

pub use audio::{AudioFifo, AudioMixer, MixerStatus, OutputBackend, SampleSource};
pub use error::{BufferError, MixerError};
pub use histogram::{HistogramImage, PersistenceHistogram, PersistenceParams, RowOrder};
pub use layout::{DisplayGeometry, SpectrumLayout};
pub use palette::Rgba;
pub use visualizer::{RenderFrame, SpectrumSettings, SpectrumView, ViewStats};
pub use waterfall::{WaterfallBuffer, WaterfallDrain};
