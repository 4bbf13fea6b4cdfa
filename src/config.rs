/*
 *  config.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  YAML configuration layered under command line overrides
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

use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}, time::Duration};
use thiserror::Error;

use crate::histogram::PersistenceParams;
use crate::layout::DEFAULT_WATERFALL_SHARE;
use crate::visualizer::SpectrumSettings;
use crate::waterfall::DEFAULT_STAGE_ROWS;

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_DISPLAY_HEIGHT: u32 = 480;
pub const DEFAULT_REFRESH_MS: u64 = 50;
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 48_000;
pub const DEFAULT_FIFO_FRAMES: usize = 8192;
pub const MIN_SAMPLE_RATE_HZ: u32 = 8_000;
pub const MAX_SAMPLE_RATE_HZ: u32 = 384_000;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level configuration. Every field is optional so files and flags
/// layer; the accessors supply defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub log_level: Option<String>,     // e.g., "info" | "debug"
    pub spectrum: Option<SpectrumConfig>,
    pub display: Option<DisplayConfig>,
    pub audio: Option<AudioConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SpectrumConfig {
    pub fft_size: Option<usize>,
    pub stage_rows: Option<usize>,
    pub center_frequency_hz: Option<u64>,
    pub persistence: Option<PersistenceParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DisplayConfig {
    pub height: Option<u32>,
    pub waterfall_share: Option<f32>,
    pub refresh_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AudioConfig {
    pub device_name: Option<String>,   // empty = default device
    pub sample_rate_hz: Option<u32>,
    pub tone_hz: Option<f32>,
    pub tone_level: Option<f32>,       // fraction of full scale
    pub noise_level: Option<f32>,
    pub fifo_frames: Option<usize>,
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "glowfall", about = "glowfall spectrum + mixer demo", version)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long)]
    pub fft_size: Option<usize>,
    #[arg(long)]
    pub center_frequency_hz: Option<u64>,
    #[arg(long)]
    pub display_height: Option<u32>,
    #[arg(long)]
    pub waterfall_share: Option<f32>,
    #[arg(long)]
    pub device_name: Option<String>,
    #[arg(long)]
    pub sample_rate_hz: Option<u32>,
    #[arg(long)]
    pub tone_hz: Option<f32>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
    /// list audio output devices and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub list_devices: bool,
    /// debug logging
    #[arg(long, action = ArgAction::SetTrue)]
    pub debug: bool,
}

impl Config {
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    fn spectrum_section(&self) -> SpectrumConfig {
        self.spectrum.clone().unwrap_or_default()
    }

    fn display_section(&self) -> DisplayConfig {
        self.display.clone().unwrap_or_default()
    }

    fn audio_section(&self) -> AudioConfig {
        self.audio.clone().unwrap_or_default()
    }

    pub fn fft_size(&self) -> usize {
        self.spectrum_section().fft_size.unwrap_or(DEFAULT_FFT_SIZE)
    }

    pub fn center_frequency_hz(&self) -> u64 {
        self.spectrum_section().center_frequency_hz.unwrap_or(0)
    }

    pub fn spectrum_settings(&self) -> SpectrumSettings {
        let s = self.spectrum_section();
        SpectrumSettings {
            stage_rows: s.stage_rows.unwrap_or(DEFAULT_STAGE_ROWS),
            persistence: s.persistence.unwrap_or_default().sanitized(),
            ..Default::default()
        }
    }

    pub fn display_height(&self) -> u32 {
        self.display_section().height.unwrap_or(DEFAULT_DISPLAY_HEIGHT)
    }

    pub fn waterfall_share(&self) -> f32 {
        self.display_section().waterfall_share.unwrap_or(DEFAULT_WATERFALL_SHARE)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.display_section().refresh_ms.unwrap_or(DEFAULT_REFRESH_MS))
    }

    pub fn device_name(&self) -> String {
        self.audio_section().device_name.unwrap_or_default()
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.audio_section().sample_rate_hz.unwrap_or(DEFAULT_SAMPLE_RATE_HZ)
    }

    pub fn tone_hz(&self) -> f32 {
        self.audio_section().tone_hz.unwrap_or(1_000.0)
    }

    pub fn tone_level(&self) -> f32 {
        self.audio_section().tone_level.unwrap_or(0.25)
    }

    pub fn noise_level(&self) -> f32 {
        self.audio_section().noise_level.unwrap_or(0.01)
    }

    pub fn fifo_frames(&self) -> usize {
        self.audio_section().fifo_frames.unwrap_or(DEFAULT_FIFO_FRAMES)
    }
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<(Config, Cli), ConfigError> {
    let cli = Cli::parse();
    let cfg = load_with(&cli)?;
    Ok((cfg, cli))
}

/// Defaults, then the YAML file (explicit path or search), then `cli`.
pub fn load_with(cli: &Cli) -> Result<Config, ConfigError> {
    let mut cfg = Config::default();

    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    apply_cli_overrides(&mut cfg, cli);
    validate(&cfg)?;
    Ok(cfg)
}

/// Pretty YAML of the effective config
pub fn dump(cfg: &Config) -> Result<String, ConfigError> {
    Ok(serde_yaml::to_string(cfg)?)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/glowfall/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/glowfall/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/glowfall.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["glowfall.yaml", "config.yaml", "config/glowfall.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    parse_yaml(&s)
}

pub fn parse_yaml(s: &str) -> Result<Config, ConfigError> {
    let cfg: Config = serde_yaml::from_str(s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    if src.log_level.is_some() { dst.log_level = src.log_level; }
    match (&mut dst.spectrum, src.spectrum) {
        (None, Some(c)) => dst.spectrum = Some(c),
        (Some(d), Some(s)) => merge_spectrum(d, s),
        _ => {}
    }
    match (&mut dst.display, src.display) {
        (None, Some(c)) => dst.display = Some(c),
        (Some(d), Some(s)) => merge_display(d, s),
        _ => {}
    }
    match (&mut dst.audio, src.audio) {
        (None, Some(c)) => dst.audio = Some(c),
        (Some(d), Some(s)) => merge_audio(d, s),
        _ => {}
    }
}

fn merge_spectrum(dst: &mut SpectrumConfig, src: SpectrumConfig) {
    if src.fft_size.is_some()            { dst.fft_size = src.fft_size; }
    if src.stage_rows.is_some()          { dst.stage_rows = src.stage_rows; }
    if src.center_frequency_hz.is_some() { dst.center_frequency_hz = src.center_frequency_hz; }
    if src.persistence.is_some()         { dst.persistence = src.persistence; }
}

fn merge_display(dst: &mut DisplayConfig, src: DisplayConfig) {
    if src.height.is_some()          { dst.height = src.height; }
    if src.waterfall_share.is_some() { dst.waterfall_share = src.waterfall_share; }
    if src.refresh_ms.is_some()      { dst.refresh_ms = src.refresh_ms; }
}

fn merge_audio(dst: &mut AudioConfig, src: AudioConfig) {
    if src.device_name.is_some()    { dst.device_name = src.device_name; }
    if src.sample_rate_hz.is_some() { dst.sample_rate_hz = src.sample_rate_hz; }
    if src.tone_hz.is_some()        { dst.tone_hz = src.tone_hz; }
    if src.tone_level.is_some()     { dst.tone_level = src.tone_level; }
    if src.noise_level.is_some()    { dst.noise_level = src.noise_level; }
    if src.fifo_frames.is_some()    { dst.fifo_frames = src.fifo_frames; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.debug {
        cfg.log_level = Some("debug".into());
    } else if cli.log_level.is_some() {
        cfg.log_level = cli.log_level.clone();
    }

    if cli.fft_size.is_some() || cli.center_frequency_hz.is_some() {
        let s = cfg.spectrum.get_or_insert_with(SpectrumConfig::default);
        if cli.fft_size.is_some()            { s.fft_size = cli.fft_size; }
        if cli.center_frequency_hz.is_some() { s.center_frequency_hz = cli.center_frequency_hz; }
    }
    if cli.display_height.is_some() || cli.waterfall_share.is_some() {
        let d = cfg.display.get_or_insert_with(DisplayConfig::default);
        if cli.display_height.is_some()  { d.height = cli.display_height; }
        if cli.waterfall_share.is_some() { d.waterfall_share = cli.waterfall_share; }
    }
    if cli.device_name.is_some() || cli.sample_rate_hz.is_some() || cli.tone_hz.is_some() {
        let a = cfg.audio.get_or_insert_with(AudioConfig::default);
        if cli.device_name.is_some()    { a.device_name = cli.device_name.clone(); }
        if cli.sample_rate_hz.is_some() { a.sample_rate_hz = cli.sample_rate_hz; }
        if cli.tone_hz.is_some()        { a.tone_hz = cli.tone_hz; }
    }
}

/// Put any invariants here (required fields, ranges, etc.)
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.fft_size() == 0 {
        return Err(ConfigError::Validation("spectrum fft_size must be > 0".into()));
    }
    if cfg.spectrum_settings().stage_rows == 0 {
        return Err(ConfigError::Validation("spectrum stage_rows must be > 0".into()));
    }
    if cfg.display_height() == 0 {
        return Err(ConfigError::Validation("display height must be > 0".into()));
    }
    let share = cfg.waterfall_share();
    if !(share > 0.0 && share <= 1.0) {
        return Err(ConfigError::Validation("display waterfall_share must be in (0, 1]".into()));
    }
    if cfg.refresh_interval().is_zero() {
        return Err(ConfigError::Validation("display refresh_ms must be > 0".into()));
    }
    let rate = cfg.sample_rate_hz();
    if !(MIN_SAMPLE_RATE_HZ..=MAX_SAMPLE_RATE_HZ).contains(&rate) {
        return Err(ConfigError::Validation(format!(
            "audio sample_rate_hz must be {MIN_SAMPLE_RATE_HZ}..={MAX_SAMPLE_RATE_HZ}"
        )));
    }
    if cfg.fifo_frames() == 0 {
        return Err(ConfigError::Validation("audio fifo_frames must be > 0".into()));
    }
    for (name, v) in [("tone_level", cfg.tone_level()), ("noise_level", cfg.noise_level())] {
        if !(0.0..=1.0).contains(&v) {
            return Err(ConfigError::Validation(format!("audio {name} must be 0..=1")));
        }
    }
    Ok(())
}
