/*
 *  main.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Demo: tone -> mixer + spectrum view, headless redraw loop
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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use env_logger::Env;
use log::{debug, error, info, warn};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use glowfall::audio::{AudioFifo, AudioMixer, SampleSource};
use glowfall::config::{self, Config};
use glowfall::generator::ToneGenerator;
use glowfall::spectrum::PowerSpectrum;
use glowfall::{RowOrder, SpectrumLayout, SpectrumView, WaterfallDrain};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

const STATS_EVERY: Duration = Duration::from_secs(5);

/// Stand-in for the GPU texture a real UI would upload drained rows to.
#[derive(Default)]
struct WaterfallTexture {
    width: usize,
    rows: Vec<Vec<u32>>,
    cursor: usize,
}

impl WaterfallTexture {
    fn apply(&mut self, drain: &WaterfallDrain) {
        let width = drain.rows.first().map_or(self.width, |r| r.len());
        if drain.ring_height != self.rows.len() || width != self.width {
            self.width = width;
            self.rows = vec![vec![0; width]; drain.ring_height];
        }
        if self.rows.is_empty() {
            return;
        }
        for (slot, row) in drain.ring_rows() {
            for (dst, px) in self.rows[slot].iter_mut().zip(row) {
                *dst = px.to_argb32();
            }
        }
        self.cursor = drain.ring_pos;
    }
}

/// Asynchronously waits for a SIGINT, SIGTERM, or SIGHUP signal.
async fn signal_handler() -> Result<(), Box<dyn std::error::Error>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

/// Tone -> FIFO (when the mixer runs) and tone -> FFT -> spectrum view,
/// paced at real time.
fn spawn_producer(
    cfg: &Config,
    rate: u32,
    fifo: Arc<AudioFifo>,
    view: Arc<SpectrumView>,
    running: Arc<AtomicBool>,
) -> std::io::Result<thread::JoinHandle<()>> {
    let mut tone = ToneGenerator::new(rate, cfg.tone_hz(), cfg.tone_level())
        .with_noise(cfg.noise_level());
    let mut fft = PowerSpectrum::new(cfg.fft_size());
    let chunk_frames = fft.fft_size();
    let period = Duration::from_secs_f64(chunk_frames as f64 / rate as f64);

    thread::Builder::new().name("glowfall-dsp".into()).spawn(move || {
        info!("producer: {} frame chunks every {:?}", chunk_frames, period);
        let mut pcm = vec![0i16; chunk_frames * 2];
        let mut next = Instant::now();
        while running.load(Ordering::Relaxed) {
            tone.fill(&mut pcm);
            let queued = fifo.write(&pcm);
            if queued < chunk_frames && !fifo.is_stopped() {
                debug!("producer: fifo full, {} frames dropped", chunk_frames - queued);
            }
            view.ingest_spectrum(&fft.compute_db_stereo(&pcm));

            next += period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                next = now;
            }
        }
        info!("producer stopped");
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (cfg, cli) = config::load().context("loading configuration")?;

    env_logger::Builder::from_env(Env::default().default_filter_or(cfg.log_level()))
        .format_timestamp_secs()
        .init();

    if cli.dump_config {
        println!("{}", config::dump(&cfg)?);
        return Ok(());
    }

    info!("This {} worth the Squeeze", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    let mixer = AudioMixer::default();
    if cli.list_devices {
        for (i, name) in mixer.device_names()?.iter().enumerate() {
            println!("{}{}", name, if i == 0 { " (default)" } else { "" });
        }
        return Ok(());
    }

    let view = Arc::new(SpectrumView::new(cfg.spectrum_settings()));
    view.reconfigure_display(cfg.display_height(), cfg.waterfall_share());
    view.set_center_frequency(cfg.center_frequency_hz());

    let fifo = Arc::new(AudioFifo::new(cfg.fifo_frames()));
    mixer.add_source(fifo.clone());
    let rate = if mixer.start(&cfg.device_name(), cfg.sample_rate_hz()) {
        mixer.current_rate()
    } else {
        warn!(
            "audio disabled ({}), running spectrum only",
            mixer.last_error().unwrap_or_default()
        );
        cfg.sample_rate_hz()
    };
    view.set_sample_rate(rate);

    let running = Arc::new(AtomicBool::new(true));
    let producer = spawn_producer(&cfg, rate, fifo.clone(), Arc::clone(&view), Arc::clone(&running))
        .context("spawning producer thread")?;

    let mut texture = WaterfallTexture::default();
    let mut ticker = tokio::time::interval(cfg.refresh_interval());
    let mut last_stats = Instant::now();
    // shape of the last rendered frame; the redraw loop never blocks on the view
    let mut shown: Option<(usize, SpectrumLayout)> = None;
    let shutdown = signal_handler();
    tokio::pin!(shutdown);

    info!("redraw loop every {:?}", cfg.refresh_interval());
    loop {
        tokio::select! {
            res = &mut shutdown => {
                if let Err(e) = res {
                    error!("signal handler failed: {e}");
                }
                break;
            }
            _ = ticker.tick() => {
                if !view.take_redraw_request() {
                    continue;
                }
                if let Some(frame) = view.render(RowOrder::HighestFirst) {
                    texture.apply(&frame.waterfall);
                    debug!(
                        "redraw: {} rows, ring at {}/{}, histogram {}x{}",
                        frame.waterfall.rows.len(),
                        texture.cursor,
                        frame.layout.waterfall_height,
                        frame.histogram.width,
                        frame.histogram.height
                    );
                    shown = Some((frame.histogram.width, frame.layout));
                }
                if last_stats.elapsed() >= STATS_EVERY {
                    last_stats = Instant::now();
                    let s = view.stats();
                    let (bins, l) = shown.unwrap_or_default();
                    info!(
                        "view: fft {} | {:.0}..{:.0} Hz | {:.2}s history | accepted {} deferred {} dropped {} skipped {} | fifo {}/{}",
                        bins,
                        l.freq_start_hz,
                        l.freq_end_hz,
                        l.time_span_secs,
                        s.frames_accepted,
                        s.frames_deferred,
                        s.rows_dropped,
                        s.render_skips,
                        fifo.fill_frames(),
                        fifo.capacity_frames()
                    );
                }
            }
        }
    }

    running.store(false, Ordering::Relaxed);
    if producer.join().is_err() {
        error!("producer thread panicked");
    }
    mixer.stop();
    info!("bye");
    Ok(())
}
