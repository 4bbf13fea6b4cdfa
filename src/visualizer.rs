/*
 *  visualizer.rs
 *
 *  glowfall - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 *
 *  Spectrum view engine: waterfall + persistence behind one lock
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
//! The DSP thread pushes frames with [`SpectrumView::ingest_spectrum`], which
//! always takes the lock so no frame is lost to contention. The redraw thread
//! calls [`SpectrumView::render`] (or the drain/snapshot halves) which only
//! waits [`RENDER_LOCK_WINDOW`] and skips the pass when the lock stays busy.
//!
//! Capacity changes (frame length, display height, centre frequency, sample
//! rate) only mark the view pending; buffers are rebuilt on the next render
//! pass. While pending, ingested frames are used only to learn the frame
//! length.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use log::{debug, error, info};

use crate::histogram::{HistogramImage, PersistenceHistogram, PersistenceParams, RowOrder};
use crate::layout::{DisplayGeometry, SpectrumLayout};
use crate::lock::{lock_best_effort, lock_blocking, RENDER_LOCK_WINDOW};
use crate::waterfall::{WaterfallBuffer, WaterfallDrain, DEFAULT_STAGE_ROWS};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumSettings {
    pub stage_rows: usize,
    pub persistence: PersistenceParams,
    pub render_lock_window: Duration,
}

impl Default for SpectrumSettings {
    fn default() -> Self {
        Self {
            stage_rows: DEFAULT_STAGE_ROWS,
            persistence: PersistenceParams::default(),
            render_lock_window: RENDER_LOCK_WINDOW,
        }
    }
}

/// One redraw worth of data.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFrame {
    pub layout: SpectrumLayout,
    pub waterfall: WaterfallDrain,
    pub histogram: HistogramImage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewStats {
    pub frames_accepted: u64,
    /// Frames that only fed length detection
    pub frames_deferred: u64,
    /// Waterfall rows lost to a full stage
    pub rows_dropped: u64,
    /// Render passes abandoned on lock contention
    pub render_skips: u64,
}

#[derive(Debug)]
struct ViewState {
    fft_size: usize,
    changes_pending: bool,
    geometry: DisplayGeometry,
    center_frequency_hz: u64,
    sample_rate: u32,
    layout: SpectrumLayout,
    waterfall: Option<WaterfallBuffer>,
    histogram: Option<PersistenceHistogram>,
}

/// Lock-free so the redraw thread can read them without waiting on the
/// producer. They survive buffer rebuilds.
#[derive(Debug, Default)]
struct ViewCounters {
    frames_accepted: AtomicU64,
    frames_deferred: AtomicU64,
    rows_dropped: AtomicU64,
    render_skips: AtomicU64,
}

impl ViewState {
    /// Rebuild whatever the pending changes invalidated. New buffers are built
    /// first and swapped in whole; on allocation failure the view disables
    /// itself (fft_size 0) and stays pending.
    fn apply_changes(&mut self, settings: &SpectrumSettings) {
        if self.fft_size == 0 {
            return;
        }
        let ring_height = self.geometry.waterfall_height();
        let fft_changed = self
            .waterfall
            .as_ref()
            .is_none_or(|w| w.width() != self.fft_size);

        if fft_changed {
            let built = WaterfallBuffer::new(self.fft_size, settings.stage_rows, ring_height)
                .and_then(|w| {
                    PersistenceHistogram::new(self.fft_size, settings.persistence).map(|h| (w, h))
                });
            match built {
                Ok((w, h)) => {
                    self.waterfall = Some(w);
                    self.histogram = Some(h);
                    info!("spectrum view: fft size {} ring height {}", self.fft_size, ring_height);
                }
                Err(e) => {
                    error!("spectrum view: {e}; disabling until next reconfiguration");
                    self.waterfall = None;
                    self.histogram = None;
                    self.fft_size = 0;
                    self.changes_pending = true;
                    return;
                }
            }
        } else if let Some(w) = self.waterfall.as_mut() {
            if w.ring_height() != ring_height {
                w.resize_ring(ring_height);
                debug!("spectrum view: ring height {}", ring_height);
            }
        }

        self.layout = SpectrumLayout::compute(
            &self.geometry,
            self.fft_size,
            self.center_frequency_hz,
            self.sample_rate,
        );
        self.changes_pending = false;
    }

    /// Apply pending changes; Some only when buffers are live.
    fn ready(&mut self, settings: &SpectrumSettings) -> Option<(&mut WaterfallBuffer, &mut PersistenceHistogram)> {
        if self.changes_pending {
            self.apply_changes(settings);
        }
        if self.fft_size == 0 || self.changes_pending {
            return None;
        }
        match (self.waterfall.as_mut(), self.histogram.as_mut()) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}

/// Waterfall, persistence histogram and axis layout of one spectrum
/// display, shared between a DSP producer thread and a redraw thread.
///
/// The producer side ([`ingest_spectrum`](SpectrumView::ingest_spectrum) and
/// the reconfiguration setters) always waits for the lock. The redraw side
/// ([`render`](SpectrumView::render), [`drain_waterfall`](SpectrumView::drain_waterfall),
/// [`snapshot_histogram`](SpectrumView::snapshot_histogram)) waits at most
/// `render_lock_window` and returns None instead. [`stats`](SpectrumView::stats)
/// and [`take_redraw_request`](SpectrumView::take_redraw_request) never lock.
pub struct SpectrumView {
    settings: SpectrumSettings,
    state: Mutex<ViewState>,
    redraw: AtomicBool,
    counters: ViewCounters,
}

impl Default for SpectrumView {
    fn default() -> Self {
        Self::new(SpectrumSettings::default())
    }
}

impl SpectrumView {
    pub fn new(settings: SpectrumSettings) -> Self {
        let settings = SpectrumSettings {
            stage_rows: settings.stage_rows,
            persistence: settings.persistence.sanitized(),
            render_lock_window: settings.render_lock_window,
        };
        Self {
            settings,
            state: Mutex::new(ViewState {
                fft_size: 0,
                changes_pending: true,
                geometry: DisplayGeometry::default(),
                center_frequency_hz: 0,
                sample_rate: 0,
                layout: SpectrumLayout::default(),
                waterfall: None,
                histogram: None,
            }),
            redraw: AtomicBool::new(false),
            counters: ViewCounters::default(),
        }
    }

    pub fn settings(&self) -> &SpectrumSettings {
        &self.settings
    }

    /// Producer entry point. Blocks briefly; never fails.
    pub fn ingest_spectrum(&self, frame: &[f32]) {
        let mut st = lock_blocking(&self.state);
        self.redraw.store(true, Ordering::Release);

        if st.changes_pending {
            st.fft_size = frame.len();
            self.counters.frames_deferred.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if frame.len() != st.fft_size {
            debug!("spectrum view: frame length {} -> {}", st.fft_size, frame.len());
            st.fft_size = frame.len();
            st.changes_pending = true;
            self.counters.frames_deferred.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.counters.frames_accepted.fetch_add(1, Ordering::Relaxed);
        if let Some(w) = st.waterfall.as_mut() {
            if !w.ingest(frame) {
                self.counters.rows_dropped.fetch_add(1, Ordering::Relaxed);
                debug!("spectrum view: waterfall stage full, row dropped");
            }
        }
        if let Some(h) = st.histogram.as_mut() {
            h.ingest(frame);
        }
    }

    /// Widget resized or splitter moved.
    pub fn reconfigure_display(&self, height_px: u32, waterfall_share: f32) {
        let mut st = lock_blocking(&self.state);
        st.geometry = DisplayGeometry::new(height_px, waterfall_share);
        st.changes_pending = true;
    }

    pub fn set_center_frequency(&self, hz: u64) {
        let mut st = lock_blocking(&self.state);
        st.center_frequency_hz = hz;
        st.changes_pending = true;
    }

    pub fn set_sample_rate(&self, hz: u32) {
        let mut st = lock_blocking(&self.state);
        st.sample_rate = hz;
        st.changes_pending = true;
    }

    /// Apply pending changes now. Returns true when the view is live.
    pub fn apply_pending(&self) -> bool {
        let mut st = lock_blocking(&self.state);
        st.ready(&self.settings).is_some()
    }

    /// Staged waterfall rows. None when the lock stayed busy or the view is
    /// not configured yet.
    pub fn drain_waterfall(&self) -> Option<WaterfallDrain> {
        let mut st = self.render_lock()?;
        let (w, _) = st.ready(&self.settings)?;
        Some(w.drain())
    }

    pub fn snapshot_histogram(&self, order: RowOrder) -> Option<HistogramImage> {
        let mut st = self.render_lock()?;
        let (_, h) = st.ready(&self.settings)?;
        Some(h.snapshot(order))
    }

    /// Drain + snapshot under a single lock acquisition.
    pub fn render(&self, order: RowOrder) -> Option<RenderFrame> {
        let mut st = self.render_lock()?;
        let (w, h) = st.ready(&self.settings)?;
        let waterfall = w.drain();
        let histogram = h.snapshot(order);
        Some(RenderFrame { layout: st.layout, waterfall, histogram })
    }

    /// Clears and returns the "display changed" flag set by each ingest.
    pub fn take_redraw_request(&self) -> bool {
        self.redraw.swap(false, Ordering::AcqRel)
    }

    /// Blocking; for control and headless callers. The redraw thread gets
    /// the frame length from `RenderFrame::histogram.width`.
    pub fn fft_size(&self) -> usize {
        lock_blocking(&self.state).fft_size
    }

    /// Blocking; for control and headless callers.
    pub fn is_pending(&self) -> bool {
        lock_blocking(&self.state).changes_pending
    }

    /// Blocking; the redraw thread uses `RenderFrame::layout`.
    pub fn layout(&self) -> SpectrumLayout {
        lock_blocking(&self.state).layout
    }

    /// Running totals since creation. Never takes the view lock.
    pub fn stats(&self) -> ViewStats {
        let c = &self.counters;
        ViewStats {
            frames_accepted: c.frames_accepted.load(Ordering::Relaxed),
            frames_deferred: c.frames_deferred.load(Ordering::Relaxed),
            rows_dropped: c.rows_dropped.load(Ordering::Relaxed),
            render_skips: c.render_skips.load(Ordering::Relaxed),
        }
    }

    fn render_lock(&self) -> Option<std::sync::MutexGuard<'_, ViewState>> {
        let guard = lock_best_effort(&self.state, self.settings.render_lock_window);
        if guard.is_none() {
            self.counters.render_skips.fetch_add(1, Ordering::Relaxed);
            debug!("spectrum view: lock busy, skipping redraw");
        }
        guard
    }
}

impl Drop for SpectrumView {
    fn drop(&mut self) {
        let st = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        st.waterfall = None;
        st.histogram = None;
        st.fft_size = 0;
        debug!("spectrum view released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::{histogram_palette, waterfall_palette};

    fn live_view(bins: usize) -> SpectrumView {
        let v = SpectrumView::default();
        v.reconfigure_display(400, 0.5);
        v.ingest_spectrum(&vec![-99.0; bins]);
        assert!(v.apply_pending());
        v
    }

    #[test]
    fn test_first_frames_only_detect_length() {
        let v = SpectrumView::default();
        v.reconfigure_display(400, 0.5);
        v.ingest_spectrum(&[0.0; 64]);
        assert!(v.is_pending());
        assert_eq!(v.fft_size(), 64);
        assert_eq!(v.stats().frames_deferred, 1);

        let drain = v.drain_waterfall().unwrap();
        assert!(drain.rows.is_empty());
        assert!(!v.is_pending());
        assert_eq!(drain.ring_height, 200);
    }

    #[test]
    fn test_ingest_then_render() {
        let v = live_view(8);
        v.ingest_spectrum(&[100.0; 8]);
        v.ingest_spectrum(&[-99.0; 8]);

        let frame = v.render(RowOrder::HighestFirst).unwrap();
        assert_eq!(frame.waterfall.rows.len(), 2);
        assert_eq!(frame.waterfall.rows[0][0], waterfall_palette()[239]);
        assert_eq!(frame.waterfall.rows[1][0], waterfall_palette()[0]);
        assert_eq!(frame.histogram.width, 8);
        // -99 dB -> level 0 -> bottom row
        assert_eq!(frame.histogram.pixel(0, 99), histogram_palette()[4]);
        assert_eq!(frame.layout.waterfall_height, 200);

        // drained
        assert!(v.drain_waterfall().unwrap().rows.is_empty());
        assert_eq!(v.stats().frames_accepted, 2);
    }

    #[test]
    fn test_length_change_discards_history() {
        let v = live_view(8);
        v.ingest_spectrum(&[0.0; 8]);
        v.ingest_spectrum(&[0.0; 16]);
        assert!(v.is_pending());
        assert_eq!(v.fft_size(), 16);

        let frame = v.render(RowOrder::HighestFirst).unwrap();
        assert!(frame.waterfall.rows.is_empty());
        assert_eq!(frame.histogram.width, 16);
        assert!(frame.histogram.pixels.iter().all(|&p| p == histogram_palette()[0]));
    }

    #[test]
    fn test_empty_frame_keeps_view_disabled() {
        let v = SpectrumView::default();
        v.ingest_spectrum(&[]);
        assert!(v.drain_waterfall().is_none());
        assert!(v.snapshot_histogram(RowOrder::LowestFirst).is_none());
        assert!(v.is_pending());
        // recovers on the next stable length
        v.ingest_spectrum(&[0.0; 4]);
        assert!(v.snapshot_histogram(RowOrder::LowestFirst).is_some());
    }

    #[test]
    fn test_allocation_failure_degrades_to_disabled() {
        let v = SpectrumView::new(SpectrumSettings {
            stage_rows: usize::MAX / 2,
            ..Default::default()
        });
        v.ingest_spectrum(&[0.0; 4]);
        assert!(!v.apply_pending());
        assert_eq!(v.fft_size(), 0);
        assert!(v.is_pending());
        // still accepts frames without panicking
        v.ingest_spectrum(&[0.0; 4]);
        assert_eq!(v.fft_size(), 4);
    }

    #[test]
    fn test_display_resize_keeps_stage() {
        let v = live_view(4);
        v.ingest_spectrum(&[0.0; 4]);
        v.reconfigure_display(1000, 0.8);
        let d = v.drain_waterfall().unwrap();
        assert_eq!(d.rows.len(), 1);
        assert_eq!(d.ring_height, 800);
        assert_eq!(d.ring_start, 0);
    }

    #[test]
    fn test_layout_follows_tuning() {
        let v = live_view(512);
        v.set_sample_rate(48_000);
        v.set_center_frequency(7_100_000);
        assert!(v.apply_pending());
        let l = v.layout();
        assert_eq!(l.freq_start_hz, 7_076_000.0);
        assert_eq!(l.freq_end_hz, 7_124_000.0);
        assert!(l.time_span_secs > 0.0);
    }

    #[test]
    fn test_redraw_flag() {
        let v = SpectrumView::default();
        assert!(!v.take_redraw_request());
        v.ingest_spectrum(&[0.0; 4]);
        assert!(v.take_redraw_request());
        assert!(!v.take_redraw_request());
    }

    #[test]
    fn test_busy_lock_skips_render_passes() {
        use std::sync::{mpsc, Arc};
        use std::thread;
        use std::time::Instant;

        let v = Arc::new(live_view(8));
        v.ingest_spectrum(&[0.0; 8]);

        let (held_tx, held_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let holder = {
            let v = Arc::clone(&v);
            thread::spawn(move || {
                let _g = v.state.lock().unwrap();
                held_tx.send(()).unwrap();
                release_rx.recv().ok();
            })
        };
        held_rx.recv().unwrap();

        let window = v.settings().render_lock_window;
        let t0 = Instant::now();
        assert!(v.render(RowOrder::HighestFirst).is_none());
        assert!(v.drain_waterfall().is_none());
        assert!(v.snapshot_histogram(RowOrder::LowestFirst).is_none());
        // three bounded waits, with slack for a loaded machine
        assert!(t0.elapsed() < window * 3 + Duration::from_millis(200));

        // counters stay readable while the lock is held
        let t1 = Instant::now();
        assert_eq!(v.stats().render_skips, 3);
        assert!(v.take_redraw_request());
        assert!(t1.elapsed() < Duration::from_millis(50));

        release_tx.send(()).unwrap();
        holder.join().unwrap();

        let frame = v.render(RowOrder::HighestFirst).unwrap();
        assert_eq!(frame.waterfall.rows.len(), 1);
        assert_eq!(v.stats().render_skips, 3);
    }

    #[test]
    fn test_drop_count_survives_length_change() {
        let v = SpectrumView::new(SpectrumSettings { stage_rows: 2, ..Default::default() });
        v.reconfigure_display(100, 0.5);
        v.ingest_spectrum(&[0.0; 4]);
        v.apply_pending();
        for _ in 0..5 {
            v.ingest_spectrum(&[0.0; 4]);
        }
        assert_eq!(v.stats().rows_dropped, 3);

        // rebuilds both buffers
        v.ingest_spectrum(&[0.0; 8]);
        assert!(v.apply_pending());
        v.ingest_spectrum(&[0.0; 8]);
        let s = v.stats();
        assert_eq!(s.rows_dropped, 3);
        assert_eq!(s.frames_accepted, 6);
        assert_eq!(s.frames_deferred, 2);
        assert_eq!(v.drain_waterfall().unwrap().rows.len(), 1);
    }

    #[test]
    fn test_stage_overflow_counts_drops() {
        let v = SpectrumView::new(SpectrumSettings { stage_rows: 3, ..Default::default() });
        v.reconfigure_display(100, 0.5);
        v.ingest_spectrum(&[0.0; 2]);
        v.apply_pending();
        for _ in 0..5 {
            v.ingest_spectrum(&[0.0; 2]);
        }
        assert_eq!(v.stats().rows_dropped, 2);
        assert_eq!(v.drain_waterfall().unwrap().rows.len(), 3);
    }
}
