//! Frame-loop instrumentation and log setup.
//!
//! The orchestrator samples every `update_frame` call into a rolling
//! window; once per window the aggregate lands on the
//! `telemetry::frames` tracing target. Sampling is off unless
//! `REEF_FRAME_STATS` is set, so the frame loop pays one branch when
//! idle.

pub mod logging;

use std::sync::Mutex;
use std::time::Duration;

use once_cell::sync::Lazy;
use tracing::info;

/// Frames per report. At 60 fps this logs about every two seconds.
const REPORT_WINDOW: u32 = 120;

static STATS_ENABLED: Lazy<bool> = Lazy::new(|| {
    std::env::var("REEF_FRAME_STATS")
        .map(|value| value != "0" && !value.is_empty())
        .unwrap_or(false)
});

static WINDOW: Lazy<Mutex<FrameWindow>> = Lazy::new(|| Mutex::new(FrameWindow::default()));

pub fn enabled() -> bool {
    *STATS_ENABLED
}

/// Aggregate over one reporting window of frame updates.
#[derive(Debug, Default)]
struct FrameWindow {
    frames: u32,
    packets: u64,
    update_total: Duration,
    update_max: Duration,
}

/// One window's summary, emitted when the window rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub frames: u32,
    pub packets: u64,
    pub avg_update: Duration,
    pub max_update: Duration,
}

impl FrameWindow {
    fn record(&mut self, packets: usize, elapsed: Duration) -> Option<FrameReport> {
        self.frames += 1;
        self.packets += packets as u64;
        self.update_total += elapsed;
        if elapsed > self.update_max {
            self.update_max = elapsed;
        }
        if self.frames < REPORT_WINDOW {
            return None;
        }
        let report = FrameReport {
            frames: self.frames,
            packets: self.packets,
            avg_update: self.update_total / self.frames,
            max_update: self.update_max,
        };
        *self = FrameWindow::default();
        Some(report)
    }
}

/// Record one frame update: how many task packets it emitted and how
/// long the orchestrator spent producing them.
pub fn frame_sampled(packets: usize, elapsed: Duration) {
    if !enabled() {
        return;
    }
    let report = WINDOW.lock().unwrap().record(packets, elapsed);
    if let Some(report) = report {
        info!(
            target = "telemetry::frames",
            frames = report.frames,
            packets_per_frame = report.packets / report.frames as u64,
            avg_update_us = report.avg_update.as_micros() as u64,
            max_update_us = report.max_update.as_micros() as u64,
            "frame loop sample"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_rolls_over_and_resets() {
        let mut window = FrameWindow::default();
        for _ in 0..REPORT_WINDOW - 1 {
            assert!(window.record(6, Duration::from_micros(100)).is_none());
        }
        // The last frame of the window is a slow outlier.
        let report = window
            .record(6, Duration::from_micros(5_000))
            .expect("window full");

        assert_eq!(report.frames, REPORT_WINDOW);
        assert_eq!(report.packets, 6 * REPORT_WINDOW as u64);
        assert_eq!(report.max_update, Duration::from_micros(5_000));
        assert!(report.avg_update < report.max_update);

        // The next sample starts a fresh window.
        assert!(window.record(1, Duration::from_micros(50)).is_none());
        assert_eq!(window.frames, 1);
        assert_eq!(window.packets, 1);
    }
}
