//! Transfer progress reporting
//!
//! Transfers only talk to the [`ProgressReporter`] trait. [`LogProgress`]
//! writes a periodic status line through `tracing` and guarantees the
//! completion line is written exactly once.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

/// Sink for transfer progress
pub trait ProgressReporter: Send + Sync {
    /// Called once before the first byte moves; `total` may be unknown
    fn start(&self, total: Option<u64>);

    /// Cumulative bytes moved so far
    fn on_progress(&self, transferred: u64);

    /// Called once when the transfer ends, successfully or not
    fn stop(&self);
}

/// Reporter that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn start(&self, _total: Option<u64>) {}
    fn on_progress(&self, _transferred: u64) {}
    fn stop(&self) {}
}

/// Direction label used in the status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

impl Direction {
    fn verb(&self) -> &'static str {
        match self {
            Direction::Download => "Received",
            Direction::Upload => "Sent",
        }
    }
}

/// Render one status line
pub fn format_progress(
    direction: Direction,
    transferred: u64,
    total: Option<u64>,
    elapsed: Duration,
) -> String {
    let mb = transferred as f64 / (1024.0 * 1024.0);
    let secs = elapsed.as_secs_f64();
    let speed = if secs > 0.0 { mb / secs } else { 0.0 };

    match total {
        Some(total) if total > 0 => {
            let percentage = transferred as f64 * 100.0 / total as f64;
            format!(
                "{} {} of {} ({:.1}%), {:.1} MBs/sec",
                direction.verb(),
                transferred,
                total,
                percentage,
                speed
            )
        },
        _ => format!("{} {}, {:.1} MBs/sec", direction.verb(), transferred, speed),
    }
}

struct ProgressState {
    direction: Direction,
    total: Mutex<Option<u64>>,
    transferred: AtomicU64,
    started: Mutex<Option<Instant>>,
    displayed_complete: AtomicBool,
    lines: AtomicUsize,
}

impl ProgressState {
    fn is_done(&self) -> bool {
        match *self.total.lock() {
            Some(total) => self.transferred.load(Ordering::SeqCst) >= total,
            None => false,
        }
    }

    /// Write a status line unless the completion line is already out
    fn display(&self) {
        if self.displayed_complete.load(Ordering::SeqCst) {
            return;
        }
        let done = self.is_done();
        if done && self.displayed_complete.swap(true, Ordering::SeqCst) {
            return;
        }

        let elapsed = self.started.lock().map(|s| s.elapsed()).unwrap_or_default();
        let line = format_progress(
            self.direction,
            self.transferred.load(Ordering::SeqCst),
            *self.total.lock(),
            elapsed,
        );
        self.lines.fetch_add(1, Ordering::SeqCst);
        info!("{line}");
    }

    fn display_final(&self) {
        if self.displayed_complete.swap(true, Ordering::SeqCst) {
            return;
        }
        let elapsed = self.started.lock().map(|s| s.elapsed()).unwrap_or_default();
        let line = format_progress(
            self.direction,
            self.transferred.load(Ordering::SeqCst),
            *self.total.lock(),
            elapsed,
        );
        self.lines.fetch_add(1, Ordering::SeqCst);
        info!("{line}");
    }
}

/// Periodic progress line on the log
pub struct LogProgress {
    state: Arc<ProgressState>,
    interval: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl LogProgress {
    pub fn new(direction: Direction) -> Self {
        Self::with_interval(direction, Duration::from_secs(1))
    }

    pub fn with_interval(direction: Direction, interval: Duration) -> Self {
        Self {
            state: Arc::new(ProgressState {
                direction,
                total: Mutex::new(None),
                transferred: AtomicU64::new(0),
                started: Mutex::new(None),
                displayed_complete: AtomicBool::new(false),
                lines: AtomicUsize::new(0),
            }),
            interval,
            timer: Mutex::new(None),
        }
    }

    /// Number of status lines written so far
    pub fn lines_written(&self) -> usize {
        self.state.lines.load(Ordering::SeqCst)
    }

    pub fn transferred(&self) -> u64 {
        self.state.transferred.load(Ordering::SeqCst)
    }
}

impl ProgressReporter for LogProgress {
    fn start(&self, total: Option<u64>) {
        *self.state.total.lock() = total;
        *self.state.started.lock() = Some(Instant::now());

        // Without a runtime there is no timer, only the final line
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let state = self.state.clone();
        let period = self.interval;
        let task = handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                state.display();
                if state.displayed_complete.load(Ordering::SeqCst) {
                    break;
                }
            }
        });

        if let Some(previous) = self.timer.lock().replace(task) {
            previous.abort();
        }
    }

    fn on_progress(&self, transferred: u64) {
        self.state.transferred.store(transferred, Ordering::SeqCst);
    }

    fn stop(&self) {
        if let Some(task) = self.timer.lock().take() {
            task.abort();
        }
        self.state.display_final();
    }
}

impl Drop for LogProgress {
    fn drop(&mut self) {
        if let Some(task) = self.timer.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_with_total() {
        let line = format_progress(
            Direction::Download,
            1024 * 1024,
            Some(2 * 1024 * 1024),
            Duration::from_secs(1),
        );
        assert_eq!(line, "Received 1048576 of 2097152 (50.0%), 1.0 MBs/sec");
    }

    #[test]
    fn test_format_without_total() {
        let line = format_progress(Direction::Upload, 10, None, Duration::ZERO);
        assert_eq!(line, "Sent 10, 0.0 MBs/sec");
    }

    #[test]
    fn test_stop_writes_completion_once() {
        let progress = LogProgress::new(Direction::Upload);
        progress.start(Some(100));
        progress.on_progress(100);
        progress.stop();
        progress.stop();
        assert_eq!(progress.lines_written(), 1);
        assert_eq!(progress.transferred(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_writes_periodic_lines() {
        let progress = LogProgress::with_interval(Direction::Download, Duration::from_secs(1));
        progress.start(Some(100));
        progress.on_progress(10);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let periodic = progress.lines_written();
        assert!(periodic >= 2, "expected periodic lines, got {periodic}");

        progress.on_progress(100);
        progress.stop();
        assert_eq!(progress.lines_written(), periodic + 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(progress.lines_written(), periodic + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_completion_is_not_repeated_by_stop() {
        let progress = LogProgress::with_interval(Direction::Download, Duration::from_secs(1));
        progress.start(Some(50));
        progress.on_progress(50);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(progress.lines_written(), 1);

        progress.stop();
        assert_eq!(progress.lines_written(), 1);
    }
}
