//! Transfer engine: chunked upload, streaming and segmented download

pub mod download;
pub mod progress;
pub mod upload;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use download::{download_segmented, download_streaming, MAX_SEGMENT_SIZE};
pub use progress::{format_progress, Direction, LogProgress, NoProgress, ProgressReporter};
pub use upload::{upload_chunks, upload_to_blob, ByteRange, ChunkCursor};

const MIB: u64 = 1024 * 1024;

/// v1 chunk size
pub const DEFAULT_CHUNK_SIZE: u64 = 32 * MIB;
/// v1 chunk workers
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 4;
/// v2 block size
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * MIB;
/// v2 block workers
pub const DEFAULT_BLOCK_CONCURRENCY: usize = 8;
/// Archives up to this size go to blob storage in one request
pub const DEFAULT_SINGLE_SHOT_THRESHOLD: u64 = 128 * MIB;

/// Upload tuning; unset fields fall back to the backend's defaults
#[derive(Clone, Default)]
pub struct UploadOptions {
    pub concurrency: Option<usize>,
    pub chunk_size: Option<u64>,
    pub single_shot_threshold: Option<u64>,
    pub reporter: Option<Arc<dyn ProgressReporter>>,
}

impl UploadOptions {
    pub fn concurrency_or(&self, default: usize) -> usize {
        self.concurrency.unwrap_or(default).max(1)
    }

    pub fn chunk_size_or(&self, default: u64) -> u64 {
        self.chunk_size.unwrap_or(default).max(1)
    }

    pub fn single_shot_threshold(&self) -> u64 {
        self.single_shot_threshold
            .unwrap_or(DEFAULT_SINGLE_SHOT_THRESHOLD)
    }

    /// The configured reporter, or one that logs upload progress
    pub fn reporter(&self) -> Arc<dyn ProgressReporter> {
        self.reporter
            .clone()
            .unwrap_or_else(|| Arc::new(LogProgress::new(Direction::Upload)))
    }
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("concurrency", &self.concurrency)
            .field("chunk_size", &self.chunk_size)
            .field("single_shot_threshold", &self.single_shot_threshold)
            .field("reporter", &self.reporter.is_some())
            .finish()
    }
}

/// Download tuning
#[derive(Clone)]
pub struct DownloadOptions {
    /// Route blob-storage archive locations through the segmented path (v1)
    pub use_blob_sdk: bool,
    /// Parallel range requests inside one segment
    pub concurrency: usize,
    /// Timeout for a single range request
    pub request_timeout: Duration,
    /// Budget for one whole segment
    pub segment_timeout: Duration,
    /// Largest segment held in memory
    pub segment_size: u64,
    /// Abort a streaming download after this long without data
    pub idle_timeout: Duration,
    pub reporter: Option<Arc<dyn ProgressReporter>>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            use_blob_sdk: false,
            concurrency: 8,
            request_timeout: Duration::from_millis(30_000),
            segment_timeout: Duration::from_secs(10 * 60),
            segment_size: 128 * MIB,
            idle_timeout: Duration::from_millis(5_000),
            reporter: None,
        }
    }
}

impl DownloadOptions {
    /// The configured reporter, or one that logs download progress
    pub fn reporter(&self) -> Arc<dyn ProgressReporter> {
        self.reporter
            .clone()
            .unwrap_or_else(|| Arc::new(LogProgress::new(Direction::Download)))
    }
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("use_blob_sdk", &self.use_blob_sdk)
            .field("concurrency", &self.concurrency)
            .field("request_timeout", &self.request_timeout)
            .field("segment_timeout", &self.segment_timeout)
            .field("segment_size", &self.segment_size)
            .field("idle_timeout", &self.idle_timeout)
            .field("reporter", &self.reporter.is_some())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::ProgressReporter;
    use parking_lot::Mutex;

    /// Records every reporter call
    #[derive(Default)]
    pub struct RecordingProgress {
        pub starts: Mutex<Vec<Option<u64>>>,
        pub updates: Mutex<Vec<u64>>,
        pub stops: Mutex<usize>,
    }

    impl ProgressReporter for RecordingProgress {
        fn start(&self, total: Option<u64>) {
            self.starts.lock().push(total);
        }

        fn on_progress(&self, transferred: u64) {
            self.updates.lock().push(transferred);
        }

        fn stop(&self) {
            *self.stops.lock() += 1;
        }
    }
}
