//! Chunked parallel upload
//!
//! Workers share one cursor owned by the upload call. Each claim hands out
//! the next byte range, so ranges never overlap and together cover the
//! whole file no matter how claims interleave.

use std::future::Future;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use cachet_core::error::CacheError;
use cachet_core::types::ArchiveFile;
use futures::future::try_join_all;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use super::ProgressReporter;
use crate::blob::{BlobClient, BlockUploadOptions};
use crate::ClientResult;

/// Inclusive byte range of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered; an inclusive range is never empty
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value; total size is left open
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/*", self.start, self.end)
    }

    /// `Range` request header value
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Upload offset shared by the workers of one call
#[derive(Debug)]
pub struct ChunkCursor {
    next: AtomicU64,
    size: u64,
    chunk_size: u64,
}

impl ChunkCursor {
    pub fn new(size: u64, chunk_size: u64) -> Self {
        Self {
            next: AtomicU64::new(0),
            size,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Claim the next range, or `None` once the file is exhausted
    pub fn claim(&self) -> Option<ByteRange> {
        let start = self.next.fetch_add(self.chunk_size, Ordering::SeqCst);
        if start >= self.size {
            return None;
        }
        let end = std::cmp::min(start.saturating_add(self.chunk_size), self.size) - 1;
        Some(ByteRange { start, end })
    }
}

/// Upload `path` in ranges of `chunk_size` with `concurrency` workers
///
/// Completes when every worker has finished; the first failing chunk fails
/// the call and cancels the remaining workers.
pub async fn upload_chunks<F, Fut>(
    path: &Path,
    size: u64,
    chunk_size: u64,
    concurrency: usize,
    reporter: &dyn ProgressReporter,
    upload: F,
) -> ClientResult<()>
where
    F: Fn(ByteRange, Bytes) -> Fut,
    Fut: Future<Output = ClientResult<()>>,
{
    let cursor = ChunkCursor::new(size, chunk_size);
    let sent = AtomicU64::new(0);

    reporter.start(Some(size));
    debug!("Awaiting all uploads");
    let workers = (0..concurrency.max(1))
        .map(|_| upload_worker(path, &cursor, &sent, reporter, &upload));
    let result = try_join_all(workers).await.map(|_| ());
    reporter.stop();

    result
}

async fn upload_worker<F, Fut>(
    path: &Path,
    cursor: &ChunkCursor,
    sent: &AtomicU64,
    reporter: &dyn ProgressReporter,
    upload: &F,
) -> ClientResult<()>
where
    F: Fn(ByteRange, Bytes) -> Fut,
    Fut: Future<Output = ClientResult<()>>,
{
    let mut file = File::open(path)
        .await
        .map_err(|e| CacheError::io(format!("Failed to open {}", path.display()), e))?;

    while let Some(range) = cursor.claim() {
        debug!(
            "Uploading chunk of size {} bytes at offset {} with content range: {}",
            range.size(),
            range.start,
            range.content_range()
        );
        let chunk = read_range(&mut file, range)
            .await
            .map_err(|e| CacheError::io(format!("Failed to read {}", path.display()), e))?;
        upload(range, chunk).await?;

        let total = sent.fetch_add(range.size(), Ordering::SeqCst) + range.size();
        reporter.on_progress(total);
    }

    Ok(())
}

async fn read_range(file: &mut File, range: ByteRange) -> std::io::Result<Bytes> {
    file.seek(SeekFrom::Start(range.start)).await?;
    let mut buffer = vec![0u8; range.size() as usize];
    file.read_exact(&mut buffer).await?;
    Ok(Bytes::from(buffer))
}

/// Hand a whole archive to a blob client, reporting progress
pub async fn upload_to_blob(
    blob: &dyn BlobClient,
    archive: &ArchiveFile,
    options: &BlockUploadOptions,
    reporter: &dyn ProgressReporter,
) -> ClientResult<()> {
    reporter.start(Some(archive.size));
    let on_progress = |sent: u64| reporter.on_progress(sent);
    let result = blob
        .upload_file(&archive.path, archive.size, options, &on_progress)
        .await;
    reporter.stop();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::testing::RecordingProgress;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    fn drain(cursor: &ChunkCursor, workers: usize) -> Vec<ByteRange> {
        // Round-robin claims to mimic interleaved workers
        let mut ranges = Vec::new();
        let mut live = vec![true; workers];
        while live.iter().any(|l| *l) {
            for slot in live.iter_mut().filter(|l| **l) {
                match cursor.claim() {
                    Some(range) => ranges.push(range),
                    None => *slot = false,
                }
            }
        }
        ranges
    }

    #[test]
    fn test_byte_range_headers() {
        let range = ByteRange { start: 0, end: 1023 };
        assert_eq!(range.size(), 1024);
        assert_eq!(range.content_range(), "bytes 0-1023/*");
        assert_eq!(range.range_header(), "bytes=0-1023");
    }

    #[test]
    fn test_last_chunk_is_short() {
        let cursor = ChunkCursor::new(10, 4);
        assert_eq!(cursor.claim(), Some(ByteRange { start: 0, end: 3 }));
        assert_eq!(cursor.claim(), Some(ByteRange { start: 4, end: 7 }));
        assert_eq!(cursor.claim(), Some(ByteRange { start: 8, end: 9 }));
        assert_eq!(cursor.claim(), None);
        assert_eq!(cursor.claim(), None);
    }

    #[test]
    fn test_empty_file_has_no_chunks() {
        assert_eq!(ChunkCursor::new(0, 4).claim(), None);
    }

    proptest! {
        #[test]
        fn chunks_cover_file_exactly(size in 0u64..5_000, chunk in 1u64..700, workers in 1usize..9) {
            let cursor = ChunkCursor::new(size, chunk);
            let mut ranges = drain(&cursor, workers);
            ranges.sort();

            let mut expected_start = 0;
            for range in &ranges {
                prop_assert_eq!(range.start, expected_start);
                prop_assert!(range.end >= range.start);
                prop_assert!(range.size() <= chunk);
                expected_start = range.end + 1;
            }
            prop_assert_eq!(expected_start, size);
        }
    }

    #[tokio::test]
    async fn test_upload_chunks_reassembles_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.tzst");
        let content: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&path, &content).await.unwrap();

        let received = Mutex::new(Vec::new());
        let progress = RecordingProgress::default();

        upload_chunks(&path, content.len() as u64, 1024, 3, &progress, |range, bytes| {
            received.lock().push((range, bytes));
            async { Ok(()) }
        })
        .await
        .unwrap();

        let mut chunks = received.into_inner();
        chunks.sort_by_key(|(range, _)| range.start);
        assert_eq!(chunks.len(), 10);
        let joined: Vec<u8> = chunks.iter().flat_map(|(_, b)| b.iter().copied()).collect();
        assert_eq!(joined, content);

        assert_eq!(*progress.starts.lock(), vec![Some(10_000)]);
        assert_eq!(progress.updates.lock().last().copied(), Some(10_000));
        assert_eq!(*progress.stops.lock(), 1);
    }

    #[tokio::test]
    async fn test_failed_chunk_fails_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.tgz");
        tokio::fs::write(&path, vec![1u8; 4096]).await.unwrap();
        let progress = RecordingProgress::default();

        let err = upload_chunks(&path, 4096, 1024, 2, &progress, |range, _| async move {
            if range.start == 2048 {
                Err(CacheError::Service {
                    status: 400,
                    context: Some("during upload chunk.".to_string()),
                })
            } else {
                Ok(())
            }
        })
        .await
        .unwrap_err();

        assert_eq!(err.status(), Some(400));
        assert_eq!(*progress.stops.lock(), 1);
    }
}
