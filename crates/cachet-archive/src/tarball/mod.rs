//! Compressed tar archives
//!
//! Members are stored relative to the workspace root. Paths outside the
//! workspace are stored under [`ROOT_PREFIX`] followed by their absolute
//! path, and mapped back to the filesystem root on extraction.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use cachet_core::error::CacheError;
use cachet_core::types::CompressionMethod;

use crate::ArchiveResult;

pub mod create;
pub mod extract;

// Re-export main functions
pub use create::create_archive;
pub use extract::extract_archive;

/// Member prefix for paths outside the workspace
pub const ROOT_PREFIX: &str = "__root__";

/// zstd window used with long-distance matching
const ZSTD_LONG_WINDOW_LOG: u32 = 30;

/// Largest window the decoder accepts
const ZSTD_MAX_WINDOW_LOG: u32 = 31;

/// Compressing writer for one of the supported methods
pub(crate) enum Encoder<W: Write> {
    Gzip(GzEncoder<W>),
    Zstd(zstd::stream::write::Encoder<'static, W>),
}

impl<W: Write> Encoder<W> {
    pub(crate) fn new(writer: W, method: CompressionMethod) -> io::Result<Self> {
        match method {
            CompressionMethod::Gzip => Ok(Encoder::Gzip(GzEncoder::new(writer, Compression::default()))),
            CompressionMethod::Zstd => {
                let mut encoder = zstd::stream::write::Encoder::new(writer, 0)?;
                encoder.long_distance_matching(true)?;
                encoder.window_log(ZSTD_LONG_WINDOW_LOG)?;
                Ok(Encoder::Zstd(encoder))
            },
            CompressionMethod::ZstdWithoutLong => {
                Ok(Encoder::Zstd(zstd::stream::write::Encoder::new(writer, 0)?))
            },
        }
    }

    /// Flush the compressed stream and hand back the inner writer
    pub(crate) fn finish(self) -> io::Result<W> {
        match self {
            Encoder::Gzip(encoder) => encoder.finish(),
            Encoder::Zstd(encoder) => encoder.finish(),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Gzip(encoder) => encoder.write(buf),
            Encoder::Zstd(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Gzip(encoder) => encoder.flush(),
            Encoder::Zstd(encoder) => encoder.flush(),
        }
    }
}

/// Decompressing reader over an archive file
pub(crate) fn open_decoder(path: &Path, method: CompressionMethod) -> ArchiveResult<Box<dyn Read>> {
    let file = File::open(path)
        .map_err(|e| CacheError::io(format!("Failed to open archive {}", path.display()), e))?;

    match method {
        CompressionMethod::Gzip => Ok(Box::new(GzDecoder::new(BufReader::new(file)))),
        CompressionMethod::Zstd | CompressionMethod::ZstdWithoutLong => {
            let mut decoder = zstd::stream::read::Decoder::new(file)
                .map_err(|e| CacheError::io("Failed to start zstd decoder".to_string(), e))?;
            decoder
                .window_log_max(ZSTD_MAX_WINDOW_LOG)
                .map_err(|e| CacheError::io("Failed to configure zstd decoder".to_string(), e))?;
            Ok(Box::new(decoder))
        },
    }
}

/// Member paths of an archive, in archive order
pub fn list_archive(path: &Path, method: CompressionMethod) -> ArchiveResult<Vec<PathBuf>> {
    let mut archive = tar::Archive::new(open_decoder(path, method)?);
    let entries = archive
        .entries()
        .map_err(|e| CacheError::io("Failed to read archive".to_string(), e))?;

    let mut members = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CacheError::io("Failed to read archive entry".to_string(), e))?;
        let member = entry
            .path()
            .map_err(|e| CacheError::io("Invalid archive entry path".to_string(), e))?;
        members.push(member.into_owned());
    }
    Ok(members)
}

/// Archive member name for a filesystem path
pub fn member_name(workspace: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix(workspace) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => {
            let mut member = PathBuf::from(ROOT_PREFIX);
            for component in path.components() {
                if let std::path::Component::Normal(part) = component {
                    member.push(part);
                }
            }
            member
        },
    }
}
