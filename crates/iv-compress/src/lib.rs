// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gzip compression for backup snapshots.
//!
//! The backup supervisor (`iv-backup`) compresses a live database copy above
//! a configurable size threshold. This crate wraps [`flate2`] with the
//! self-describing [`CompressedMessage`] envelope and cumulative
//! [`CompressionStats`], so the supervisor can report bytes saved without
//! re-deriving it from file sizes on disk.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

/// Identifies which compression algorithm was applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionAlgorithm {
    /// No compression — data is passed through unchanged.
    None,
    /// Gzip compression (DEFLATE, RFC 1952).
    Gzip,
}

/// Errors that can occur during compression or decompression.
#[derive(Debug, thiserror::Error)]
pub enum CompressError {
    /// The underlying gzip stream could not be read or written.
    #[error("gzip I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, CompressError>;

/// Compresses and decompresses raw byte buffers using gzip at a fixed
/// compression level.
#[derive(Clone, Copy, Debug)]
pub struct MessageCompressor {
    algorithm: CompressionAlgorithm,
    level: Compression,
}

impl MessageCompressor {
    /// Create a new compressor for the given algorithm at the default
    /// (level 6) compression setting.
    #[must_use]
    pub fn new(algorithm: CompressionAlgorithm) -> Self {
        Self {
            algorithm,
            level: Compression::default(),
        }
    }

    /// Override the gzip compression level (0-9).
    #[must_use]
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level);
        self
    }

    /// Return the algorithm this compressor uses.
    #[must_use]
    pub fn algorithm(&self) -> CompressionAlgorithm {
        self.algorithm
    }

    /// Compress `data`, returning the compressed byte vector.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.algorithm {
            CompressionAlgorithm::None => Ok(data.to_vec()),
            CompressionAlgorithm::Gzip => {
                let mut enc = GzEncoder::new(Vec::new(), self.level);
                enc.write_all(data)?;
                Ok(enc.finish()?)
            }
        }
    }

    /// Decompress `data` previously produced by [`compress`](Self::compress).
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.algorithm {
            CompressionAlgorithm::None => Ok(data.to_vec()),
            CompressionAlgorithm::Gzip => {
                let mut dec = GzDecoder::new(data);
                let mut out = Vec::new();
                dec.read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }

    /// Compress `data` and wrap the result in a [`CompressedMessage`].
    pub fn compress_message(&self, data: &[u8]) -> Result<CompressedMessage> {
        let compressed = self.compress(data)?;
        Ok(CompressedMessage {
            algorithm: self.algorithm,
            original_size: data.len(),
            compressed_size: compressed.len(),
            data: compressed,
        })
    }

    /// Decompress a [`CompressedMessage`] back into raw bytes.
    pub fn decompress_message(&self, msg: &CompressedMessage) -> Result<Vec<u8>> {
        self.decompress(&msg.data)
    }

    /// Gzip-compress the file at `src` into a new file at `dst`.
    ///
    /// Used by the backup supervisor to compress a database snapshot that
    /// already lives on disk without holding the whole file in memory twice.
    pub fn compress_file(&self, src: &Path, dst: &Path) -> Result<u64> {
        let mut input = std::fs::File::open(src)?;
        let output = std::fs::File::create(dst)?;
        let mut enc = GzEncoder::new(output, self.level);
        let bytes = std::io::copy(&mut input, &mut enc)?;
        enc.finish()?;
        Ok(bytes)
    }

    /// Decompress the gzip file at `src` into a new file at `dst`.
    pub fn decompress_file(&self, src: &Path, dst: &Path) -> Result<u64> {
        let input = std::fs::File::open(src)?;
        let mut dec = GzDecoder::new(input);
        let mut output = std::fs::File::create(dst)?;
        Ok(std::io::copy(&mut dec, &mut output)?)
    }
}

/// A self-describing compressed payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompressedMessage {
    /// Algorithm that was used to produce `data`.
    pub algorithm: CompressionAlgorithm,
    /// Size in bytes of the original uncompressed payload.
    pub original_size: usize,
    /// Size in bytes of the `data` field.
    pub compressed_size: usize,
    /// The (possibly compressed) payload bytes.
    pub data: Vec<u8>,
}

/// Cumulative statistics for compression operations, surfaced by the backup
/// supervisor's `stats()` operation.
#[derive(Clone, Debug, Default)]
pub struct CompressionStats {
    /// Total bytes after compression.
    pub total_compressed: u64,
    /// Total bytes before compression.
    pub total_original: u64,
}

impl CompressionStats {
    /// Create a new, zeroed stats tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a single compression operation.
    pub fn record(&mut self, original: u64, compressed: u64) {
        self.total_original += original;
        self.total_compressed += compressed;
    }

    /// Overall compression ratio (`compressed / original`).
    #[must_use]
    pub fn compression_ratio(&self) -> f64 {
        if self.total_original == 0 {
            return 0.0;
        }
        self.total_compressed as f64 / self.total_original as f64
    }

    /// Total bytes saved by compression (`original - compressed`).
    #[must_use]
    pub fn bytes_saved(&self) -> u64 {
        self.total_original.saturating_sub(self.total_compressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_and_stats_work() {
        let c = MessageCompressor::new(CompressionAlgorithm::Gzip);
        let data = b"hello world, this is a snapshot of a database file".repeat(50);
        let compressed = c.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(c.decompress(&compressed).unwrap(), data);

        let mut stats = CompressionStats::new();
        stats.record(data.len() as u64, compressed.len() as u64);
        assert_eq!(stats.total_original, data.len() as u64);
        assert!(stats.bytes_saved() > 0);
    }

    #[test]
    fn none_algorithm_is_passthrough() {
        let c = MessageCompressor::new(CompressionAlgorithm::None);
        let data = b"raw bytes";
        assert_eq!(c.compress(data).unwrap(), data);
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("db.sqlite");
        let gz = dir.path().join("db.sqlite.gz");
        let restored = dir.path().join("restored.sqlite");
        std::fs::write(&src, b"pretend sqlite file contents".repeat(100)).unwrap();

        let c = MessageCompressor::new(CompressionAlgorithm::Gzip);
        c.compress_file(&src, &gz).unwrap();
        c.decompress_file(&gz, &restored).unwrap();

        assert_eq!(
            std::fs::read(&src).unwrap(),
            std::fs::read(&restored).unwrap()
        );
    }

    #[test]
    fn serde_algorithm() {
        let encoded = serde_json::to_string(&CompressionAlgorithm::Gzip).unwrap();
        let decoded: CompressionAlgorithm = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, CompressionAlgorithm::Gzip);
    }
}
