//! Size-aware payload codec
//!
//! Small payloads pass through untouched. Larger ones are zlib-compressed at a
//! level picked from their size, and payloads above [`CHUNK_SIZE`] are split
//! into independently compressed chunks so no single deflate stream has to
//! hold the whole document.
//!
//! Chunked layout:
//!
//! ```text
//! [u32 BE meta_len][meta_len bytes: zlib(JSON ChunkMetadata)][chunk 0][chunk 1]...
//! ```
//!
//! There is no magic byte. [`try_decompress`] attempts the chunked layout first
//! and falls back to a single zlib stream when the header does not parse. A
//! zlib stream starts with `0x78`, so its first four bytes read as a length far
//! larger than any payload and the chunked attempt fails fast.

use crate::error::{CacheError, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::{debug, warn};

/// Payloads at or below this size are never compressed
pub const COMPRESSION_THRESHOLD: usize = 16 * 1024;

/// Payloads above this size are chunked; also the chunk size
pub const CHUNK_SIZE: usize = 500 * 1024;

/// Payloads above this size use [`CompressionLevel::Mid`]
pub const MID_LEVEL_THRESHOLD: usize = 100 * 1024;

/// Compression must save at least this fraction to be kept
pub const MIN_SAVINGS: f64 = 0.15;

const HEADER_LEN: usize = 4;

// Every stream this codec writes inflates to at most one chunk.
const MAX_INFLATED_LEN: usize = CHUNK_SIZE;

/// Compression effort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    Min,
    Mid,
    Max,
}

impl CompressionLevel {
    /// Level used for a payload of `len` bytes
    pub fn for_size(len: usize) -> Self {
        if len >= CHUNK_SIZE {
            CompressionLevel::Max
        } else if len > MID_LEVEL_THRESHOLD {
            CompressionLevel::Mid
        } else {
            CompressionLevel::Min
        }
    }

    fn as_flate2(self) -> Compression {
        match self {
            CompressionLevel::Min => Compression::new(1),
            CompressionLevel::Mid => Compression::new(6),
            CompressionLevel::Max => Compression::new(9),
        }
    }
}

/// Describes a chunked payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ChunkMetadata {
    chunk_count: usize,
    original_size: usize,
    chunk_sizes: Vec<usize>,
}

/// Compress with a level chosen from the payload size
///
/// Payloads at or below [`COMPRESSION_THRESHOLD`] are returned unmodified.
/// If compression fails the original bytes are returned.
pub fn compress(data: &[u8]) -> Vec<u8> {
    compress_with_level(data, CompressionLevel::for_size(data.len()))
}

/// Compress with an explicit level
///
/// The size threshold and chunking still apply.
pub fn compress_with_level(data: &[u8], level: CompressionLevel) -> Vec<u8> {
    if data.len() <= COMPRESSION_THRESHOLD {
        return data.to_vec();
    }

    let result = if data.len() > CHUNK_SIZE {
        compress_chunked(data, level)
    } else {
        deflate(data, level)
    };

    match result {
        Ok(compressed) => {
            debug!(
                "Compressed {} bytes to {} bytes ({:.1}% saved)",
                data.len(),
                compressed.len(),
                compression_ratio(data.len(), compressed.len())
            );
            compressed
        }
        Err(e) => {
            warn!("Compression failed, keeping raw payload: {}", e);
            data.to_vec()
        }
    }
}

/// Decompress, returning the input unchanged if it is not a compressed payload
pub fn decompress(data: &[u8]) -> Vec<u8> {
    match try_decompress(data) {
        Ok(decompressed) => decompressed,
        Err(e) => {
            debug!("Payload is not compressed ({}), returning as-is", e);
            data.to_vec()
        }
    }
}

/// Decompress, reporting payloads that cannot be decoded
pub fn try_decompress(data: &[u8]) -> Result<Vec<u8>> {
    if let Some(decompressed) = decompress_chunked(data) {
        return Ok(decompressed);
    }
    inflate(data)
}

/// Whether a compressed form saves enough to be worth storing
pub fn worth_compressing(raw_len: usize, compressed_len: usize) -> bool {
    if raw_len == 0 {
        return false;
    }
    (compressed_len as f64) <= (raw_len as f64) * (1.0 - MIN_SAVINGS)
}

/// Percentage saved by compression
pub fn compression_ratio(original: usize, compressed: usize) -> f64 {
    if original == 0 {
        return 0.0;
    }
    (1.0 - (compressed as f64 / original as f64)) * 100.0
}

fn deflate(data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level.as_flate2());
    encoder
        .write_all(data)
        .map_err(|e| CacheError::CompressionError(format!("zlib compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| CacheError::CompressionError(format!("zlib finalization failed: {}", e)))
}

fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data).take(MAX_INFLATED_LEN as u64 + 1);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| CacheError::CompressionError(format!("zlib decompression failed: {}", e)))?;
    if decompressed.len() > MAX_INFLATED_LEN {
        return Err(CacheError::CompressionError(format!(
            "zlib stream inflates past {} bytes",
            MAX_INFLATED_LEN
        )));
    }
    Ok(decompressed)
}

fn compress_chunked(data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    let mut chunks = Vec::with_capacity(data.len().div_ceil(CHUNK_SIZE));
    for chunk in data.chunks(CHUNK_SIZE) {
        chunks.push(deflate(chunk, level)?);
    }

    let metadata = ChunkMetadata {
        chunk_count: chunks.len(),
        original_size: data.len(),
        chunk_sizes: chunks.iter().map(Vec::len).collect(),
    };
    let metadata = deflate(&serde_json::to_vec(&metadata)?, CompressionLevel::Max)?;
    let metadata_len = u32::try_from(metadata.len())
        .map_err(|_| CacheError::CompressionError("chunk metadata too large".to_string()))?;

    let body_len: usize = chunks.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(HEADER_LEN + metadata.len() + body_len);
    out.extend_from_slice(&metadata_len.to_be_bytes());
    out.extend_from_slice(&metadata);
    for chunk in &chunks {
        out.extend_from_slice(chunk);
    }

    debug!("Compressed {} bytes into {} chunks", data.len(), chunks.len());
    Ok(out)
}

// Any mismatch means "not chunked"; the caller then tries a single stream.
fn decompress_chunked(data: &[u8]) -> Option<Vec<u8>> {
    let header: [u8; HEADER_LEN] = data.get(..HEADER_LEN)?.try_into().ok()?;
    let metadata_len = u32::from_be_bytes(header) as usize;
    let metadata_end = HEADER_LEN.checked_add(metadata_len)?;
    let metadata_bytes = data.get(HEADER_LEN..metadata_end)?;

    let metadata: ChunkMetadata = serde_json::from_slice(&inflate(metadata_bytes).ok()?).ok()?;
    if metadata.chunk_count != metadata.chunk_sizes.len() {
        return None;
    }
    if metadata.chunk_sizes.contains(&0) {
        return None;
    }
    // Sizes come from stored bytes; bound them before allocating.
    let max_size = metadata.chunk_count.checked_mul(CHUNK_SIZE)?;
    if metadata.original_size > max_size {
        return None;
    }
    if (metadata.chunk_count == 0) != (metadata.original_size == 0) {
        return None;
    }
    let body = &data[metadata_end..];
    let body_len = metadata
        .chunk_sizes
        .iter()
        .try_fold(0usize, |acc, size| acc.checked_add(*size))?;
    if body_len != body.len() {
        return None;
    }

    let mut out = Vec::with_capacity(metadata.original_size.min(CHUNK_SIZE));
    let mut offset = 0;
    for size in &metadata.chunk_sizes {
        out.extend_from_slice(&inflate(&body[offset..offset + size]).ok()?);
        offset += size;
    }

    if out.len() != metadata.original_size {
        return None;
    }
    Some(out)
}
