//! Block compression
//!
//! Compressed payloads are stored as chunks: a header with the summary and
//! per-block sizes followed by independently compressed blocks. The method
//! is never stored in the chunk; callers derive it from bulk data or file
//! flags.

mod chunk;
mod lzo;

pub use chunk::{
    CHUNK_BLOCK_SIZE, ChunkBlock, ChunkHeader, decompress_chunk, read_chunk_header, write_chunk,
};

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{ArchiveError, Result};

/// zlib compression flag
pub const COMPRESS_ZLIB: u32 = 1;
/// LZO1X compression flag
pub const COMPRESS_LZO: u32 = 2;
/// LZX compression flag
pub const COMPRESS_LZX: u32 = 4;
/// Encrypted LZO compression flag (Blade & Soul)
pub const COMPRESS_LZO_ENC: u32 = 8;

/// Block compression method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMethod {
    /// zlib stream
    Zlib,
    /// LZO1X
    Lzo,
    /// LZX (recognized, not decodable)
    Lzx,
    /// Encrypted LZO (recognized, not decodable)
    LzoEncrypted,
}

impl CompressionMethod {
    /// `COMPRESS_*` flag of this method
    pub const fn flag(self) -> u32 {
        match self {
            Self::Zlib => COMPRESS_ZLIB,
            Self::Lzo => COMPRESS_LZO,
            Self::Lzx => COMPRESS_LZX,
            Self::LzoEncrypted => COMPRESS_LZO_ENC,
        }
    }

    /// Method named by exactly one `COMPRESS_*` flag
    pub fn from_flags(flags: u32) -> Result<Self> {
        match flags {
            COMPRESS_ZLIB => Ok(Self::Zlib),
            COMPRESS_LZO => Ok(Self::Lzo),
            COMPRESS_LZX => Ok(Self::Lzx),
            COMPRESS_LZO_ENC => Ok(Self::LzoEncrypted),
            other => Err(ArchiveError::UnknownCompression(other)),
        }
    }
}

/// Upfront allocation limit for a declared output size
const MAX_PREALLOC: usize = 1 << 20;

/// Upper bound on LZO1X output per input byte
///
/// Long matches extend their length by 255 per zero byte.
const LZO_MAX_EXPANSION: usize = 256;

/// Decompress one block
///
/// At most `expected` bytes plus one are produced, so an oversized block is
/// visible to the caller as a length mismatch instead of an allocation.
/// Memory grows with the data actually produced, not with `expected`.
pub fn decompress(method: CompressionMethod, input: &[u8], expected: usize) -> Result<Vec<u8>> {
    trace!(
        "{:?} decompression of {} bytes, expecting {}",
        method,
        input.len(),
        expected
    );
    match method {
        CompressionMethod::Zlib => {
            let mut output = Vec::with_capacity(expected.min(MAX_PREALLOC));
            ZlibDecoder::new(input)
                .take(expected as u64 + 1)
                .read_to_end(&mut output)
                .map_err(|e| ArchiveError::DecompressionFailed(format!("zlib: {e}")))?;
            Ok(output)
        }
        CompressionMethod::Lzo => {
            let reachable = input
                .len()
                .saturating_mul(LZO_MAX_EXPANSION)
                .saturating_add(64);
            let mut output = vec![0u8; expected.min(reachable)];
            let produced = lzo::decompress(input, &mut output)?;
            output.truncate(produced);
            Ok(output)
        }
        method @ (CompressionMethod::Lzx | CompressionMethod::LzoEncrypted) => {
            Err(ArchiveError::UnsupportedCompression(method))
        }
    }
}

/// Compress one block; only zlib is supported
pub fn compress(method: CompressionMethod, input: &[u8]) -> Result<Vec<u8>> {
    if method != CompressionMethod::Zlib {
        return Err(ArchiveError::UnsupportedCompression(method));
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(input)?;
    Ok(encoder.finish()?)
}
