//! Compressed chunk header and block-wise codec

use tracing::{debug, trace};

use crate::archive::{Archive, SerializeExt};
use crate::error::{ArchiveError, Result};
use crate::profile::{PACKAGE_FILE_TAG, PACKAGE_FILE_TAG_REV};

use super::{CompressionMethod, compress, decompress};

/// Default maximum uncompressed block size
pub const CHUNK_BLOCK_SIZE: usize = 0x20000;

/// Compressed and uncompressed size of one block (or of the whole chunk)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkBlock {
    /// Size of the compressed bytes
    pub compressed_size: usize,
    /// Size after decompression
    pub uncompressed_size: usize,
}

/// Chunk header: summary plus one entry per block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Maximum uncompressed size of one block
    pub block_size: usize,
    /// Totals for the whole chunk
    pub summary: ChunkBlock,
    /// Blocks in file order
    pub blocks: Vec<ChunkBlock>,
}

fn invalid(message: impl Into<String>) -> ArchiveError {
    ArchiveError::InvalidChunk(message.into())
}

/// Read one size field: 64-bit for UE4, 32-bit otherwise; both limited to
/// the 32-bit range
fn read_size<A: Archive + ?Sized>(ar: &mut A) -> Result<usize> {
    let value = if ar.context().uses_wide_chunk_sizes() {
        ar.load::<i64>()?
    } else {
        i64::from(ar.load::<i32>()?)
    };
    if !(0..=i64::from(i32::MAX)).contains(&value) {
        return Err(ArchiveError::SizeOutOfRange(value));
    }
    Ok(value as usize)
}

fn write_size<A: Archive + ?Sized>(ar: &mut A, value: usize) -> Result<()> {
    let value = i32::try_from(value).map_err(|_| ArchiveError::SizeOutOfRange(value as i64))?;
    if ar.context().uses_wide_chunk_sizes() {
        ar.store(&i64::from(value))
    } else {
        ar.store(&value)
    }
}

fn read_block<A: Archive + ?Sized>(ar: &mut A) -> Result<ChunkBlock> {
    Ok(ChunkBlock {
        compressed_size: read_size(ar)?,
        uncompressed_size: read_size(ar)?,
    })
}

fn read_header_fields<A: Archive + ?Sized>(ar: &mut A) -> Result<ChunkHeader> {
    // The block size is compared against the tag before range checking
    let raw_block_size = if ar.context().uses_wide_chunk_sizes() {
        ar.load::<i64>()?
    } else {
        i64::from(ar.load::<i32>()?)
    };
    let block_size = if raw_block_size as u32 == PACKAGE_FILE_TAG {
        CHUNK_BLOCK_SIZE
    } else if (1..=i64::from(i32::MAX)).contains(&raw_block_size) {
        raw_block_size as usize
    } else {
        return Err(ArchiveError::SizeOutOfRange(raw_block_size));
    };

    let summary = read_block(ar)?;
    let mut blocks = Vec::new();
    let mut compressed = 0usize;
    let mut uncompressed = 0usize;
    while compressed < summary.compressed_size {
        let block = read_block(ar)?;
        if block.compressed_size == 0 {
            return Err(invalid(format!("block {} has no compressed data", blocks.len())));
        }
        if block.uncompressed_size > block_size {
            return Err(invalid(format!(
                "block {} is {} bytes, maximum is {}",
                blocks.len(),
                block.uncompressed_size,
                block_size
            )));
        }
        compressed += block.compressed_size;
        uncompressed += block.uncompressed_size;
        blocks.push(block);
    }
    if compressed != summary.compressed_size {
        return Err(invalid(format!(
            "block sizes sum to {compressed} bytes, summary declares {}",
            summary.compressed_size
        )));
    }
    if uncompressed != summary.uncompressed_size {
        return Err(invalid(format!(
            "blocks decompress to {uncompressed} bytes, summary declares {}",
            summary.uncompressed_size
        )));
    }

    Ok(ChunkHeader {
        block_size,
        summary,
        blocks,
    })
}

/// Read a chunk header
///
/// A byte-swapped tag flips the archive's byte order for the rest of the
/// header only.
pub fn read_chunk_header<A: Archive + ?Sized>(ar: &mut A) -> Result<ChunkHeader> {
    let tag: u32 = ar.load()?;
    let swapped = match tag {
        PACKAGE_FILE_TAG => false,
        PACKAGE_FILE_TAG_REV => true,
        other => return Err(ArchiveError::InvalidTag(other)),
    };

    let original = ar.state().reverse_bytes();
    if swapped {
        ar.state_mut().set_reverse_bytes(!original);
    }
    let header = read_header_fields(ar);
    ar.state_mut().set_reverse_bytes(original);

    let header = header?;
    trace!(
        "Chunk header: block size {:#X}, {} blocks, {} -> {} bytes",
        header.block_size,
        header.blocks.len(),
        header.summary.compressed_size,
        header.summary.uncompressed_size
    );
    Ok(header)
}

/// Read and decompress a chunk at the cursor
///
/// The archive's compression override, when set, replaces `method`.
pub fn decompress_chunk<A: Archive + ?Sized>(
    ar: &mut A,
    method: CompressionMethod,
) -> Result<Vec<u8>> {
    let start = ar.tell();
    decode_chunk(ar, method).map_err(|e| e.in_operation("compressed chunk", start))
}

fn decode_chunk<A: Archive + ?Sized>(ar: &mut A, method: CompressionMethod) -> Result<Vec<u8>> {
    let method = match ar.state().compression_override() {
        Some(forced) => {
            if forced != method {
                debug!("Compression override: {:?} instead of {:?}", forced, method);
            }
            forced
        }
        None => method,
    };

    let header = read_chunk_header(ar)?;
    ar.check_transfer(header.summary.compressed_size)?;

    // Grows per block; the summary size alone is untrusted
    let mut output = Vec::with_capacity(
        header
            .summary
            .uncompressed_size
            .min(header.summary.compressed_size.saturating_mul(4)),
    );
    let mut compressed = Vec::new();
    for (index, block) in header.blocks.iter().enumerate() {
        compressed.resize(block.compressed_size, 0);
        ar.serialize_bytes(&mut compressed)?;
        let data = decompress(method, &compressed, block.uncompressed_size)?;
        if data.len() != block.uncompressed_size {
            return Err(ArchiveError::BlockSizeMismatch {
                index,
                expected: block.uncompressed_size,
                actual: data.len(),
            });
        }
        output.extend_from_slice(&data);
    }
    Ok(output)
}

/// Write `data` as a chunk of blocks of at most `block_size` bytes
pub fn write_chunk<A: Archive + ?Sized>(
    ar: &mut A,
    data: &[u8],
    method: CompressionMethod,
    block_size: usize,
) -> Result<()> {
    if ar.is_loading() {
        return Err(ArchiveError::NotSaving);
    }
    if block_size == 0 {
        return Err(invalid("block size must not be zero"));
    }

    let mut payloads = Vec::new();
    let mut blocks = Vec::new();
    for piece in data.chunks(block_size) {
        let compressed = compress(method, piece)?;
        blocks.push(ChunkBlock {
            compressed_size: compressed.len(),
            uncompressed_size: piece.len(),
        });
        payloads.push(compressed);
    }
    let summary = ChunkBlock {
        compressed_size: blocks.iter().map(|b| b.compressed_size).sum(),
        uncompressed_size: data.len(),
    };

    ar.store(&PACKAGE_FILE_TAG)?;
    write_size(ar, block_size)?;
    for block in std::iter::once(&summary).chain(&blocks) {
        write_size(ar, block.compressed_size)?;
        write_size(ar, block.uncompressed_size)?;
    }
    for mut payload in payloads {
        ar.serialize_bytes(&mut payload)?;
    }
    trace!(
        "Wrote chunk: {} blocks, {} -> {} bytes",
        blocks.len(),
        data.len(),
        summary.compressed_size
    );
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::archive::{MemReader, MemWriter};
    use crate::config::ArchiveConfig;
    use crate::profile::{ArchiveContext, Game, GameProfile, Platform};

    fn context(game: Game) -> ArchiveContext {
        ArchiveContext::new(500, 0, GameProfile::new(game, Platform::Pc))
    }

    fn sample() -> Vec<u8> {
        (0..10_000u32).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_chunk_round_trip() {
        for game in [Game::Ue3, Game::Ue4_5] {
            let mut writer = MemWriter::new().with_context(context(game));
            write_chunk(&mut writer, &sample(), CompressionMethod::Zlib, 4096).unwrap();
            let bytes = writer.into_inner();

            let mut reader = MemReader::new(&bytes).with_context(context(game));
            let data = decompress_chunk(&mut reader, CompressionMethod::Zlib).unwrap();
            assert_eq!(data, sample());
            assert!(reader.is_eof());
        }
    }

    #[test]
    fn test_header_geometry() {
        let mut writer = MemWriter::new().with_context(context(Game::Ue3));
        write_chunk(&mut writer, &sample(), CompressionMethod::Zlib, 4096).unwrap();
        let bytes = writer.into_inner();

        let mut reader = MemReader::new(&bytes).with_context(context(Game::Ue3));
        let header = read_chunk_header(&mut reader).unwrap();
        assert_eq!(header.block_size, 4096);
        assert_eq!(header.summary.uncompressed_size, 10_000);
        let sizes: Vec<usize> = header.blocks.iter().map(|b| b.uncompressed_size).collect();
        assert_eq!(sizes, vec![4096, 4096, 1808]);
    }

    #[test]
    fn test_swapped_tag_reverses_header_only() {
        let mut header = Vec::new();
        header.extend_from_slice(&PACKAGE_FILE_TAG.to_be_bytes());
        header.extend_from_slice(&PACKAGE_FILE_TAG.to_be_bytes());
        for value in [0i32, 0] {
            header.extend_from_slice(&value.to_be_bytes());
        }
        header.extend_from_slice(&7u32.to_le_bytes());

        let mut reader = MemReader::new(&header).with_context(context(Game::Ue3));
        let parsed = read_chunk_header(&mut reader).unwrap();
        assert_eq!(parsed.block_size, CHUNK_BLOCK_SIZE);
        assert!(parsed.blocks.is_empty());
        assert!(!reader.state().reverse_bytes());
        assert_eq!(reader.load::<u32>().unwrap(), 7);
    }

    #[test]
    fn test_invalid_tag() {
        let data = [0u8; 16];
        let mut reader = MemReader::new(&data).with_context(context(Game::Ue3));
        assert!(matches!(
            read_chunk_header(&mut reader),
            Err(ArchiveError::InvalidTag(0))
        ));
    }

    #[test]
    fn test_zero_size_block_rejected() {
        let mut data = Vec::new();
        for value in [PACKAGE_FILE_TAG as i32, 0x20000, 10, 10, 0, 0] {
            data.extend_from_slice(&value.to_le_bytes());
        }
        let mut reader = MemReader::new(&data).with_context(context(Game::Ue3));
        assert!(matches!(
            read_chunk_header(&mut reader),
            Err(ArchiveError::InvalidChunk(_))
        ));
    }

    #[test]
    fn test_overshoot_rejected() {
        let mut data = Vec::new();
        for value in [PACKAGE_FILE_TAG as i32, 0x20000, 10, 10, 12, 10] {
            data.extend_from_slice(&value.to_le_bytes());
        }
        let mut reader = MemReader::new(&data).with_context(context(Game::Ue3));
        assert!(matches!(
            read_chunk_header(&mut reader),
            Err(ArchiveError::InvalidChunk(_))
        ));
    }

    #[test]
    fn test_wide_size_out_of_range() {
        let mut data = PACKAGE_FILE_TAG.to_le_bytes().to_vec();
        data.extend_from_slice(&0x20000i64.to_le_bytes());
        data.extend_from_slice(&(i64::from(i32::MAX) + 1).to_le_bytes());
        data.extend_from_slice(&0i64.to_le_bytes());
        let mut reader = MemReader::new(&data).with_context(context(Game::Ue4_0));
        assert!(matches!(
            read_chunk_header(&mut reader),
            Err(ArchiveError::SizeOutOfRange(0x8000_0000))
        ));
    }

    #[test]
    fn test_block_size_mismatch() {
        let payload = compress(CompressionMethod::Zlib, b"abcdef").unwrap();
        let mut data = Vec::new();
        let size = payload.len() as i32;
        for value in [PACKAGE_FILE_TAG as i32, 0x20000, size, 5, size, 5] {
            data.extend_from_slice(&value.to_le_bytes());
        }
        data.extend_from_slice(&payload);

        let mut reader = MemReader::new(&data).with_context(context(Game::Ue3));
        let err = decompress_chunk(&mut reader, CompressionMethod::Zlib).unwrap_err();
        assert!(matches!(
            err.root_cause(),
            ArchiveError::BlockSizeMismatch {
                index: 0,
                expected: 5,
                actual: 6
            }
        ));
    }

    #[test]
    fn test_forged_sizes_do_not_preallocate() {
        let payload = compress(CompressionMethod::Zlib, b"abcdef").unwrap();
        let size = payload.len() as i32;
        for method in [CompressionMethod::Zlib, CompressionMethod::Lzo] {
            let mut data = Vec::new();
            for value in [PACKAGE_FILE_TAG as i32, i32::MAX, size, i32::MAX, size, i32::MAX] {
                data.extend_from_slice(&value.to_le_bytes());
            }
            data.extend_from_slice(&payload);

            let mut reader = MemReader::new(&data).with_context(context(Game::Ue3));
            let err = decompress_chunk(&mut reader, method).unwrap_err();
            assert!(matches!(
                err.root_cause(),
                ArchiveError::BlockSizeMismatch { .. } | ArchiveError::DecompressionFailed(_)
            ));
        }
    }

    #[test]
    fn test_compression_override() {
        let mut writer = MemWriter::new().with_context(context(Game::Ue3));
        write_chunk(&mut writer, b"override", CompressionMethod::Zlib, 64).unwrap();
        let bytes = writer.into_inner();

        let config = ArchiveConfig::default().with_compression(CompressionMethod::Zlib);
        let mut reader = MemReader::new(&bytes)
            .with_config(&config)
            .with_context(context(Game::Ue3));
        let data = decompress_chunk(&mut reader, CompressionMethod::Lzo).unwrap();
        assert_eq!(data, b"override");
    }
}
