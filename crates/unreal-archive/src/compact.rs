//! Compact index codec
//!
//! Legacy (pre-UE3) packages store counts and indices as 1-5 byte signed
//! integers. The first byte holds the sign (0x80), a continuation flag
//! (0x40) and the 6 most significant value bits; every following byte
//! holds a continuation flag (0x80) and 7 more value bits.

use crate::archive::{Archive, Serializable, SerializeExt};
use crate::error::{ArchiveError, Result};

/// Maximum encoded length
pub const MAX_COMPACT_INDEX_SIZE: usize = 5;

const SIGN_BIT: u8 = 0x80;
const FIRST_MORE_BIT: u8 = 0x40;
const MORE_BIT: u8 = 0x80;

/// Encode a value, returning the buffer and the number of used bytes
pub fn encode_compact_index(value: i32) -> ([u8; MAX_COMPACT_INDEX_SIZE], usize) {
    let magnitude = value.unsigned_abs();
    let len = match magnitude {
        0..0x40 => 1,
        0x40..0x2000 => 2,
        0x2000..0x10_0000 => 3,
        0x10_0000..0x800_0000 => 4,
        _ => 5,
    };

    let mut out = [0u8; MAX_COMPACT_INDEX_SIZE];
    let first_shift = 7 * (len - 1);
    out[0] = ((magnitude >> first_shift) & 0x3F) as u8;
    if value < 0 {
        out[0] |= SIGN_BIT;
    }
    if len > 1 {
        out[0] |= FIRST_MORE_BIT;
    }
    for (i, byte) in out.iter_mut().enumerate().take(len).skip(1) {
        let shift = 7 * (len - 1 - i);
        *byte = ((magnitude >> shift) & 0x7F) as u8;
        if i + 1 < len {
            *byte |= MORE_BIT;
        }
    }
    (out, len)
}

/// Decode a value from the start of `data`, returning it and the number of
/// consumed bytes
pub fn decode_compact_index(data: &[u8]) -> Result<(i32, usize)> {
    let mut bytes = data.iter().copied();
    decode_with(|| {
        bytes.next().ok_or(ArchiveError::PastEnd {
            position: data.len() as u64,
            size: 1,
            len: data.len() as u64,
        })
    })
}

fn decode_with<F>(mut next: F) -> Result<(i32, usize)>
where
    F: FnMut() -> Result<u8>,
{
    let first = next()?;
    let negative = first & SIGN_BIT != 0;
    let mut magnitude = u64::from(first & 0x3F);
    let mut more = first & FIRST_MORE_BIT != 0;
    let mut consumed = 1;

    while more && consumed < MAX_COMPACT_INDEX_SIZE {
        let byte = next()?;
        magnitude = (magnitude << 7) | u64::from(byte & 0x7F);
        more = byte & MORE_BIT != 0;
        consumed += 1;
    }

    let value = if negative {
        if magnitude > 1 << 31 {
            return Err(ArchiveError::CompactIndexOverflow(magnitude));
        }
        (magnitude as i64).wrapping_neg() as i32
    } else {
        i32::try_from(magnitude).map_err(|_| ArchiveError::CompactIndexOverflow(magnitude))?
    };
    Ok((value, consumed))
}

/// Read a compact index from an archive
pub fn read_compact_index<A: Archive + ?Sized>(ar: &mut A) -> Result<i32> {
    let (value, _) = decode_with(|| ar.load::<u8>())?;
    Ok(value)
}

/// Write a compact index to an archive
pub fn write_compact_index<A: Archive + ?Sized>(ar: &mut A, value: i32) -> Result<()> {
    let (mut bytes, len) = encode_compact_index(value);
    ar.serialize_bytes(&mut bytes[..len])
}

/// Transfer an index or count in the width the archive's engine uses:
/// compact for legacy engines, 4 bytes otherwise
pub fn serialize_index<A: Archive + ?Sized>(ar: &mut A, value: &mut i32) -> Result<()> {
    if ar.context().uses_compact_indices() {
        if ar.is_loading() {
            *value = read_compact_index(ar)?;
            Ok(())
        } else {
            write_compact_index(ar, *value)
        }
    } else {
        ar.transfer(value)
    }
}

/// Index that is always stored in compact form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CompactIndex(pub i32);

impl Serializable for CompactIndex {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        if ar.is_loading() {
            self.0 = read_compact_index(ar)?;
            Ok(())
        } else {
            write_compact_index(ar, self.0)
        }
    }
}
