//! Bulk data blocks
//!
//! A bulk data block is a small header followed (or not) by a payload. The
//! header flags decide where the payload lives:
//!
//! - inline, right after the header
//! - elsewhere in the same package, at the recorded offset
//! - in a separate file, which the caller supplies as a second archive
//! - nowhere, when the block is marked unused
//!
//! Compression flags select the chunk decompressor applied to the payload.
//! Flag combinations that are not known for the active engine are rejected.

use tracing::trace;

use crate::archive::{Archive, Serializable, SerializeExt};
use crate::compression::{CHUNK_BLOCK_SIZE, CompressionMethod, decompress_chunk, write_chunk};
use crate::error::{ArchiveError, Result};
use crate::profile::{ArchiveContext, Game};
use crate::type_info::TypeInfo;

/// Raw bulk data flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BulkDataFlags(pub u32);

impl BulkDataFlags {
    /// UE3: payload stored in a different file
    pub const STORE_IN_SEPARATE_FILE: u32 = 0x01;
    /// zlib-compressed payload
    pub const COMPRESSED_ZLIB: u32 = 0x02;
    /// UE3: LZO-compressed payload
    pub const COMPRESSED_LZO: u32 = 0x10;
    /// Empty block without payload
    pub const UNUSED: u32 = 0x20;
    /// UE3: payload stored at another place of the same file
    pub const SEPARATE_DATA: u32 = 0x40;
    /// UE3: LZX-compressed payload
    pub const COMPRESSED_LZX: u32 = 0x80;
    /// UE3: encrypted LZO payload (Blade & Soul)
    pub const COMPRESSED_LZO_ENC: u32 = 0x100;

    /// UE4: payload stored at the end of the package
    pub const PAYLOAD_AT_END_OF_FILE: u32 = 0x01;
    /// UE4: payload follows the header
    pub const FORCE_INLINE_PAYLOAD: u32 = 0x40;

    const UE3_COMPRESSION: [(u32, CompressionMethod); 4] = [
        (Self::COMPRESSED_ZLIB, CompressionMethod::Zlib),
        (Self::COMPRESSED_LZO, CompressionMethod::Lzo),
        (Self::COMPRESSED_LZX, CompressionMethod::Lzx),
        (Self::COMPRESSED_LZO_ENC, CompressionMethod::LzoEncrypted),
    ];

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `mask` is set
    pub const fn contains(self, mask: u32) -> bool {
        self.0 & mask == mask
    }

    /// Decide payload location and compression for a context
    pub fn layout(self, context: &ArchiveContext) -> Result<BulkLayout> {
        let game = context.game();
        let unsupported = || ArchiveError::UnsupportedBulkFlags {
            flags: self.0,
            game,
        };

        if context.engine() == Game::Ue4 {
            let known = Self::PAYLOAD_AT_END_OF_FILE
                | Self::COMPRESSED_ZLIB
                | Self::UNUSED
                | Self::FORCE_INLINE_PAYLOAD;
            if self.0 & !known != 0
                || self.contains(Self::PAYLOAD_AT_END_OF_FILE | Self::FORCE_INLINE_PAYLOAD)
            {
                return Err(unsupported());
            }
            let location = if self.contains(Self::UNUSED) {
                BulkLocation::Unused
            } else if self.contains(Self::PAYLOAD_AT_END_OF_FILE) {
                BulkLocation::Elsewhere
            } else {
                BulkLocation::Inline
            };
            let compression = self
                .contains(Self::COMPRESSED_ZLIB)
                .then_some(CompressionMethod::Zlib);
            return Ok(BulkLayout {
                location,
                compression,
            });
        }

        let mut known = Self::STORE_IN_SEPARATE_FILE
            | Self::COMPRESSED_ZLIB
            | Self::COMPRESSED_LZO
            | Self::UNUSED
            | Self::SEPARATE_DATA
            | Self::COMPRESSED_LZX;
        if game == Game::BladeNSoul {
            known |= Self::COMPRESSED_LZO_ENC;
        }
        if self.0 & !known != 0
            || self.contains(Self::STORE_IN_SEPARATE_FILE | Self::SEPARATE_DATA)
        {
            return Err(unsupported());
        }

        let mut methods = Self::UE3_COMPRESSION
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, method)| *method);
        let compression = methods.next();
        if methods.next().is_some() {
            return Err(unsupported());
        }

        let location = if self.contains(Self::UNUSED) {
            BulkLocation::Unused
        } else if self.contains(Self::STORE_IN_SEPARATE_FILE) {
            BulkLocation::SeparateFile
        } else if self.contains(Self::SEPARATE_DATA) {
            BulkLocation::Elsewhere
        } else {
            BulkLocation::Inline
        };
        Ok(BulkLayout {
            location,
            compression,
        })
    }
}

/// Where a payload is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkLocation {
    /// No payload
    Unused,
    /// Immediately after the header
    Inline,
    /// At the recorded offset of the same package, or of the external
    /// source when one is supplied
    Elsewhere,
    /// At the recorded offset of an external source
    SeparateFile,
}

/// Resolved meaning of a flag set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkLayout {
    /// Payload location
    pub location: BulkLocation,
    /// Chunk compression, if any
    pub compression: Option<CompressionMethod>,
}

/// Bulk data block of `ELEMENT_SIZE`-byte elements
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BulkData<const ELEMENT_SIZE: usize> {
    flags: BulkDataFlags,
    element_count: i32,
    offset_in_file: i64,
    size_on_disk: i32,
    data: Vec<u8>,
}

/// Bulk data of bytes
pub type ByteBulkData = BulkData<1>;
/// Bulk data of 16-bit words
pub type WordBulkData = BulkData<2>;
/// Bulk data of 32-bit integers
pub type IntBulkData = BulkData<4>;

impl<const ELEMENT_SIZE: usize> BulkData<ELEMENT_SIZE> {
    /// Create an inline block from a payload
    ///
    /// The payload length must be a multiple of `ELEMENT_SIZE`.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() % ELEMENT_SIZE != 0 {
            return Err(ArchiveError::BulkSizeMismatch {
                expected: (data.len() / ELEMENT_SIZE * ELEMENT_SIZE) as u64,
                actual: data.len() as u64,
            });
        }
        let element_count = i32::try_from(data.len() / ELEMENT_SIZE)
            .map_err(|_| ArchiveError::SizeOutOfRange(data.len() as i64))?;
        Ok(Self {
            element_count,
            data,
            ..Self::default()
        })
    }

    /// Set the flags used when saving
    #[must_use]
    pub fn with_flags(mut self, flags: BulkDataFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Header flags
    pub const fn flags(&self) -> BulkDataFlags {
        self.flags
    }

    /// Number of elements
    pub const fn element_count(&self) -> i32 {
        self.element_count
    }

    /// Recorded payload offset
    pub const fn offset_in_file(&self) -> i64 {
        self.offset_in_file
    }

    /// Recorded payload size on disk (compressed size when compressed)
    pub const fn size_on_disk(&self) -> i32 {
        self.size_on_disk
    }

    /// Loaded payload
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Take the loaded payload
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Uncompressed payload length implied by the header
    pub fn payload_len(&self) -> Result<usize> {
        let count = usize::try_from(self.element_count)
            .map_err(|_| ArchiveError::NegativeCount(i64::from(self.element_count)))?;
        count
            .checked_mul(ELEMENT_SIZE)
            .ok_or(ArchiveError::SizeOutOfRange(i64::from(self.element_count)))
    }

    /// Transfer the header fields
    ///
    /// Fields are flags, element count, payload offset and size on disk.
    /// The offset is 64-bit for UE4 archives from
    /// `VER_UE4_BULKDATA_AT_LARGE_OFFSETS` on and 32-bit otherwise.
    pub fn serialize_header<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        ar.transfer(&mut self.flags.0)?;
        ar.transfer(&mut self.element_count)?;
        if ar.context().uses_wide_bulk_offsets() {
            ar.transfer(&mut self.offset_in_file)?;
            if self.offset_in_file > i64::from(i32::MAX) {
                return Err(ArchiveError::SizeOutOfRange(self.offset_in_file));
            }
        } else {
            let mut offset = i32::try_from(self.offset_in_file)
                .map_err(|_| ArchiveError::SizeOutOfRange(self.offset_in_file))?;
            ar.transfer(&mut offset)?;
            self.offset_in_file = i64::from(offset);
        }
        ar.transfer(&mut self.size_on_disk)
    }

    /// Read the payload described by an already loaded header
    ///
    /// `external` is the archive holding payloads stored outside the
    /// current one; it is required for separate-file payloads.
    pub fn read_payload<A: Archive + ?Sized>(
        &mut self,
        ar: &mut A,
        external: Option<&mut dyn Archive>,
    ) -> Result<()> {
        if !ar.is_loading() {
            return Err(ArchiveError::NotLoading);
        }
        let layout = self.flags.layout(ar.context())?;
        trace!(
            "Bulk data: flags {:#X}, {} elements, {:?}, {:?}",
            self.flags.0, self.element_count, layout.location, layout.compression
        );

        match (layout.location, external) {
            (BulkLocation::Unused, _) => {
                self.data.clear();
                Ok(())
            }
            (BulkLocation::Inline, _) => {
                let start = ar.tell();
                self.read_here(ar, layout.compression)?;
                let consumed = ar.tell() - start;
                if self.size_on_disk >= 0 && consumed != self.size_on_disk as u64 {
                    return Err(ArchiveError::BulkSizeMismatch {
                        expected: self.size_on_disk as u64,
                        actual: consumed,
                    });
                }
                Ok(())
            }
            (BulkLocation::Elsewhere | BulkLocation::SeparateFile, Some(source)) => {
                if !source.state().is_locked() {
                    source.state_mut().setup_from(ar.state())?;
                }
                self.read_at(source, layout.compression)
            }
            (BulkLocation::Elsewhere, None) => self.read_at(ar, layout.compression),
            (BulkLocation::SeparateFile, None) => Err(ArchiveError::MissingExternalSource),
        }
    }

    fn read_at<A: Archive + ?Sized>(
        &mut self,
        ar: &mut A,
        compression: Option<CompressionMethod>,
    ) -> Result<()> {
        let offset = u64::try_from(self.offset_in_file)
            .map_err(|_| ArchiveError::SizeOutOfRange(self.offset_in_file))?;
        let saved = ar.tell();
        ar.seek(offset)?;
        let result = self.read_here(ar, compression);
        ar.seek(saved)?;
        result
    }

    fn read_here<A: Archive + ?Sized>(
        &mut self,
        ar: &mut A,
        compression: Option<CompressionMethod>,
    ) -> Result<()> {
        let expected = self.payload_len()?;
        self.data = match compression {
            Some(method) => decompress_chunk(ar, method)?,
            None => {
                ar.check_transfer(expected)?;
                let mut data = vec![0u8; expected];
                ar.serialize_bytes(&mut data)?;
                data
            }
        };
        if self.data.len() != expected {
            return Err(ArchiveError::BulkSizeMismatch {
                expected: expected as u64,
                actual: self.data.len() as u64,
            });
        }
        Ok(())
    }

    /// Read the header and skip the payload without decoding it
    pub fn skip<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        if !ar.is_loading() {
            return Err(ArchiveError::NotLoading);
        }
        self.serialize_header(ar)?;
        let layout = self.flags.layout(ar.context())?;
        if layout.location == BulkLocation::Inline {
            let size = u64::try_from(self.size_on_disk)
                .map_err(|_| ArchiveError::SizeOutOfRange(i64::from(self.size_on_disk)))?;
            trace!("Skipping {} bytes of inline bulk data", size);
            ar.skip_bytes(size)?;
        }
        Ok(())
    }

    /// Read the header and its payload
    pub fn load<A: Archive + ?Sized>(
        &mut self,
        ar: &mut A,
        external: Option<&mut dyn Archive>,
    ) -> Result<()> {
        let start = ar.tell();
        self.serialize_header(ar)
            .and_then(|()| self.read_payload(ar, external))
            .map_err(|e| e.in_operation("bulk data", start))
    }

    /// Write the header and an inline payload
    ///
    /// Location flags are cleared. A zlib flag writes the payload as a
    /// compressed chunk; other compression methods cannot be written.
    pub fn save<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        if ar.is_loading() {
            return Err(ArchiveError::NotSaving);
        }
        let start = ar.tell();
        self.save_inline(ar)
            .map_err(|e| e.in_operation("bulk data", start))
    }

    fn save_inline<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let layout = self.flags.layout(ar.context())?;
        if let Some(method) = layout.compression
            && method != CompressionMethod::Zlib
        {
            return Err(ArchiveError::UnsupportedCompression(method));
        }

        let location_bits = BulkDataFlags::STORE_IN_SEPARATE_FILE | BulkDataFlags::SEPARATE_DATA;
        self.flags.0 &= !location_bits;
        self.element_count = i32::try_from(self.data.len() / ELEMENT_SIZE)
            .map_err(|_| ArchiveError::SizeOutOfRange(self.data.len() as i64))?;
        self.size_on_disk = 0;
        self.offset_in_file = 0;

        let header_at = ar.tell();
        self.serialize_header(ar)?;
        let payload_at = ar.tell();
        if layout.location != BulkLocation::Unused {
            match layout.compression {
                Some(method) => write_chunk(ar, &self.data, method, CHUNK_BLOCK_SIZE)?,
                None => {
                    let mut data = self.data.clone();
                    ar.serialize_bytes(&mut data)?;
                }
            }
        }
        let end = ar.tell();

        self.size_on_disk = i32::try_from(end - payload_at)
            .map_err(|_| ArchiveError::SizeOutOfRange((end - payload_at) as i64))?;
        self.offset_in_file = payload_at as i64;
        ar.seek(header_at)?;
        self.serialize_header(ar)?;
        ar.seek(end)
    }
}

impl<const ELEMENT_SIZE: usize> Serializable for BulkData<ELEMENT_SIZE> {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        if ar.is_loading() {
            self.load(ar, None)
        } else {
            self.save(ar)
        }
    }
}

impl<const ELEMENT_SIZE: usize> TypeInfo for BulkData<ELEMENT_SIZE> {}
