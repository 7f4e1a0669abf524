//! Archive abstraction
//!
//! An [`Archive`] is a bidirectional byte cursor: the same
//! [`Serializable::serialize`] call reads values from a loading archive and
//! writes them to a saving one. Backends only implement raw byte transfer,
//! positioning and the stopper; scalar transcoding, byte-order reversal and
//! the bounds checks are shared here.

mod file;
mod memory;
mod wrapper;

pub use file::{FileReader, FileWriter};
pub use memory::{MemReader, MemWriter};
pub use wrapper::ReaderWrapper;

use std::sync::Arc;

use tracing::trace;

use crate::compression::CompressionMethod;
use crate::config::{ArchiveConfig, LazyPolicy};
use crate::error::{ArchiveError, Result};
use crate::profile::ArchiveContext;

/// Concrete backend of an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    /// Buffered file reader
    FileReader,
    /// Buffered file writer
    FileWriter,
    /// In-memory reader
    MemReader,
    /// In-memory writer
    MemWriter,
    /// Offsetting adapter over another archive
    Wrapper,
}

/// Mode and context shared by all backends
#[derive(Debug, Clone)]
pub struct ArchiveState {
    loading: bool,
    reverse_bytes: bool,
    context: ArchiveContext,
    locked: bool,
    lazy_policy: LazyPolicy,
    compression_override: Option<CompressionMethod>,
    names: Option<Arc<[Arc<str>]>>,
}

impl ArchiveState {
    /// Create the state of a loading (`true`) or saving archive
    pub fn new(loading: bool) -> Self {
        Self {
            loading,
            reverse_bytes: false,
            context: ArchiveContext::default(),
            locked: false,
            lazy_policy: LazyPolicy::default(),
            compression_override: None,
            names: None,
        }
    }

    /// Create a state seeded from a configuration
    pub fn with_config(loading: bool, config: &ArchiveConfig) -> Self {
        let mut state = Self::new(loading);
        state.context = state.context.with_host_version(config.host_version);
        state.lazy_policy = config.lazy_policy;
        state.compression_override = config.compression_override;
        state
    }

    /// Whether the archive reads (`true`) or writes
    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    /// Whether scalars are byte-swapped
    pub const fn reverse_bytes(&self) -> bool {
        self.reverse_bytes
    }

    /// Enable or disable scalar byte-order reversal
    pub fn set_reverse_bytes(&mut self, reverse: bool) {
        self.reverse_bytes = reverse;
    }

    /// Version and profile context
    pub const fn context(&self) -> &ArchiveContext {
        &self.context
    }

    /// Replace the context; fails once the context has been locked
    pub fn set_context(&mut self, context: ArchiveContext) -> Result<()> {
        if self.locked {
            return Err(ArchiveError::ContextLocked);
        }
        self.context = context;
        Ok(())
    }

    /// Freeze the context for the rest of the archive's life
    pub fn lock_context(&mut self) {
        self.locked = true;
    }

    /// Whether detection has completed
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// Deferred array policy
    pub const fn lazy_policy(&self) -> LazyPolicy {
        self.lazy_policy
    }

    /// Set the deferred array policy
    pub fn set_lazy_policy(&mut self, policy: LazyPolicy) {
        self.lazy_policy = policy;
    }

    /// Forced decompressor, if any
    pub const fn compression_override(&self) -> Option<CompressionMethod> {
        self.compression_override
    }

    /// Name table used to resolve serialized names
    pub fn names(&self) -> Option<&Arc<[Arc<str>]>> {
        self.names.as_ref()
    }

    /// Install the name table of the package being decoded
    pub fn set_names(&mut self, names: Arc<[Arc<str>]>) {
        self.names = Some(names);
    }

    /// Copy byte order, context and decoding settings from another archive
    ///
    /// The loading direction is kept. Fails when this state is locked.
    pub fn setup_from(&mut self, other: &Self) -> Result<()> {
        if self.locked {
            return Err(ArchiveError::ContextLocked);
        }
        self.reverse_bytes = other.reverse_bytes;
        self.context = other.context;
        self.locked = other.locked;
        self.lazy_policy = other.lazy_policy;
        self.compression_override = other.compression_override;
        self.names.clone_from(&other.names);
        Ok(())
    }
}

/// Bidirectional byte cursor with version context
///
/// Implementors provide raw byte transfer and positioning; everything else
/// is provided on top of those. Positions are absolute within the
/// archive's own coordinate space.
pub trait Archive {
    /// Mode and context
    fn state(&self) -> &ArchiveState;

    /// Mutable mode and context
    fn state_mut(&mut self) -> &mut ArchiveState;

    /// Concrete backend
    fn kind(&self) -> ArchiveKind;

    /// Move the cursor; `position` must lie within `[0, size]`
    fn seek(&mut self, position: u64) -> Result<()>;

    /// Cursor position
    fn tell(&self) -> u64;

    /// Size of the backing storage (bytes written so far for writers)
    fn size(&self) -> u64;

    /// Soft end-of-object marker
    fn stopper(&self) -> Option<u64>;

    /// Set or clear the soft end-of-object marker
    fn set_stopper(&mut self, stopper: Option<u64>);

    /// Transfer raw bytes: fill `data` when loading, emit it when saving
    fn serialize_bytes(&mut self, data: &mut [u8]) -> Result<()>;

    /// Commit pending output and release buffers
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether this archive is (or wraps) the given backend
    fn is_a(&self, kind: ArchiveKind) -> bool {
        self.kind() == kind
    }

    /// Whether the archive reads
    fn is_loading(&self) -> bool {
        self.state().is_loading()
    }

    /// Version and profile context
    fn context(&self) -> &ArchiveContext {
        self.state().context()
    }

    /// Verify that `size` bytes can be transferred at the cursor
    fn check_transfer(&self, size: usize) -> Result<()> {
        let position = self.tell();
        let end = position.saturating_add(size as u64);
        if let Some(stopper) = self.stopper()
            && end > stopper
        {
            return Err(ArchiveError::PastStopper {
                position,
                size,
                stopper,
            });
        }
        if self.is_loading() && end > self.size() {
            return Err(ArchiveError::PastEnd {
                position,
                size,
                len: self.size(),
            });
        }
        Ok(())
    }

    /// Transfer one scalar, reversing its bytes when the archive's byte
    /// order differs from little-endian
    fn transcode_scalar(&mut self, data: &mut [u8]) -> Result<()> {
        if !self.state().reverse_bytes() {
            return self.serialize_bytes(data);
        }
        if self.is_loading() {
            self.serialize_bytes(data)?;
            data.reverse();
            Ok(())
        } else {
            data.reverse();
            let result = self.serialize_bytes(data);
            data.reverse();
            result
        }
    }

    /// Whether the cursor reached the end of the data
    fn is_eof(&self) -> bool {
        self.tell() >= self.size()
    }

    /// Whether the cursor sits exactly on the stopper
    fn is_stopper(&self) -> bool {
        self.stopper() == Some(self.tell())
    }

    /// Skip whatever remains of the current object
    fn drop_remaining(&mut self) -> Result<()> {
        if let Some(stopper) = self.stopper() {
            let position = self.tell();
            if stopper > position {
                trace!("Dropping {} bytes at {:#X}", stopper - position, position);
            }
            self.seek(stopper)?;
        }
        Ok(())
    }

    /// Hex dump of up to `count` bytes at the cursor without moving it
    fn dump_bytes(&mut self, count: usize) -> Result<String> {
        if !self.is_loading() {
            return Err(ArchiveError::NotLoading);
        }
        let position = self.tell();
        let mut limit = self.size();
        if let Some(stopper) = self.stopper() {
            limit = limit.min(stopper);
        }
        let available = limit.saturating_sub(position).min(count as u64) as usize;
        let mut data = vec![0u8; available];
        self.serialize_bytes(&mut data)?;
        self.seek(position)?;
        Ok(hex::encode(data))
    }
}

/// Value with a bidirectional archive representation
pub trait Serializable {
    /// Read into `self` from a loading archive or write `self` to a saving
    /// one
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()>;
}

/// Convenience transfer helpers available on every archive
pub trait SerializeExt: Archive {
    /// Transfer a value in the archive's direction
    fn transfer<T: Serializable>(&mut self, value: &mut T) -> Result<()> {
        value.serialize(self)
    }

    /// Read a fresh value
    fn load<T: Serializable + Default>(&mut self) -> Result<T> {
        if !self.is_loading() {
            return Err(ArchiveError::NotLoading);
        }
        let mut value = T::default();
        value.serialize(self)?;
        Ok(value)
    }

    /// Write a value
    fn store<T: Serializable + Clone>(&mut self, value: &T) -> Result<()> {
        if self.is_loading() {
            return Err(ArchiveError::NotSaving);
        }
        let mut value = value.clone();
        value.serialize(self)
    }

    /// Advance the cursor by `count` bytes, writing zeroes when saving
    fn skip_bytes(&mut self, count: u64) -> Result<()> {
        if self.is_loading() {
            let target = self.tell().saturating_add(count);
            if let Some(stopper) = self.stopper()
                && target > stopper
            {
                return Err(ArchiveError::PastStopper {
                    position: self.tell(),
                    size: count as usize,
                    stopper,
                });
            }
            self.seek(target)
        } else {
            let mut zeroes = vec![0u8; count as usize];
            self.serialize_bytes(&mut zeroes)
        }
    }
}

impl<A: Archive + ?Sized> SerializeExt for A {}

impl Serializable for u8 {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let mut byte = [*self];
        ar.serialize_bytes(&mut byte)?;
        *self = byte[0];
        Ok(())
    }
}

impl Serializable for i8 {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let mut byte = self.to_le_bytes();
        ar.serialize_bytes(&mut byte)?;
        *self = Self::from_le_bytes(byte);
        Ok(())
    }
}

macro_rules! scalar_serializable {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Serializable for $ty {
                fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
                    let mut bytes = self.to_le_bytes();
                    ar.transcode_scalar(&mut bytes)?;
                    if ar.is_loading() {
                        *self = <$ty>::from_le_bytes(bytes);
                    }
                    Ok(())
                }
            }
        )*
    };
}

scalar_serializable!(i16, u16, i32, u32, i64, u64, f32, f64);

/// Booleans are stored as 4-byte integers
impl Serializable for bool {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let mut value = i32::from(*self);
        value.serialize(ar)?;
        *self = value != 0;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::profile::{Game, GameProfile, Platform};
    use proptest::prelude::*;

    #[test]
    fn test_scalars_little_endian() {
        let mut writer = MemWriter::new();
        writer.store(&0x1234_5678u32).unwrap();
        writer.store(&-2i16).unwrap();
        writer.store(&7u8).unwrap();
        writer.store(&1.5f32).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(
            bytes,
            vec![0x78, 0x56, 0x34, 0x12, 0xFE, 0xFF, 7, 0x00, 0x00, 0xC0, 0x3F]
        );

        let mut reader = MemReader::new(&bytes);
        assert_eq!(reader.load::<u32>().unwrap(), 0x1234_5678);
        assert_eq!(reader.load::<i16>().unwrap(), -2);
        assert_eq!(reader.load::<u8>().unwrap(), 7);
        assert!((reader.load::<f32>().unwrap() - 1.5).abs() < f32::EPSILON);
        assert!(reader.is_eof());
    }

    #[test]
    fn test_bool_is_four_bytes() {
        let mut writer = MemWriter::new();
        writer.store(&true).unwrap();
        assert_eq!(writer.as_bytes(), &[1, 0, 0, 0]);

        let data = [0, 2, 0, 0];
        let mut reader = MemReader::new(&data);
        assert!(reader.load::<bool>().unwrap());
        assert_eq!(reader.tell(), 4);
    }

    #[test]
    fn test_reversed_scalar_differs_from_native() {
        let mut writer = MemWriter::new().with_reverse_bytes(true);
        writer.store(&0x0102_0304u32).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes, vec![1, 2, 3, 4]);

        let mut reversed = MemReader::new(&bytes).with_reverse_bytes(true);
        assert_eq!(reversed.load::<u32>().unwrap(), 0x0102_0304);

        let mut native = MemReader::new(&bytes);
        assert_eq!(native.load::<u32>().unwrap(), 0x0403_0201);
    }

    #[test]
    fn test_store_keeps_caller_value_when_reversing() {
        let mut writer = MemWriter::new().with_reverse_bytes(true);
        let mut value = 0xAABB_u16;
        writer.transfer(&mut value).unwrap();
        assert_eq!(value, 0xAABB);
        assert_eq!(writer.as_bytes(), &[0xAA, 0xBB]);
    }

    #[test]
    fn test_stopper_is_fatal() {
        let data = [0u8; 16];
        let mut reader = MemReader::new(&data);
        reader.set_stopper(Some(6));
        reader.load::<u32>().unwrap();
        let err = reader.load::<u32>().unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::PastStopper {
                position: 4,
                size: 4,
                stopper: 6
            }
        ));
        assert_eq!(reader.tell(), 4);

        reader.drop_remaining().unwrap();
        assert!(reader.is_stopper());
        assert_eq!(reader.tell(), 6);
    }

    #[test]
    fn test_past_end_never_clamps() {
        let data = [1u8, 2, 3];
        let mut reader = MemReader::new(&data);
        let err = reader.load::<u32>().unwrap_err();
        assert!(err.is_protocol_violation());
        assert_eq!(reader.tell(), 0);
    }

    #[test]
    fn test_writer_honours_stopper() {
        let mut writer = MemWriter::new();
        writer.set_stopper(Some(2));
        assert!(matches!(
            writer.store(&1u32),
            Err(ArchiveError::PastStopper { .. })
        ));
    }

    #[test]
    fn test_direction_misuse() {
        let mut writer = MemWriter::new();
        assert!(matches!(writer.load::<u32>(), Err(ArchiveError::NotLoading)));
        let data = [0u8; 4];
        let mut reader = MemReader::new(&data);
        assert!(matches!(reader.store(&1u32), Err(ArchiveError::NotSaving)));
    }

    #[test]
    fn test_dump_bytes_restores_position() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF, 0x01];
        let mut reader = MemReader::new(&data);
        reader.seek(1).unwrap();
        assert_eq!(reader.dump_bytes(3).unwrap(), "adbeef");
        assert_eq!(reader.tell(), 1);
        assert_eq!(reader.dump_bytes(100).unwrap(), "adbeef01");
    }

    #[test]
    fn test_context_lock() {
        let mut state = ArchiveState::new(true);
        let context = ArchiveContext::new(
            584,
            57,
            GameProfile::new(Game::Borderlands, Platform::Pc),
        );
        state.set_context(context).unwrap();
        state.lock_context();
        assert!(matches!(
            state.set_context(ArchiveContext::default()),
            Err(ArchiveError::ContextLocked)
        ));
        assert_eq!(state.context().game(), Game::Borderlands);

        let mut other = ArchiveState::new(false);
        other.setup_from(&state).unwrap();
        assert!(!other.is_loading());
        assert!(other.is_locked());
        assert_eq!(other.context().version(), 584);
    }

    #[test]
    fn test_skip_bytes() {
        let mut writer = MemWriter::new();
        writer.skip_bytes(3).unwrap();
        assert_eq!(writer.as_bytes(), &[0, 0, 0]);

        let data = [0u8; 8];
        let mut reader = MemReader::new(&data);
        reader.skip_bytes(5).unwrap();
        assert_eq!(reader.tell(), 5);
        assert!(reader.skip_bytes(4).is_err());
    }

    proptest! {
        #[test]
        fn prop_reversal_round_trip(value in any::<u64>(), other in any::<i32>()) {
            let mut writer = MemWriter::new().with_reverse_bytes(true);
            writer.store(&value).expect("Test operation should succeed");
            writer.store(&other).expect("Test operation should succeed");
            let bytes = writer.into_inner();

            let mut reader = MemReader::new(&bytes).with_reverse_bytes(true);
            prop_assert_eq!(reader.load::<u64>().expect("Test operation should succeed"), value);
            prop_assert_eq!(reader.load::<i32>().expect("Test operation should succeed"), other);

            let mut native = MemReader::new(&bytes);
            prop_assert_eq!(
                native.load::<u64>().expect("Test operation should succeed"),
                value.swap_bytes()
            );
        }
    }
}
