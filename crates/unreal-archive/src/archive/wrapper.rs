//! Offsetting adapter for segments embedded in a larger archive

use super::{Archive, ArchiveKind, ArchiveState};
use crate::error::{ArchiveError, Result};

/// Archive view whose position 0 is `offset` in the inner archive
///
/// Seek, tell, size and stopper are rebased; byte transfer and bounds
/// checks happen in the inner archive. The wrapper starts with a copy of
/// the inner archive's context.
#[derive(Debug)]
pub struct ReaderWrapper<'a, A: Archive + ?Sized> {
    inner: &'a mut A,
    offset: u64,
    state: ArchiveState,
}

impl<'a, A: Archive + ?Sized> ReaderWrapper<'a, A> {
    /// Wrap `inner`, treating inner position `offset` as position 0
    pub fn new(inner: &'a mut A, offset: u64) -> Result<Self> {
        if offset > inner.size() {
            return Err(ArchiveError::SeekOutOfRange {
                position: offset,
                len: inner.size(),
            });
        }
        let mut state = ArchiveState::new(inner.is_loading());
        state.setup_from(inner.state())?;
        if inner.tell() < offset {
            inner.seek(offset)?;
        }
        Ok(Self {
            inner,
            offset,
            state,
        })
    }

    /// Offset of this view in the inner archive
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Inner archive
    pub fn inner(&mut self) -> &mut A {
        &mut *self.inner
    }
}

impl<A: Archive + ?Sized> Archive for ReaderWrapper<'_, A> {
    fn state(&self) -> &ArchiveState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ArchiveState {
        &mut self.state
    }

    fn kind(&self) -> ArchiveKind {
        ArchiveKind::Wrapper
    }

    fn is_a(&self, kind: ArchiveKind) -> bool {
        kind == ArchiveKind::Wrapper || self.inner.is_a(kind)
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        let target = position
            .checked_add(self.offset)
            .ok_or(ArchiveError::SeekOutOfRange {
                position,
                len: self.size(),
            })?;
        self.inner.seek(target)
    }

    fn tell(&self) -> u64 {
        self.inner.tell().saturating_sub(self.offset)
    }

    fn size(&self) -> u64 {
        self.inner.size().saturating_sub(self.offset)
    }

    fn stopper(&self) -> Option<u64> {
        self.inner
            .stopper()
            .map(|stopper| stopper.saturating_sub(self.offset))
    }

    fn set_stopper(&mut self, stopper: Option<u64>) {
        self.inner
            .set_stopper(stopper.map(|stopper| stopper.saturating_add(self.offset)));
    }

    fn serialize_bytes(&mut self, data: &mut [u8]) -> Result<()> {
        if self.inner.tell() < self.offset {
            return Err(ArchiveError::SeekOutOfRange {
                position: self.inner.tell(),
                len: self.size(),
            });
        }
        self.inner.serialize_bytes(data)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
