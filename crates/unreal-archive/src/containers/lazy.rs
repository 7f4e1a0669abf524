//! Deferred arrays

use std::ops::Deref;

use tracing::trace;

use crate::archive::{Archive, Serializable, SerializeExt};
use crate::config::LazyPolicy;
use crate::error::{ArchiveError, Result};
use crate::type_info::TypeInfo;

use super::{ArrayStorage, TArray, serialize_array, skip_fixed_array};

/// Versions above this one store a skip position in front of lazy arrays
pub const LAZY_ARRAY_SKIP_VERSION: i32 = 61;

fn has_skip_position<A: Archive + ?Sized>(ar: &A) -> bool {
    ar.context().version() > LAZY_ARRAY_SKIP_VERSION
}

fn read_skip_position<A: Archive + ?Sized>(ar: &mut A) -> Result<u64> {
    let skip: i32 = ar.load()?;
    let position = ar.tell();
    if skip < 0 || (skip as u64) < position || skip as u64 > ar.size() {
        return Err(ArchiveError::InvalidLazyArraySkip {
            skip: i64::from(skip),
            position,
        });
    }
    Ok(skip as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingLoad {
    position: u64,
    end: u64,
}

/// Array preceded by the absolute position just past its data
///
/// With [`LazyPolicy::Deferred`] loading records where the data lives and
/// jumps over it; [`LazyArray::materialize`] reads it later.
#[derive(Debug, PartialEq, Eq)]
pub struct LazyArray<T> {
    items: TArray<T>,
    pending: Option<PendingLoad>,
}

impl<T> Default for LazyArray<T> {
    fn default() -> Self {
        Self {
            items: TArray::new(),
            pending: None,
        }
    }
}

impl<T> LazyArray<T> {
    /// Wrap already loaded elements
    pub fn new(items: TArray<T>) -> Self {
        Self {
            items,
            pending: None,
        }
    }

    /// Whether the contents still have to be read
    pub const fn is_deferred(&self) -> bool {
        self.pending.is_some()
    }

    /// Loaded elements; empty while deferred
    pub fn items(&self) -> &TArray<T> {
        &self.items
    }

    /// Take the loaded elements
    pub fn into_inner(self) -> TArray<T> {
        self.items
    }
}

impl<T: Serializable + TypeInfo + Default> LazyArray<T> {
    /// Read deferred contents from the archive they were recorded in
    ///
    /// The archive position is restored afterwards. Does nothing when the
    /// contents are already loaded.
    pub fn materialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<&TArray<T>> {
        let Some(pending) = self.pending else {
            return Ok(&self.items);
        };
        if !ar.is_loading() {
            return Err(ArchiveError::NotLoading);
        }

        let saved = ar.tell();
        ar.seek(pending.position)?;
        serialize_array(&mut self.items, ar)
            .map_err(|e| e.in_operation("lazy array", pending.position))?;
        let consumed_to = ar.tell();
        ar.seek(saved)?;
        if consumed_to != pending.end {
            return Err(ArchiveError::InvalidLazyArraySkip {
                skip: pending.end as i64,
                position: consumed_to,
            });
        }
        self.pending = None;
        Ok(&self.items)
    }

    fn load<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        if !has_skip_position(ar) {
            self.pending = None;
            return serialize_array(&mut self.items, ar);
        }

        let end = read_skip_position(ar)?;
        if ar.state().lazy_policy() == LazyPolicy::Deferred {
            let position = ar.tell();
            trace!(
                "Deferring lazy array at {:#X}, skipping to {:#X}",
                position, end
            );
            self.items.clear();
            self.pending = Some(PendingLoad { position, end });
            return ar.seek(end);
        }

        self.pending = None;
        serialize_array(&mut self.items, ar)?;
        let position = ar.tell();
        if position != end {
            return Err(ArchiveError::InvalidLazyArraySkip {
                skip: end as i64,
                position,
            });
        }
        Ok(())
    }

    fn save<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        if self.pending.is_some() {
            return Err(ArchiveError::NotLoading);
        }
        if !has_skip_position(ar) {
            return serialize_array(&mut self.items, ar);
        }

        let skip_at = ar.tell();
        ar.store(&0i32)?;
        serialize_array(&mut self.items, ar)?;
        let end = ar.tell();
        let skip = i32::try_from(end).map_err(|_| ArchiveError::SizeOutOfRange(end as i64))?;
        ar.seek(skip_at)?;
        ar.store(&skip)?;
        ar.seek(end)
    }
}

impl<T> Deref for LazyArray<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T: Serializable + TypeInfo + Default> Serializable for LazyArray<T> {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let start = ar.tell();
        let result = if ar.is_loading() {
            self.load(ar)
        } else {
            self.save(ar)
        };
        result.map_err(|e| e.in_operation("lazy array", start))
    }
}

impl<T> TypeInfo for LazyArray<T> {}

/// Skip a lazy array without reading it
///
/// Old versions carry no skip position; `item_size` is used to jump over
/// their fixed-size items.
pub fn skip_lazy_array<A: Archive + ?Sized>(ar: &mut A, item_size: usize) -> Result<()> {
    if !ar.is_loading() {
        return Err(ArchiveError::NotLoading);
    }
    if has_skip_position(ar) {
        let end = read_skip_position(ar)?;
        ar.seek(end)
    } else {
        skip_fixed_array(ar, item_size)
    }
}
