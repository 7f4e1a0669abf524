//! Container family
//!
//! All array-like containers share one serialization entry point,
//! [`serialize_array`], which reads or writes the element count and then
//! picks a strategy from the element's [`TypeInfo`] layout.

mod array;
mod bulk_array;
mod lazy;
mod map;
mod static_array;
mod string;
mod untyped;

pub use array::TArray;
pub use bulk_array::{BulkArray, skip_bulk_array};
pub use lazy::{LazyArray, skip_lazy_array};
pub use map::{MapPair, StaticMap, TMap};
pub use static_array::StaticArray;
pub use string::{FString, StaticString};
pub use untyped::UntypedArray;

use crate::archive::{Archive, Serializable, SerializeExt};
use crate::compact::serialize_index;
use crate::error::{ArchiveError, Result};
use crate::type_info::{Layout, TypeInfo};

/// Sentinel for "not found" when indices are stored as integers
pub const INDEX_NONE: i32 = -1;

/// Storage shared by the heap-backed and inline containers
pub trait ArrayStorage<T> {
    /// Live elements
    fn as_slice(&self) -> &[T];

    /// Live elements, mutable
    fn as_mut_slice(&mut self) -> &mut [T];

    /// Maximum number of elements, `None` when unbounded
    fn capacity_limit(&self) -> Option<usize>;

    /// Append an element
    fn push(&mut self, item: T) -> Result<()>;

    /// Insert an element, shifting the following ones up
    fn insert(&mut self, index: usize, item: T) -> Result<()>;

    /// Remove an element, keeping the order of the others
    fn remove(&mut self, index: usize) -> Option<T>;

    /// Remove an element by moving the last element into its slot
    ///
    /// Constant time, but the order of the remaining elements changes.
    fn swap_remove(&mut self, index: usize) -> Option<T>;

    /// Drop elements past `len`
    fn truncate(&mut self, len: usize);

    /// Prepare room for `count` elements about to be loaded
    fn reserve_for_load(&mut self, count: usize) -> Result<()>;

    /// Number of live elements
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether there are no live elements
    fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Drop all elements
    fn clear(&mut self) {
        self.truncate(0);
    }

    /// Index of the first element equal to `item`
    fn find(&self, item: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.as_slice().iter().position(|x| x == item)
    }
}

/// Bytes left before the stopper or the end of the data
pub(crate) fn remaining<A: Archive + ?Sized>(ar: &A) -> u64 {
    let limit = ar.stopper().map_or(ar.size(), |stopper| stopper.min(ar.size()));
    limit.saturating_sub(ar.tell())
}

/// Transfer an element count in the archive's index width
pub fn serialize_count<A: Archive + ?Sized>(ar: &mut A, count: &mut usize) -> Result<()> {
    let mut value = if ar.is_loading() {
        0
    } else {
        i32::try_from(*count).map_err(|_| ArchiveError::SizeOutOfRange(*count as i64))?
    };
    serialize_index(ar, &mut value)?;
    if value < 0 {
        return Err(ArchiveError::NegativeCount(i64::from(value)));
    }
    *count = value as usize;
    Ok(())
}

/// Serialize a count-prefixed array
pub fn serialize_array<T, S, A>(storage: &mut S, ar: &mut A) -> Result<()>
where
    T: Serializable + TypeInfo + Default,
    S: ArrayStorage<T>,
    A: Archive + ?Sized,
{
    let mut count = storage.len();
    serialize_count(ar, &mut count)?;
    serialize_elements(storage, ar, count)
}

/// Serialize `count` elements whose count has already been transferred
pub fn serialize_elements<T, S, A>(storage: &mut S, ar: &mut A, count: usize) -> Result<()>
where
    T: Serializable + TypeInfo + Default,
    S: ArrayStorage<T>,
    A: Archive + ?Sized,
{
    if ar.is_loading()
        && let Some(capacity) = storage.capacity_limit()
        && count > capacity
    {
        return Err(ArchiveError::CapacityExceeded {
            requested: count,
            capacity,
        });
    }

    let context = *ar.context();
    if let Layout::Simple {
        field_count,
        field_width,
    } = T::LAYOUT
        && T::simple_layout_applies(&context)
        && let Some(codec) = T::simple_codec()
    {
        let mut raw = UntypedArray::new(field_count * field_width);
        if ar.is_loading() {
            raw.serialize_simple(ar, count, field_count, field_width)?;
            storage.reserve_for_load(count)?;
            storage.clear();
            for element in raw.elements() {
                storage.push((codec.decode)(element))?;
            }
        } else {
            for item in storage.as_slice() {
                raw.add_with(|slot| (codec.encode)(item, slot));
            }
            raw.serialize_simple(ar, count, field_count, field_width)?;
        }
        return Ok(());
    }

    if !ar.is_loading() {
        for item in storage.as_mut_slice() {
            item.serialize(ar)?;
        }
        return Ok(());
    }

    storage.reserve_for_load(count)?;
    if T::LAYOUT == Layout::Raw {
        if count as u64 > remaining(ar) {
            return Err(ArchiveError::PastEnd {
                position: ar.tell(),
                size: count,
                len: ar.size(),
            });
        }
        storage.truncate(count);
        while storage.len() < count {
            storage.push(T::default())?;
        }
        for item in storage.as_mut_slice() {
            item.serialize(ar)?;
        }
    } else {
        storage.clear();
        for _ in 0..count {
            let mut item = T::default();
            item.serialize(ar)?;
            storage.push(item)?;
        }
    }
    Ok(())
}

/// Skip a count-prefixed array of fixed-size items
pub fn skip_fixed_array<A: Archive + ?Sized>(ar: &mut A, item_size: usize) -> Result<()> {
    let count: usize = if ar.is_loading() {
        let mut count = 0;
        serialize_count(ar, &mut count)?;
        count
    } else {
        return Err(ArchiveError::NotLoading);
    };
    let bytes = (count as u64)
        .checked_mul(item_size as u64)
        .ok_or(ArchiveError::SizeOutOfRange(count as i64))?;
    ar.skip_bytes(bytes)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::archive::{MemReader, MemWriter};
    use crate::math::Vector;
    use crate::profile::{ArchiveContext, Game, GameProfile, Platform};
    use proptest::prelude::*;

    /// Plain per-element encoding of a vector array
    fn naive_vectors(values: &[Vector], reverse: bool) -> Vec<u8> {
        let mut writer = MemWriter::new().with_reverse_bytes(reverse);
        writer.store(&(values.len() as i32)).unwrap();
        for v in values {
            writer.store(&v.x).unwrap();
            writer.store(&v.y).unwrap();
            writer.store(&v.z).unwrap();
        }
        writer.into_inner()
    }

    #[test]
    fn test_negative_count() {
        let data = (-1i32).to_le_bytes();
        let mut reader = MemReader::new(&data);
        assert!(matches!(
            reader.load::<TArray<u32>>(),
            Err(ArchiveError::NegativeCount(-1))
        ));
    }

    #[test]
    fn test_huge_count_fails_before_allocating() {
        let data = i32::MAX.to_le_bytes();
        let mut reader = MemReader::new(&data);
        let err = reader.load::<TArray<u64>>().unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_inline_capacity_checked_before_elements() {
        let mut writer = MemWriter::new();
        writer
            .transfer(&mut TArray::from(vec![FString::new("a"), FString::new("b")]))
            .unwrap();
        let bytes = writer.into_inner();

        let mut reader = MemReader::new(&bytes);
        let mut inline: StaticArray<FString, 1> = StaticArray::new();
        assert!(matches!(
            serialize_array(&mut inline, &mut reader),
            Err(ArchiveError::CapacityExceeded {
                requested: 2,
                capacity: 1
            })
        ));
        assert_eq!(reader.tell(), 4);
        assert!(inline.is_empty());
    }

    #[test]
    fn test_skip_fixed_array() {
        let mut writer = MemWriter::new();
        writer
            .transfer(&mut TArray::from(vec![1u16, 2, 3]))
            .unwrap();
        writer.store(&0xBEEFu16).unwrap();
        let bytes = writer.into_inner();

        let mut reader = MemReader::new(&bytes);
        skip_fixed_array(&mut reader, 2).unwrap();
        assert_eq!(reader.load::<u16>().unwrap(), 0xBEEF);
    }

    #[test]
    fn test_legacy_count_is_compact() {
        let context = ArchiveContext::new(118, 27, GameProfile::new(Game::Ut2, Platform::Pc));
        let mut writer = MemWriter::new().with_context(context);
        writer.transfer(&mut TArray::from(vec![7u8, 8])).unwrap();
        assert_eq!(writer.as_bytes(), &[2, 7, 8]);
    }

    #[test]
    fn test_simple_path_disabled_by_quirk() {
        let endwar = ArchiveContext::new(300, 0, GameProfile::new(Game::EndWar, Platform::Pc));
        let mut values = TArray::from(vec![Vector::new(1.0, 2.0, 3.0)]);
        let mut writer = MemWriter::new().with_context(endwar);
        writer.transfer(&mut values).unwrap();
        assert_eq!(writer.as_bytes().len(), 4 + 16);

        let bytes = writer.into_inner();
        let mut reader = MemReader::new(&bytes).with_context(endwar);
        let decoded: TArray<Vector> = reader.load().unwrap();
        assert_eq!(decoded.as_slice(), values.as_slice());
    }

    proptest! {
        #[test]
        fn prop_simple_matches_per_element(
            raw in proptest::collection::vec((any::<i32>(), any::<i32>(), any::<i32>()), 0..20),
            reverse in any::<bool>(),
        ) {
            let values: Vec<Vector> = raw
                .iter()
                .map(|&(x, y, z)| Vector::new(x as f32, y as f32, z as f32))
                .collect();
            let naive = naive_vectors(&values, reverse);

            let mut writer = MemWriter::new().with_reverse_bytes(reverse);
            writer
                .transfer(&mut TArray::from(values.clone()))
                .expect("Test operation should succeed");
            prop_assert_eq!(writer.as_bytes(), &naive[..]);

            let mut reader = MemReader::new(&naive).with_reverse_bytes(reverse);
            let decoded: TArray<Vector> = reader.load().expect("Test operation should succeed");
            prop_assert_eq!(decoded.as_slice(), &values[..]);
        }
    }
}
