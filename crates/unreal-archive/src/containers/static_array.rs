//! Fixed-capacity inline array

use std::ops::{Deref, DerefMut};

use crate::archive::{Archive, Serializable};
use crate::error::{ArchiveError, Result};
use crate::type_info::TypeInfo;

use super::{ArrayStorage, serialize_array};

/// Array with inline storage for up to `N` elements
///
/// Same interface as [`super::TArray`]; growing past `N` is an error rather
/// than a reallocation. Unused slots hold `T::default()`.
#[derive(Debug)]
pub struct StaticArray<T, const N: usize> {
    items: [T; N],
    len: usize,
}

impl<T: Default, const N: usize> Default for StaticArray<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default, const N: usize> StaticArray<T, N> {
    /// Create an empty array
    pub fn new() -> Self {
        Self {
            items: std::array::from_fn(|_| T::default()),
            len: 0,
        }
    }

    /// Inline capacity
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Append an element and return its index
    pub fn add(&mut self, item: T) -> Result<usize> {
        ArrayStorage::push(self, item)?;
        Ok(self.len - 1)
    }

    /// Remove the element at `index` by moving the last element into its
    /// slot; do not use where element order matters
    pub fn fast_remove(&mut self, index: usize) -> Option<T> {
        ArrayStorage::swap_remove(self, index)
    }

    /// Drop all elements
    pub fn empty(&mut self) {
        ArrayStorage::clear(self);
    }

    /// Explicit deep copy
    #[must_use]
    pub fn duplicate(&self) -> Self
    where
        T: Clone,
    {
        Self {
            items: self.items.clone(),
            len: self.len,
        }
    }

    fn overflow(&self) -> ArchiveError {
        ArchiveError::CapacityExceeded {
            requested: self.len + 1,
            capacity: N,
        }
    }
}

impl<T, const N: usize> Deref for StaticArray<T, N> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items[..self.len]
    }
}

impl<T, const N: usize> DerefMut for StaticArray<T, N> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items[..self.len]
    }
}

impl<T: PartialEq, const N: usize> PartialEq for StaticArray<T, N> {
    fn eq(&self, other: &Self) -> bool {
        self[..] == other[..]
    }
}

impl<T: Default, const N: usize> ArrayStorage<T> for StaticArray<T, N> {
    fn as_slice(&self) -> &[T] {
        &self.items[..self.len]
    }

    fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items[..self.len]
    }

    fn capacity_limit(&self) -> Option<usize> {
        Some(N)
    }

    fn push(&mut self, item: T) -> Result<()> {
        if self.len == N {
            return Err(self.overflow());
        }
        self.items[self.len] = item;
        self.len += 1;
        Ok(())
    }

    fn insert(&mut self, index: usize, item: T) -> Result<()> {
        if index > self.len {
            return Err(ArchiveError::IndexOutOfBounds {
                index,
                len: self.len,
            });
        }
        if self.len == N {
            return Err(self.overflow());
        }
        self.items[self.len] = item;
        self.items[index..=self.len].rotate_right(1);
        self.len += 1;
        Ok(())
    }

    fn remove(&mut self, index: usize) -> Option<T> {
        if index >= self.len {
            return None;
        }
        self.items[index..self.len].rotate_left(1);
        self.len -= 1;
        Some(std::mem::take(&mut self.items[self.len]))
    }

    fn swap_remove(&mut self, index: usize) -> Option<T> {
        if index >= self.len {
            return None;
        }
        self.len -= 1;
        self.items.swap(index, self.len);
        Some(std::mem::take(&mut self.items[self.len]))
    }

    fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        for slot in &mut self.items[len..self.len] {
            *slot = T::default();
        }
        self.len = len;
    }

    fn reserve_for_load(&mut self, count: usize) -> Result<()> {
        if count > N {
            return Err(ArchiveError::CapacityExceeded {
                requested: count,
                capacity: N,
            });
        }
        Ok(())
    }
}

impl<T, const N: usize> Serializable for StaticArray<T, N>
where
    T: Serializable + TypeInfo + Default,
{
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        serialize_array(self, ar)
    }
}

impl<T, const N: usize> TypeInfo for StaticArray<T, N> {}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::archive::{MemReader, MemWriter, SerializeExt};

    fn filled() -> StaticArray<u32, 4> {
        let mut array = StaticArray::new();
        for i in 1..=4 {
            array.add(i).unwrap();
        }
        array
    }

    #[test]
    fn test_capacity() {
        let mut array = filled();
        assert!(matches!(
            array.add(5),
            Err(ArchiveError::CapacityExceeded {
                requested: 5,
                capacity: 4
            })
        ));
        assert!(array.insert(0, 5).is_err());
        assert_eq!(array.capacity(), 4);
    }

    #[test]
    fn test_remove_variants() {
        let mut array = filled();
        assert_eq!(ArrayStorage::remove(&mut array, 1), Some(2));
        assert_eq!(&array[..], &[1, 3, 4]);
        array.insert(0, 7).unwrap();
        assert_eq!(&array[..], &[7, 1, 3, 4]);
        assert_eq!(array.fast_remove(0), Some(7));
        assert_eq!(&array[..], &[4, 1, 3]);
        assert_eq!(array.find(&3), Some(2));
        array.empty();
        assert!(array.is_empty());
    }

    #[test]
    fn test_serialization_matches_heap_array() {
        let mut array = filled();
        let mut writer = MemWriter::new();
        writer.transfer(&mut array).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), 4 + 16);

        let mut reader = MemReader::new(&bytes);
        let decoded: StaticArray<u32, 4> = reader.load().unwrap();
        assert_eq!(decoded, array);

        let mut reader = MemReader::new(&bytes);
        assert!(matches!(
            reader.load::<StaticArray<u32, 2>>(),
            Err(ArchiveError::CapacityExceeded {
                requested: 4,
                capacity: 2
            })
        ));
    }
}
