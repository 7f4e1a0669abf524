//! Heap-backed typed array

use std::ops::{Deref, DerefMut};

use crate::archive::{Archive, Serializable};
use crate::error::{ArchiveError, Result};
use crate::type_info::TypeInfo;

use super::{ArrayStorage, INDEX_NONE, serialize_array};

/// Upper bound on capacity reserved from an untrusted element count
const MAX_PRESIZE: usize = 4096;

/// Typed, move-only array
///
/// Deliberately not `Clone`: large payloads are only copied through
/// [`TArray::duplicate`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TArray<T> {
    items: Vec<T>,
}

impl<T> Default for TArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TArray<T> {
    /// Create an empty array
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Create an empty array with room for `capacity` elements
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Elements as a slice
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Take the elements out
    pub fn into_vec(self) -> Vec<T> {
        self.items
    }

    /// Append an element and return its index
    pub fn add(&mut self, item: T) -> usize {
        self.items.push(item);
        self.items.len() - 1
    }

    /// Insert an element before `index`
    pub fn insert(&mut self, index: usize, item: T) -> Result<()> {
        if index > self.items.len() {
            return Err(ArchiveError::IndexOutOfBounds {
                index,
                len: self.items.len(),
            });
        }
        self.items.insert(index, item);
        Ok(())
    }

    /// Remove the element at `index`, keeping the order of the others
    pub fn remove(&mut self, index: usize) -> Option<T> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    /// Remove `count` elements starting at `index`, keeping order
    pub fn remove_range(&mut self, index: usize, count: usize) -> Result<()> {
        let end = index.saturating_add(count);
        if end > self.items.len() {
            return Err(ArchiveError::IndexOutOfBounds {
                index: end,
                len: self.items.len(),
            });
        }
        self.items.drain(index..end);
        Ok(())
    }

    /// Remove the element at `index` by moving the last element into its
    /// slot; do not use where element order matters
    pub fn fast_remove(&mut self, index: usize) -> Option<T> {
        (index < self.items.len()).then(|| self.items.swap_remove(index))
    }

    /// Drop all elements, keeping room for `reserve` of them
    pub fn empty(&mut self, reserve: usize) {
        self.items.clear();
        self.items.reserve(reserve);
    }

    /// Index of the first element equal to `item`
    pub fn find(&self, item: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.items.iter().position(|x| x == item)
    }

    /// Index of the first element equal to `item`, or [`INDEX_NONE`]
    pub fn find_index(&self, item: &T) -> i32
    where
        T: PartialEq,
    {
        self.find(item)
            .and_then(|index| i32::try_from(index).ok())
            .unwrap_or(INDEX_NONE)
    }

    /// Explicit deep copy
    #[must_use]
    pub fn duplicate(&self) -> Self
    where
        T: Clone,
    {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T> Deref for TArray<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> DerefMut for TArray<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items
    }
}

impl<T> From<Vec<T>> for TArray<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

impl<T> FromIterator<T> for TArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for TArray<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a TArray<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T> ArrayStorage<T> for TArray<T> {
    fn as_slice(&self) -> &[T] {
        &self.items
    }

    fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }

    fn capacity_limit(&self) -> Option<usize> {
        None
    }

    fn push(&mut self, item: T) -> Result<()> {
        self.items.push(item);
        Ok(())
    }

    fn insert(&mut self, index: usize, item: T) -> Result<()> {
        Self::insert(self, index, item)
    }

    fn remove(&mut self, index: usize) -> Option<T> {
        Self::remove(self, index)
    }

    fn swap_remove(&mut self, index: usize) -> Option<T> {
        self.fast_remove(index)
    }

    fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    fn reserve_for_load(&mut self, count: usize) -> Result<()> {
        self.items
            .reserve(count.saturating_sub(self.items.len()).min(MAX_PRESIZE));
        Ok(())
    }
}

impl<T: Serializable + TypeInfo + Default> Serializable for TArray<T> {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        serialize_array(self, ar)
    }
}

impl<T> TypeInfo for TArray<T> {}
