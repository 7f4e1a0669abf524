//! Untyped growable element buffer

use crate::archive::Archive;
use crate::error::{ArchiveError, Result};

/// Contiguous buffer of fixed-size opaque elements
///
/// Backs the simple-type fast path: a whole run is transferred with a single
/// byte transfer and byte-swapped field by field in one pass.
#[derive(Debug, PartialEq, Eq)]
pub struct UntypedArray {
    data: Vec<u8>,
    element_size: usize,
}

impl UntypedArray {
    /// Create an empty buffer for elements of `element_size` bytes
    pub fn new(element_size: usize) -> Self {
        Self {
            data: Vec::new(),
            element_size,
        }
    }

    /// Create a buffer holding `count` zeroed elements
    pub fn zeroed(element_size: usize, count: usize) -> Self {
        Self {
            data: vec![0; element_size * count],
            element_size,
        }
    }

    /// Size of one element
    pub const fn element_size(&self) -> usize {
        self.element_size
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len().checked_div(self.element_size).unwrap_or(0)
    }

    /// Whether the buffer has no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw bytes of all elements
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Bytes of element `index`
    pub fn element(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(self.element_size)?;
        self.data.get(start..start + self.element_size)
    }

    /// Iterate over element byte slices
    pub fn elements(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(self.element_size.max(1))
    }

    /// Append an element; `bytes` must be exactly one element long
    pub fn add(&mut self, bytes: &[u8]) -> Result<usize> {
        self.check_element(bytes)?;
        self.data.extend_from_slice(bytes);
        Ok(self.len().saturating_sub(1))
    }

    /// Append a zeroed element and let `fill` write it
    pub fn add_with<F: FnOnce(&mut [u8])>(&mut self, fill: F) -> usize {
        let start = self.data.len();
        self.data.resize(start + self.element_size, 0);
        fill(&mut self.data[start..]);
        self.len().saturating_sub(1)
    }

    /// Insert an element before `index`
    pub fn insert(&mut self, index: usize, bytes: &[u8]) -> Result<()> {
        self.check_element(bytes)?;
        if index > self.len() {
            return Err(ArchiveError::IndexOutOfBounds {
                index,
                len: self.len(),
            });
        }
        let at = index * self.element_size;
        self.data.splice(at..at, bytes.iter().copied());
        Ok(())
    }

    /// Remove `count` elements starting at `index`, keeping order
    pub fn remove(&mut self, index: usize, count: usize) -> Result<()> {
        let end = index.saturating_add(count);
        if end > self.len() {
            return Err(ArchiveError::IndexOutOfBounds {
                index: end,
                len: self.len(),
            });
        }
        self.data
            .drain(index * self.element_size..end * self.element_size);
        Ok(())
    }

    /// Remove one element by moving the last element into its slot
    pub fn fast_remove(&mut self, index: usize) -> Result<()> {
        let len = self.len();
        if index >= len {
            return Err(ArchiveError::IndexOutOfBounds { index, len });
        }
        let size = self.element_size;
        let last = (len - 1) * size;
        if index * size != last {
            self.data.copy_within(last..last + size, index * size);
        }
        self.data.truncate(last);
        Ok(())
    }

    /// Drop all elements, keeping room for `reserve` of them
    pub fn empty(&mut self, reserve: usize) {
        self.data.clear();
        self.data.reserve(reserve * self.element_size);
    }

    fn check_element(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() == self.element_size {
            Ok(())
        } else {
            Err(ArchiveError::ElementSizeMismatch {
                expected: self.element_size as u64,
                actual: bytes.len() as u64,
            })
        }
    }

    /// Transfer the element bytes as one run, byte-swapping each
    /// `field_width` field when the archive reverses byte order
    pub fn serialize_run<A: Archive + ?Sized>(&mut self, ar: &mut A, field_width: usize) -> Result<()> {
        let swap = ar.state().reverse_bytes() && field_width > 1;
        if ar.is_loading() {
            ar.serialize_bytes(&mut self.data)?;
            if swap {
                swap_fields(&mut self.data, field_width);
            }
            Ok(())
        } else if swap {
            swap_fields(&mut self.data, field_width);
            let result = ar.serialize_bytes(&mut self.data);
            swap_fields(&mut self.data, field_width);
            result
        } else {
            ar.serialize_bytes(&mut self.data)
        }
    }

    /// Serialize `count` elements as one run of homogeneous scalar fields
    ///
    /// The count itself is transferred by the caller. Loading replaces the
    /// contents with `count` elements; saving writes every element.
    pub fn serialize_simple<A: Archive + ?Sized>(
        &mut self,
        ar: &mut A,
        count: usize,
        field_count: usize,
        field_width: usize,
    ) -> Result<()> {
        if field_count * field_width != self.element_size {
            return Err(ArchiveError::ElementSizeMismatch {
                expected: self.element_size as u64,
                actual: (field_count * field_width) as u64,
            });
        }

        if ar.is_loading() {
            let total = count
                .checked_mul(self.element_size)
                .ok_or(ArchiveError::SizeOutOfRange(count as i64))?;
            ar.check_transfer(total)?;
            self.data.clear();
            self.data.resize(total, 0);
        }
        self.serialize_run(ar, field_width)
    }
}

fn swap_fields(data: &mut [u8], field_width: usize) {
    for field in data.chunks_exact_mut(field_width) {
        field.reverse();
    }
}
