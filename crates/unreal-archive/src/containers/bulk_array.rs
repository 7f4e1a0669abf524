//! Arrays with a verbatim payload fast path

use std::ops::Deref;

use tracing::trace;

use crate::archive::{Archive, Serializable, SerializeExt};
use crate::error::{ArchiveError, Result};
use crate::type_info::TypeInfo;

use super::{
    ArrayStorage, TArray, UntypedArray, serialize_array, serialize_count, serialize_elements,
    skip_fixed_array,
};

/// First version that stores the element size in front of bulk arrays
pub const BULK_ARRAY_ELEMENT_SIZE_VERSION: i32 = 453;

fn has_element_size<A: Archive + ?Sized>(ar: &A) -> bool {
    ar.context().version() >= BULK_ARRAY_ELEMENT_SIZE_VERSION
}

/// Array whose payload can be copied verbatim
///
/// The single-transfer path is taken only when the archive's version equals
/// the configured host version, the byte order is native and the element
/// is a simple type of the recorded size. Everything else goes through the
/// per-element path, followed by a check that exactly
/// `count * element_size` bytes were consumed.
#[derive(Debug, PartialEq, Eq)]
pub struct BulkArray<T> {
    items: TArray<T>,
}

impl<T> Default for BulkArray<T> {
    fn default() -> Self {
        Self {
            items: TArray::new(),
        }
    }
}

impl<T> BulkArray<T> {
    /// Wrap elements
    pub fn new(items: TArray<T>) -> Self {
        Self { items }
    }

    /// Elements
    pub fn items(&self) -> &TArray<T> {
        &self.items
    }

    /// Take the elements
    pub fn into_inner(self) -> TArray<T> {
        self.items
    }
}

impl<T> Deref for BulkArray<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T: Serializable + TypeInfo + Default> BulkArray<T> {
    fn verbatim_size<A: Archive + ?Sized>(ar: &A) -> Option<usize> {
        let context = ar.context();
        if context.host_version() != Some(context.version()) || ar.state().reverse_bytes() {
            return None;
        }
        if !T::simple_layout_applies(context) {
            return None;
        }
        T::LAYOUT.simple_size()
    }

    fn load<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let element_size: i32 = ar.load()?;
        if element_size < 0 {
            return Err(ArchiveError::SizeOutOfRange(i64::from(element_size)));
        }
        let element_size = element_size as usize;
        let mut count = 0;
        serialize_count(ar, &mut count)?;

        if let Some(size) = Self::verbatim_size(ar)
            && size == element_size
            && let Some(codec) = T::simple_codec()
        {
            let total = count
                .checked_mul(size)
                .ok_or(ArchiveError::SizeOutOfRange(count as i64))?;
            ar.check_transfer(total)?;
            trace!("Bulk array: verbatim copy of {} bytes", total);
            let mut raw = UntypedArray::zeroed(size, count);
            raw.serialize_run(ar, 1)?;
            self.items = raw.elements().map(codec.decode).collect();
            return Ok(());
        }

        let start = ar.tell();
        serialize_elements(&mut self.items, ar, count)?;
        let consumed = ar.tell() - start;
        let expected = (count as u64).saturating_mul(element_size as u64);
        if consumed != expected {
            return Err(ArchiveError::ElementSizeMismatch {
                expected,
                actual: consumed,
            });
        }
        Ok(())
    }

    fn save<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let size_at = ar.tell();
        ar.store(&0i32)?;
        let mut count = self.items.len();
        serialize_count(ar, &mut count)?;

        let fixed_size = T::LAYOUT
            .simple_size()
            .filter(|_| T::simple_layout_applies(ar.context()));
        let element_size = match fixed_size {
            Some(size) => {
                serialize_elements(&mut self.items, ar, count)?;
                size as u64
            }
            None => self.save_uniform(ar)?,
        };
        let end = ar.tell();

        let element_size = i32::try_from(element_size)
            .map_err(|_| ArchiveError::SizeOutOfRange(element_size as i64))?;
        ar.seek(size_at)?;
        ar.store(&element_size)?;
        ar.seek(end)
    }

    /// Write elements one by one; every element must take the same size
    fn save_uniform<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<u64> {
        let mut element_size = None;
        for item in self.items.iter_mut() {
            let start = ar.tell();
            ar.transfer(item)?;
            let size = ar.tell() - start;
            match element_size {
                None => element_size = Some(size),
                Some(expected) if expected != size => {
                    return Err(ArchiveError::ElementSizeMismatch {
                        expected,
                        actual: size,
                    });
                }
                Some(_) => {}
            }
        }
        Ok(element_size.unwrap_or(0))
    }
}

impl<T: Serializable + TypeInfo + Default> Serializable for BulkArray<T> {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        if !has_element_size(ar) {
            return serialize_array(&mut self.items, ar);
        }
        let start = ar.tell();
        let result = if ar.is_loading() {
            self.load(ar)
        } else {
            self.save(ar)
        };
        result.map_err(|e| e.in_operation("bulk array", start))
    }
}

impl<T> TypeInfo for BulkArray<T> {}

/// Skip a bulk array without reading it
///
/// Versions without a recorded element size use `fallback_size`.
pub fn skip_bulk_array<A: Archive + ?Sized>(ar: &mut A, fallback_size: usize) -> Result<()> {
    if !ar.is_loading() {
        return Err(ArchiveError::NotLoading);
    }
    if !has_element_size(ar) {
        return skip_fixed_array(ar, fallback_size);
    }
    let element_size: i32 = ar.load()?;
    if element_size < 0 {
        return Err(ArchiveError::SizeOutOfRange(i64::from(element_size)));
    }
    skip_fixed_array(ar, element_size as usize)
}
