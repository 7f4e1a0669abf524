//! NUL-terminated strings

use std::borrow::Cow;
use std::fmt;

use crate::archive::{Archive, Serializable, SerializeExt};
use crate::compact::serialize_index;
use crate::error::{ArchiveError, Result};
use crate::type_info::TypeInfo;

use super::{ArrayStorage, StaticArray};

/// Read the length-prefixed form: positive lengths count bytes, negative
/// lengths count UTF-16 units, zero is the empty string
fn load_string<A: Archive + ?Sized>(ar: &mut A) -> Result<Vec<u8>> {
    let mut len = 0i32;
    serialize_index(ar, &mut len)?;

    let data = match len {
        0 => return Ok(vec![0]),
        len if len > 0 => {
            let len = len as usize;
            ar.check_transfer(len)?;
            let mut data = vec![0u8; len];
            ar.serialize_bytes(&mut data)?;
            data
        }
        len => {
            let units = len.unsigned_abs() as usize;
            ar.check_transfer(units.saturating_mul(2))?;
            let mut data = Vec::with_capacity(units);
            for _ in 0..units {
                let unit: u16 = ar.load()?;
                data.push(u8::try_from(unit).unwrap_or(b'?'));
            }
            data
        }
    };

    if data.last() != Some(&0) {
        return Err(ArchiveError::UnterminatedString);
    }
    Ok(data)
}

/// Write the byte form; `data` includes the terminator unless empty
fn save_string<A: Archive + ?Sized>(ar: &mut A, data: &[u8]) -> Result<()> {
    if data.len() <= 1 {
        let mut len = 0i32;
        return serialize_index(ar, &mut len);
    }

    let mut len =
        i32::try_from(data.len()).map_err(|_| ArchiveError::SizeOutOfRange(data.len() as i64))?;
    serialize_index(ar, &mut len)?;
    let mut bytes = data.to_vec();
    ar.serialize_bytes(&mut bytes)
}

fn with_terminator(text: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(text.len() + 1);
    data.extend_from_slice(text.as_bytes());
    data.push(0);
    data
}

fn text_bytes(data: &[u8]) -> &[u8] {
    match data.split_last() {
        Some((0, rest)) => rest,
        _ => data,
    }
}

/// Heap-backed NUL-terminated string
///
/// The stored bytes include the terminator; a string whose count is 0 or 1
/// is empty.
#[derive(Debug, Default, PartialEq, Eq, Hash)]
pub struct FString {
    data: Vec<u8>,
}

impl FString {
    /// Create from text
    pub fn new(text: &str) -> Self {
        Self {
            data: with_terminator(text),
        }
    }

    /// Text bytes without the terminator
    pub fn as_bytes(&self) -> &[u8] {
        text_bytes(&self.data)
    }

    /// Stored bytes including the terminator
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.data
    }

    /// Number of stored bytes, terminator included
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// Text length without the terminator
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether only the terminator (or nothing) is stored
    pub fn is_empty(&self) -> bool {
        self.data.len() <= 1
    }

    /// Text, replacing invalid UTF-8
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Explicit deep copy
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}

impl From<&str> for FString {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl PartialEq<str> for FString {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl fmt::Display for FString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl Serializable for FString {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let start = ar.tell();
        let result = if ar.is_loading() {
            load_string(ar).map(|data| self.data = data)
        } else {
            save_string(ar, &self.data)
        };
        result.map_err(|e| e.in_operation("FString", start))
    }
}

impl TypeInfo for FString {}

/// NUL-terminated string with inline storage for `N` bytes (terminator
/// included)
#[derive(Debug, Default)]
pub struct StaticString<const N: usize> {
    data: StaticArray<u8, N>,
}

impl<const N: usize> StaticString<N> {
    /// Create from text; fails when the text does not fit
    pub fn new(text: &str) -> Result<Self> {
        let mut string = Self::default();
        string.assign(&with_terminator(text))?;
        Ok(string)
    }

    fn assign(&mut self, bytes: &[u8]) -> Result<()> {
        self.data.reserve_for_load(bytes.len())?;
        self.data.clear();
        for &byte in bytes {
            self.data.push(byte)?;
        }
        Ok(())
    }

    /// Text bytes without the terminator
    pub fn as_bytes(&self) -> &[u8] {
        text_bytes(&self.data)
    }

    /// Whether only the terminator (or nothing) is stored
    pub fn is_empty(&self) -> bool {
        ArrayStorage::len(&self.data) <= 1
    }

    /// Text, replacing invalid UTF-8
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl<const N: usize> PartialEq<str> for StaticString<N> {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const N: usize> Serializable for StaticString<N> {
    fn serialize<A: Archive + ?Sized>(&mut self, ar: &mut A) -> Result<()> {
        let start = ar.tell();
        let result = if ar.is_loading() {
            load_string(ar).and_then(|data| self.assign(&data))
        } else {
            let data = self.data.as_slice().to_vec();
            save_string(ar, &data)
        };
        result.map_err(|e| e.in_operation("FStaticString", start))
    }
}

impl<const N: usize> TypeInfo for StaticString<N> {}
