//! In-memory archive backends

use std::sync::Arc;

use super::{Archive, ArchiveKind, ArchiveState};
use crate::config::ArchiveConfig;
use crate::error::{ArchiveError, Result};
use crate::profile::ArchiveContext;

#[derive(Debug, Clone)]
enum Buffer<'a> {
    Borrowed(&'a [u8]),
    Shared(Arc<[u8]>),
    Owned(Vec<u8>),
}

impl Buffer<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::Borrowed(data) => data,
            Self::Shared(data) => data,
            Self::Owned(data) => data,
        }
    }
}

/// Reader over a byte buffer
///
/// Independent readers over one shared buffer can decode in parallel.
#[derive(Debug, Clone)]
pub struct MemReader<'a> {
    data: Buffer<'a>,
    position: u64,
    stopper: Option<u64>,
    state: ArchiveState,
}

impl<'a> MemReader<'a> {
    /// Read from a borrowed buffer
    pub fn new(data: &'a [u8]) -> Self {
        Self::from_buffer(Buffer::Borrowed(data))
    }

    fn from_buffer(data: Buffer<'a>) -> Self {
        Self {
            data,
            position: 0,
            stopper: None,
            state: ArchiveState::new(true),
        }
    }

    /// Apply a configuration
    #[must_use]
    pub fn with_config(mut self, config: &ArchiveConfig) -> Self {
        self.state = ArchiveState::with_config(true, config);
        self
    }

    /// Set the version context
    #[must_use]
    pub fn with_context(mut self, context: ArchiveContext) -> Self {
        let host_version = context
            .host_version()
            .or_else(|| self.state.context().host_version());
        self.state.context = context.with_host_version(host_version);
        self
    }

    /// Enable scalar byte-order reversal
    #[must_use]
    pub fn with_reverse_bytes(mut self, reverse: bool) -> Self {
        self.state.set_reverse_bytes(reverse);
        self
    }

    /// Remaining bytes after the cursor
    pub fn remaining(&self) -> &[u8] {
        let data = self.data.as_slice();
        &data[(self.position as usize).min(data.len())..]
    }
}

impl MemReader<'static> {
    /// Read from a buffer shared with other readers
    pub fn from_shared(data: Arc<[u8]>) -> Self {
        Self::from_buffer(Buffer::Shared(data))
    }

    /// Read from an owned buffer
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self::from_buffer(Buffer::Owned(data))
    }
}

impl Archive for MemReader<'_> {
    fn state(&self) -> &ArchiveState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ArchiveState {
        &mut self.state
    }

    fn kind(&self) -> ArchiveKind {
        ArchiveKind::MemReader
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        let len = self.size();
        if position > len {
            return Err(ArchiveError::SeekOutOfRange { position, len });
        }
        self.position = position;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.position
    }

    fn size(&self) -> u64 {
        self.data.as_slice().len() as u64
    }

    fn stopper(&self) -> Option<u64> {
        self.stopper
    }

    fn set_stopper(&mut self, stopper: Option<u64>) {
        self.stopper = stopper;
    }

    fn serialize_bytes(&mut self, data: &mut [u8]) -> Result<()> {
        self.check_transfer(data.len())?;
        let start = self.position as usize;
        data.copy_from_slice(&self.data.as_slice()[start..start + data.len()]);
        self.position += data.len() as u64;
        Ok(())
    }
}

/// Growable in-memory writer
#[derive(Debug, Clone)]
pub struct MemWriter {
    data: Vec<u8>,
    position: u64,
    stopper: Option<u64>,
    state: ArchiveState,
}

impl Default for MemWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemWriter {
    /// Create an empty writer
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            position: 0,
            stopper: None,
            state: ArchiveState::new(false),
        }
    }

    /// Apply a configuration
    #[must_use]
    pub fn with_config(mut self, config: &ArchiveConfig) -> Self {
        self.state = ArchiveState::with_config(false, config);
        self
    }

    /// Set the version context
    #[must_use]
    pub fn with_context(mut self, context: ArchiveContext) -> Self {
        let host_version = context
            .host_version()
            .or_else(|| self.state.context().host_version());
        self.state.context = context.with_host_version(host_version);
        self
    }

    /// Enable scalar byte-order reversal
    #[must_use]
    pub fn with_reverse_bytes(mut self, reverse: bool) -> Self {
        self.state.set_reverse_bytes(reverse);
        self
    }

    /// Bytes written so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Take the written bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Archive for MemWriter {
    fn state(&self) -> &ArchiveState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ArchiveState {
        &mut self.state
    }

    fn kind(&self) -> ArchiveKind {
        ArchiveKind::MemWriter
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        let len = self.size();
        if position > len {
            return Err(ArchiveError::SeekOutOfRange { position, len });
        }
        self.position = position;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.position
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn stopper(&self) -> Option<u64> {
        self.stopper
    }

    fn set_stopper(&mut self, stopper: Option<u64>) {
        self.stopper = stopper;
    }

    fn serialize_bytes(&mut self, data: &mut [u8]) -> Result<()> {
        self.check_transfer(data.len())?;
        let start = self.position as usize;
        let end = start + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        self.position = end as u64;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::archive::SerializeExt;

    #[test]
    fn test_reader_seek_bounds() {
        let data = [0u8; 8];
        let mut reader = MemReader::new(&data);
        reader.seek(8).unwrap();
        assert!(reader.is_eof());
        assert!(matches!(
            reader.seek(9),
            Err(ArchiveError::SeekOutOfRange {
                position: 9,
                len: 8
            })
        ));
        assert_eq!(reader.tell(), 8);
    }

    #[test]
    fn test_shared_readers_are_independent() {
        let data: Arc<[u8]> = Arc::from(vec![1u8, 0, 0, 0, 2, 0, 0, 0]);
        let mut first = MemReader::from_shared(Arc::clone(&data));
        let mut second = MemReader::from_shared(data);
        second.seek(4).unwrap();
        assert_eq!(first.load::<u32>().unwrap(), 1);
        assert_eq!(second.load::<u32>().unwrap(), 2);
        assert_eq!(first.remaining(), &[2, 0, 0, 0]);
        assert!(first.is_a(ArchiveKind::MemReader));
    }

    #[test]
    fn test_writer_overwrites_after_seek() {
        let mut writer = MemWriter::new();
        writer.store(&0u32).unwrap();
        writer.store(&0xFFu8).unwrap();
        writer.seek(0).unwrap();
        writer.store(&0x0A0B_0C0Du32).unwrap();
        assert_eq!(writer.tell(), 4);
        writer.seek(writer.size()).unwrap();
        writer.store(&1u8).unwrap();
        assert_eq!(writer.into_inner(), vec![0x0D, 0x0C, 0x0B, 0x0A, 0xFF, 1]);
    }
}
