//! Buffered file archive backends

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, trace};

use super::{Archive, ArchiveKind, ArchiveState};
use crate::config::ArchiveConfig;
use crate::error::{ArchiveError, Result};

fn open_error(path: &Path, source: std::io::Error) -> ArchiveError {
    ArchiveError::Open {
        path: path.to_path_buf(),
        source,
    }
}

/// File reader with a read-ahead buffer
#[derive(Debug)]
pub struct FileReader {
    file: File,
    path: PathBuf,
    buffer: Vec<u8>,
    buffer_start: u64,
    buffer_capacity: usize,
    position: u64,
    len: u64,
    stopper: Option<u64>,
    state: ArchiveState,
}

impl FileReader {
    /// Open a file for reading
    pub fn open<P: AsRef<Path>>(path: P, config: &ArchiveConfig) -> Result<Self> {
        let path = path.as_ref();
        config.validate()?;
        let file = File::open(path).map_err(|e| open_error(path, e))?;
        let len = file.metadata().map_err(|e| open_error(path, e))?.len();
        debug!("Opened {} for reading ({} bytes)", path.display(), len);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            buffer: Vec::with_capacity(config.read_buffer_size),
            buffer_start: 0,
            buffer_capacity: config.read_buffer_size,
            position: 0,
            len,
            stopper: None,
            state: ArchiveState::with_config(true, config),
        })
    }

    /// Open a file that may legitimately be absent
    ///
    /// A missing file yields `Ok(None)`; every other failure is an error.
    pub fn open_optional<P: AsRef<Path>>(path: P, config: &ArchiveConfig) -> Result<Option<Self>> {
        match Self::open(path, config) {
            Ok(reader) => Ok(Some(reader)),
            Err(ArchiveError::Open { path, source }) if source.kind() == ErrorKind::NotFound => {
                debug!("Optional file {} is absent", path.display());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn buffered(&self, size: usize) -> Option<usize> {
        let start = self.position.checked_sub(self.buffer_start)?;
        let end = start.checked_add(size as u64)?;
        (end <= self.buffer.len() as u64).then_some(start as usize)
    }

    fn fill_buffer(&mut self) -> Result<()> {
        let wanted = (self.len - self.position).min(self.buffer_capacity as u64) as usize;
        self.buffer.resize(wanted, 0);
        self.file.seek(SeekFrom::Start(self.position))?;
        self.file.read_exact(&mut self.buffer)?;
        self.buffer_start = self.position;
        trace!(
            "Read-ahead {} bytes at {:#X} from {}",
            wanted,
            self.position,
            self.path.display()
        );
        Ok(())
    }
}

impl Archive for FileReader {
    fn state(&self) -> &ArchiveState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ArchiveState {
        &mut self.state
    }

    fn kind(&self) -> ArchiveKind {
        ArchiveKind::FileReader
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        if position > self.len {
            return Err(ArchiveError::SeekOutOfRange {
                position,
                len: self.len,
            });
        }
        self.position = position;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.position
    }

    fn size(&self) -> u64 {
        self.len
    }

    fn stopper(&self) -> Option<u64> {
        self.stopper
    }

    fn set_stopper(&mut self, stopper: Option<u64>) {
        self.stopper = stopper;
    }

    fn serialize_bytes(&mut self, data: &mut [u8]) -> Result<()> {
        self.check_transfer(data.len())?;
        if data.is_empty() {
            return Ok(());
        }

        if data.len() > self.buffer_capacity {
            self.file.seek(SeekFrom::Start(self.position))?;
            self.file.read_exact(data)?;
        } else {
            if self.buffered(data.len()).is_none() {
                self.fill_buffer()?;
            }
            let start = self.buffered(data.len()).ok_or(ArchiveError::PastEnd {
                position: self.position,
                size: data.len(),
                len: self.len,
            })?;
            data.copy_from_slice(&self.buffer[start..start + data.len()]);
        }
        self.position += data.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        debug!("Closing {}", self.path.display());
        self.buffer = Vec::new();
        self.buffer_start = 0;
        Ok(())
    }
}

/// File writer with a write-coalescing buffer
///
/// Buffered bytes are committed by [`Archive::close`] and, as a last resort,
/// when the writer is dropped.
#[derive(Debug)]
pub struct FileWriter {
    file: File,
    path: PathBuf,
    buffer: Vec<u8>,
    buffer_start: u64,
    buffer_capacity: usize,
    position: u64,
    len: u64,
    stopper: Option<u64>,
    state: ArchiveState,
}

impl FileWriter {
    /// Create (or truncate) a file for writing
    pub fn create<P: AsRef<Path>>(path: P, config: &ArchiveConfig) -> Result<Self> {
        let path = path.as_ref();
        config.validate()?;
        let file = File::create(path).map_err(|e| open_error(path, e))?;
        debug!("Opened {} for writing", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
            buffer: Vec::with_capacity(config.write_buffer_size),
            buffer_start: 0,
            buffer_capacity: config.write_buffer_size,
            position: 0,
            len: 0,
            stopper: None,
            state: ArchiveState::with_config(false, config),
        })
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Commit buffered bytes to the file
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.file.seek(SeekFrom::Start(self.buffer_start))?;
        self.file.write_all(&self.buffer)?;
        trace!(
            "Flushed {} bytes at {:#X} to {}",
            self.buffer.len(),
            self.buffer_start,
            self.path.display()
        );
        self.buffer_start += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }
}

impl Archive for FileWriter {
    fn state(&self) -> &ArchiveState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ArchiveState {
        &mut self.state
    }

    fn kind(&self) -> ArchiveKind {
        ArchiveKind::FileWriter
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        let len = self.size();
        if position > len {
            return Err(ArchiveError::SeekOutOfRange { position, len });
        }
        self.flush()?;
        self.position = position;
        self.buffer_start = position;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.position
    }

    fn size(&self) -> u64 {
        self.len
    }

    fn stopper(&self) -> Option<u64> {
        self.stopper
    }

    fn set_stopper(&mut self, stopper: Option<u64>) {
        self.stopper = stopper;
    }

    fn serialize_bytes(&mut self, data: &mut [u8]) -> Result<()> {
        self.check_transfer(data.len())?;
        if self.buffer_start + self.buffer.len() as u64 != self.position {
            self.flush()?;
            self.buffer_start = self.position;
        }

        self.buffer.extend_from_slice(data);
        self.position += data.len() as u64;
        self.len = self.len.max(self.position);
        if self.buffer.len() >= self.buffer_capacity {
            self.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.file.sync_all()?;
        debug!("Closed {} ({} bytes)", self.path.display(), self.len);
        Ok(())
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!("Failed to flush {} on drop: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::archive::SerializeExt;
    use tempfile::TempDir;

    fn small_buffers() -> ArchiveConfig {
        ArchiveConfig::default()
            .with_read_buffer_size(4)
            .with_write_buffer_size(4)
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("data.bin");
        let config = small_buffers();

        let mut writer = FileWriter::create(&path, &config).unwrap();
        for value in 0u32..10 {
            writer.store(&value).unwrap();
        }
        writer.seek(4).unwrap();
        writer.store(&0xAAu32).unwrap();
        assert_eq!(writer.size(), 40);
        writer.close().unwrap();
        drop(writer);

        let mut reader = FileReader::open(&path, &config).unwrap();
        assert_eq!(reader.size(), 40);
        assert_eq!(reader.load::<u32>().unwrap(), 0);
        assert_eq!(reader.load::<u32>().unwrap(), 0xAA);
        reader.seek(36).unwrap();
        assert_eq!(reader.load::<u32>().unwrap(), 9);
        assert!(reader.is_eof());
    }

    #[test]
    fn test_drop_flushes_buffer() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("dropped.bin");
        {
            let mut writer = FileWriter::create(&path, &ArchiveConfig::default()).unwrap();
            writer.store(&0x0102_0304u32).unwrap();
        }
        assert_eq!(std::fs::read(&path).unwrap(), vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_large_read_bypasses_buffer() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("large.bin");
        let payload: Vec<u8> = (0..=255u8).collect();
        std::fs::write(&path, &payload).unwrap();

        let mut reader = FileReader::open(&path, &small_buffers()).unwrap();
        let mut head = [0u8; 3];
        reader.serialize_bytes(&mut head).unwrap();
        let mut body = vec![0u8; 200];
        reader.serialize_bytes(&mut body).unwrap();
        assert_eq!(head, [0, 1, 2]);
        assert_eq!(body[..], payload[3..203]);
        assert!(reader.load::<u64>().is_ok());
        assert_eq!(reader.tell(), 211);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("absent.u");
        let config = ArchiveConfig::default();

        assert!(matches!(
            FileReader::open(&path, &config),
            Err(ArchiveError::Open { .. })
        ));
        assert!(FileReader::open_optional(&path, &config).unwrap().is_none());
    }

    #[test]
    fn test_read_past_end() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("short.bin");
        std::fs::write(&path, [1u8, 2]).unwrap();

        let mut reader = FileReader::open(&path, &ArchiveConfig::default()).unwrap();
        assert!(matches!(
            reader.load::<u32>(),
            Err(ArchiveError::PastEnd { len: 2, .. })
        ));
    }
}
