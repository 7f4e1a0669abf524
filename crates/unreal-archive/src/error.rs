//! Archive error types

use std::path::PathBuf;
use thiserror::Error;

use crate::compression::CompressionMethod;
use crate::profile::Game;

/// Archive error type
///
/// Every variant is terminal for the decode operation that raised it. There
/// is no partial-object recovery: callers report the file as unreadable.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Transfer would cross the soft end-of-object marker
    #[error("serializing behind stopper ({position:#X}+{size:#X} > {stopper:#X})")]
    PastStopper {
        /// Cursor position at the time of the transfer
        position: u64,
        /// Requested transfer size
        size: usize,
        /// Configured stopper
        stopper: u64,
    },

    /// Transfer would cross the end of the backing storage
    #[error("serializing behind end of data ({position:#X}+{size:#X} > {len:#X})")]
    PastEnd {
        /// Cursor position at the time of the transfer
        position: u64,
        /// Requested transfer size
        size: usize,
        /// Size of the backing storage
        len: u64,
    },

    /// Seek target outside of the backing storage
    #[error("seek to {position:#X} outside of data (size {len:#X})")]
    SeekOutOfRange {
        /// Requested position
        position: u64,
        /// Size of the backing storage
        len: u64,
    },

    /// Load-only operation attempted on a saving archive
    #[error("operation requires a loading archive")]
    NotLoading,

    /// Save-only operation attempted on a loading archive
    #[error("operation requires a saving archive")]
    NotSaving,

    /// Archive context was changed after detection completed
    #[error("archive context is locked after detection")]
    ContextLocked,

    /// Fixed-capacity container overflow
    #[error("capacity exceeded: {requested} > {capacity}")]
    CapacityExceeded {
        /// Number of elements requested
        requested: usize,
        /// Inline capacity
        capacity: usize,
    },

    /// Container index outside the live elements
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Number of live elements
        len: usize,
    },

    /// Package tag is neither the native nor the byte-swapped magic
    #[error("invalid package tag: {0:#010X}")]
    InvalidTag(u32),

    /// Serialized string has no NUL terminator
    #[error("serialized string is not null-terminated")]
    UnterminatedString,

    /// Negative element count
    #[error("negative element count: {0}")]
    NegativeCount(i64),

    /// Compact index magnitude does not fit in 32 bits
    #[error("compact index overflow: magnitude {0:#X}")]
    CompactIndexOverflow(u64),

    /// Per-element size recorded on disk disagrees with consumed bytes
    #[error("array element size mismatch: expected {expected} bytes, consumed {actual}")]
    ElementSizeMismatch {
        /// Bytes the header promised
        expected: u64,
        /// Bytes actually consumed
        actual: u64,
    },

    /// Deferred array skip position points backwards or outside the data
    #[error("invalid lazy array skip position {skip:#X} at {position:#X}")]
    InvalidLazyArraySkip {
        /// Recorded skip position
        skip: i64,
        /// Cursor position after reading it
        position: u64,
    },

    /// Name index outside the name table
    #[error("name index {index} outside name table of {len} entries")]
    NameIndexOutOfRange {
        /// Index read from the stream
        index: i32,
        /// Name table length
        len: usize,
    },

    /// Malformed compressed chunk header
    #[error("invalid compressed chunk: {0}")]
    InvalidChunk(String),

    /// Block decompressed to a different size than declared
    #[error("block {index} decompressed to {actual} bytes, header declares {expected}")]
    BlockSizeMismatch {
        /// Block number within the chunk
        index: usize,
        /// Declared uncompressed size
        expected: usize,
        /// Produced uncompressed size
        actual: usize,
    },

    /// Bulk payload length disagrees with its header
    #[error("bulk payload is {actual} bytes, header declares {expected}")]
    BulkSizeMismatch {
        /// Size implied by the header
        expected: u64,
        /// Size found in the stream
        actual: u64,
    },

    /// Unknown check value in a Vengeance object header
    #[error("unexpected Vengeance header check value {check:#X} at {position:#X}")]
    VengeanceHeader {
        /// Check value read from the stream
        check: i32,
        /// Position of the check value
        position: u64,
    },

    /// Bulk data flag combination not recognized for the active profile
    #[error("unsupported bulk data flags {flags:#X} for {game:?}")]
    UnsupportedBulkFlags {
        /// Raw flags
        flags: u32,
        /// Active game profile
        game: Game,
    },

    /// Compression flags do not name a known method
    #[error("unknown compression flags: {0:#X}")]
    UnknownCompression(u32),

    /// Compression method is recognized but cannot be decoded
    #[error("unsupported compression method: {0:?}")]
    UnsupportedCompression(CompressionMethod),

    /// Decompression failure
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    /// Size or offset beyond the 32-bit range of the pipeline
    #[error("size or offset out of 32-bit range: {0:#X}")]
    SizeOutOfRange(i64),

    /// Payload lives in another file but no source was supplied
    #[error("bulk data stored in a separate file but no external source was supplied")]
    MissingExternalSource,

    /// File could not be opened
    #[error("cannot open {}: {source}", path.display())]
    Open {
        /// Path of the file
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Failure annotated with the operation and position that triggered it
    #[error("{operation} failed at {position:#X}: {source}")]
    Operation {
        /// Name of the decode operation
        operation: &'static str,
        /// Cursor position when the operation started
        position: u64,
        /// Underlying error
        #[source]
        source: Box<ArchiveError>,
    },
}

impl ArchiveError {
    /// Wrap an error with the operation and position context
    pub fn in_operation(self, operation: &'static str, position: u64) -> Self {
        Self::Operation {
            operation,
            position,
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping operation annotations
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Operation { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether this is a stopper or end-of-data violation
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::PastStopper { .. } | Self::PastEnd { .. } | Self::SeekOutOfRange { .. }
        )
    }
}

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_context_keeps_root_cause() {
        let err = ArchiveError::PastEnd {
            position: 0x10,
            size: 4,
            len: 0x12,
        }
        .in_operation("FString", 0x0C);

        assert!(err.is_protocol_violation());
        assert!(matches!(err.root_cause(), ArchiveError::PastEnd { .. }));
        let text = err.to_string();
        assert!(text.contains("FString"));
        assert!(text.contains("0xC"));
    }

    #[test]
    fn test_unsupported_is_not_protocol_violation() {
        let err = ArchiveError::UnknownCompression(0x40);
        assert!(!err.is_protocol_violation());
        assert_eq!(err.to_string(), "unknown compression flags: 0x40");
    }
}
