//! Versioned binary archive layer for Unreal Engine 1-4 package data
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_possible_wrap)] // Intentional for binary operations
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::doc_markdown)] // Engine terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::similar_names)] // Domain-specific naming patterns
#![allow(clippy::float_cmp)] // Binary format requirements
#![allow(clippy::return_self_not_must_use)] // Builder patterns
#![allow(clippy::use_self)] // Type clarity
//! This crate decodes and encodes the binary layouts used by Unreal Engine
//! packages across engine generations and per-title variations. One
//! bidirectional [`Archive`] abstraction drives both directions: every
//! serializable type has a single `serialize` routine that reads from a
//! loading archive and writes to a saving one.
//!
//! # Layers
//!
//! - **Archive backends**: buffered files, memory buffers and an offsetting
//!   wrapper, all bounds-checked against the data end and an optional
//!   stopper
//! - **Containers**: arrays, maps and strings with three serialization
//!   strategies chosen from each element's [`TypeInfo`] layout
//! - **Deferred and bulk arrays**: skip-position prefixed arrays and arrays
//!   with a verbatim fast path
//! - **Bulk data and compressed chunks**: out-of-band payloads with zlib and
//!   LZO block decompression
//! - **Version and game profile**: the version pair, game and platform that
//!   every conditional layout decision reads
//!
//! # Example
//!
//! ```
//! use unreal_archive::{MemReader, MemWriter, SerializeExt, TArray, math::Vector};
//!
//! let mut vectors = TArray::from(vec![Vector::new(1.0, 2.0, 3.0)]);
//! let mut writer = MemWriter::new();
//! writer.transfer(&mut vectors)?;
//! let bytes = writer.into_inner();
//!
//! let mut reader = MemReader::new(&bytes);
//! let decoded: TArray<Vector> = reader.load()?;
//! assert_eq!(decoded.as_slice(), vectors.as_slice());
//! # Ok::<(), unreal_archive::ArchiveError>(())
//! ```

#![warn(missing_docs)]

pub mod archive;
pub mod bulk;
pub mod compact;
pub mod compression;
pub mod config;
pub mod containers;
pub mod error;
pub mod math;
pub mod name;
pub mod profile;
pub mod type_info;

pub use error::{ArchiveError, Result};

// Re-export commonly used types
pub use archive::{
    Archive, ArchiveKind, ArchiveState, FileReader, FileWriter, MemReader, MemWriter,
    ReaderWrapper, Serializable, SerializeExt,
};
pub use bulk::{BulkData, BulkDataFlags, ByteBulkData, IntBulkData, WordBulkData};
pub use compact::CompactIndex;
pub use compression::CompressionMethod;
pub use config::{ArchiveConfig, LazyPolicy};
pub use containers::{
    ArrayStorage, BulkArray, FString, LazyArray, StaticArray, StaticMap, StaticString, TArray,
    TMap, UntypedArray,
};
pub use name::Name;
pub use profile::{ArchiveContext, Game, GameProfile, Platform, probe_package};
pub use type_info::{Layout, TypeInfo};
