//! Configuration threaded through archive construction

use serde::{Deserialize, Serialize};

use crate::compression::CompressionMethod;
use crate::error::{ArchiveError, Result};
use crate::profile::{Game, Platform};

/// Default read-ahead buffer of the file reader
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default write-coalescing buffer of the file writer
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Loading strategy for deferred arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LazyPolicy {
    /// Materialize contents while the surrounding object is decoded
    #[default]
    Eager,
    /// Record the payload position and skip it until first access
    Deferred,
}

/// Archive configuration
///
/// Replaces process-wide overrides: every archive receives its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Force this game instead of detecting it from the header
    pub game_override: Option<Game>,

    /// Force this platform instead of deriving it from the byte order
    pub platform_override: Option<Platform>,

    /// Force this decompressor instead of the flag-derived method
    pub compression_override: Option<CompressionMethod>,

    /// Format version whose on-disk layout equals the in-memory layout
    pub host_version: Option<i32>,

    /// Loading strategy for deferred arrays
    pub lazy_policy: LazyPolicy,

    /// File reader buffer size (in bytes)
    pub read_buffer_size: usize,

    /// File writer buffer size (in bytes)
    pub write_buffer_size: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            game_override: None,
            platform_override: None,
            compression_override: None,
            host_version: None,
            lazy_policy: LazyPolicy::Eager,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
        }
    }
}

impl ArchiveConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ArchiveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ArchiveError::Config(e.to_string()))
    }

    /// Check the configuration for values the backends cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 {
            return Err(ArchiveError::Config(
                "read_buffer_size must be non-zero".to_string(),
            ));
        }
        if self.write_buffer_size == 0 {
            return Err(ArchiveError::Config(
                "write_buffer_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Force the game profile
    #[must_use]
    pub const fn with_game(mut self, game: Game) -> Self {
        self.game_override = Some(game);
        self
    }

    /// Force the platform
    #[must_use]
    pub const fn with_platform(mut self, platform: Platform) -> Self {
        self.platform_override = Some(platform);
        self
    }

    /// Force the decompressor
    #[must_use]
    pub const fn with_compression(mut self, method: CompressionMethod) -> Self {
        self.compression_override = Some(method);
        self
    }

    /// Set the host format version
    #[must_use]
    pub const fn with_host_version(mut self, version: i32) -> Self {
        self.host_version = Some(version);
        self
    }

    /// Set the deferred array policy
    #[must_use]
    pub const fn with_lazy_policy(mut self, policy: LazyPolicy) -> Self {
        self.lazy_policy = policy;
        self
    }

    /// Set the file reader buffer size
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the file writer buffer size
    #[must_use]
    pub const fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ArchiveConfig::default();
        assert!(config.game_override.is_none());
        assert_eq!(config.lazy_policy, LazyPolicy::Eager);
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        config.validate().expect("Default config should be valid");
    }

    #[test]
    fn test_json_partial_document() {
        let config = ArchiveConfig::from_json(
            r#"{ "game_override": "Bioshock", "lazy_policy": "deferred", "host_version": 584 }"#,
        )
        .expect("Test operation should succeed");
        assert_eq!(config.game_override, Some(Game::Bioshock));
        assert_eq!(config.lazy_policy, LazyPolicy::Deferred);
        assert_eq!(config.host_version, Some(584));
        assert_eq!(config.write_buffer_size, DEFAULT_WRITE_BUFFER_SIZE);
    }

    #[test]
    fn test_json_round_trip() {
        let config = ArchiveConfig::new()
            .with_platform(Platform::Ps3)
            .with_compression(CompressionMethod::Lzo)
            .with_read_buffer_size(4096);
        let json = config.to_json().expect("Test operation should succeed");
        let parsed = ArchiveConfig::from_json(&json).expect("Test operation should succeed");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            ArchiveConfig::from_json("{ not json"),
            Err(ArchiveError::Config(_))
        ));
        assert!(matches!(
            ArchiveConfig::from_json(r#"{ "write_buffer_size": 0 }"#),
            Err(ArchiveError::Config(_))
        ));
    }
}
