//! Decoder configuration.
//!
//! Values are resolved in the following order (later overrides earlier):
//! 1. Default values
//! 2. Builder calls or a deserialized config section
//! 3. Environment variables (`from_env` / `apply_env_overrides`)

use fluxwire_protocol::MAX_CONTAINER_LEN;
use serde::{Deserialize, Serialize};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Tuning knobs for a `Cursor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Buffer size used when wrapping a `std::io::Read` transport.
    pub read_buffer_size: usize,
    /// Largest declared string/binary/array/map length accepted.
    pub max_container_len: usize,
    /// Read the next row chunk header as soon as the current chunk is
    /// drained, so `Series::length` is accurate earlier.
    pub prefetch_chunk_headers: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_container_len: MAX_CONTAINER_LEN,
            prefetch_chunk_headers: true,
        }
    }
}

impl DecoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with environment variable overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_max_container_len(mut self, len: usize) -> Self {
        self.max_container_len = len;
        self
    }

    pub fn with_prefetch_chunk_headers(mut self, enabled: bool) -> Self {
        self.prefetch_chunk_headers = enabled;
        self
    }

    /// Applies `FLUXWIRE_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(size) = lookup("FLUXWIRE_READ_BUFFER_SIZE") {
            match size.parse() {
                Ok(n) => {
                    self.read_buffer_size =
                        usize::clamp(n, MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE)
                }
                Err(_) => tracing::warn!("ignoring invalid FLUXWIRE_READ_BUFFER_SIZE={}", size),
            }
        }

        if let Some(len) = lookup("FLUXWIRE_MAX_CONTAINER_LEN") {
            match len.parse() {
                Ok(n) => self.max_container_len = n,
                Err(_) => tracing::warn!("ignoring invalid FLUXWIRE_MAX_CONTAINER_LEN={}", len),
            }
        }

        if let Some(flag) = lookup("FLUXWIRE_PREFETCH_CHUNK_HEADERS") {
            self.prefetch_chunk_headers = flag == "1" || flag.to_lowercase() == "true";
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = DecoderConfig::default();
        assert_eq!(config.read_buffer_size, 8 * 1024);
        assert_eq!(config.max_container_len, 16 * 1024 * 1024);
        assert!(config.prefetch_chunk_headers);
    }

    #[test]
    fn test_read_buffer_size_clamped() {
        let config = DecoderConfig::new().with_read_buffer_size(10);
        assert_eq!(config.read_buffer_size, MIN_READ_BUFFER_SIZE);

        let config = DecoderConfig::new().with_read_buffer_size(usize::MAX);
        assert_eq!(config.read_buffer_size, MAX_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FLUXWIRE_READ_BUFFER_SIZE", "65536"),
            ("FLUXWIRE_MAX_CONTAINER_LEN", "1024"),
            ("FLUXWIRE_PREFETCH_CHUNK_HEADERS", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = DecoderConfig::default();
        config.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.read_buffer_size, 65536);
        assert_eq!(config.max_container_len, 1024);
        assert!(!config.prefetch_chunk_headers);
    }

    #[test]
    fn test_invalid_env_values_ignored() {
        let mut config = DecoderConfig::default();
        config.apply_overrides_from(|k| match k {
            "FLUXWIRE_MAX_CONTAINER_LEN" => Some("lots".to_string()),
            _ => None,
        });
        assert_eq!(config, DecoderConfig::default());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: DecoderConfig =
            serde_json::from_str(r#"{"prefetch_chunk_headers": false}"#).unwrap();
        assert!(!config.prefetch_chunk_headers);
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
    }
}
