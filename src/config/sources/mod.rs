//! Concrete [`ConfigSource`](super::ConfigSource) implementations.
//!
//! Provides the file-based [`FileSource`] (YAML, JSON, TOML, each gated by a
//! feature flag) and the [`parse_config_str`] helper for format-specific
//! deserialization.

pub mod file_source;

pub use file_source::FileSource;

use sha2::{Digest, Sha256};

use crate::config::model::Config;
use crate::error::FanfetchError;

/// Parse a config string based on file extension.
pub fn parse_config_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<Config, FanfetchError> {
    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| FanfetchError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| FanfetchError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(|e| FanfetchError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        other => Err(FanfetchError::UnsupportedFormat(other.to_string())),
    }
}

/// Compute a lowercase hex-encoded SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = parse_config_str("ini", "", "fanfetch.ini").unwrap_err();
        assert!(matches!(err, FanfetchError::UnsupportedFormat(ref ext) if ext == "ini"));
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn parses_yaml_sections() {
        let config = parse_config_str(
            "yaml",
            "cache:\n  ttl_ms: 1000\nfetch:\n  max_targets: 4\n",
            "inline.yaml",
        )
        .unwrap();
        assert_eq!(config.cache.ttl_ms, 1000);
        assert_eq!(config.fetch.max_targets, 4);
    }
}
