//! Async file-based config source.
//!
//! [`FileSource`] implements [`ConfigSource`] for every enabled file format,
//! picking the parser from the file extension. It reads the file with
//! Tokio, validates the result, logs a retry-budget warning when the backoff
//! schedule outlasts the deadline, and versions the load by content hash.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{parse_config_str, sha256_hex};
use crate::config::model::Config;
use crate::config::validation::{retry_budget_warning, validate};
use crate::config::{ConfigSource, ConfigVersion};
use crate::error::FanfetchError;

/// File names probed, in order, when no path is given.
pub const AUTO_DETECT: &[&str] = &[
    "fanfetch.yaml",
    "fanfetch.yml",
    "fanfetch.json",
    "fanfetch.toml",
];

pub struct FileSource {
    path: PathBuf,
    format: &'static str,
}

impl FileSource {
    /// Fails with [`FanfetchError::UnsupportedFormat`] when the extension
    /// names no compiled-in format.
    pub fn new(path: PathBuf) -> Result<Self, FanfetchError> {
        let format = match extension(&path) {
            #[cfg(feature = "yaml")]
            "yaml" | "yml" => "yaml",
            #[cfg(feature = "json")]
            "json" => "json",
            #[cfg(feature = "toml")]
            "toml" => "toml",
            other => return Err(FanfetchError::UnsupportedFormat(other.to_string())),
        };
        Ok(Self { path, format })
    }

    /// The first [`AUTO_DETECT`] candidate present in `dir`.
    pub async fn detect(dir: &Path) -> Result<Option<Self>, FanfetchError> {
        for name in AUTO_DETECT {
            let path = dir.join(name);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                tracing::info!(path = %path.display(), "auto-detected config file");
                return Self::new(path).map(Some);
            }
        }
        Ok(None)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_content(&self) -> Result<String, FanfetchError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FanfetchError::ConfigFileNotFound {
                    path: self.path.clone(),
                }
            } else {
                FanfetchError::Io(e)
            }
        })
    }
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("")
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &'static str {
        self.format
    }

    async fn load(&self) -> Result<(Config, ConfigVersion), FanfetchError> {
        let content = self.read_content().await?;
        let config = parse_config_str(
            extension(&self.path),
            &content,
            &self.path.display().to_string(),
        )?;

        if let Err(errors) = validate(&config) {
            return Err(FanfetchError::ConfigValidation { errors });
        }
        if let Some(warning) = retry_budget_warning(&config) {
            tracing::warn!(path = %self.path.display(), "{warning}");
        }

        let hash = sha256_hex(content.as_bytes());
        Ok((config, ConfigVersion::Hash(hash)))
    }
}
