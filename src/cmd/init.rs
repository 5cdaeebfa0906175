//! `fanfetch init`: generate a starter configuration file.
//!
//! Serializes the built-in defaults in the chosen format, so the file always
//! matches what `fanfetch run` would use without one.

use std::path::PathBuf;

use crate::cli::{ConfigFormat, InitArgs};
use crate::config::model::Config;
use crate::error::FanfetchError;

pub fn execute(args: &InitArgs) -> Result<(), FanfetchError> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("fanfetch.{}", args.format.extension())));

    if output.exists() {
        return Err(FanfetchError::FileExists { path: output });
    }

    let content = render(&args.format, &Config::default())?;
    std::fs::write(&output, content)?;
    println!("Created {}", output.display());
    Ok(())
}

/// Render `config` in `format`, with a header comment where the format
/// allows one.
pub fn render(format: &ConfigFormat, config: &Config) -> Result<String, FanfetchError> {
    match format {
        ConfigFormat::Yaml => render_yaml(config),
        ConfigFormat::Json => serde_json::to_string_pretty(config)
            .map(|s| s + "\n")
            .map_err(|e| FanfetchError::Serialize(e.to_string())),
        ConfigFormat::Toml => render_toml(config),
    }
}

const HEADER: &str = "# fanfetch config. All values shown are the defaults; durations are milliseconds.\n\n";

#[cfg(feature = "yaml")]
fn render_yaml(config: &Config) -> Result<String, FanfetchError> {
    serde_yml::to_string(config)
        .map(|body| format!("{HEADER}{body}"))
        .map_err(|e| FanfetchError::Serialize(e.to_string()))
}

#[cfg(not(feature = "yaml"))]
fn render_yaml(_config: &Config) -> Result<String, FanfetchError> {
    Err(FanfetchError::UnsupportedFormat("yaml".into()))
}

#[cfg(feature = "toml")]
fn render_toml(config: &Config) -> Result<String, FanfetchError> {
    toml::to_string_pretty(config)
        .map(|body| format!("{HEADER}{body}"))
        .map_err(|e| FanfetchError::Serialize(e.to_string()))
}

#[cfg(not(feature = "toml"))]
fn render_toml(_config: &Config) -> Result<String, FanfetchError> {
    Err(FanfetchError::UnsupportedFormat("toml".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trips_to_defaults() {
        let rendered = render(&ConfigFormat::Json, &Config::default()).unwrap();
        let parsed: Config = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_has_header_and_sections() {
        let rendered = render(&ConfigFormat::Yaml, &Config::default()).unwrap();
        assert!(rendered.starts_with("# fanfetch config"));
        assert!(rendered.contains("ttl_ms: 300000"));
        assert!(rendered.contains("rate_limit:"));
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = std::env::temp_dir().join(format!("fanfetch-init-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let output = dir.join("fanfetch.json");
        std::fs::write(&output, "{}").unwrap();

        let args = InitArgs {
            format: ConfigFormat::Json,
            output: Some(output.clone()),
        };
        let err = execute(&args).unwrap_err();
        assert!(matches!(err, FanfetchError::FileExists { .. }));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "{}");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
