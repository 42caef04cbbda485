//! `vesper.toml`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use vesper::{CompileOptions, RenderConfig};

pub const CONFIG_FILE: &str = "vesper.toml";

/// ```toml
/// [compile]
/// debug_names = true
/// strict = false
///
/// [render]
/// sanitize_urls = true
/// interactive = false
/// ```
#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub compile: CompileOptions,
    pub render: RenderConfig,
}

impl Config {
    /// Loads `explicit`, or `./vesper.toml` when it exists, or the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = PathBuf::from(CONFIG_FILE);
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_str(&text).with_context(|| format!("In {}", path.display()))?;
        log::debug!("loaded {}: {config:?}", path.display());
        Ok(config)
    }

    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML format")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tables_keep_defaults() {
        let config = Config::from_str("[render]\ninteractive = false\n").unwrap();
        assert_eq!(config.compile, CompileOptions::default());
        assert!(config.render.sanitize_urls);
        assert!(!config.render.interactive);
    }

    #[test]
    fn both_tables() {
        let config = Config::from_str(
            "[compile]\nstrict = false\ndebug_names = true\n\n[render]\nsanitize_urls = false\n",
        )
        .unwrap();
        assert!(!config.compile.strict);
        assert!(config.compile.debug_names);
        assert!(!config.render.sanitize_urls);
        assert!(config.render.interactive);
    }

    #[test]
    fn unknown_tables_are_rejected() {
        assert!(Config::from_str("[server]\nport = 1\n").is_err());
    }
}
