//! User-level settings persisted as TOML under the platform config dir.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::{Result, VidsumError},
    provider::Provider,
};

pub const DEFAULT_MIN_SEGMENT_MINUTES: f64 = 4.0;
pub const DEFAULT_MAX_SEGMENT_MINUTES: f64 = 15.0;
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_REPORT_LANG: &str = "Chinese";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_output_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_minutes_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_minutes_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_lang: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obsidian_vault: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obsidian_folder: Option<String>,
}

impl AppConfig {
    /// `<config dir>/vidsum/config.toml`
    pub fn path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("vidsum").join("config.toml"))
            .ok_or_else(|| VidsumError::Config {
                path: PathBuf::from("~/.config/vidsum/config.toml"),
                reason: "could not determine the user config directory".to_string(),
            })
    }

    pub fn load() -> Result<Self> {
        Ok(Self::load_from(&Self::path()?))
    }

    /// A missing file yields defaults. So does a corrupt one, with a warning.
    pub fn load_from(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
                return Self::default();
            }
        };

        match toml::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "config is not valid TOML, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        info!(path = %path.display(), "config saved");
        Ok(())
    }

    /// Delete the config file. Deleting a missing file is not an error.
    pub fn reset(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_api_key(&mut self, key: &str) {
        self.api_key = Some(key.trim().to_string());
    }

    pub fn remove_api_key(&mut self) -> bool {
        self.api_key.take().is_some()
    }

    pub fn set_default_output_dir(&mut self, dir: impl Into<PathBuf>) {
        self.default_output_dir = Some(dir.into());
    }

    pub fn set_segment_minutes(&mut self, min: f64, max: f64) -> Result<()> {
        if !(min > 0.0 && max >= min) {
            return Err(VidsumError::Config {
                path: Self::path().unwrap_or_default(),
                reason: format!("segment minutes must satisfy 0 < min <= max, got {min}..{max}"),
            });
        }
        self.segment_minutes_min = Some(min);
        self.segment_minutes_max = Some(max);
        Ok(())
    }

    pub fn segment_minutes(&self) -> (f64, f64) {
        (
            self.segment_minutes_min
                .unwrap_or(DEFAULT_MIN_SEGMENT_MINUTES),
            self.segment_minutes_max
                .unwrap_or(DEFAULT_MAX_SEGMENT_MINUTES),
        )
    }

    pub fn output_dir(&self) -> PathBuf {
        self.default_output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }

    pub fn report_lang(&self) -> &str {
        self.report_lang.as_deref().unwrap_or(DEFAULT_REPORT_LANG)
    }

    pub fn provider(&self) -> Provider {
        self.provider.unwrap_or_default()
    }

    /// `sk-a...wxyz` style rendering for display.
    pub fn masked_api_key(&self) -> Option<String> {
        let key = self.api_key.as_deref()?;
        let chars: Vec<char> = key.chars().collect();
        if chars.len() <= 8 {
            return Some("*".repeat(chars.len()));
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        Some(format!("{head}...{tail}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("config.toml"));

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.segment_minutes(), (4.0, 15.0));
        assert_eq!(config.output_dir(), PathBuf::from("output"));
        assert_eq!(config.report_lang(), "Chinese");
        assert_eq!(config.provider(), Provider::Openai);
    }

    #[test]
    fn save_and_load_preserve_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.set_api_key("  sk-test-1234567890 ");
        config.set_default_output_dir("/tmp/summaries");
        config.set_segment_minutes(3.0, 9.0).unwrap();
        config.provider = Some(Provider::Gemini);
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded, config);
        assert_eq!(loaded.api_key.as_deref(), Some("sk-test-1234567890"));
        assert_eq!(loaded.masked_api_key().as_deref(), Some("sk-t...7890"));

        AppConfig::reset(&path).unwrap();
        assert!(!path.exists());
        AppConfig::reset(&path).unwrap();
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "api_key = [not toml").unwrap();

        assert_eq!(AppConfig::load_from(&path), AppConfig::default());
    }

    #[test]
    fn segment_minutes_are_validated() {
        let mut config = AppConfig::default();
        assert!(config.set_segment_minutes(0.0, 5.0).is_err());
        assert!(config.set_segment_minutes(6.0, 5.0).is_err());
        assert_eq!(config.segment_minutes(), (4.0, 15.0));
        assert!(!config.remove_api_key());
    }
}
