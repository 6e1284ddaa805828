//! Sidecar configuration.
//!
//! Defaults, then an optional TOML file named by `CLASSROOMD_CONFIG`, then
//! individual environment overrides.

use crate::gateway::DEFAULT_FALLBACK_MESSAGE;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const CONFIG_ENV: &str = "CLASSROOMD_CONFIG";
pub const RESYNC_DELAY_ENV: &str = "CLASSROOMD_RESYNC_DELAY_MS";
pub const LOG_LEVEL_ENV: &str = "CLASSROOMD_LOG";
pub const LOG_FORMAT_ENV: &str = "CLASSROOMD_LOG_FORMAT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    /// Delay between an optimistic change and the authoritative refetch.
    pub resync_delay_ms: u64,
    /// Shown when a backend error body carries no usable message.
    pub fallback_error_message: String,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resync_delay_ms: 1500,
            fallback_error_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `classroomd=debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => bail!("unknown log format: {other}"),
        }
    }
}

impl Config {
    /// Loads the process configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.to_string_lossy()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("invalid config {}", path.to_string_lossy()))
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(raw) = lookup(RESYNC_DELAY_ENV) {
            self.resync_delay_ms = raw
                .trim()
                .parse()
                .with_context(|| format!("{RESYNC_DELAY_ENV} must be a whole number of milliseconds"))?;
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV).filter(|v| !v.trim().is_empty()) {
            self.logging.level = level.trim().to_string();
        }
        if let Some(format) = lookup(LOG_FORMAT_ENV) {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }

    pub fn resync_delay(&self) -> Duration {
        Duration::from_millis(self.resync_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.resync_delay(), Duration::from_millis(1500));
        assert_eq!(c.logging.format, LogFormat::Compact);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = Config::from_toml_str(
            r#"
            resync_delay_ms = 250

            [logging]
            format = "json"
            "#,
        )
        .expect("parse");
        assert_eq!(c.resync_delay_ms, 250);
        assert_eq!(c.logging.format, LogFormat::Json);
        assert_eq!(c.logging.level, "info");
        assert_eq!(c.fallback_error_message, DEFAULT_FALLBACK_MESSAGE);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            (RESYNC_DELAY_ENV, "50"),
            (LOG_LEVEL_ENV, "classroomd=debug"),
            (LOG_FORMAT_ENV, "Pretty"),
        ]
        .into_iter()
        .collect();
        let mut c = Config::default();
        c.apply_overrides(|k| env.get(k).map(|v| v.to_string())).expect("overrides");
        assert_eq!(c.resync_delay_ms, 50);
        assert_eq!(c.logging.level, "classroomd=debug");
        assert_eq!(c.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn bad_override_is_an_error() {
        let mut c = Config::default();
        assert!(c
            .apply_overrides(|k| (k == RESYNC_DELAY_ENV).then(|| "soon".to_string()))
            .is_err());
        assert!(c
            .apply_overrides(|k| (k == LOG_FORMAT_ENV).then(|| "xml".to_string()))
            .is_err());
    }
}
