//! Configuration loading and management.

use std::path::{Path, PathBuf};

use chrono::Duration;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use wu_core::{AggregationConfig, SplitPolicy, UnknownAgentPolicy};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Default window length in seconds.
    pub window_secs: i64,

    /// How far before the report start to read wrap-up events, in seconds.
    pub lookback_secs: i64,

    /// What to do with wrap-ups of agents that are not configured.
    pub unknown_agent: UnknownAgentPolicy,

    /// How long wrap-ups are spread across windows.
    pub split: SplitPolicy,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("wu.db"),
            window_secs: 1800,
            lookback_secs: 120,
            unknown_agent: UnknownAgentPolicy::default(),
            split: SplitPolicy::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (WU_*)
        figment = figment.merge(Env::prefixed("WU_"));

        figment.extract()
    }

    /// Aggregation settings derived from this configuration.
    pub fn aggregation_config(&self) -> AggregationConfig {
        AggregationConfig {
            lookback: Duration::seconds(self.lookback_secs),
            unknown_agent: self.unknown_agent,
            split: self.split,
            ..AggregationConfig::default()
        }
    }
}

/// Returns the platform-specific config directory for wu.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("wu"))
}

/// Returns the platform-specific data directory for wu.
///
/// On Linux: `~/.local/share/wu`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("wu"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_data_path_ends_with_wu() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "wu");
    }

    #[test]
    fn test_default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("wu.db"));
        assert_eq!(config.window_secs, 1800);
        assert_eq!(config.lookback_secs, 120);
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "window_secs = 900\nunknown_agent = \"fail\"\nsplit = \"spanning\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.window_secs, 900);
        assert_eq!(config.unknown_agent, UnknownAgentPolicy::Fail);
        assert_eq!(config.split, SplitPolicy::Spanning);
        assert_eq!(config.lookback_secs, 120);
    }

    #[test]
    fn test_aggregation_config_carries_policies() {
        let config = Config {
            lookback_secs: 60,
            unknown_agent: UnknownAgentPolicy::Fail,
            ..Config::default()
        };
        let aggregation = config.aggregation_config();
        assert_eq!(aggregation.lookback, Duration::seconds(60));
        assert_eq!(aggregation.unknown_agent, UnknownAgentPolicy::Fail);
        assert_eq!(aggregation.split, SplitPolicy::Adjacent);
    }
}
