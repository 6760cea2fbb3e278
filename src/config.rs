use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::Source;
use crate::error::{DriftwatchError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tracking record storage
    pub store: StoreConfig,

    /// Poll loop settings
    pub poller: PollerConfig,

    /// Where emitted records go when running under the poller
    pub sink: SinkConfig,

    /// Per-platform settings
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for tracking records
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Seconds between poll cycles
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// JSONL file to append emitted records to
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub platform_a: SourceConfig,
    pub platform_b: SourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Whether the poller polls this source at all
    pub enabled: bool,

    /// API base URL
    pub base_url: String,

    /// API token; when absent, read from DRIFTWATCH_<SOURCE>_TOKEN
    pub api_token: Option<String>,

    /// Sustained request budget against this platform
    pub requests_per_minute: u32,

    /// Burst allowance above the sustained rate
    pub burst_size: u32,

    /// Retry attempts per API call (including the first)
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds
    pub retry_base_delay_ms: u64,

    /// Document ids to track
    pub documents: Vec<String>,
}

impl SourceConfig {
    fn default_for(base_url: &str) -> Self {
        Self {
            enabled: false,
            base_url: base_url.to_string(),
            api_token: None,
            requests_per_minute: 60,
            burst_size: 5,
            max_attempts: 4,
            retry_base_delay_ms: 500,
            documents: Vec::new(),
        }
    }

    /// Resolve the API token from config or environment.
    pub fn resolve_token(&self, source: Source) -> Result<String> {
        if let Some(token) = &self.api_token {
            if !token.is_empty() {
                return Ok(token.clone());
            }
        }

        let var = match source {
            Source::PlatformA => "DRIFTWATCH_PLATFORM_A_TOKEN",
            Source::PlatformB => "DRIFTWATCH_PLATFORM_B_TOKEN",
        };
        std::env::var(var).map_err(|_| {
            DriftwatchError::Config(format!(
                "no API token for {} (set api_token in config or {})",
                source, var
            ))
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                path: PathBuf::from(".driftwatch/state"),
            },
            poller: PollerConfig { interval_secs: 60 },
            sink: SinkConfig {
                path: PathBuf::from(".driftwatch/records.jsonl"),
            },
            sources: SourcesConfig {
                platform_a: SourceConfig::default_for("https://api.platform-a.example"),
                platform_b: SourceConfig::default_for("https://api.platform-b.example"),
            },
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| DriftwatchError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| DriftwatchError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                // Try common config file locations
                let candidates = [
                    "Driftwatch.toml",
                    "driftwatch.toml",
                    ".driftwatch.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn source(&self, source: Source) -> &SourceConfig {
        match source {
            Source::PlatformA => &self.sources.platform_a,
            Source::PlatformB => &self.sources.platform_b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.poller.interval_secs, 60);
        assert_eq!(parsed.sources.platform_a.requests_per_minute, 60);
        assert!(!parsed.sources.platform_b.enabled);
    }

    #[test]
    fn test_config_token_resolution() {
        let mut source = SourceConfig::default_for("https://example.test");
        source.api_token = Some("tok-123".to_string());
        assert_eq!(
            source.resolve_token(Source::PlatformA).unwrap(),
            "tok-123"
        );

        source.api_token = None;
        // No env var set in tests either.
        std::env::remove_var("DRIFTWATCH_PLATFORM_A_TOKEN");
        assert!(source.resolve_token(Source::PlatformA).is_err());
    }
}
