use serde::{Deserialize, Serialize};

use crate::domain::query_cache::QueryCacheConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: QueryCacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Load from `config/default`, `config/local` and `APP__*` variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query_cache::EvictionPolicy;

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_camel_case_cache_section() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "cache": {
                    "maxEntries": 50,
                    "evictionPolicy": "size",
                    "persistToDisk": true,
                    "diskCachePath": "/tmp/nq"
                },
                "logging": { "level": "debug", "format": "json" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.cache.max_entries, 50);
        assert_eq!(config.cache.eviction_policy, EvictionPolicy::Size);
        assert!(config.cache.persist_to_disk);
        assert_eq!(config.cache.ttl_hours, 24.0);
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
