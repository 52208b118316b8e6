// Service configuration: defaults, file loading, environment overrides

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub app_name: String,
    pub host: String,
    pub port: u16,
    pub api_prefix: String,

    // Image store
    pub upload_path: String,
    pub uploads_url_prefix: String,
    pub max_file_size: usize,
    pub allowed_content_types: Vec<String>,
    /// Longer side above which images are downsampled on ingest.
    pub max_image_dimension: u32,

    // Cache
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,

    // Orchestration
    pub max_concurrent_segmentations: usize,
    pub max_algorithms_per_request: usize,
    pub max_batch_size: usize,

    // HTTP
    pub cors_origins: String,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            app_name: "Image Segmentation Service".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_prefix: "/api/v1".to_string(),
            upload_path: "./uploads".to_string(),
            uploads_url_prefix: "/uploads".to_string(),
            max_file_size: 10 * 1024 * 1024,
            allowed_content_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/bmp".to_string(),
                "image/tiff".to_string(),
            ],
            max_image_dimension: 2048,
            cache_ttl_secs: 3600,
            cache_max_entries: 10_000,
            max_concurrent_segmentations: 4,
            max_algorithms_per_request: 4,
            max_batch_size: 10,
            cors_origins: "http://localhost:3000,http://127.0.0.1:3000".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path, e)))?;
        Self::from_str(&content)
    }

    /// Load configuration from string (JSON, TOML or YAML)
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        if let Ok(config) = serde_json::from_str::<ServiceConfig>(content) {
            return Ok(config);
        }

        if let Ok(config) = toml::from_str::<ServiceConfig>(content) {
            return Ok(config);
        }

        // YAML accepts almost anything as a scalar, so it goes last
        match serde_yaml::from_str::<ServiceConfig>(content) {
            Ok(config) => Ok(config),
            Err(e) => Err(ConfigError::ParseError(format!("Unknown format: {}", e))),
        }
    }

    /// Defaults with `TESSERA_*` environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `TESSERA_*` environment overrides in place
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("TESSERA_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("TESSERA_PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Some(path) = lookup("TESSERA_UPLOAD_PATH") {
            self.upload_path = path;
        }
        if let Some(dim) = lookup("TESSERA_MAX_IMAGE_DIMENSION").and_then(|v| v.parse().ok()) {
            self.max_image_dimension = dim;
        }
        if let Some(ttl) = lookup("TESSERA_CACHE_TTL").and_then(|v| v.parse().ok()) {
            self.cache_ttl_secs = ttl;
        }
        if let Some(n) = lookup("TESSERA_MAX_CONCURRENT_SEGMENTATIONS").and_then(|v| v.parse().ok()) {
            self.max_concurrent_segmentations = n;
        }
        if let Some(origins) = lookup("TESSERA_CORS_ORIGINS") {
            self.cors_origins = origins;
        }
        if let Some(level) = lookup("TESSERA_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(format) = lookup("TESSERA_LOG_FORMAT") {
            match format.to_ascii_lowercase().as_str() {
                "json" => self.log_format = LogFormat::Json,
                "pretty" => self.log_format = LogFormat::Pretty,
                _ => {}
            }
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cors_origins_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ValidationError("port cannot be 0".to_string()));
        }
        if self.max_concurrent_segmentations == 0 {
            return Err(ConfigError::ValidationError(
                "max_concurrent_segmentations must be > 0".to_string(),
            ));
        }
        if !(1..=4).contains(&self.max_algorithms_per_request) {
            return Err(ConfigError::ValidationError(
                "max_algorithms_per_request must be between 1 and 4".to_string(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::ValidationError("max_batch_size must be > 0".to_string()));
        }
        if self.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "max_image_dimension must be > 0".to_string(),
            ));
        }
        if self.cache_max_entries == 0 {
            return Err(ConfigError::ValidationError("cache_max_entries must be > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(e) => write!(f, "Validation error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrent_segmentations, 4);
        assert_eq!(config.max_batch_size, 10);
        assert_eq!(config.cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.max_image_dimension, 2048);
    }

    #[test]
    fn test_from_str_json_partial() {
        let config = ServiceConfig::from_str(r#"{"port": 9000, "cache_ttl_secs": 60}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.max_batch_size, 10);
    }

    #[test]
    fn test_from_str_toml() {
        let content = "port = 8100\nlog_format = \"json\"\nmax_concurrent_segmentations = 2\n";
        let config = ServiceConfig::from_str(content).unwrap();
        assert_eq!(config.port, 8100);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.max_concurrent_segmentations, 2);
    }

    #[test]
    fn test_from_str_yaml() {
        let content = "host: 127.0.0.1\nmax_image_dimension: 1024\n";
        let config = ServiceConfig::from_str(content).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.max_image_dimension, 1024);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TESSERA_PORT", "9100"),
            ("TESSERA_CACHE_TTL", "5"),
            ("TESSERA_LOG_FORMAT", "JSON"),
            ("TESSERA_MAX_CONCURRENT_SEGMENTATIONS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = ServiceConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.port, 9100);
        assert_eq!(config.cache_ttl_secs, 5);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.max_concurrent_segmentations, 4);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = ServiceConfig::default();
        config.max_concurrent_segmentations = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.max_algorithms_per_request = 5;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.max_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cors_origins_list() {
        let mut config = ServiceConfig::default();
        config.cors_origins = " http://a.test , ,http://b.test".to_string();
        assert_eq!(config.cors_origins_list(), vec!["http://a.test", "http://b.test"]);
    }
}
