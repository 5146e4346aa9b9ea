//! Agent configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::ConfigError;

/// Configuration for the offline agent
///
/// Every field has a default, so a config file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Origin the agent serves; precache paths are resolved against it
    pub origin: Url,

    /// Prefix shared by every generation this agent owns
    pub cache_prefix: String,

    /// Deployment version baked into generation names
    pub version: String,

    /// Paths cached eagerly at install
    pub precache: Vec<String>,

    /// Document served to navigations when nothing better is cached
    pub index_document: String,

    /// Storage settings
    pub storage: StorageConfig,

    /// Network settings
    pub network: NetworkConfig,

    /// Fallback values for push notifications
    pub notifications: NotificationDefaults,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Disk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which store to back generations with
    pub backend: StorageBackend,

    /// Directory for the disk backend
    pub cache_dir: PathBuf,

    /// Maximum total body bytes across all generations
    pub quota_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// User agent string
    pub user_agent: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    pub title: String,
    pub body: String,
    /// Page opened when a notification without a url is clicked
    pub url: String,
    pub icon: String,
    pub badge: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://localhost:8080/").expect("static origin is valid"),
            cache_prefix: "tutorial".to_string(),
            version: "v1".to_string(),
            precache: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
            ],
            index_document: "/index.html".to_string(),
            storage: StorageConfig::default(),
            network: NetworkConfig::default(),
            notifications: NotificationDefaults::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("lantern"),
            quota_bytes: None,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("Lantern/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
        }
    }
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "Rust Tutorial".to_string(),
            body: "New tutorial content is available".to_string(),
            url: "/".to_string(),
            icon: "/icons/icon-192.png".to_string(),
            badge: "/icons/badge-72.png".to_string(),
        }
    }
}

impl AgentConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Check the values that cannot be defaulted away.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "origin must be http(s), got {}",
                self.origin
            )));
        }
        if self.cache_prefix.is_empty() {
            return Err(ConfigError::Invalid("cache_prefix is empty".to_string()));
        }
        if self.version.is_empty() {
            return Err(ConfigError::Invalid("version is empty".to_string()));
        }
        if self.network.timeout_secs == 0 {
            return Err(ConfigError::Invalid("network.timeout_secs is zero".to_string()));
        }
        self.resolve(&self.index_document)?;
        for path in &self.precache {
            self.resolve(path)?;
        }
        Ok(())
    }

    /// Name of the precache generation for this version.
    pub fn precache_name(&self) -> String {
        format!("{}-precache-{}", self.cache_prefix, self.version)
    }

    /// Name of the runtime generation for this version.
    pub fn runtime_name(&self) -> String {
        format!("{}-runtime-{}", self.cache_prefix, self.version)
    }

    /// Prefix identifying generations owned by this agent, any version.
    pub fn generation_prefix(&self) -> String {
        format!("{}-", self.cache_prefix)
    }

    /// Resolve a site path against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
        self.origin
            .join(path)
            .map_err(|e| ConfigError::Invalid(format!("bad path {path:?}: {e}")))
    }

    /// Absolute URLs of the precache list.
    pub fn precache_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.precache.iter().map(|p| self.resolve(p)).collect()
    }

    /// Absolute URL of the index document.
    pub fn index_url(&self) -> Result<Url, ConfigError> {
        self.resolve(&self.index_document)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_generation_names() {
        let config = AgentConfig::default();
        assert_eq!(config.precache_name(), "tutorial-precache-v1");
        assert_eq!(config.runtime_name(), "tutorial-runtime-v1");
        assert!(config.precache_name().starts_with(&config.generation_prefix()));
        assert!(config.runtime_name().starts_with(&config.generation_prefix()));
    }

    #[test]
    fn test_default_cache_dir_is_platform_cache() {
        let storage = StorageConfig::default();
        assert!(storage.cache_dir.ends_with("lantern"));
        if let Some(platform) = dirs::cache_dir() {
            assert_eq!(storage.cache_dir, platform.join("lantern"));
        }
    }

    #[test]
    fn test_precache_urls_resolve_against_origin() {
        let config = AgentConfig::default();
        let urls: Vec<String> = config
            .precache_urls()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            urls,
            vec![
                "http://localhost:8080/",
                "http://localhost:8080/index.html",
                "http://localhost:8080/manifest.json",
            ]
        );
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            AgentConfig::from_json(r#"{"version": "v7", "storage": {"quota_bytes": 1024}}"#)
                .unwrap();
        assert_eq!(config.version, "v7");
        assert_eq!(config.cache_prefix, "tutorial");
        assert_eq!(config.storage.quota_bytes, Some(1024));
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.index_document, "/index.html");
    }

    #[test]
    fn test_rejects_non_http_origin() {
        let err = AgentConfig::from_json(r#"{"origin": "ftp://example.com/"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_empty_version() {
        let err = AgentConfig::from_json(r#"{"version": ""}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_json() {
        let err = AgentConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lantern.json");
        std::fs::write(&path, r#"{"cache_prefix": "rustbook", "storage": {"backend": "disk"}}"#)
            .unwrap();

        let config = AgentConfig::load(&path).unwrap();
        assert_eq!(config.precache_name(), "rustbook-precache-v1");
        assert_eq!(config.storage.backend, StorageBackend::Disk);
    }

    #[test]
    fn test_load_missing_file() {
        let err = AgentConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
