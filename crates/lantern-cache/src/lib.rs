//! # Lantern Cache
//!
//! Storage for cache generations: named maps from request identity to a
//! response snapshot.
//!
//! ## Architecture
//!
//! ```text
//! CacheStore (trait)
//!     ├── MemoryStore   in-process, optional byte quota
//!     └── DiskStore     one JSON file per generation
//!
//! Generation
//!     └── RequestKey (method + URL) → CacheEntry (status, headers, body)
//! ```
//!
//! Stores guarantee exact key match, last-write-wins `put`, and independent
//! `delete`. Nothing else is assumed by the agent.

use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use lantern_common::{StorageBackend, StorageConfig};
use lantern_net::{Request, Response, ResponseSource};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub mod disk;
pub mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

// ==================== Errors ====================

/// Errors raised by cache stores.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: u64, available: u64 },

    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ==================== Keys & Entries ====================

/// Identity of a cached request: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    /// Key for a GET of `url`.
    pub fn get(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: "GET".to_string(),
            url: url.into(),
        }
    }

    /// Key for an intercepted request.
    pub fn for_request(request: &Request) -> Self {
        let mut key = Self::get(&request.url);
        key.method = request.method.as_str().to_string();
        key
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A cached request/response pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    #[serde(with = "body_base64")]
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot a response for storage under `key`.
    pub fn from_response(key: &RequestKey, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            url: key.url.clone(),
            method: key.method.clone(),
            status: response.status.as_u16(),
            headers,
            body: response.body.to_vec(),
            cached_at: lantern_common::now_millis(),
        }
    }

    pub fn key(&self) -> RequestKey {
        RequestKey {
            method: self.method.clone(),
            url: self.url.clone(),
        }
    }

    /// Body size counted against quotas.
    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }

    /// Rebuild a response marked as served from cache.
    pub fn to_response(&self) -> Result<Response, CacheError> {
        let url = Url::parse(&self.url).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| CacheError::Corrupt(format!("{}: {e}", self.url)))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(n, v);
            }
        }

        Ok(Response {
            url,
            status,
            headers,
            body: self.body.clone().into(),
            source: ResponseSource::Cache,
        })
    }
}

mod body_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

// ==================== Generation ====================

/// A named set of cached entries.
#[derive(Debug, Clone)]
pub struct Generation {
    /// Generation name.
    pub name: String,

    /// Creation time (ms since epoch); stores search generations in this order.
    pub created_at: u64,

    entries: HashMap<RequestKey, CacheEntry>,
}

impl Generation {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            created_at: lantern_common::now_millis(),
            entries: HashMap::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, key: &RequestKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Insert or overwrite, returning the replaced entry.
    pub fn put(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        self.entries.insert(entry.key(), entry)
    }

    /// Delete entry.
    pub fn delete(&mut self, key: &RequestKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Get all keys.
    pub fn keys(&self) -> Vec<RequestKey> {
        self.entries.keys().cloned().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total body bytes.
    pub fn size(&self) -> u64 {
        self.entries.values().map(CacheEntry::size).sum()
    }
}

// ==================== Store ====================

/// The storage collaborator.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a generation, creating it if absent.
    async fn open(&self, name: &str) -> Result<(), CacheError>;

    /// Check if a generation exists.
    async fn has(&self, name: &str) -> Result<bool, CacheError>;

    /// All generation names, in creation order.
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Delete a generation. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;

    /// Exact match within one generation. A missing generation matches nothing.
    async fn match_in(&self, name: &str, key: &RequestKey)
        -> Result<Option<CacheEntry>, CacheError>;

    /// Exact match across all generations, first hit in creation order.
    async fn match_any(&self, key: &RequestKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Insert or overwrite an entry, creating the generation if absent.
    async fn put(&self, name: &str, entry: CacheEntry) -> Result<(), CacheError>;

    /// Keys stored in one generation.
    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>, CacheError>;
}

/// Build the store selected by `config`.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    let store: Arc<dyn CacheStore> = match config.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new(config.quota_bytes)),
        StorageBackend::Disk => {
            Arc::new(DiskStore::open(&config.cache_dir, config.quota_bytes).await?)
        }
    };
    Ok(store)
}

/// Fail when `needed` more bytes on top of `used` would exceed `quota`.
pub(crate) fn check_quota(quota: Option<u64>, used: u64, needed: u64) -> Result<(), CacheError> {
    match quota {
        Some(quota) if used + needed > quota => Err(CacheError::QuotaExceeded {
            needed,
            available: quota.saturating_sub(used),
        }),
        _ => Ok(()),
    }
}
