//! In-process cache store.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

use crate::{check_quota, CacheEntry, CacheError, CacheStore, Generation, RequestKey};

/// Generations held in memory, in creation order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    generations: RwLock<Vec<Generation>>,
    quota_bytes: Option<u64>,
}

impl MemoryStore {
    /// Create a store, optionally limited to `quota_bytes` of bodies.
    pub fn new(quota_bytes: Option<u64>) -> Self {
        Self {
            generations: RwLock::new(Vec::new()),
            quota_bytes,
        }
    }

    /// Total body bytes across all generations.
    pub async fn usage(&self) -> u64 {
        self.generations.read().await.iter().map(Generation::size).sum()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        let mut generations = self.generations.write().await;
        if !generations.iter().any(|g| g.name == name) {
            trace!(generation = name, "Creating generation");
            generations.push(Generation::new(name));
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.generations.read().await.iter().any(|g| g.name == name))
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self
            .generations
            .read()
            .await
            .iter()
            .map(|g| g.name.clone())
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let mut generations = self.generations.write().await;
        let before = generations.len();
        generations.retain(|g| g.name != name);
        Ok(generations.len() != before)
    }

    async fn match_in(
        &self,
        name: &str,
        key: &RequestKey,
    ) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self
            .generations
            .read()
            .await
            .iter()
            .find(|g| g.name == name)
            .and_then(|g| g.match_request(key))
            .cloned())
    }

    async fn match_any(&self, key: &RequestKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self
            .generations
            .read()
            .await
            .iter()
            .find_map(|g| g.match_request(key))
            .cloned())
    }

    async fn put(&self, name: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let mut generations = self.generations.write().await;

        let key = entry.key();
        let used: u64 = generations.iter().map(Generation::size).sum();
        let replaced = generations
            .iter()
            .find(|g| g.name == name)
            .and_then(|g| g.match_request(&key))
            .map(CacheEntry::size)
            .unwrap_or(0);
        check_quota(self.quota_bytes, used - replaced, entry.size())?;

        let index = match generations.iter().position(|g| g.name == name) {
            Some(index) => index,
            None => {
                generations.push(Generation::new(name));
                generations.len() - 1
            }
        };

        trace!(generation = name, key = %key, bytes = entry.size(), "Storing entry");
        generations[index].put(entry);
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<RequestKey>, CacheError> {
        Ok(self
            .generations
            .read()
            .await
            .iter()
            .find(|g| g.name == name)
            .map(Generation::keys)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn entry(url: &str, body: &str) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            method: "GET".to_string(),
            status: 200,
            headers: Default::default(),
            body: body.as_bytes().to_vec(),
            cached_at: 0,
        }
    }

    fn key(url: &str) -> RequestKey {
        RequestKey::get(&Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let store = MemoryStore::default();
        store.open("tutorial-precache-v1").await.unwrap();
        store.open("tutorial-precache-v1").await.unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["tutorial-precache-v1"]);
        assert!(store.has("tutorial-precache-v1").await.unwrap());
        assert!(!store.has("tutorial-runtime-v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_put_creates_generation_and_overwrites() {
        let store = MemoryStore::default();
        let url = "https://site.test/app.css";

        store.put("runtime", entry(url, "a")).await.unwrap();
        store.put("runtime", entry(url, "bb")).await.unwrap();

        let found = store.match_in("runtime", &key(url)).await.unwrap().unwrap();
        assert_eq!(found.body, b"bb");
        assert_eq!(store.entries("runtime").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_match_any_uses_creation_order() {
        let store = MemoryStore::default();
        let url = "https://site.test/index.html";

        store.put("first", entry(url, "one")).await.unwrap();
        store.put("second", entry(url, "two")).await.unwrap();

        let found = store.match_any(&key(url)).await.unwrap().unwrap();
        assert_eq!(found.body, b"one");
        assert!(store.match_in("missing", &key(url)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_independent() {
        let store = MemoryStore::default();
        store.open("a").await.unwrap();
        store.open("b").await.unwrap();

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert_eq!(store.keys().await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_quota_counts_replaced_entry() {
        let store = MemoryStore::new(Some(4));
        let url = "https://site.test/a.js";

        store.put("g", entry(url, "1234")).await.unwrap();
        // Overwriting frees the old body first.
        store.put("g", entry(url, "abcd")).await.unwrap();

        let err = store
            .put("g", entry("https://site.test/b.js", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::QuotaExceeded { needed: 1, available: 0 }));
        assert_eq!(store.usage().await, 4);
    }
}
