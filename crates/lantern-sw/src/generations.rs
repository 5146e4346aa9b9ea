//! Cache generation manager: precache on install, garbage-collect on activate.

use std::sync::Arc;

use futures::future::join_all;
use lantern_cache::{CacheEntry, CacheStore, RequestKey};
use lantern_common::AgentConfig;
use lantern_net::{Fetcher, NetError, Request};
use tracing::{debug, info, warn};
use url::Url;

use crate::ServiceWorkerError;

/// Names of the generations owned by the current version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationNames {
    pub precache: String,
    pub runtime: String,
    /// Shared by every generation this agent has ever created.
    pub prefix: String,
}

impl GenerationNames {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            precache: config.precache_name(),
            runtime: config.runtime_name(),
            prefix: config.generation_prefix(),
        }
    }

    /// Owned by this agent but not by the current version.
    pub fn is_stale(&self, name: &str) -> bool {
        name.starts_with(&self.prefix) && name != self.precache && name != self.runtime
    }
}

/// Outcome of a bulk insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub cached: Vec<Url>,
    pub failed: Vec<(Url, String)>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Creates, fills, and deletes cache generations.
pub struct GenerationManager {
    names: GenerationNames,
    precache: Vec<Url>,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
}

impl GenerationManager {
    pub fn new(
        names: GenerationNames,
        precache: Vec<Url>,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            names,
            precache,
            store,
            fetcher,
        }
    }

    pub fn names(&self) -> &GenerationNames {
        &self.names
    }

    /// Open the precache generation and fill it with the precache list.
    ///
    /// Failures are logged and reported, never returned: installation proceeds.
    pub async fn initialize(&self) -> InstallReport {
        let report = self.add_all(&self.names.precache, &self.precache).await;
        if report.is_complete() {
            info!(
                generation = %self.names.precache,
                count = report.cached.len(),
                "Precache complete"
            );
        } else {
            warn!(
                generation = %self.names.precache,
                cached = report.cached.len(),
                failed = report.failed.len(),
                "Precache incomplete, continuing install"
            );
        }
        report
    }

    /// Fetch every URL and store the ok responses in `generation`.
    pub async fn add_all(&self, generation: &str, urls: &[Url]) -> InstallReport {
        let mut report = InstallReport::default();

        if let Err(e) = self.store.open(generation).await {
            warn!(generation, error = %e, "Failed to open generation");
            report.failed = urls.iter().map(|u| (u.clone(), e.to_string())).collect();
            return report;
        }

        let results = join_all(urls.iter().map(|url| self.add(generation, url))).await;
        for (url, result) in urls.iter().zip(results) {
            match result {
                Ok(()) => report.cached.push(url.clone()),
                Err(e) => {
                    warn!(generation, url = %url, error = %e, "Failed to cache URL");
                    report.failed.push((url.clone(), e.to_string()));
                }
            }
        }
        report
    }

    async fn add(&self, generation: &str, url: &Url) -> Result<(), ServiceWorkerError> {
        let request = Request::get(url.clone());
        let response = self.fetcher.fetch(&request).await?;
        if !response.ok() {
            return Err(NetError::RequestFailed(format!("{url} returned {}", response.status)).into());
        }
        let key = RequestKey::for_request(&request);
        self.store
            .put(generation, CacheEntry::from_response(&key, &response))
            .await?;
        Ok(())
    }

    /// Delete every generation carrying the prefix that the current version does not own.
    ///
    /// Deletions run concurrently; one failing does not stop the others.
    /// Returns the names actually deleted.
    pub async fn activate(&self) -> Result<Vec<String>, ServiceWorkerError> {
        let stale: Vec<String> = self
            .store
            .keys()
            .await?
            .into_iter()
            .filter(|name| self.names.is_stale(name))
            .collect();

        let deleted = self.delete_each(&stale).await;
        info!(
            deleted = deleted.len(),
            stale = stale.len(),
            "Old generations removed"
        );
        Ok(deleted)
    }

    /// Delete every generation, whoever owns it.
    ///
    /// All deletions are attempted before any failure is reported.
    pub async fn clear_all(&self) -> Result<Vec<String>, ServiceWorkerError> {
        let names = self.store.keys().await?;
        let deleted = self.delete_each(&names).await;
        if deleted.len() != names.len() {
            return Err(ServiceWorkerError::DeleteFailed {
                failed: names.len() - deleted.len(),
                total: names.len(),
            });
        }
        info!(count = deleted.len(), "All generations cleared");
        Ok(deleted)
    }

    async fn delete_each(&self, names: &[String]) -> Vec<String> {
        let results = join_all(names.iter().map(|name| self.store.delete(name))).await;
        names
            .iter()
            .zip(results)
            .filter_map(|(name, result)| match result {
                Ok(existed) => {
                    debug!(generation = %name, existed, "Generation deleted");
                    Some(name.clone())
                }
                Err(e) => {
                    warn!(generation = %name, error = %e, "Failed to delete generation");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> GenerationNames {
        GenerationNames::from_config(&AgentConfig::default())
    }

    #[test]
    fn test_is_stale() {
        let names = names();
        assert!(!names.is_stale("tutorial-precache-v1"));
        assert!(!names.is_stale("tutorial-runtime-v1"));
        assert!(names.is_stale("tutorial-precache-v0"));
        assert!(names.is_stale("tutorial-runtime-2023"));
        assert!(!names.is_stale("someone-elses-cache"));
    }

    #[test]
    fn test_install_report_complete() {
        let mut report = InstallReport::default();
        assert!(report.is_complete());
        report
            .failed
            .push((Url::parse("https://site.test/").unwrap(), "offline".to_string()));
        assert!(!report.is_complete());
    }
}
