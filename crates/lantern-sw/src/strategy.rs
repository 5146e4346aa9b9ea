//! Fetch strategies.
//!
//! - Navigation: network-first, falling back to any exact cached match and
//!   then to the cached index document.
//! - Assets: stale-while-revalidate against the runtime generation.
//!
//! The asset strategy resolves its cache lookup completely before deciding
//! anything. The network refresh runs as its own task, so a cache hit is
//! returned without waiting on the network at all.

use std::sync::Arc;

use lantern_cache::{CacheEntry, CacheStore, RequestKey};
use lantern_net::{Fetcher, Request, Response};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::generations::GenerationNames;
use crate::ServiceWorkerError;

/// A background refresh of one runtime entry.
///
/// Dropping it detaches the task; it still runs to completion.
#[derive(Debug)]
pub struct Revalidation(JoinHandle<Option<Response>>);

impl Revalidation {
    /// Wait for the refresh. True when the network answered.
    pub async fn finished(self) -> bool {
        matches!(self.0.await, Ok(Some(_)))
    }
}

/// Response for an intercepted fetch.
#[derive(Debug)]
pub struct FetchOutcome {
    pub response: Response,
    /// Present when a cached copy was served and a refresh is still in flight.
    pub revalidation: Option<Revalidation>,
}

impl FetchOutcome {
    fn immediate(response: Response) -> Self {
        Self {
            response,
            revalidation: None,
        }
    }
}

/// Both fetch strategies over one store and one fetcher.
pub struct FetchStrategies {
    names: GenerationNames,
    index_key: RequestKey,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
}

impl FetchStrategies {
    pub fn new(
        names: GenerationNames,
        index_key: RequestKey,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            names,
            index_key,
            store,
            fetcher,
        }
    }

    /// Network-first with cache fallback.
    pub async fn network_first(&self, request: &Request) -> Result<Response, ServiceWorkerError> {
        let key = RequestKey::for_request(request);

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.ok() {
                    let entry = CacheEntry::from_response(&key, &response);
                    if let Err(e) = self.store.put(&self.names.precache, entry).await {
                        warn!(key = %key, error = %e, "Failed to store navigation response");
                    }
                }
                Ok(response)
            }
            Err(err) => {
                debug!(key = %key, error = %err, "Navigation fetch failed, trying cache");

                if let Some(response) = self.lookup_any(&key).await {
                    return Ok(response);
                }
                if let Some(response) = self.lookup_any(&self.index_key).await {
                    debug!(key = %key, "Serving index document fallback");
                    return Ok(response);
                }
                Err(ServiceWorkerError::Offline(request.url.to_string()))
            }
        }
    }

    /// Stale-while-revalidate.
    pub async fn stale_while_revalidate(
        &self,
        request: &Request,
    ) -> Result<FetchOutcome, ServiceWorkerError> {
        let key = RequestKey::for_request(request);
        let cached = self.lookup_runtime(&key).await;

        let refresh = tokio::spawn(revalidate(
            Arc::clone(&self.store),
            Arc::clone(&self.fetcher),
            self.names.runtime.clone(),
            request.clone(),
            key,
        ));

        match cached {
            Some(response) => Ok(FetchOutcome {
                response,
                revalidation: Some(Revalidation(refresh)),
            }),
            None => match refresh.await {
                Ok(Some(response)) => Ok(FetchOutcome::immediate(response)),
                Ok(None) => Err(ServiceWorkerError::Offline(request.url.to_string())),
                Err(e) => Err(ServiceWorkerError::Task(e.to_string())),
            },
        }
    }

    async fn lookup_runtime(&self, key: &RequestKey) -> Option<Response> {
        let runtime = &self.names.runtime;
        let lookup = match self.store.open(runtime).await {
            Ok(()) => self.store.match_in(runtime, key).await,
            Err(e) => Err(e),
        };
        match lookup {
            Ok(entry) => entry.and_then(|e| to_response(key, &e)),
            Err(e) => {
                warn!(key = %key, error = %e, "Runtime lookup failed");
                None
            }
        }
    }

    async fn lookup_any(&self, key: &RequestKey) -> Option<Response> {
        match self.store.match_any(key).await {
            Ok(entry) => entry.and_then(|e| to_response(key, &e)),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache lookup failed");
                None
            }
        }
    }
}

fn to_response(key: &RequestKey, entry: &CacheEntry) -> Option<Response> {
    entry
        .to_response()
        .map_err(|e| warn!(key = %key, error = %e, "Ignoring unreadable cache entry"))
        .ok()
}

/// Fetch and, on an ok response, overwrite the runtime entry.
///
/// Network failure resolves to `None`; nothing propagates.
async fn revalidate(
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    generation: String,
    request: Request,
    key: RequestKey,
) -> Option<Response> {
    match fetcher.fetch(&request).await {
        Ok(response) => {
            if response.ok() {
                let entry = CacheEntry::from_response(&key, &response);
                if let Err(e) = store.put(&generation, entry).await {
                    warn!(key = %key, error = %e, "Failed to refresh runtime entry");
                }
            }
            Some(response)
        }
        Err(e) => {
            debug!(key = %key, error = %e, "Revalidation fetch failed");
            None
        }
    }
}
