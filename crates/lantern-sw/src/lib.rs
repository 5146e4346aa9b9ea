//! # Lantern Service Worker
//!
//! Offline-caching agent for a static tutorial site.
//!
//! ## Features
//!
//! - **Generations**: precache at install, garbage-collect old versions at activate
//! - **Routing**: navigations go network-first, assets go stale-while-revalidate
//! - **Lifecycle**: installing → waiting → active, with skip-waiting and client claim
//! - **Messages**: `SKIP_WAITING`, `GET_VERSION`, `CACHE_URLS`, `CLEAR_CACHE`
//! - **Notifications**: push display and click-to-focus
//!
//! ## Architecture
//!
//! ```text
//! OfflineWorker::dispatch(WorkerEvent)
//!     │
//!     ├── Install / Activate ──→ GenerationManager ──→ CacheStore
//!     ├── Fetch ──→ router::classify ──→ FetchStrategies ──→ Fetcher + CacheStore
//!     ├── Message ──→ ClientMessage (reply over oneshot)
//!     ├── Push / NotificationClick ──→ NotificationCenter + Clients
//!     └── Sync / PeriodicSync ──→ sync placeholders
//!
//! HostEvent ──→ mpsc channel back to the host
//! ```

use lantern_cache::CacheError;
use lantern_common::ConfigError;
use lantern_net::NetError;
use thiserror::Error;

pub mod clients;
pub mod generations;
pub mod lifecycle;
pub mod messages;
pub mod notifications;
pub mod router;
pub mod strategy;
pub mod sync;
pub mod worker;

pub use clients::{Client, ClientMatchOptions, ClientType, Clients};
pub use generations::{GenerationManager, GenerationNames, InstallReport};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use messages::{ClientMessage, MessageReply, ReplyPort};
pub use notifications::{ClickOutcome, Notification, NotificationCenter, PushPayload};
pub use router::{classify, Route};
pub use strategy::{FetchOutcome, FetchStrategies, Revalidation};
pub use worker::{EventOutcome, HostEvent, OfflineWorker, WorkerEvent};

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Network failed and nothing usable was cached.
    #[error("Offline and not cached: {0}")]
    Offline(String),

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not delete {failed} of {total} generations")]
    DeleteFailed { failed: usize, total: usize },

    #[error("Message error: {0}")]
    Message(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Background task failed: {0}")]
    Task(String),
}
