//! The agent: lifecycle, event dispatch, and the host-facing channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lantern_cache::{CacheStore, RequestKey};
use lantern_common::{AgentConfig, NotificationDefaults};
use lantern_net::{Fetcher, Request};
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::clients::{ClientMatchOptions, ClientType, Clients};
use crate::generations::{GenerationManager, GenerationNames, InstallReport};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::messages::{respond, ClientMessage, MessageReply, ReplyPort};
use crate::notifications::{
    ClickOutcome, Notification, NotificationCenter, NotificationId, PushPayload, DISMISS_ACTION,
};
use crate::router::{classify, Route};
use crate::strategy::{FetchOutcome, FetchStrategies};
use crate::{sync, ServiceWorkerError};

/// Unique identifier for a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Events the host delivers to the worker.
#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Message {
        data: JsonValue,
        reply: Option<ReplyPort>,
    },
    Push {
        data: Option<Vec<u8>>,
    },
    NotificationClick {
        notification: Notification,
        action: Option<String>,
    },
    Sync {
        tag: String,
    },
    PeriodicSync {
        tag: String,
    },
}

impl WorkerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Fetch(_) => "fetch",
            WorkerEvent::Message { .. } => "message",
            WorkerEvent::Push { .. } => "push",
            WorkerEvent::NotificationClick { .. } => "notificationclick",
            WorkerEvent::Sync { .. } => "sync",
            WorkerEvent::PeriodicSync { .. } => "periodicsync",
        }
    }
}

/// What handling an event produced.
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    /// Names of the generations removed.
    Activated(Vec<String>),
    Respond(FetchOutcome),
    /// Not intercepted; the host fetches normally.
    Passthrough,
    Notified(Notification),
    Clicked(ClickOutcome),
    Done,
}

/// Side effects the host should apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    StateChange {
        worker_id: WorkerId,
        state: LifecycleState,
    },
    ControllerChange {
        client_id: String,
    },
    NotificationShown {
        notification: Notification,
    },
    NotificationClosed {
        id: NotificationId,
    },
    ClientFocused {
        client_id: String,
    },
    WindowOpened {
        client_id: String,
        url: Url,
    },
}

/// The offline-caching agent.
pub struct OfflineWorker {
    id: WorkerId,
    origin: Url,
    version: String,
    notification_defaults: NotificationDefaults,
    lifecycle: RwLock<Lifecycle>,
    generations: GenerationManager,
    strategies: FetchStrategies,
    clients: Arc<RwLock<Clients>>,
    notifications: RwLock<NotificationCenter>,
    event_tx: mpsc::UnboundedSender<HostEvent>,
}

impl OfflineWorker {
    /// Create a worker in the installing state.
    pub fn new(
        config: &AgentConfig,
        store: Arc<dyn CacheStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<HostEvent>), ServiceWorkerError> {
        config.validate()?;

        let names = GenerationNames::from_config(config);
        let index_key = RequestKey::get(&config.index_url()?);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let worker = Self {
            id: WorkerId::new(),
            origin: config.origin.clone(),
            version: names.precache.clone(),
            notification_defaults: config.notifications.clone(),
            lifecycle: RwLock::new(Lifecycle::new()),
            generations: GenerationManager::new(
                names.clone(),
                config.precache_urls()?,
                Arc::clone(&store),
                Arc::clone(&fetcher),
            ),
            strategies: FetchStrategies::new(names, index_key, store, fetcher),
            clients: Arc::new(RwLock::new(Clients::new())),
            notifications: RwLock::new(NotificationCenter::new()),
            event_tx,
        };

        info!(worker_id = ?worker.id, version = %worker.version, "Worker created");
        Ok((worker, event_rx))
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Version reported to pages: the precache generation name.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.read().await.state()
    }

    pub fn clients(&self) -> Arc<RwLock<Clients>> {
        Arc::clone(&self.clients)
    }

    pub async fn visible_notifications(&self) -> Vec<Notification> {
        self.notifications
            .read()
            .await
            .visible()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Dispatch an event, logging any error instead of returning it.
    pub async fn handle(&self, event: WorkerEvent) -> Option<EventOutcome> {
        let kind = event.kind();
        match self.dispatch(event).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(event = kind, error = %e, "Unhandled error in event handler");
                None
            }
        }
    }

    /// Dispatch an event to its handler.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome, ServiceWorkerError> {
        match event {
            WorkerEvent::Install => self.install().await.map(EventOutcome::Installed),
            WorkerEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            WorkerEvent::Fetch(request) => Ok(match self.handle_fetch(&request).await? {
                Some(outcome) => EventOutcome::Respond(outcome),
                None => EventOutcome::Passthrough,
            }),
            WorkerEvent::Message { data, reply } => {
                self.handle_message(&data, reply).await?;
                Ok(EventOutcome::Done)
            }
            WorkerEvent::Push { data } => {
                Ok(EventOutcome::Notified(self.handle_push(data.as_deref()).await))
            }
            WorkerEvent::NotificationClick {
                notification,
                action,
            } => self
                .handle_notification_click(&notification, action.as_deref())
                .await
                .map(EventOutcome::Clicked),
            WorkerEvent::Sync { tag } => {
                sync::background_sync(&tag).await;
                Ok(EventOutcome::Done)
            }
            WorkerEvent::PeriodicSync { tag } => {
                sync::periodic_sync(&tag).await;
                Ok(EventOutcome::Done)
            }
        }
    }

    /// Install, then activate straight away if skip-waiting was requested.
    pub async fn start(&self) -> Result<InstallReport, ServiceWorkerError> {
        let report = self.install().await?;
        if self.claim_pending_activation().await? {
            self.finish_activation().await?;
        }
        Ok(report)
    }

    // ==================== Lifecycle ====================

    /// Precache, request skip-waiting, and move to waiting.
    ///
    /// Precache failures never fail the install.
    pub async fn install(&self) -> Result<InstallReport, ServiceWorkerError> {
        self.lifecycle.write().await.begin_install()?;

        let report = self.generations.initialize().await;

        let mut lifecycle = self.lifecycle.write().await;
        lifecycle.skip_waiting();
        lifecycle.install_complete()?;
        drop(lifecycle);

        self.emit(HostEvent::StateChange {
            worker_id: self.id,
            state: LifecycleState::Waiting,
        });
        Ok(report)
    }

    /// Remove stale generations, become active, and claim every client.
    pub async fn activate(&self) -> Result<Vec<String>, ServiceWorkerError> {
        self.lifecycle.write().await.begin_activation()?;
        self.finish_activation().await
    }

    /// Force activation of a waiting worker.
    ///
    /// A no-op while an activation is already running.
    pub async fn skip_waiting(&self) -> Result<(), ServiceWorkerError> {
        self.lifecycle.write().await.skip_waiting();
        if self.claim_pending_activation().await? {
            self.finish_activation().await?;
        }
        Ok(())
    }

    /// Claim the activation if skip-waiting is due, checked under one guard.
    async fn claim_pending_activation(&self) -> Result<bool, ServiceWorkerError> {
        let mut lifecycle = self.lifecycle.write().await;
        if !lifecycle.should_activate() {
            return Ok(false);
        }
        lifecycle.begin_activation()?;
        Ok(true)
    }

    async fn finish_activation(&self) -> Result<Vec<String>, ServiceWorkerError> {
        let deleted = match self.generations.activate().await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(error = %e, "Generation cleanup failed, activating anyway");
                Vec::new()
            }
        };

        self.lifecycle.write().await.activate()?;
        self.emit(HostEvent::StateChange {
            worker_id: self.id,
            state: LifecycleState::Active,
        });

        let claimed = self.clients.write().await.claim();
        for client_id in claimed {
            self.emit(HostEvent::ControllerChange { client_id });
        }

        info!(worker_id = ?self.id, "Worker active");
        Ok(deleted)
    }

    /// Retire this worker; it stops intercepting fetches.
    pub async fn make_redundant(&self) {
        self.lifecycle.write().await.make_redundant();
        self.emit(HostEvent::StateChange {
            worker_id: self.id,
            state: LifecycleState::Redundant,
        });
    }

    // ==================== Fetch ====================

    /// Route an intercepted request. `None` means the host should fetch normally.
    pub async fn handle_fetch(
        &self,
        request: &Request,
    ) -> Result<Option<FetchOutcome>, ServiceWorkerError> {
        if !self.state().await.can_intercept_fetch() {
            return Ok(None);
        }

        match classify(request) {
            Route::Passthrough => Ok(None),
            Route::Navigation => {
                let response = self.strategies.network_first(request).await?;
                Ok(Some(FetchOutcome {
                    response,
                    revalidation: None,
                }))
            }
            Route::Asset => Ok(Some(self.strategies.stale_while_revalidate(request).await?)),
        }
    }

    // ==================== Messages ====================

    pub async fn handle_message(
        &self,
        data: &JsonValue,
        reply: Option<ReplyPort>,
    ) -> Result<(), ServiceWorkerError> {
        let message = match ClientMessage::parse(data) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Ignoring message");
                return Ok(());
            }
        };
        debug!(?message, "Message received");

        match message {
            ClientMessage::SkipWaiting => self.skip_waiting().await?,
            ClientMessage::GetVersion => respond(
                reply,
                MessageReply::Version {
                    version: self.version.clone(),
                    timestamp: lantern_common::now_millis(),
                },
            ),
            ClientMessage::CacheUrls { urls } => {
                let success = self.cache_urls(&urls).await;
                respond(reply, MessageReply::Status { success });
            }
            ClientMessage::ClearCache => {
                let success = match self.generations.clear_all().await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(error = %e, "Clear cache incomplete");
                        false
                    }
                };
                respond(reply, MessageReply::Status { success });
            }
        }
        Ok(())
    }

    async fn cache_urls(&self, urls: &[String]) -> bool {
        let mut resolved = Vec::with_capacity(urls.len());
        for url in urls {
            match self.origin.join(url) {
                Ok(url) => resolved.push(url),
                Err(e) => {
                    warn!(url = %url, error = %e, "Cannot resolve URL to cache");
                    return false;
                }
            }
        }
        let runtime = self.generations.names().runtime.clone();
        self.generations
            .add_all(&runtime, &resolved)
            .await
            .is_complete()
    }

    // ==================== Notifications ====================

    pub async fn handle_push(&self, data: Option<&[u8]>) -> Notification {
        let notification =
            Notification::from_push(PushPayload::parse(data), &self.notification_defaults);
        self.notifications.write().await.show(notification.clone());
        debug!(title = %notification.title, "Notification shown");
        self.emit(HostEvent::NotificationShown {
            notification: notification.clone(),
        });
        notification
    }

    /// Close the notification, then focus or open the page it points at.
    pub async fn handle_notification_click(
        &self,
        notification: &Notification,
        action: Option<&str>,
    ) -> Result<ClickOutcome, ServiceWorkerError> {
        self.notifications.write().await.close(notification.id);
        self.emit(HostEvent::NotificationClosed {
            id: notification.id,
        });

        if action == Some(DISMISS_ACTION) {
            return Ok(ClickOutcome::Dismissed);
        }

        let target = self
            .origin
            .join(&notification.data.url)
            .map_err(|e| ServiceWorkerError::Client(e.to_string()))?;

        let mut clients = self.clients.write().await;
        let existing = clients
            .match_all(&ClientMatchOptions {
                include_uncontrolled: true,
                client_type: ClientType::Window,
            })
            .into_iter()
            .find(|c| c.url == target)
            .map(|c| c.id.clone());

        match existing {
            Some(id) => {
                let client = clients.focus(&id)?;
                drop(clients);
                self.emit(HostEvent::ClientFocused {
                    client_id: client.id.clone(),
                });
                Ok(ClickOutcome::Focused(client.id))
            }
            None => {
                let client = clients.open_window(target.as_str())?;
                drop(clients);
                self.emit(HostEvent::WindowOpened {
                    client_id: client.id.clone(),
                    url: client.url,
                });
                Ok(ClickOutcome::Opened(client.id))
            }
        }
    }

    fn emit(&self, event: HostEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("Host event receiver dropped");
        }
    }
}
