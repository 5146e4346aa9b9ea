//! Clients: the windows and workers the agent can control.

use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use url::Url;

use crate::ServiceWorkerError;

/// A client (controlled page or worker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    /// Client type.
    pub client_type: ClientType,

    /// Whether focused.
    pub focused: bool,

    /// Whether this agent controls the client.
    pub controlled: bool,
}

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
    SharedWorker,
    All,
}

impl Client {
    /// An uncontrolled window client at `url`.
    pub fn window(url: Url) -> Self {
        Self {
            id: next_client_id(),
            url,
            client_type: ClientType::Window,
            focused: false,
            controlled: false,
        }
    }
}

/// Options for [`Clients::match_all`].
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
    pub client_type: ClientType,
}

/// Clients API.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Match all clients.
    pub fn match_all(&self, options: &ClientMatchOptions) -> Vec<&Client> {
        let mut matched: Vec<&Client> = self
            .clients
            .values()
            .filter(|c| options.include_uncontrolled || c.controlled)
            .filter(|c| match options.client_type {
                ClientType::All => true,
                t => c.client_type == t,
            })
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        matched
    }

    /// Open a window, focused and controlled.
    pub fn open_window(&mut self, url: &str) -> Result<Client, ServiceWorkerError> {
        let url = Url::parse(url).map_err(|e| ServiceWorkerError::Client(e.to_string()))?;

        for other in self.clients.values_mut() {
            other.focused = false;
        }

        let client = Client {
            focused: true,
            controlled: true,
            ..Client::window(url)
        };

        debug!(client_id = %client.id, url = %client.url, "Window opened");
        self.clients.insert(client.id.clone(), client.clone());
        Ok(client)
    }

    /// Focus a window client.
    pub fn focus(&mut self, id: &str) -> Result<Client, ServiceWorkerError> {
        match self.clients.get(id) {
            None => return Err(ServiceWorkerError::Client(format!("no client {id}"))),
            Some(client) if client.client_type != ClientType::Window => {
                return Err(ServiceWorkerError::Client(
                    "Can only focus window clients".to_string(),
                ));
            }
            Some(_) => {}
        }

        for client in self.clients.values_mut() {
            client.focused = client.id == id;
        }
        self.clients
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceWorkerError::Client(format!("no client {id}")))
    }

    /// Take control of every client. Returns the IDs that were not controlled before.
    pub fn claim(&mut self) -> Vec<String> {
        let mut claimed: Vec<String> = self
            .clients
            .values_mut()
            .filter(|c| !c.controlled)
            .map(|c| {
                c.controlled = true;
                c.id.clone()
            })
            .collect();
        claimed.sort();
        claimed
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }
}

/// Generate a client ID, ordered by creation.
fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{:08}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_open_window_focuses_and_controls() {
        let mut clients = Clients::new();
        let first = clients.open_window("https://site.test/").unwrap();
        let second = clients.open_window("https://site.test/ch02.html").unwrap();

        assert_eq!(second.client_type, ClientType::Window);
        assert!(second.focused && second.controlled);
        assert!(!clients.get(&first.id).unwrap().focused);
    }

    #[test]
    fn test_open_window_rejects_bad_url() {
        let mut clients = Clients::new();
        assert!(matches!(
            clients.open_window("not a url"),
            Err(ServiceWorkerError::Client(_))
        ));
    }

    #[test]
    fn test_match_all_filters_uncontrolled_and_type() {
        let mut clients = Clients::new();
        clients.add(Client::window(url("https://site.test/a")));
        clients.add(Client {
            client_type: ClientType::Worker,
            controlled: true,
            ..Client::window(url("https://site.test/worker.js"))
        });

        let controlled_windows = clients.match_all(&ClientMatchOptions::default());
        assert!(controlled_windows.is_empty());

        let all_windows = clients.match_all(&ClientMatchOptions {
            include_uncontrolled: true,
            client_type: ClientType::Window,
        });
        assert_eq!(all_windows.len(), 1);

        let everything = clients.match_all(&ClientMatchOptions {
            include_uncontrolled: true,
            client_type: ClientType::All,
        });
        assert_eq!(everything.len(), 2);
    }

    #[test]
    fn test_claim_returns_newly_controlled() {
        let mut clients = Clients::new();
        let a = Client::window(url("https://site.test/a"));
        let b = Client {
            controlled: true,
            ..Client::window(url("https://site.test/b"))
        };
        let a_id = a.id.clone();
        clients.add(a);
        clients.add(b);

        assert_eq!(clients.claim(), vec![a_id]);
        assert!(clients.claim().is_empty());
        assert_eq!(clients.match_all(&ClientMatchOptions::default()).len(), 2);
    }

    #[test]
    fn test_focus_only_windows() {
        let mut clients = Clients::new();
        let worker = Client {
            client_type: ClientType::Worker,
            ..Client::window(url("https://site.test/w.js"))
        };
        let worker_id = worker.id.clone();
        clients.add(worker);

        assert!(clients.focus(&worker_id).is_err());
        assert!(clients.focus("client-missing").is_err());

        let window = Client::window(url("https://site.test/"));
        let window_id = window.id.clone();
        clients.add(window);
        assert!(clients.focus(&window_id).unwrap().focused);
    }
}
