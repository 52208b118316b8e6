// WebSocket connection manager
// Tracks live interactive sessions and routes outbound messages to them

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_api::ServerMessage;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub type ConnectionId = String;

/// What is known about one live session.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub connected_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub last_activity: DateTime<Utc>,
}

/// Handle for one registered session. Re-registering an id issues a new
/// generation, so an older handle can no longer reach or remove the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub connection_id: ConnectionId,
    generation: u64,
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub max_connections: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
        }
    }
}

struct Route {
    generation: u64,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

/// Process-wide registry of sessions. Created at server start; an entry is
/// added when a session opens and removed when it closes or a send to it
/// fails.
pub struct WebSocketManager {
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionInfo>>>,
    message_senders: Arc<RwLock<HashMap<ConnectionId, Route>>>,
    next_generation: AtomicU64,
    config: WebSocketConfig,
}

impl WebSocketManager {
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            message_senders: Arc::new(RwLock::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
            config,
        }
    }

    /// Register a session. Re-using a live id replaces the older session;
    /// dropping its sender ends that session's send loop.
    pub fn register_connection(
        &self,
        connection_id: ConnectionId,
        user_agent: Option<String>,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<Registration, String> {
        let mut connections = self.connections.write();
        if !connections.contains_key(&connection_id) && connections.len() >= self.config.max_connections {
            return Err(format!(
                "Maximum connections ({}) reached",
                self.config.max_connections
            ));
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        let replaced = connections
            .insert(
                connection_id.clone(),
                ConnectionInfo {
                    connection_id: connection_id.clone(),
                    connected_at: now,
                    user_agent,
                    last_activity: now,
                },
            )
            .is_some();
        self.message_senders
            .write()
            .insert(connection_id.clone(), Route { generation, sender });
        let active = connections.len();
        drop(connections);

        if replaced {
            warn!(connection_id = %connection_id, "WebSocket connection id reused, replacing previous session");
        }
        info!(connection_id = %connection_id, active, "WebSocket connection registered");
        Ok(Registration {
            connection_id,
            generation,
        })
    }

    /// Remove the session `registration` was issued for. Returns `None` when
    /// it is already gone or a newer session now holds the id.
    pub fn unregister_connection(&self, registration: &Registration) -> Option<ConnectionInfo> {
        let mut connections = self.connections.write();
        let mut senders = self.message_senders.write();
        let current = senders
            .get(&registration.connection_id)
            .is_some_and(|route| route.generation == registration.generation);
        if !current {
            return None;
        }

        senders.remove(&registration.connection_id);
        let info = connections.remove(&registration.connection_id);
        drop(senders);
        drop(connections);

        info!(connection_id = %registration.connection_id, "WebSocket connection unregistered");
        info
    }

    /// Queue a message for one session. A closed session is dropped from
    /// the registry and `false` is returned.
    pub fn send(&self, registration: &Registration, message: ServerMessage) -> bool {
        let delivered = match self.message_senders.read().get(&registration.connection_id) {
            Some(route) if route.generation == registration.generation => route.sender.send(message).is_ok(),
            _ => {
                debug!(
                    connection_id = %registration.connection_id,
                    "Attempted to send message to a closed or replaced connection"
                );
                return false;
            }
        };

        if !delivered {
            warn!(connection_id = %registration.connection_id, "Message sender closed, dropping connection");
            self.unregister_connection(registration);
        }
        delivered
    }

    pub fn update_activity(&self, connection_id: &str) {
        if let Some(info) = self.connections.write().get_mut(connection_id) {
            info.last_activity = Utc::now();
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }
}

impl Default for WebSocketManager {
    fn default() -> Self {
        Self::new(WebSocketConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_send_unregister() {
        let manager = WebSocketManager::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registration = manager
            .register_connection("c1".to_string(), Some("test-agent".to_string()), tx)
            .unwrap();
        assert_eq!(manager.connection_count(), 1);

        assert!(manager.send(&registration, ServerMessage::error("hi")));
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::error("hi"));

        let info = manager.unregister_connection(&registration).unwrap();
        assert_eq!(info.user_agent.as_deref(), Some("test-agent"));
        assert_eq!(manager.connection_count(), 0);
        assert!(!manager.send(&registration, ServerMessage::error("gone")));
        assert!(manager.unregister_connection(&registration).is_none());
    }

    #[test]
    fn test_failed_send_removes_connection() {
        let manager = WebSocketManager::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let registration = manager.register_connection("c1".to_string(), None, tx).unwrap();
        drop(rx);

        assert!(!manager.send(&registration, ServerMessage::error("x")));
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn test_connection_limit() {
        let manager = WebSocketManager::new(WebSocketConfig { max_connections: 1 });
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let (tx3, _rx3) = mpsc::unbounded_channel();
        manager.register_connection("a".to_string(), None, tx1).unwrap();
        assert!(manager.register_connection("b".to_string(), None, tx2).is_err());
        // same id replaces rather than counting against the limit
        assert!(manager.register_connection("a".to_string(), None, tx3).is_ok());
    }

    #[test]
    fn test_replaced_session_cleanup_leaves_new_session_alone() {
        let manager = WebSocketManager::default();
        let (old_tx, mut old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();
        let old = manager.register_connection("same".to_string(), None, old_tx).unwrap();
        let new = manager.register_connection("same".to_string(), None, new_tx).unwrap();
        assert_ne!(old, new);

        // the old sender was dropped on replacement
        assert!(old_rx.try_recv().is_err());
        assert!(!manager.send(&old, ServerMessage::error("stale")));

        // the old handler exits and cleans up after itself
        assert!(manager.unregister_connection(&old).is_none());
        assert_eq!(manager.connection_count(), 1);

        assert!(manager.send(&new, ServerMessage::error("still here")));
        assert_eq!(new_rx.try_recv().unwrap(), ServerMessage::error("still here"));
    }
}
