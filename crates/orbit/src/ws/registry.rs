//! Registry of live WebSocket connections and the sessions they own.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::types::{ConnectionId, OutboundSink, new_connection_id};
use crate::session::{AssistantSession, ShellSession};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("server is shutting down")]
    ShuttingDown,

    #[error("connection limit of {0} reached")]
    AtCapacity(usize),
}

/// One client connection and the sessions it owns.
pub struct Connection {
    id: ConnectionId,
    created_at: DateTime<Utc>,
    sink: OutboundSink,
    shell: Option<ShellSession>,
    assistant: Option<AssistantSession>,
    closed: bool,
}

impl Connection {
    fn new(id: ConnectionId, sink: OutboundSink) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            sink,
            shell: None,
            assistant: None,
            closed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn sink(&self) -> &OutboundSink {
        &self.sink
    }

    pub fn shell(&self) -> Option<&ShellSession> {
        self.shell.as_ref()
    }

    pub fn shell_mut(&mut self) -> Option<&mut ShellSession> {
        self.shell.as_mut()
    }

    pub fn assistant(&self) -> Option<&AssistantSession> {
        self.assistant.as_ref()
    }

    pub fn assistant_mut(&mut self) -> Option<&mut AssistantSession> {
        self.assistant.as_mut()
    }

    /// Install a shell session, closing the previous one first.
    ///
    /// Returns false, and closes `session`, if the connection is already torn down.
    pub fn attach_shell(&mut self, mut session: ShellSession) -> bool {
        if self.closed {
            session.close();
            return false;
        }
        if let Some(mut old) = self.shell.take() {
            old.close();
        }
        self.shell = Some(session);
        true
    }

    /// Install an assistant session, closing the previous one first.
    pub fn attach_assistant(&mut self, mut session: AssistantSession) -> bool {
        if self.closed {
            session.close();
            return false;
        }
        if let Some(mut old) = self.assistant.take() {
            old.close();
        }
        self.assistant = Some(session);
        true
    }

    /// Kill the shell process. The session stays, inert, and keeps its
    /// working directory for the next start.
    pub fn close_shell(&mut self) {
        if let Some(shell) = self.shell.as_mut() {
            shell.close();
        }
    }

    pub fn close_assistant(&mut self) {
        if let Some(mut assistant) = self.assistant.take() {
            assistant.close();
        }
    }

    fn close(&mut self) {
        self.closed = true;
        self.close_shell();
        self.close_assistant();
    }
}

/// All live connections, keyed by id.
///
/// Each connection sits behind its own async mutex, so operations on one
/// connection are serialized while different connections proceed in parallel.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Mutex<Connection>>>,
    /// Admitted connections, reserved before insertion so the limit holds
    /// under concurrent upgrades.
    slots: AtomicUsize,
    accepting: AtomicBool,
    max_connections: usize,
    shutdown: CancellationToken,
}

impl ConnectionRegistry {
    /// `max_connections` of 0 means unlimited.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            slots: AtomicUsize::new(0),
            accepting: AtomicBool::new(true),
            max_connections,
            shutdown: CancellationToken::new(),
        }
    }

    /// Whether a new connection would be accepted right now.
    pub fn check_admission(&self) -> Result<(), RegistryError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(RegistryError::ShuttingDown);
        }
        if self.max_connections > 0 && self.slots.load(Ordering::SeqCst) >= self.max_connections {
            return Err(RegistryError::AtCapacity(self.max_connections));
        }
        Ok(())
    }

    fn reserve_slot(&self) -> Result<(), RegistryError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(RegistryError::ShuttingDown);
        }
        let max = self.max_connections;
        self.slots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (max == 0 || used < max).then_some(used + 1)
            })
            .map(|_| ())
            .map_err(|_| RegistryError::AtCapacity(max))
    }

    pub fn create(&self, sink: OutboundSink) -> Result<ConnectionId, RegistryError> {
        self.reserve_slot()?;
        let id = new_connection_id();
        self.connections
            .insert(id.clone(), Arc::new(Mutex::new(Connection::new(id.clone(), sink))));
        info!("connection {} registered ({} active)", id, self.connections.len());
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Mutex<Connection>>> {
        self.connections.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    /// See [`Connection::attach_shell`]. An unknown connection closes `session`.
    pub async fn attach_shell(&self, id: &str, mut session: ShellSession) -> bool {
        match self.get(id) {
            Some(conn) => conn.lock().await.attach_shell(session),
            None => {
                session.close();
                false
            }
        }
    }

    /// See [`Connection::attach_assistant`]. An unknown connection closes `session`.
    pub async fn attach_assistant(&self, id: &str, mut session: AssistantSession) -> bool {
        match self.get(id) {
            Some(conn) => conn.lock().await.attach_assistant(session),
            None => {
                session.close();
                false
            }
        }
    }

    /// Close both sessions of a connection and forget it.
    pub async fn remove(&self, id: &str) {
        let Some((_, conn)) = self.connections.remove(id) else {
            debug!("connection {} already removed", id);
            return;
        };
        self.slots.fetch_sub(1, Ordering::SeqCst);
        let mut conn = conn.lock().await;
        conn.close();
        info!(
            "connection {} removed after {}s ({} active)",
            id,
            (Utc::now() - conn.created_at).num_seconds(),
            self.connections.len()
        );
    }

    /// Refuse new connections and tear down every existing one.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        self.shutdown.cancel();
        let ids: Vec<ConnectionId> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        if !ids.is_empty() {
            warn!("shutting down {} connection(s)", ids.len());
        }
        for id in ids {
            self.remove(&id).await;
        }
    }

    /// Resolves once [`shutdown`](Self::shutdown) has been called.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await;
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_remove() {
        let registry = ConnectionRegistry::default();
        let (sink, _rx) = OutboundSink::channel();
        let id = registry.create(sink).unwrap();
        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);

        registry.remove(&id).await;
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());

        // Second remove is harmless.
        registry.remove(&id).await;
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let registry = ConnectionRegistry::new(1);
        let (sink, _rx) = OutboundSink::channel();
        let id = registry.create(sink.clone()).unwrap();
        assert_eq!(registry.create(sink.clone()), Err(RegistryError::AtCapacity(1)));

        registry.remove(&id).await;
        assert!(registry.create(sink).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_respect_limit_and_get_unique_ids() {
        let registry = Arc::new(ConnectionRegistry::new(8));
        let (sink, _rx) = OutboundSink::channel();

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let registry = registry.clone();
                let sink = sink.clone();
                tokio::spawn(async move { registry.create(sink) })
            })
            .collect();

        let mut ids = std::collections::HashSet::new();
        let mut refused = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(id) => assert!(ids.insert(id), "duplicate connection id"),
                Err(e) => {
                    assert_eq!(e, RegistryError::AtCapacity(8));
                    refused += 1;
                }
            }
        }
        assert_eq!(ids.len(), 8);
        assert_eq!(refused, 56);
        assert_eq!(registry.len(), 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_unlimited() {
        let registry = Arc::new(ConnectionRegistry::default());
        let (sink, _rx) = OutboundSink::channel();

        let tasks: Vec<_> = (0..100)
            .map(|_| {
                let registry = registry.clone();
                let sink = sink.clone();
                tokio::spawn(async move { registry.create(sink).unwrap() })
            })
            .collect();
        let mut ids = std::collections::HashSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap());
        }
        assert_eq!(ids.len(), 100);
        assert_eq!(registry.len(), 100);

        for id in &ids {
            registry.remove(id).await;
        }
        assert!(registry.is_empty());
        assert!(registry.check_admission().is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_connections() {
        let registry = ConnectionRegistry::default();
        let (sink, _rx) = OutboundSink::channel();
        registry.create(sink.clone()).unwrap();
        registry.create(sink.clone()).unwrap();

        registry.shutdown().await;
        registry.closed().await;
        assert!(registry.is_empty());
        assert!(!registry.is_accepting());
        assert_eq!(registry.create(sink), Err(RegistryError::ShuttingDown));
    }
}
