//! Application state shared across handlers.

use std::sync::Arc;

use crate::session::SessionFactory;
use crate::ws::{ConnectionRegistry, MessageRouter};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub router: Arc<MessageRouter>,
    /// Browser origins allowed to make cross-origin requests and to open the
    /// WebSocket. Empty denies every browser origin; clients that send no
    /// `Origin` header are not affected.
    pub allowed_origins: Vec<String>,
}

impl AppState {
    pub fn new(registry: Arc<ConnectionRegistry>, sessions: SessionFactory) -> Self {
        let router = Arc::new(MessageRouter::new(registry.clone(), sessions));
        Self {
            registry,
            router,
            allowed_origins: Vec::new(),
        }
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }
}
