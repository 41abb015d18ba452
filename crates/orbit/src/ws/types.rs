//! Connection identity and the per-connection outbound channel.

use log::trace;
use orbit_protocol::ServerMessage;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Opaque connection identifier (`conn-<uuid>`).
pub type ConnectionId = String;

pub fn new_connection_id() -> ConnectionId {
    format!("conn-{}", Uuid::new_v4().simple())
}

/// Send-only handle to a connection's socket writer.
///
/// Cloneable and usable from any task or thread. Sending never blocks; once
/// the writer is gone messages are dropped.
#[derive(Debug, Clone)]
pub struct OutboundSink {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl OutboundSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a message. Returns false if the connection's writer is gone.
    pub fn send(&self, message: ServerMessage) -> bool {
        match self.tx.send(message) {
            Ok(()) => true,
            Err(err) => {
                trace!("dropping outbound message for closed connection: {:?}", err.0);
                false
            }
        }
    }

    pub fn send_error(&self, message: impl Into<String>) -> bool {
        self.send(ServerMessage::error(message))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
