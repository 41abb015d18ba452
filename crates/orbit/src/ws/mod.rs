//! WebSocket connections.
//!
//! ```text
//! socket ──read loop──> MessageRouter ──> Connection { shell, assistant }
//!                                                  │
//! socket <──write loop── OutboundSink <────────────┘ (process output, replies)
//! ```
//!
//! Every connection lives in the [`ConnectionRegistry`] from upgrade until its
//! socket closes; removal kills whatever processes it still owns.

mod handler;
mod registry;
mod router;
mod types;

pub use handler::ws_handler;
pub use registry::{Connection, ConnectionRegistry, RegistryError};
pub use router::{INVALID_MESSAGE, MessageRouter};
pub use types::{ConnectionId, OutboundSink, new_connection_id};
