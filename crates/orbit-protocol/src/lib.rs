//! Wire protocol types for the Orbit terminal broker.
//!
//! A browser client holds one WebSocket to the broker and multiplexes two kinds of
//! traffic over it:
//!
//! ```text
//! Client <--[terminal:* raw bytes]------> Broker <--> shell PTY
//!        <--[assistant:* raw bytes]-----> Broker <--> assistant CLI PTY
//!        <--[assistant:question:* etc.]-> Broker (question flow)
//! ```
//!
//! Every frame is a JSON object whose `type` field carries the discriminant
//! (`terminal:start`, `assistant:question:new`, ...). Payload fields are camelCase.

pub mod document;
pub mod messages;

pub use document::{DocumentKind, Question, QuestionKind};
pub use messages::{ClientMessage, ServerMessage};
