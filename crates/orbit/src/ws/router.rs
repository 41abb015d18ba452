//! Dispatch of inbound client messages to sessions.

use std::sync::Arc;

use log::{debug, warn};
use orbit_protocol::ClientMessage;

use super::registry::{Connection, ConnectionRegistry};
use crate::pty::TerminalSize;
use crate::session::SessionFactory;

/// Sent for frames that do not parse as a known message.
pub const INVALID_MESSAGE: &str = "Invalid message format";

/// Routes client messages to the sessions of their connection.
///
/// Handlers only take the connection lock; they never wait on a process or on
/// improvement generation.
#[derive(Clone)]
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    sessions: SessionFactory,
}

impl MessageRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, sessions: SessionFactory) -> Self {
        Self { registry, sessions }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Parse one text frame and dispatch it.
    pub async fn handle_text(&self, connection_id: &str, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.dispatch(connection_id, message).await,
            Err(e) => {
                warn!("invalid message from {}: {}", connection_id, e);
                if let Some(conn) = self.registry.get(connection_id) {
                    conn.lock().await.sink().send_error(INVALID_MESSAGE);
                }
            }
        }
    }

    pub async fn dispatch(&self, connection_id: &str, message: ClientMessage) {
        let Some(conn) = self.registry.get(connection_id) else {
            debug!(
                "{} for unknown connection {}, ignoring",
                message.kind(),
                connection_id
            );
            return;
        };
        let mut conn = conn.lock().await;
        debug!("{} <- {}", connection_id, message.kind());

        match message {
            ClientMessage::TerminalStart { cols, rows } => {
                let Some(size) = TerminalSize::or_default(cols, rows) else {
                    conn.sink().send_error("Terminal size must be non-zero");
                    return;
                };
                self.start_shell(&mut conn, size);
            }
            ClientMessage::TerminalInput { data } => match conn.shell_mut() {
                Some(shell) => shell.input(&data),
                None => debug!("no shell for {}, dropping input", connection_id),
            },
            ClientMessage::TerminalResize { cols, rows } => {
                let Some(size) = TerminalSize::new(cols, rows) else {
                    conn.sink().send_error("Terminal size must be non-zero");
                    return;
                };
                if let Some(shell) = conn.shell_mut() {
                    shell.resize(size);
                }
            }
            ClientMessage::TerminalClose => conn.close_shell(),
            ClientMessage::SetWorkingDir { path } => {
                let sink = conn.sink().clone();
                match conn.shell_mut() {
                    Some(shell) => {
                        if let Err(e) = shell.set_working_dir(&path) {
                            sink.send_error(e.to_string());
                        }
                    }
                    None => debug!("no shell for {}, ignoring working dir", connection_id),
                }
            }
            ClientMessage::AssistantStart {
                document_kind,
                text_snapshot,
                credential,
                cols,
                rows,
            } => {
                let Some(size) = TerminalSize::or_default(cols, rows) else {
                    conn.sink().send_error("Terminal size must be non-zero");
                    return;
                };
                let mut session = self.sessions.assistant_session(
                    conn.id().to_string(),
                    conn.sink().clone(),
                    document_kind,
                    text_snapshot,
                    credential.as_deref(),
                );
                // The old session dies before the new process starts.
                conn.close_assistant();
                match session.start(size) {
                    Ok(_) => {
                        conn.attach_assistant(session);
                    }
                    Err(e) => {
                        warn!("failed to start assistant for {}: {}", connection_id, e);
                        conn.sink()
                            .send_error(format!("Failed to start assistant: {e}"));
                    }
                }
            }
            ClientMessage::AssistantInput { data } => match conn.assistant_mut() {
                Some(assistant) => assistant.input(&data),
                None => debug!("no assistant for {}, dropping input", connection_id),
            },
            ClientMessage::AssistantResize { cols, rows } => {
                let Some(size) = TerminalSize::new(cols, rows) else {
                    conn.sink().send_error("Terminal size must be non-zero");
                    return;
                };
                if let Some(assistant) = conn.assistant_mut() {
                    assistant.resize(size);
                }
            }
            ClientMessage::AssistantAnswer {
                question_id,
                answer_text,
            } => {
                if question_id.trim().is_empty() || answer_text.trim().is_empty() {
                    conn.sink()
                        .send_error("Answer requires a question id and answer text");
                    return;
                }
                match conn.assistant_mut() {
                    Some(assistant) => assistant.answer(&question_id, &answer_text),
                    None => debug!("no assistant for {}, dropping answer", connection_id),
                }
            }
            ClientMessage::AssistantGetImprovements => match conn.assistant_mut() {
                Some(assistant) => assistant.request_improvements(true),
                None => debug!("no assistant for {}, ignoring improvements", connection_id),
            },
            ClientMessage::AssistantClose => conn.close_assistant(),
        }
    }

    fn start_shell(&self, conn: &mut Connection, size: TerminalSize) {
        let sink = conn.sink().clone();
        let result = match conn.shell_mut() {
            Some(shell) => shell.start(size),
            None => {
                let mut shell = self.sessions.shell_session(conn.id().to_string(), sink.clone());
                let result = shell.start(size);
                if result.is_ok() {
                    conn.attach_shell(shell);
                }
                result
            }
        };
        if let Err(e) = result {
            warn!("failed to start shell for {}: {}", conn.id(), e);
            sink.send_error(format!("Failed to start terminal: {e}"));
        }
    }
}
