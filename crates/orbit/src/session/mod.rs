//! Shell and assistant sessions.
//!
//! A session owns at most one live [`ProcessHandle`](crate::pty::ProcessHandle)
//! and forwards its output to the connection's [`OutboundSink`].

mod assistant;
mod config;
mod output;
mod shell;

use std::sync::Arc;

use orbit_protocol::DocumentKind;
use thiserror::Error;

pub use assistant::AssistantSession;
pub use config::{AssistantConfig, ShellConfig};
pub use shell::ShellSession;

use crate::assistant::{DraftImprover, GuidedQuestionFlow, Improver, Interview, QuestionFlow};
use crate::pty::{PtyError, PtySpawner};
use crate::ws::{ConnectionId, OutboundSink};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Pty(#[from] PtyError),

    #[error("invalid working directory: {0:?}")]
    InvalidWorkingDir(String),
}

/// Builds sessions with shared process and question-flow dependencies.
#[derive(Clone)]
pub struct SessionFactory {
    spawner: Arc<dyn PtySpawner>,
    question_flow: Arc<dyn QuestionFlow>,
    improver: Arc<dyn Improver>,
    shell: ShellConfig,
    assistant: AssistantConfig,
}

impl SessionFactory {
    pub fn new(spawner: Arc<dyn PtySpawner>, shell: ShellConfig, assistant: AssistantConfig) -> Self {
        Self {
            spawner,
            question_flow: Arc::new(GuidedQuestionFlow::new()),
            improver: Arc::new(DraftImprover),
            shell,
            assistant,
        }
    }

    pub fn with_question_flow(mut self, flow: Arc<dyn QuestionFlow>) -> Self {
        self.question_flow = flow;
        self
    }

    pub fn with_improver(mut self, improver: Arc<dyn Improver>) -> Self {
        self.improver = improver;
        self
    }

    pub fn shell_config(&self) -> &ShellConfig {
        &self.shell
    }

    pub fn assistant_config(&self) -> &AssistantConfig {
        &self.assistant
    }

    pub fn shell_session(&self, connection_id: ConnectionId, sink: OutboundSink) -> ShellSession {
        ShellSession::new(connection_id, self.spawner.clone(), self.shell.clone(), sink)
    }

    pub fn assistant_session(
        &self,
        connection_id: ConnectionId,
        sink: OutboundSink,
        kind: DocumentKind,
        snapshot: String,
        credential: Option<&str>,
    ) -> AssistantSession {
        let spec = self.assistant.process_spec(&self.shell, credential);
        let interview = Interview::new(kind, snapshot, self.assistant.completeness_threshold);
        AssistantSession::new(
            connection_id,
            sink,
            self.spawner.clone(),
            spec,
            interview,
            self.question_flow.clone(),
            self.improver.clone(),
        )
    }
}
