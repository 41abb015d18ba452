use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use orbit_protocol::{DocumentKind, ServerMessage};
use tokio_util::sync::CancellationToken;

use super::SessionError;
use super::output::{StreamForwarder, StreamKind};
use crate::assistant::{FlowState, Improver, Interview, QuestionFlow};
use crate::pty::{ProcessHandle, ProcessSpec, PtySpawner, SpawnOutcome, TerminalSize};
use crate::ws::{ConnectionId, OutboundSink};

#[derive(Debug, Clone, PartialEq, Eq)]
enum ImprovementSlot {
    Idle,
    Pending,
    Ready(String),
}

/// An assistant CLI process plus the structured interview that runs beside it.
///
/// The CLI's raw terminal stream and the question flow are independent; both
/// go out on the connection's sink.
pub struct AssistantSession {
    connection_id: ConnectionId,
    sink: OutboundSink,
    handle: ProcessHandle,
    interview: Interview,
    flow: Arc<dyn QuestionFlow>,
    improver: Arc<dyn Improver>,
    improvements: Arc<Mutex<ImprovementSlot>>,
    cancel: CancellationToken,
}

impl AssistantSession {
    pub fn new(
        connection_id: ConnectionId,
        sink: OutboundSink,
        spawner: Arc<dyn PtySpawner>,
        spec: ProcessSpec,
        interview: Interview,
        flow: Arc<dyn QuestionFlow>,
        improver: Arc<dyn Improver>,
    ) -> Self {
        Self {
            connection_id,
            sink,
            handle: ProcessHandle::new("assistant", spawner, spec),
            interview,
            flow,
            improver,
            improvements: Arc::new(Mutex::new(ImprovementSlot::Idle)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn document_kind(&self) -> DocumentKind {
        self.interview.kind()
    }

    pub fn interview(&self) -> &Interview {
        &self.interview
    }

    pub fn is_live(&self) -> bool {
        self.handle.is_live()
    }

    /// Spawn the CLI, announce `assistant:ready` and open the interview.
    pub fn start(&mut self, size: TerminalSize) -> Result<SpawnOutcome, SessionError> {
        let outcome = self.handle.spawn(
            size,
            StreamForwarder::new(StreamKind::Assistant, self.sink.clone()),
        )?;
        if outcome == SpawnOutcome::AlreadyLive {
            return Ok(outcome);
        }

        info!(
            "assistant started for connection {} ({})",
            self.connection_id,
            self.interview.kind()
        );
        self.sink.send(ServerMessage::AssistantReady);

        if self.interview.state() == FlowState::Initializing {
            match self.interview.start(self.flow.as_ref()) {
                Some(question) => {
                    self.sink.send(ServerMessage::QuestionNew { question });
                }
                None => debug!(
                    "nothing to ask for {} on connection {}",
                    self.interview.kind(),
                    self.connection_id
                ),
            }
        }
        Ok(outcome)
    }

    pub fn input(&mut self, data: &str) {
        self.handle.write(data.as_bytes());
    }

    pub fn resize(&mut self, size: TerminalSize) {
        self.handle.resize(size);
    }

    /// Record an answer, report progress and either ask the next question or
    /// generate improvements once the interview is complete enough.
    pub fn answer(&mut self, question_id: &str, answer_text: &str) {
        let outcome = self
            .interview
            .record_answer(self.flow.as_ref(), question_id, answer_text);

        self.sink.send(ServerMessage::QuestionAnswered {
            question_id: question_id.to_string(),
            answer_text: answer_text.to_string(),
        });
        self.sink.send(ServerMessage::Completeness {
            completeness: outcome.completeness,
        });

        if outcome.complete {
            self.request_improvements(false);
        } else if let Some(question) = outcome.next_question {
            self.sink.send(ServerMessage::QuestionNew { question });
        } else {
            debug!(
                "interview idle at {}% for connection {}",
                outcome.completeness, self.connection_id
            );
        }
    }

    /// Generate improvements unless a generation already ran or is running.
    ///
    /// An explicit request re-sends a cached result.
    pub fn request_improvements(&mut self, explicit: bool) {
        {
            let mut slot = lock_slot(&self.improvements);
            match &*slot {
                ImprovementSlot::Ready(text) => {
                    if explicit {
                        self.sink.send(ServerMessage::Improvements {
                            improvements: text.clone(),
                        });
                    }
                    return;
                }
                ImprovementSlot::Pending => {
                    debug!("improvements already pending for {}", self.connection_id);
                    return;
                }
                ImprovementSlot::Idle => *slot = ImprovementSlot::Pending,
            }
        }

        let request = self.interview.improvement_request();
        let improver = self.improver.clone();
        let sink = self.sink.clone();
        let slot = self.improvements.clone();
        let cancel = self.cancel.clone();
        let connection_id = self.connection_id.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("improvement generation cancelled for {}", connection_id);
                    return;
                }
                result = improver.improve(request) => result,
            };

            match result {
                Ok(text) => {
                    *lock_slot(&slot) = ImprovementSlot::Ready(text.clone());
                    sink.send(ServerMessage::Improvements { improvements: text });
                }
                Err(e) => {
                    warn!("improvement generation failed for {}: {:#}", connection_id, e);
                    *lock_slot(&slot) = ImprovementSlot::Idle;
                    sink.send_error(format!("Failed to generate improvements: {e}"));
                }
            }
        });
    }

    /// Cancel pending work and kill the CLI. Always safe.
    pub fn close(&mut self) {
        self.cancel.cancel();
        if self.handle.is_live() {
            info!("assistant closed for connection {}", self.connection_id);
        }
        self.handle.kill();
    }
}

impl Drop for AssistantSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock_slot(slot: &Mutex<ImprovementSlot>) -> MutexGuard<'_, ImprovementSlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
