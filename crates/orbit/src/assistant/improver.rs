use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use orbit_protocol::DocumentKind;

use super::context::build_context;

/// One answered interview question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnsweredQuestion {
    pub question_id: String,
    /// Section label of the question, when it was issued by this session.
    pub context: Option<String>,
    pub answer: String,
}

impl AnsweredQuestion {
    pub fn heading(&self) -> &str {
        self.context.as_deref().unwrap_or(&self.question_id)
    }
}

/// Input to an [`Improver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImprovementRequest {
    pub kind: DocumentKind,
    pub snapshot: String,
    pub answers: Vec<AnsweredQuestion>,
}

impl ImprovementRequest {
    /// Prompt preamble describing the document being refined.
    pub fn prompt(&self) -> String {
        build_context(self.kind, None, &self.snapshot)
    }
}

/// Produces improved document text from an interview.
#[async_trait]
pub trait Improver: Send + Sync {
    async fn improve(&self, request: ImprovementRequest) -> Result<String>;
}

/// Folds the interview answers back into the document as a
/// "Clarifications" section.
#[derive(Debug, Default, Clone, Copy)]
pub struct DraftImprover;

#[async_trait]
impl Improver for DraftImprover {
    async fn improve(&self, request: ImprovementRequest) -> Result<String> {
        debug!(
            "drafting improvements for {} ({} answers, prompt {} chars)",
            request.kind,
            request.answers.len(),
            request.prompt().len()
        );

        let mut draft = request.snapshot.trim_end().to_string();
        if request.answers.is_empty() {
            return Ok(draft);
        }
        if !draft.is_empty() {
            draft.push_str("\n\n");
        }
        draft.push_str("## Clarifications\n");
        for answer in &request.answers {
            draft.push_str(&format!("\n### {}\n{}\n", answer.heading(), answer.answer));
        }
        Ok(draft)
    }
}
