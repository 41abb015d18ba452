use std::collections::{BTreeMap, BTreeSet, HashMap};

use orbit_protocol::{DocumentKind, Question};

use super::flow::{QuestionContext, QuestionFlow};
use super::improver::{AnsweredQuestion, ImprovementRequest};

/// Default completeness at which an interview counts as done.
pub const DEFAULT_COMPLETENESS_THRESHOLD: u8 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Initializing,
    AwaitingAnswer,
    /// Waiting on the client with nothing further to ask.
    Idle,
    Complete,
}

/// Result of recording one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub completeness: u8,
    pub next_question: Option<Question>,
    /// Completeness is at or above the threshold.
    pub complete: bool,
}

/// Question-flow state for one assistant session.
///
/// Answers and the asked-set only ever grow. Re-answering a question replaces
/// its text.
#[derive(Debug)]
pub struct Interview {
    kind: DocumentKind,
    snapshot: String,
    threshold: u8,
    answers: BTreeMap<String, String>,
    asked: BTreeSet<String>,
    issued: HashMap<String, Question>,
    completeness: u8,
    state: FlowState,
}

impl Interview {
    pub fn new(kind: DocumentKind, snapshot: impl Into<String>, threshold: u8) -> Self {
        Self {
            kind,
            snapshot: snapshot.into(),
            threshold: threshold.min(100),
            answers: BTreeMap::new(),
            asked: BTreeSet::new(),
            issued: HashMap::new(),
            completeness: 0,
            state: FlowState::Initializing,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn snapshot(&self) -> &str {
        &self.snapshot
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn completeness(&self) -> u8 {
        self.completeness
    }

    pub fn answers(&self) -> &BTreeMap<String, String> {
        &self.answers
    }

    pub fn asked(&self) -> &BTreeSet<String> {
        &self.asked
    }

    /// Ask the flow for the opening question.
    ///
    /// With nothing to ask the interview is complete straight away.
    pub fn start(&mut self, flow: &dyn QuestionFlow) -> Option<Question> {
        let question = flow.next_question(&self.context());
        match &question {
            Some(q) => {
                self.issued.insert(q.id.clone(), q.clone());
                self.state = FlowState::AwaitingAnswer;
            }
            None => {
                self.completeness = flow.completeness(&self.context());
                self.state = FlowState::Complete;
            }
        }
        question
    }

    /// Record an answer and work out what happens next.
    pub fn record_answer(
        &mut self,
        flow: &dyn QuestionFlow,
        question_id: &str,
        answer_text: &str,
    ) -> AnswerOutcome {
        self.answers
            .insert(question_id.to_string(), answer_text.to_string());
        self.asked.insert(question_id.to_string());

        self.completeness = flow.completeness(&self.context()).min(100);
        if self.completeness >= self.threshold {
            self.state = FlowState::Complete;
            return AnswerOutcome {
                completeness: self.completeness,
                next_question: None,
                complete: true,
            };
        }

        let next_question = flow.next_question(&self.context());
        match &next_question {
            Some(q) => {
                self.issued.insert(q.id.clone(), q.clone());
                self.state = FlowState::AwaitingAnswer;
            }
            None if self.state != FlowState::Complete => self.state = FlowState::Idle,
            None => {}
        }
        AnswerOutcome {
            completeness: self.completeness,
            next_question,
            complete: false,
        }
    }

    /// Snapshot plus answers, labelled with the questions that produced them.
    pub fn improvement_request(&self) -> ImprovementRequest {
        ImprovementRequest {
            kind: self.kind,
            snapshot: self.snapshot.clone(),
            answers: self
                .answers
                .iter()
                .map(|(id, answer)| AnsweredQuestion {
                    question_id: id.clone(),
                    context: self
                        .issued
                        .get(id)
                        .map(|q| q.context.clone())
                        .filter(|c| !c.is_empty()),
                    answer: answer.clone(),
                })
                .collect(),
        }
    }

    fn context(&self) -> QuestionContext<'_> {
        QuestionContext {
            kind: self.kind,
            snapshot: &self.snapshot,
            answers: &self.answers,
            asked: &self.asked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::GuidedQuestionFlow;

    #[test]
    fn test_start_emits_first_question() {
        let mut interview = Interview::new(DocumentKind::Vision, "", 80);
        let q = interview.start(&GuidedQuestionFlow).unwrap();
        assert_eq!(q.id, "problem");
        assert_eq!(interview.state(), FlowState::AwaitingAnswer);
    }

    #[test]
    fn test_start_with_nothing_to_ask_completes() {
        let mut interview = Interview::new(DocumentKind::Metrics, "", 80);
        assert!(interview.start(&GuidedQuestionFlow).is_none());
        assert_eq!(interview.state(), FlowState::Complete);
        assert_eq!(interview.completeness(), 100);
    }

    #[test]
    fn test_answers_progress_to_complete() {
        let mut interview = Interview::new(DocumentKind::Vision, "", 80);
        interview.start(&GuidedQuestionFlow);

        let outcome = interview.record_answer(&GuidedQuestionFlow, "problem", "Inefficient workflow");
        assert_eq!(outcome.completeness, 50);
        assert!(!outcome.complete);
        assert_eq!(outcome.next_question.unwrap().id, "target_user");

        let outcome = interview.record_answer(&GuidedQuestionFlow, "target_user", "End consumers");
        assert_eq!(outcome.completeness, 100);
        assert!(outcome.complete);
        assert!(outcome.next_question.is_none());
        assert_eq!(interview.state(), FlowState::Complete);
    }

    #[test]
    fn test_reanswer_overwrites_without_duplicating() {
        let mut interview = Interview::new(DocumentKind::Vision, "", 80);
        interview.start(&GuidedQuestionFlow);
        interview.record_answer(&GuidedQuestionFlow, "problem", "first");
        interview.record_answer(&GuidedQuestionFlow, "problem", "second");

        assert_eq!(interview.answers().len(), 1);
        assert_eq!(interview.answers()["problem"], "second");
        assert_eq!(interview.asked().len(), 1);
    }

    #[test]
    fn test_idle_when_flow_runs_dry_below_threshold() {
        let mut interview = Interview::new(DocumentKind::Vision, "## Target User\nDevs", 80);
        assert_eq!(interview.start(&GuidedQuestionFlow).unwrap().id, "problem");

        let outcome = interview.record_answer(&GuidedQuestionFlow, "problem", "Other specific problem");
        assert_eq!(outcome.completeness, 50);
        assert!(outcome.next_question.is_none());
        assert!(!outcome.complete);
        assert_eq!(interview.state(), FlowState::Idle);
    }

    #[test]
    fn test_unrelated_answer_keeps_asking() {
        let mut interview = Interview::new(DocumentKind::UserProfile, "", 80);
        interview.start(&GuidedQuestionFlow);
        let outcome = interview.record_answer(&GuidedQuestionFlow, "other", "x");
        assert_eq!(outcome.completeness, 0);
        assert_eq!(outcome.next_question.unwrap().id, "technical_comfort");

        let outcome = interview.record_answer(&GuidedQuestionFlow, "technical_comfort", "Low");
        assert!(outcome.complete);
    }

    #[test]
    fn test_improvement_request_labels_answers() {
        let mut interview = Interview::new(DocumentKind::Vision, "# Doc", 80);
        interview.start(&GuidedQuestionFlow);
        interview.record_answer(&GuidedQuestionFlow, "problem", "Lack of existing tools");
        interview.record_answer(&GuidedQuestionFlow, "extra", "note");

        let request = interview.improvement_request();
        assert_eq!(request.snapshot, "# Doc");
        let problem = request
            .answers
            .iter()
            .find(|a| a.question_id == "problem")
            .unwrap();
        assert_eq!(problem.context.as_deref(), Some("Problem Statement"));
        let extra = request.answers.iter().find(|a| a.question_id == "extra").unwrap();
        assert_eq!(extra.context, None);
    }
}
