//! Question selection and completeness scoring.

use std::collections::{BTreeMap, BTreeSet};

use orbit_protocol::{DocumentKind, Question};

/// Read-only view of an interview, handed to a [`QuestionFlow`].
#[derive(Debug, Clone, Copy)]
pub struct QuestionContext<'a> {
    pub kind: DocumentKind,
    /// Document text captured when the session started.
    pub snapshot: &'a str,
    pub answers: &'a BTreeMap<String, String>,
    pub asked: &'a BTreeSet<String>,
}

impl QuestionContext<'_> {
    fn needs(&self, id: &str, section: &str) -> bool {
        !self.snapshot.contains(section) && !self.asked.contains(id)
    }
}

/// Decides what to ask next and how complete the interview is.
pub trait QuestionFlow: Send + Sync {
    /// The next question, or `None` when there is nothing left to ask.
    fn next_question(&self, ctx: &QuestionContext<'_>) -> Option<Question>;

    /// Completeness in `0..=100`.
    fn completeness(&self, ctx: &QuestionContext<'_>) -> u8;
}

/// Fixed question bank keyed off the sections a document is missing.
///
/// A question is skipped once it has been asked or when the snapshot already
/// contains the section heading it fills in.
#[derive(Debug, Default, Clone, Copy)]
pub struct GuidedQuestionFlow;

impl GuidedQuestionFlow {
    pub fn new() -> Self {
        Self
    }

    fn bank(kind: DocumentKind) -> &'static [QuestionTemplate] {
        match kind {
            DocumentKind::Vision => &VISION_QUESTIONS,
            DocumentKind::UserProfile => &USER_PROFILE_QUESTIONS,
            DocumentKind::Metrics => &[],
        }
    }
}

impl QuestionFlow for GuidedQuestionFlow {
    fn next_question(&self, ctx: &QuestionContext<'_>) -> Option<Question> {
        Self::bank(ctx.kind)
            .iter()
            .find(|t| ctx.needs(t.id, t.section))
            .map(QuestionTemplate::build)
    }

    fn completeness(&self, ctx: &QuestionContext<'_>) -> u8 {
        let required: Vec<&QuestionTemplate> = Self::bank(ctx.kind)
            .iter()
            .filter(|t| t.required)
            .collect();
        if required.is_empty() {
            return 100;
        }
        let answered = required
            .iter()
            .filter(|t| ctx.answers.contains_key(t.id))
            .count();
        ((answered * 100) / required.len()).min(100) as u8
    }
}

struct QuestionTemplate {
    id: &'static str,
    text: &'static str,
    /// Heading that makes the question redundant when present in the snapshot.
    section: &'static str,
    context: &'static str,
    choices: &'static [&'static str],
    required: bool,
}

impl QuestionTemplate {
    fn build(&self) -> Question {
        let mut question = Question::multiple_choice(self.id, self.text, self.context, self.choices);
        question.required = self.required;
        question
    }
}

const VISION_QUESTIONS: [QuestionTemplate; 2] = [
    QuestionTemplate {
        id: "problem",
        text: "What specific problem are you solving?",
        section: "Problem",
        context: "Problem Statement",
        choices: &[
            "Time-consuming manual process",
            "Lack of existing tools",
            "Inefficient workflow",
            "Other specific problem",
        ],
        required: true,
    },
    QuestionTemplate {
        id: "target_user",
        text: "Who exactly will use this software?",
        section: "Target User",
        context: "Target User",
        choices: &[
            "Technical users (developers, engineers)",
            "Business users (managers, analysts)",
            "End consumers",
            "Internal team members",
        ],
        required: true,
    },
];

const USER_PROFILE_QUESTIONS: [QuestionTemplate; 1] = [QuestionTemplate {
    id: "technical_comfort",
    text: "What is the user's technical comfort level?",
    section: "Technical Comfort",
    context: "Technical Comfort",
    choices: &[
        "Low - Needs simple, guided interfaces",
        "Medium - Comfortable with standard apps",
        "High - Can handle advanced features",
    ],
    required: true,
}];
