//! Document kinds and interview questions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of planning document an assistant session is refining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    #[serde(rename = "vision")]
    Vision,
    #[serde(rename = "userProfile")]
    UserProfile,
    #[serde(rename = "metrics")]
    Metrics,
}

impl DocumentKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vision => "vision",
            Self::UserProfile => "userProfile",
            Self::Metrics => "metrics",
        }
    }

    /// Human-readable name used when building prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Vision => "vision document",
            Self::UserProfile => "user profile",
            Self::Metrics => "success metrics",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the client should render the answer input for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    MultipleChoice,
    YesNo,
    Scale,
}

/// A single interview question sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Stable identifier; answers are keyed by it.
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub required: bool,
    /// Section of the document the question refines (e.g. "Problem Statement").
    #[serde(default)]
    pub context: String,
}

impl Question {
    /// Build a multiple-choice question.
    pub fn multiple_choice(
        id: impl Into<String>,
        text: impl Into<String>,
        context: impl Into<String>,
        choices: &[&str],
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            kind: QuestionKind::MultipleChoice,
            choices: choices.iter().map(|c| (*c).to_string()).collect(),
            required: true,
            context: context.into(),
        }
    }

    /// Render the choices as a numbered list.
    pub fn format_choices(&self) -> String {
        self.choices
            .iter()
            .enumerate()
            .map(|(idx, choice)| format!("{}. {}", idx + 1, choice))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
