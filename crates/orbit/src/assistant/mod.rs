//! Assistant question flow: which question to ask next, how complete the
//! interview is, and how answers turn into improved document text.

mod context;
mod flow;
mod improver;
mod interview;

pub use context::build_context;
pub use flow::{GuidedQuestionFlow, QuestionContext, QuestionFlow};
pub use improver::{AnsweredQuestion, DraftImprover, ImprovementRequest, Improver};
pub use interview::{AnswerOutcome, DEFAULT_COMPLETENESS_THRESHOLD, FlowState, Interview};
