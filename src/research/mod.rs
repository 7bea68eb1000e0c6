//! Research data model: the per-session record, delegated sub-tasks, and the
//! analyst's per-round result.

pub mod record;
pub mod task;

pub use record::{Evidence, EvidenceQuality, Question, QuestionKind, QuestionStatus, ResearchRecord};
pub use task::{Action, BackendSelector, InputField, Priority, SubTask, SubTaskBuilder, VisionJob};

/// Outcome of one analyst step.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationResult {
    pub updated_record: ResearchRecord,
    pub reasoning: String,
    pub tasks: Vec<SubTask>,
    pub should_stop: bool,
}

impl IterationResult {
    /// A no-op continuation: record untouched, nothing dispatched, keep going.
    pub fn unchanged(record: &ResearchRecord, reasoning: impl Into<String>) -> Self {
        Self {
            updated_record: record.clone(),
            reasoning: reasoning.into(),
            tasks: Vec::new(),
            should_stop: false,
        }
    }
}
