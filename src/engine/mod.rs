//! Research engine: analyst step, iteration loop, durable state, artifacts
//! and operator interventions.

pub mod analyst;
pub mod artifacts;
pub mod intervention;
pub mod prompts;
pub mod runner;
pub mod store;

pub use analyst::{Analyst, ReasoningAnalyst};
pub use intervention::{Intervention, InterventionOutcome};
pub use runner::{EngineOptions, LoopOutcome, ResearchEngine, Round, RoundReport, Termination};
pub use store::{SessionSummary, SqliteStore, StateStore};

use crate::llm::BackendResponse;
use crate::research::SubTask;

/// A dispatched sub-task paired with its response.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task: SubTask,
    pub response: BackendResponse,
}
