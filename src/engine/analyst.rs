//! Analyst step: one call to the reasoning backend per round.
//!
//! The step is fail-soft. An adapter error or an undecodable reply produces a
//! no-op `IterationResult` (record unchanged, no tasks, keep going) so the
//! loop always gets a well-formed result.

use super::TaskOutcome;
use super::prompts::analyst_prompt;
use crate::llm::Capability;
use crate::research::task::SubTaskWire;
use crate::research::{IterationResult, ResearchRecord, SubTask};
use crate::util::{extract_structured_block, truncate_chars};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Characters of a raw reply kept as reasoning when it cannot be decoded.
pub const RAW_REASONING_CHARS: usize = 500;

/// The central reasoning step of a round.
#[async_trait]
pub trait Analyst: Send + Sync {
    async fn run(&self, record: &ResearchRecord, prior: &[TaskOutcome]) -> IterationResult;
}

/// Reply shape the analyst is instructed to produce.
///
/// Tasks stay untyped here and are decoded one by one, so a single bad task
/// cannot void the rest of the reply.
#[derive(Debug, Deserialize)]
struct AnalystReply {
    updated_state: ResearchRecord,
    reasoning: String,
    #[serde(default)]
    tasks: Option<Vec<Value>>,
    #[serde(default)]
    should_stop: bool,
}

/// `Analyst` backed by the primary reasoning adapter.
pub struct ReasoningAnalyst {
    backend: Arc<dyn Capability>,
    model: String,
}

impl ReasoningAnalyst {
    pub fn new(backend: Arc<dyn Capability>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Analyst for ReasoningAnalyst {
    async fn run(&self, record: &ResearchRecord, prior: &[TaskOutcome]) -> IterationResult {
        let prompt = analyst_prompt(record, prior);
        debug!(prompt_chars = prompt.len(), prior = prior.len(), "invoking analyst");

        let response = self.backend.invoke(&prompt, Some(&self.model)).await;
        if let Some(err) = response.error {
            error!(backend = %response.backend, error = %err, "analyst call failed");
            return IterationResult::unchanged(record, format!("Error: {}", err));
        }

        parse_reply(record, &response.text)
    }
}

/// Decode an analyst reply, falling back to a no-op result on any failure.
pub fn parse_reply(record: &ResearchRecord, raw: &str) -> IterationResult {
    let payload = extract_structured_block(raw);
    let reply: AnalystReply = match serde_json::from_str(payload) {
        Ok(reply) => reply,
        Err(e) => {
            error!(error = %e, "failed to parse analyst reply");
            debug!(raw = truncate_chars(raw, RAW_REASONING_CHARS), "raw analyst reply");
            return IterationResult::unchanged(record, truncate_chars(raw, RAW_REASONING_CHARS));
        }
    };

    let updated = reply.updated_state;
    if !updated.confidence_in_range() {
        warn!(confidence = updated.confidence_score, "analyst confidence outside [0, 100]");
    }
    for question in updated.dangling_questions() {
        warn!(question = %question.id, parent = ?question.parent_id, "question references unknown parent");
    }

    let tasks = reply
        .tasks
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| {
            let action = value
                .get("action")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string();
            decode_task(value)
                .map_err(|e| warn!(%action, error = %e, "dropping invalid sub-task"))
                .ok()
        })
        .collect();

    IterationResult {
        updated_record: updated,
        reasoning: reply.reasoning,
        tasks,
        should_stop: reply.should_stop,
    }
}

fn decode_task(value: Value) -> Result<SubTask, String> {
    let wire: SubTaskWire = serde_json::from_value(value).map_err(|e| e.to_string())?;
    SubTask::try_from(wire).map_err(|e| e.to_string())
}
