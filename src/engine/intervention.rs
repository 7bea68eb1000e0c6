//! Operator edits applied to a stored record between rounds.

use crate::errors::EngineError;
use crate::research::record::USER_ANALYST;
use crate::research::{Evidence, EvidenceQuality, ResearchRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_SOURCE_TYPE: &str = "user_generated";
pub const DEFAULT_STOP_REASON: &str = "User forced stop";
const USER_SOURCE_BIAS: &str = "medium";
const USER_SOURCE_LANGUAGE: &str = "ko";
const EVIDENCE_ID_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intervention {
    AddEvidence {
        claim: String,
        content: String,
        #[serde(default)]
        source_url: String,
        #[serde(default)]
        source_type: Option<String>,
    },
    AddNote {
        text: String,
    },
    ForceStop {
        #[serde(default)]
        reason: Option<String>,
    },
    SkipQuestion {
        question_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterventionOutcome {
    EvidenceAdded { id: String },
    NoteAdded { notes: usize },
    Stopped { reason: String },
    /// Number of questions marked skipped; zero when the id matched nothing.
    QuestionSkipped { matched: usize },
}

/// Short evidence id, redrawn until it is unique within the record.
fn new_evidence_id(record: &ResearchRecord) -> String {
    loop {
        let id: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(EVIDENCE_ID_LEN)
            .collect();
        if !record.has_evidence_id(&id) {
            return id;
        }
    }
}

/// Apply one intervention in place.
pub fn apply(
    record: &mut ResearchRecord,
    intervention: Intervention,
) -> Result<InterventionOutcome, EngineError> {
    match intervention {
        Intervention::AddEvidence {
            claim,
            content,
            source_url,
            source_type,
        } => {
            let id = new_evidence_id(record);
            record.evidence_list.push(Evidence {
                id: id.clone(),
                claim,
                content,
                source_url,
                quality: EvidenceQuality {
                    source_type: source_type
                        .filter(|s| !s.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_SOURCE_TYPE.to_string()),
                    source_bias: USER_SOURCE_BIAS.to_string(),
                    freshness: String::new(),
                    independence_score: 0.0,
                    original_language: USER_SOURCE_LANGUAGE.to_string(),
                    analyzed_by: USER_ANALYST.to_string(),
                },
            });
            Ok(InterventionOutcome::EvidenceAdded { id })
        }
        Intervention::AddNote { text } => {
            let text = text.trim();
            if text.is_empty() {
                return Err(EngineError::InvalidIntervention(
                    "note text must not be empty".to_string(),
                ));
            }
            record.user_notes.push(text.to_string());
            Ok(InterventionOutcome::NoteAdded {
                notes: record.user_notes.len(),
            })
        }
        Intervention::ForceStop { reason } => {
            let reason = reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_STOP_REASON.to_string());
            record.stop_reason = Some(reason.clone());
            Ok(InterventionOutcome::Stopped { reason })
        }
        Intervention::SkipQuestion { question_id } => Ok(InterventionOutcome::QuestionSkipped {
            matched: record.skip_question(&question_id),
        }),
    }
}
