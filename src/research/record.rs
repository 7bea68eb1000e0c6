use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Intended upper bound of `ResearchRecord::confidence_score`.
pub const MAX_CONFIDENCE: f64 = 100.0;

/// `EvidenceQuality::analyzed_by` of evidence an operator added.
pub const USER_ANALYST: &str = "user";

/// The persisted research state of one session.
///
/// Field names are the analyst's wire contract: the record is serialized
/// into the analyst prompt verbatim and decoded back from its reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRecord {
    pub research_goal: String,
    #[serde(default)]
    pub decision_context: String,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub current_hypotheses: Vec<String>,
    #[serde(default)]
    pub evidence_list: Vec<Evidence>,
    #[serde(default)]
    pub uncertainties: Vec<String>,
    /// Intended range is [0, 100]; not enforced.
    #[serde(default)]
    pub confidence_score: f64,
    /// Question tree linked by `parent_id`. References are not validated.
    #[serde(default)]
    pub next_questions: Vec<Question>,
    #[serde(default)]
    pub iteration_count: u32,
    #[serde(default = "default_language")]
    pub internal_language: String,
    /// Set once the session is terminal.
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub user_notes: Vec<String>,
}

fn default_language() -> String {
    "zh".to_string()
}

impl ResearchRecord {
    /// Fresh record at round 0.
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            research_goal: goal.into(),
            decision_context: String::new(),
            assumptions: Vec::new(),
            current_hypotheses: Vec::new(),
            evidence_list: Vec::new(),
            uncertainties: Vec::new(),
            confidence_score: 0.0,
            next_questions: Vec::new(),
            iteration_count: 0,
            internal_language: default_language(),
            stop_reason: None,
            user_notes: Vec::new(),
        }
    }

    pub fn with_decision_context(mut self, context: impl Into<String>) -> Self {
        self.decision_context = context.into();
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.stop_reason.is_some()
    }

    pub fn confidence_in_range(&self) -> bool {
        (0.0..=MAX_CONFIDENCE).contains(&self.confidence_score)
    }

    pub fn has_evidence_id(&self, id: &str) -> bool {
        self.evidence_list.iter().any(|e| e.id == id)
    }

    /// Questions whose `parent_id` names no question in this record.
    pub fn dangling_questions(&self) -> Vec<&Question> {
        let ids: HashSet<&str> = self.next_questions.iter().map(|q| q.id.as_str()).collect();
        self.next_questions
            .iter()
            .filter(|q| {
                q.parent_id
                    .as_deref()
                    .is_some_and(|parent| !ids.contains(parent))
            })
            .collect()
    }

    /// Put back operator input that `previous` had and this record lost.
    ///
    /// Missing user notes are restored ahead of any new ones, in their
    /// original order. Missing user-added evidence is appended. Returns how
    /// many items were restored.
    pub fn carry_operator_input(&mut self, previous: &ResearchRecord) -> usize {
        let lost_notes = previous
            .user_notes
            .iter()
            .filter(|note| !self.user_notes.contains(note))
            .count();
        if lost_notes > 0 {
            let added: Vec<String> = self
                .user_notes
                .drain(..)
                .filter(|note| !previous.user_notes.contains(note))
                .collect();
            self.user_notes = previous.user_notes.clone();
            self.user_notes.extend(added);
        }

        let lost_evidence: Vec<Evidence> = previous
            .evidence_list
            .iter()
            .filter(|e| e.quality.analyzed_by == USER_ANALYST && !self.has_evidence_id(&e.id))
            .cloned()
            .collect();
        let restored = lost_notes + lost_evidence.len();
        self.evidence_list.extend(lost_evidence);
        restored
    }

    /// Mark every question with `question_id` as skipped. Returns how many matched.
    pub fn skip_question(&mut self, question_id: &str) -> usize {
        let mut matched = 0;
        for question in self.next_questions.iter_mut().filter(|q| q.id == question_id) {
            question.status = QuestionStatus::Skipped;
            matched += 1;
        }
        matched
    }
}

/// A sourced piece of evidence backing a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    pub claim: String,
    pub content: String,
    pub source_url: String,
    pub quality: EvidenceQuality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceQuality {
    /// official | commercial | user_generated | media
    pub source_type: String,
    /// low | medium | high
    pub source_bias: String,
    /// Publication date, `YYYY-MM-DD` when known.
    #[serde(default)]
    pub freshness: String,
    #[serde(default)]
    pub independence_score: f64,
    #[serde(default = "default_language")]
    pub original_language: String,
    /// Backend (or `user`) that analyzed the source.
    #[serde(default)]
    pub analyzed_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub text: String,
    #[serde(default)]
    pub status: QuestionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    DrillDown,
    Refutation,
    CrossCheck,
    ExpandGraph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    #[default]
    Pending,
    Answered,
    Skipped,
}
