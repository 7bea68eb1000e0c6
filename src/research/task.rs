//! Sub-tasks the analyst delegates to worker backends.
//!
//! A `SubTask` can only be built through `SubTaskBuilder` (or decoded from the
//! analyst's wire form, which goes through the same checks), so every value
//! in circulation satisfies its action's required-field contract.

use crate::errors::TaskError;
use crate::llm::BackendKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of delegated actions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    WebSearch,
    SummarizeUrl,
    OptimizeQuery,
    AnalyzeChinese,
    CompanyAnalyze,
    LibrarianExtract,
    DedupeEvidence,
    AnalyzeIteration,
    MergeEvidence,
    PlanNext,
    /// Any action name outside the table; always handled by the reasoning backend.
    Other(String),
}

/// Which task field feeds the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputField {
    /// Uses `query`, which must be non-empty.
    Query,
    /// Uses `content`, falling back to `query`.
    Content,
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::WebSearch => "web_search",
            Action::SummarizeUrl => "summarize_url",
            Action::OptimizeQuery => "optimize_query",
            Action::AnalyzeChinese => "analyze_chinese",
            Action::CompanyAnalyze => "company_analyze",
            Action::LibrarianExtract => "librarian_extract",
            Action::DedupeEvidence => "dedupe_evidence",
            Action::AnalyzeIteration => "analyze_iteration",
            Action::MergeEvidence => "merge_evidence",
            Action::PlanNext => "plan_next",
            Action::Other(name) => name,
        }
    }

    pub fn input_field(&self) -> InputField {
        match self {
            Action::WebSearch | Action::SummarizeUrl | Action::OptimizeQuery => InputField::Query,
            _ => InputField::Content,
        }
    }
}

impl FromStr for Action {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "web_search" => Action::WebSearch,
            "summarize_url" => Action::SummarizeUrl,
            "optimize_query" => Action::OptimizeQuery,
            "analyze_chinese" => Action::AnalyzeChinese,
            "company_analyze" => Action::CompanyAnalyze,
            "librarian_extract" => Action::LibrarianExtract,
            "dedupe_evidence" => Action::DedupeEvidence,
            "analyze_iteration" => Action::AnalyzeIteration,
            "merge_evidence" => Action::MergeEvidence,
            "plan_next" => Action::PlanNext,
            other => Action::Other(other.to_string()),
        })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend choice made by the analyst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendSelector {
    #[default]
    Auto,
    Explicit(BackendKind),
}

impl FromStr for BackendSelector {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "auto" => Ok(BackendSelector::Auto),
            other => other
                .parse::<BackendKind>()
                .map(BackendSelector::Explicit)
                .map_err(|_| TaskError::UnknownBackend(s.to_string())),
        }
    }
}

impl fmt::Display for BackendSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendSelector::Auto => f.write_str("auto"),
            BackendSelector::Explicit(kind) => f.write_str(kind.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionJob {
    ScreenshotSummary,
    DocumentOcr,
    LabelRead,
}

impl VisionJob {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisionJob::ScreenshotSummary => "screenshot_summary",
            VisionJob::DocumentOcr => "document_ocr",
            VisionJob::LabelRead => "label_read",
        }
    }
}

impl FromStr for VisionJob {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "screenshot_summary" => Ok(VisionJob::ScreenshotSummary),
            "document_ocr" => Ok(VisionJob::DocumentOcr),
            "label_read" => Ok(VisionJob::LabelRead),
            other => Err(TaskError::UnknownVisionJob(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    #[serde(alias = "accurate")]
    AccurateFirst,
    #[serde(alias = "cheap")]
    CheapFirst,
}

/// A validated unit of delegated work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SubTaskWire", into = "SubTaskWire")]
pub struct SubTask {
    backend: BackendSelector,
    action: Action,
    query: String,
    content: String,
    vision: Option<VisionJob>,
    priority: Priority,
    model: Option<String>,
}

impl SubTask {
    pub fn builder(action: Action) -> SubTaskBuilder {
        SubTaskBuilder::new(action)
    }

    pub fn backend(&self) -> BackendSelector {
        self.backend
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn vision(&self) -> Option<VisionJob> {
        self.vision
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Content, or the query when content is empty. Never the reverse.
    pub fn content_or_query(&self) -> &str {
        if self.content.trim().is_empty() {
            &self.query
        } else {
            &self.content
        }
    }

    /// The text the action's prompt template is built from.
    pub fn prompt_input(&self) -> &str {
        if self.vision.is_some() {
            return self.content_or_query();
        }
        match self.action.input_field() {
            InputField::Query => &self.query,
            InputField::Content => self.content_or_query(),
        }
    }
}

/// Builder enforcing the sub-task contract on `build()`.
#[derive(Debug, Clone)]
pub struct SubTaskBuilder {
    task: SubTask,
}

impl SubTaskBuilder {
    fn new(action: Action) -> Self {
        Self {
            task: SubTask {
                backend: BackendSelector::Auto,
                action,
                query: String::new(),
                content: String::new(),
                vision: None,
                priority: Priority::AccurateFirst,
                model: None,
            },
        }
    }

    pub fn backend(mut self, backend: BackendSelector) -> Self {
        self.task.backend = backend;
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.task.query = query.into();
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.task.content = content.into();
        self
    }

    pub fn vision(mut self, job: VisionJob) -> Self {
        self.task.vision = Some(job);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.task.model = Some(model.into());
        self
    }

    pub fn build(self) -> Result<SubTask, TaskError> {
        let task = self.task;
        let action = task.action.as_str().to_string();
        let has_query = !task.query.trim().is_empty();
        let has_input = has_query || !task.content.trim().is_empty();

        if task.vision.is_some() || task.action.input_field() == InputField::Content {
            if !has_input {
                return Err(TaskError::MissingInput { action });
            }
        } else if !has_query {
            return Err(TaskError::MissingQuery { action });
        }
        Ok(task)
    }
}

/// Loosely-typed form used on the analyst wire and in artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTaskWire {
    #[serde(default = "auto_selector")]
    pub llm: String,
    pub action: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_vision: bool,
    #[serde(default, alias = "vision_job", skip_serializing_if = "Option::is_none")]
    pub vision_job_type: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

fn auto_selector() -> String {
    "auto".to_string()
}

impl TryFrom<SubTaskWire> for SubTask {
    type Error = TaskError;

    fn try_from(wire: SubTaskWire) -> Result<Self, Self::Error> {
        let action: Action = match wire.action.parse() {
            Ok(action) => action,
            Err(never) => match never {},
        };
        let mut builder = SubTask::builder(action)
            .backend(wire.llm.parse()?)
            .query(wire.query)
            .content(wire.content)
            .priority(wire.priority);

        let job = wire.vision_job_type.as_deref().filter(|j| !j.trim().is_empty());
        match (wire.requires_vision, job) {
            (true, Some(job)) => builder = builder.vision(job.parse()?),
            (false, None) => {}
            (true, None) => {
                return Err(TaskError::InconsistentVision(
                    "requires_vision set without a vision_job_type".into(),
                ));
            }
            (false, Some(job)) => {
                return Err(TaskError::InconsistentVision(format!(
                    "vision_job_type '{job}' without requires_vision"
                )));
            }
        }
        if let Some(model) = wire.model.filter(|m| !m.trim().is_empty()) {
            builder = builder.model(model);
        }
        builder.build()
    }
}

impl From<SubTask> for SubTaskWire {
    fn from(task: SubTask) -> Self {
        Self {
            llm: task.backend.to_string(),
            action: task.action.as_str().to_string(),
            query: task.query,
            content: task.content,
            requires_vision: task.vision.is_some(),
            vision_job_type: task.vision.map(|job| job.as_str().to_string()),
            priority: task.priority,
            model: task.model,
        }
    }
}
