//! Task router: resolves each sub-task to a backend, runs it, and applies a
//! single-level fallback.
//!
//! Resolution is a pure table over `{selector, vision job, action, priority}`
//! (`resolve`), computed once per task before any backend is touched. Dispatch
//! then maps `(backend, action)` to a prompt template; a pair the backend does
//! not serve is an "unsupported combination" and is never retried.
//!
//! Fallback:
//!
//! | Failed backend          | Retry                                         |
//! |-------------------------|-----------------------------------------------|
//! | search / extraction     | reasoning, main model, content-or-query        |
//! | reasoning               | extraction, generic analysis template         |
//!
//! A failed retry yields an aggregate error tagged `none`. No task is attempted
//! more than twice and there is no delay between attempts.

use super::{
    BackendKind, BackendResponse, Capability, ClaudeCli, GeminiCli, GlmClient, NO_BACKEND, prompts,
};
use crate::config::Settings;
use crate::research::{Action, BackendSelector, Priority, SubTask, VisionJob};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Model choice for the resolved backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelHint {
    /// Let the backend use its configured default.
    BackendDefault,
    Main,
    Cheap,
    Named(String),
}

/// Where a task goes and with which model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub backend: BackendKind,
    pub model: ModelHint,
}

/// Resolve a task to a backend and model hint. Pure; touches no adapter.
pub fn resolve(task: &SubTask) -> Route {
    let backend = match task.backend() {
        BackendSelector::Explicit(kind) => kind,
        BackendSelector::Auto => match task.vision() {
            Some(VisionJob::ScreenshotSummary | VisionJob::DocumentOcr) => BackendKind::Search,
            Some(VisionJob::LabelRead) => BackendKind::Reasoning,
            None => match task.action() {
                Action::WebSearch | Action::SummarizeUrl => BackendKind::Search,
                Action::OptimizeQuery
                | Action::AnalyzeChinese
                | Action::CompanyAnalyze
                | Action::LibrarianExtract
                | Action::DedupeEvidence => BackendKind::Extraction,
                Action::AnalyzeIteration
                | Action::MergeEvidence
                | Action::PlanNext
                | Action::Other(_) => BackendKind::Reasoning,
            },
        },
    };

    let model = match (task.model(), backend) {
        (Some(name), _) => ModelHint::Named(name.to_string()),
        (None, BackendKind::Reasoning) => {
            if task.vision() == Some(VisionJob::LabelRead) && task.priority() == Priority::CheapFirst
            {
                ModelHint::Cheap
            } else {
                ModelHint::Main
            }
        }
        (None, _) => ModelHint::BackendDefault,
    };

    Route { backend, model }
}

/// Build the prompt `backend` uses for `task`, or `None` if it does not serve it.
pub fn render_prompt(backend: BackendKind, task: &SubTask) -> Option<String> {
    let input = task.prompt_input();
    match backend {
        BackendKind::Search => match (task.vision(), task.action()) {
            (Some(job @ (VisionJob::ScreenshotSummary | VisionJob::DocumentOcr)), _) => {
                Some(prompts::vision(job, input))
            }
            (Some(VisionJob::LabelRead), _) => None,
            (None, Action::WebSearch) => Some(prompts::web_search(input)),
            (None, Action::SummarizeUrl) => Some(prompts::summarize_url(input)),
            (None, _) => None,
        },
        BackendKind::Extraction => match (task.vision(), task.action()) {
            (Some(_), _) => None,
            (None, Action::OptimizeQuery) => Some(prompts::optimize_query(input)),
            (None, Action::AnalyzeChinese) => Some(prompts::analyze(input)),
            (None, Action::CompanyAnalyze) => Some(prompts::company_analyze(input)),
            (None, Action::LibrarianExtract) => Some(prompts::librarian_extract(input)),
            (None, Action::DedupeEvidence) => Some(prompts::dedupe_evidence(input)),
            (None, _) => None,
        },
        BackendKind::Reasoning => match task.vision() {
            Some(job) => Some(prompts::vision(job, input)),
            None => Some(task.content_or_query().to_string()),
        },
    }
}

/// The three adapters the router dispatches to.
#[derive(Clone)]
pub struct Backends {
    pub reasoning: Arc<dyn Capability>,
    pub search: Arc<dyn Capability>,
    pub extraction: Arc<dyn Capability>,
}

impl Backends {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            reasoning: Arc::new(ClaudeCli::new(
                &settings.claude_cmd,
                settings.adapter_timeout,
            )),
            search: Arc::new(GeminiCli::new(&settings.gemini_cmd, settings.adapter_timeout)),
            extraction: Arc::new(GlmClient::new(
                &settings.glm_base_url,
                settings.glm_api_key.clone(),
                &settings.glm_model,
                settings.adapter_timeout,
            )),
        }
    }

    pub fn get(&self, kind: BackendKind) -> &Arc<dyn Capability> {
        match kind {
            BackendKind::Reasoning => &self.reasoning,
            BackendKind::Search => &self.search,
            BackendKind::Extraction => &self.extraction,
        }
    }
}

pub struct TaskRouter {
    backends: Backends,
    main_model: String,
    cheap_model: String,
}

impl TaskRouter {
    pub fn new(backends: Backends, main_model: impl Into<String>, cheap_model: impl Into<String>) -> Self {
        Self {
            backends,
            main_model: main_model.into(),
            cheap_model: cheap_model.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Backends::from_settings(settings),
            &settings.claude_main_model,
            &settings.claude_cheap_model,
        )
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn main_model(&self) -> &str {
        &self.main_model
    }

    fn model_for<'a>(&'a self, hint: &'a ModelHint) -> Option<&'a str> {
        match hint {
            ModelHint::BackendDefault => None,
            ModelHint::Main => Some(&self.main_model),
            ModelHint::Cheap => Some(&self.cheap_model),
            ModelHint::Named(name) => Some(name),
        }
    }

    /// Execute one sub-task. Never fails; errors come back in the response.
    pub async fn execute(&self, task: &SubTask) -> BackendResponse {
        let route = resolve(task);
        let adapter = self.backends.get(route.backend);

        let Some(prompt) = render_prompt(route.backend, task) else {
            warn!(
                backend = adapter.name(),
                action = %task.action(),
                "unsupported backend/action combination"
            );
            return BackendResponse::failed(
                adapter.name(),
                format!(
                    "Unsupported combination: {} cannot handle '{}'",
                    adapter.name(),
                    task.action()
                ),
            );
        };

        debug!(backend = adapter.name(), action = %task.action(), model = ?route.model, "dispatching sub-task");
        let first = adapter.invoke(&prompt, self.model_for(&route.model)).await;
        if first.is_ok() {
            return first;
        }

        let first_error = first.error.unwrap_or_default();
        warn!(
            backend = adapter.name(),
            action = %task.action(),
            error = %first_error,
            "sub-task failed, trying fallback"
        );

        let second = self.fallback(route.backend, task).await;
        if second.is_ok() {
            info!(backend = %second.backend, action = %task.action(), "fallback succeeded");
            return second;
        }

        BackendResponse::failed(
            NO_BACKEND,
            format!(
                "All backends failed: {}: {}; {}: {}",
                adapter.name(),
                first_error,
                second.backend,
                second.error.unwrap_or_default()
            ),
        )
    }

    async fn fallback(&self, failed: BackendKind, task: &SubTask) -> BackendResponse {
        let input = task.content_or_query();
        match failed {
            BackendKind::Search | BackendKind::Extraction => {
                self.backends
                    .reasoning
                    .invoke(input, Some(&self.main_model))
                    .await
            }
            BackendKind::Reasoning => {
                self.backends
                    .extraction
                    .invoke(&prompts::analyze(input), None)
                    .await
            }
        }
    }

    /// Execute every task of a round. Results are in task order either way.
    pub async fn execute_all(&self, tasks: &[SubTask], parallel: bool) -> Vec<BackendResponse> {
        if parallel {
            join_all(tasks.iter().map(|task| self.execute(task))).await
        } else {
            let mut responses = Vec::with_capacity(tasks.len());
            for task in tasks {
                responses.push(self.execute(task).await);
            }
            responses
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::StubBackend;

    fn task(action: Action) -> SubTask {
        SubTask::builder(action).query("q").content("c").build().unwrap()
    }

    fn router(reasoning: &StubBackend, search: &StubBackend, extraction: &StubBackend) -> TaskRouter {
        TaskRouter::new(
            Backends {
                reasoning: Arc::new(reasoning.clone()),
                search: Arc::new(search.clone()),
                extraction: Arc::new(extraction.clone()),
            },
            "sonnet",
            "haiku",
        )
    }

    #[test]
    fn test_web_search_always_resolves_to_search() {
        let variants = [
            SubTask::builder(Action::WebSearch).query("q").build().unwrap(),
            SubTask::builder(Action::WebSearch)
                .query("q")
                .content("long content")
                .priority(Priority::CheapFirst)
                .model("whatever")
                .build()
                .unwrap(),
        ];
        for t in &variants {
            assert_eq!(resolve(t).backend, BackendKind::Search);
        }
    }

    #[test]
    fn test_company_analyze_always_resolves_to_extraction() {
        let t = SubTask::builder(Action::CompanyAnalyze)
            .content("ACME")
            .priority(Priority::CheapFirst)
            .build()
            .unwrap();
        assert_eq!(resolve(&t).backend, BackendKind::Extraction);
    }

    #[test]
    fn test_action_table() {
        let cases = [
            (Action::SummarizeUrl, BackendKind::Search),
            (Action::OptimizeQuery, BackendKind::Extraction),
            (Action::AnalyzeChinese, BackendKind::Extraction),
            (Action::LibrarianExtract, BackendKind::Extraction),
            (Action::DedupeEvidence, BackendKind::Extraction),
            (Action::AnalyzeIteration, BackendKind::Reasoning),
            (Action::MergeEvidence, BackendKind::Reasoning),
            (Action::PlanNext, BackendKind::Reasoning),
            (Action::Other("generate_report".into()), BackendKind::Reasoning),
        ];
        for (action, expected) in cases {
            assert_eq!(resolve(&task(action.clone())).backend, expected, "{action}");
        }
    }

    #[test]
    fn test_vision_jobs_override_action() {
        let screenshot = SubTask::builder(Action::CompanyAnalyze)
            .content("https://img")
            .vision(VisionJob::ScreenshotSummary)
            .build()
            .unwrap();
        assert_eq!(resolve(&screenshot).backend, BackendKind::Search);

        let label_cheap = SubTask::builder(Action::WebSearch)
            .query("https://img")
            .vision(VisionJob::LabelRead)
            .priority(Priority::CheapFirst)
            .build()
            .unwrap();
        assert_eq!(
            resolve(&label_cheap),
            Route {
                backend: BackendKind::Reasoning,
                model: ModelHint::Cheap
            }
        );

        let label_accurate = SubTask::builder(Action::PlanNext)
            .content("https://img")
            .vision(VisionJob::LabelRead)
            .build()
            .unwrap();
        assert_eq!(resolve(&label_accurate).model, ModelHint::Main);
    }

    #[test]
    fn test_explicit_selector_is_used_directly() {
        let t = SubTask::builder(Action::WebSearch)
            .backend(BackendSelector::Explicit(BackendKind::Extraction))
            .query("q")
            .build()
            .unwrap();
        assert_eq!(resolve(&t).backend, BackendKind::Extraction);
        assert!(render_prompt(BackendKind::Extraction, &t).is_none());
    }

    #[test]
    fn test_reasoning_prompt_is_content_or_query() {
        let t = SubTask::builder(Action::PlanNext).query("only query").build().unwrap();
        assert_eq!(render_prompt(BackendKind::Reasoning, &t).unwrap(), "only query");
    }

    #[tokio::test]
    async fn test_successful_dispatch_uses_resolved_backend() {
        let (reasoning, search, extraction) = (
            StubBackend::new("claude"),
            StubBackend::new("gemini").reply_ok("results"),
            StubBackend::new("glm"),
        );
        let router = router(&reasoning, &search, &extraction);
        let t = SubTask::builder(Action::WebSearch).query("深圳蓝牙耳机").build().unwrap();

        let response = router.execute(&t).await;
        assert_eq!(response, BackendResponse::ok("gemini", "results"));
        assert_eq!(search.calls().len(), 1);
        assert!(search.calls()[0].prompt.contains("深圳蓝牙耳机"));
        assert!(reasoning.calls().is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_falls_back_to_reasoning_main_model() {
        let (reasoning, search, extraction) = (
            StubBackend::new("claude").reply_ok("fallback result"),
            StubBackend::new("gemini").reply_err("rate limited"),
            StubBackend::new("glm"),
        );
        let router = router(&reasoning, &search, &extraction);
        let t = SubTask::builder(Action::WebSearch).query("test").build().unwrap();

        let response = router.execute(&t).await;
        assert_eq!(response.text, "fallback result");
        assert_eq!(response.backend, "claude");
        let calls = reasoning.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].prompt, "test");
        assert_eq!(calls[0].model.as_deref(), Some("sonnet"));
    }

    #[tokio::test]
    async fn test_reasoning_failure_falls_back_to_generic_analysis() {
        let (reasoning, search, extraction) = (
            StubBackend::new("claude").reply_err("exit 1"),
            StubBackend::new("gemini"),
            StubBackend::new("glm").reply_ok("analysis"),
        );
        let router = router(&reasoning, &search, &extraction);
        let t = SubTask::builder(Action::MergeEvidence).content("ev-1, ev-2").build().unwrap();

        let response = router.execute(&t).await;
        assert_eq!(response.backend, "glm");
        assert_eq!(extraction.calls()[0].prompt, prompts::analyze("ev-1, ev-2"));
    }

    #[tokio::test]
    async fn test_fallback_is_bounded_to_one_retry() {
        let (reasoning, search, extraction) = (
            StubBackend::new("claude").reply_err("claude down"),
            StubBackend::new("gemini"),
            StubBackend::new("glm").reply_err("glm down"),
        );
        let router = router(&reasoning, &search, &extraction);
        let t = SubTask::builder(Action::CompanyAnalyze).content("ACME").build().unwrap();

        let response = router.execute(&t).await;
        assert_eq!(response.backend, NO_BACKEND);
        let error = response.error.unwrap();
        assert!(error.contains("glm down"));
        assert!(error.contains("claude down"));
        assert_eq!(extraction.calls().len(), 1);
        assert_eq!(reasoning.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_combination_is_not_retried() {
        let (reasoning, search, extraction) = (
            StubBackend::new("claude").reply_ok("never"),
            StubBackend::new("gemini").reply_ok("never"),
            StubBackend::new("glm"),
        );
        let router = router(&reasoning, &search, &extraction);
        let t = SubTask::builder(Action::CompanyAnalyze)
            .backend(BackendSelector::Explicit(BackendKind::Search))
            .content("ACME")
            .build()
            .unwrap();

        let response = router.execute(&t).await;
        assert_eq!(response.backend, "gemini");
        assert!(response.error.unwrap().contains("Unsupported combination"));
        assert!(search.calls().is_empty());
        assert!(reasoning.calls().is_empty());
    }

    #[tokio::test]
    async fn test_execute_all_preserves_order() {
        let (reasoning, search, extraction) = (
            StubBackend::new("claude").reply_ok("plan"),
            StubBackend::new("gemini").reply_ok("hits"),
            StubBackend::new("glm").reply_ok("facts"),
        );
        let router = router(&reasoning, &search, &extraction);
        let tasks = vec![
            task(Action::PlanNext),
            task(Action::WebSearch),
            task(Action::LibrarianExtract),
        ];

        for parallel in [true, false] {
            let names: Vec<String> = router
                .execute_all(&tasks, parallel)
                .await
                .into_iter()
                .map(|r| r.backend)
                .collect();
            assert_eq!(names, vec!["claude", "gemini", "glm"]);
        }
    }
}
