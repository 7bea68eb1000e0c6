//! The iteration loop.
//!
//! One round: read record, analyst step, persist, dispatch sub-tasks,
//! write the evidence artifact. Rounds and interventions on the same session
//! hold the session's store lease for the whole read-modify-write, so engines
//! in different processes sharing one database serialize against each other.
//! A caller that finds the session leased polls until `lease_wait` runs out
//! and then fails with `EngineError::SessionBusy`. A holder that dies without
//! releasing frees the session once `lease_ttl` expires.

use super::analyst::{Analyst, ReasoningAnalyst};
use super::artifacts::{self, IterationArtifact};
use super::intervention::{self, Intervention, InterventionOutcome};
use super::store::{SessionSummary, SqliteStore, StateStore};
use super::TaskOutcome;
use crate::config::Settings;
use crate::errors::EngineError;
use crate::llm::TaskRouter;
use crate::research::ResearchRecord;
use crate::util::preview;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

const STOP_WITHOUT_REASONING: &str = "Analyst requested stop";
const DEFAULT_LEASE_POLL: Duration = Duration::from_millis(250);

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The analyst set its stop flag.
    Analyst,
    /// The round cap was reached; the record carries no stop reason.
    RoundCap,
    /// The record was already stopped when a round began.
    Intervention { reason: String },
}

/// Output of one completed round.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub round: u32,
    pub reasoning: String,
    pub should_stop: bool,
    pub record: ResearchRecord,
    pub outcomes: Vec<TaskOutcome>,
    /// `None` when the artifact could not be written.
    pub artifact: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum Round {
    /// The record already had a stop reason; nothing ran.
    Halted { reason: String },
    Completed(Box<RoundReport>),
}

#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub termination: Termination,
    pub record: ResearchRecord,
    pub rounds: u32,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub artifacts_dir: PathBuf,
    pub parallel_dispatch: bool,
    pub max_rounds: u32,
    /// Lifetime of a session lease taken for one round or intervention.
    pub lease_ttl: Duration,
    /// How long to wait for a leased session before `SessionBusy`.
    pub lease_wait: Duration,
    /// Interval between lease attempts while waiting.
    pub lease_poll: Duration,
}

impl EngineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            artifacts_dir: settings.artifacts_dir.clone(),
            parallel_dispatch: settings.parallel_dispatch,
            max_rounds: settings.max_rounds,
            lease_ttl: settings.lease_ttl,
            lease_wait: settings.lease_wait,
            lease_poll: DEFAULT_LEASE_POLL,
        }
    }
}

/// A held session lease. Owner ids are unique per acquisition.
struct SessionLease {
    session_id: i64,
    owner: String,
}

pub struct ResearchEngine {
    store: Arc<dyn StateStore>,
    analyst: Arc<dyn Analyst>,
    router: Arc<TaskRouter>,
    options: EngineOptions,
}

impl ResearchEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        analyst: Arc<dyn Analyst>,
        router: Arc<TaskRouter>,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            analyst,
            router,
            options,
        }
    }

    /// Wire the SQLite store, the three real adapters and the reasoning analyst.
    pub fn from_settings(settings: &Settings) -> Result<Self, EngineError> {
        let store = SqliteStore::new(&settings.database)?;
        let router = TaskRouter::from_settings(settings);
        let analyst = ReasoningAnalyst::new(
            router.backends().reasoning.clone(),
            router.main_model(),
        );
        Ok(Self::new(
            Arc::new(store),
            Arc::new(analyst),
            Arc::new(router),
            EngineOptions::from_settings(settings),
        ))
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub async fn create_session(
        &self,
        goal: &str,
        decision_context: &str,
    ) -> Result<(i64, ResearchRecord), EngineError> {
        let (id, record) = self.store.create(goal, decision_context).await?;
        info!(session_id = id, goal, "created research session");
        Ok((id, record))
    }

    pub async fn get_state(&self, session_id: i64) -> Result<ResearchRecord, EngineError> {
        Ok(self.store.get(session_id).await?)
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, EngineError> {
        Ok(self.store.list().await?)
    }

    pub fn list_artifacts(&self, session_id: i64) -> Result<Vec<PathBuf>, EngineError> {
        Ok(artifacts::list_artifacts(&self.options.artifacts_dir, session_id)?)
    }

    /// Take the session lease, polling while another holder has it.
    async fn lease(&self, session_id: i64) -> Result<SessionLease, EngineError> {
        let owner = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.options.lease_wait;
        loop {
            if self
                .store
                .try_lease(session_id, &owner, self.options.lease_ttl)
                .await?
            {
                return Ok(SessionLease { session_id, owner });
            }
            if Instant::now() >= deadline {
                warn!(session_id, "session lease not acquired in time");
                return Err(EngineError::SessionBusy { id: session_id });
            }
            debug!(session_id, "session leased elsewhere, waiting");
            tokio::time::sleep(self.options.lease_poll).await;
        }
    }

    async fn release(&self, lease: SessionLease) {
        if let Err(e) = self
            .store
            .release_lease(lease.session_id, &lease.owner)
            .await
        {
            warn!(session_id = lease.session_id, error = %e, "failed to release session lease");
        }
    }

    /// Run one round, feeding `prior` (the previous round's outputs) to the analyst.
    pub async fn run_round(
        &self,
        session_id: i64,
        prior: &[TaskOutcome],
    ) -> Result<Round, EngineError> {
        let lease = self.lease(session_id).await?;
        let round = self.run_leased_round(session_id, prior).await;
        self.release(lease).await;
        round
    }

    async fn run_leased_round(
        &self,
        session_id: i64,
        prior: &[TaskOutcome],
    ) -> Result<Round, EngineError> {
        let record = self.store.get(session_id).await?;
        if let Some(reason) = &record.stop_reason {
            info!(session_id, reason = %reason, "session already stopped, round halted");
            return Ok(Round::Halted {
                reason: reason.clone(),
            });
        }

        let round = record.iteration_count + 1;
        debug!(session_id, round, prior = prior.len(), "starting round");
        let result = self.analyst.run(&record, prior).await;

        let mut updated = result.updated_record;
        if updated.iteration_count <= record.iteration_count {
            updated.iteration_count = round;
        }
        let restored = updated.carry_operator_input(&record);
        if restored > 0 {
            warn!(session_id, round, restored, "analyst dropped operator input, restored");
        }
        if result.should_stop && updated.stop_reason.is_none() {
            let reason = preview(&result.reasoning);
            updated.stop_reason = Some(if reason.is_empty() {
                STOP_WITHOUT_REASONING.to_string()
            } else {
                reason
            });
        }
        self.store.save(session_id, &updated).await?;
        let round = updated.iteration_count;

        info!(
            session_id,
            round,
            tasks = result.tasks.len(),
            should_stop = result.should_stop,
            confidence = updated.confidence_score,
            "analyst step complete"
        );

        let responses = self
            .router
            .execute_all(&result.tasks, self.options.parallel_dispatch)
            .await;
        let outcomes: Vec<TaskOutcome> = result
            .tasks
            .into_iter()
            .zip(responses)
            .map(|(task, response)| TaskOutcome { task, response })
            .collect();

        let failed = outcomes.iter().filter(|o| !o.response.is_ok()).count();
        if failed > 0 {
            warn!(session_id, round, failed, total = outcomes.len(), "sub-tasks failed");
        }

        let bundle = IterationArtifact::new(session_id, round, &outcomes);
        let artifact = match artifacts::write_artifact_blocking(&self.options.artifacts_dir, bundle)
            .await
        {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(session_id, round, error = %format!("{:#}", e), "failed to write artifact");
                None
            }
        };

        Ok(Round::Completed(Box::new(RoundReport {
            round,
            reasoning: result.reasoning,
            should_stop: result.should_stop,
            record: updated,
            outcomes,
            artifact,
        })))
    }

    /// Run rounds until the analyst stops, the record is stopped, or the cap.
    pub async fn run_to_completion(
        &self,
        session_id: i64,
        max_rounds: Option<u32>,
    ) -> Result<LoopOutcome, EngineError> {
        self.run_with_observer(session_id, max_rounds, |_| {}).await
    }

    /// `run_to_completion`, calling `observer` after every completed round.
    pub async fn run_with_observer<F>(
        &self,
        session_id: i64,
        max_rounds: Option<u32>,
        mut observer: F,
    ) -> Result<LoopOutcome, EngineError>
    where
        F: FnMut(&RoundReport) + Send,
    {
        let max_rounds = max_rounds.unwrap_or(self.options.max_rounds);
        let mut prior: Vec<TaskOutcome> = Vec::new();
        let mut rounds = 0;

        while rounds < max_rounds {
            match self.run_round(session_id, &prior).await? {
                Round::Halted { reason } => {
                    return Ok(LoopOutcome {
                        termination: Termination::Intervention { reason },
                        record: self.store.get(session_id).await?,
                        rounds,
                    });
                }
                Round::Completed(report) => {
                    rounds += 1;
                    observer(&report);
                    if report.should_stop {
                        info!(session_id, round = report.round, "analyst stopped the session");
                        return Ok(LoopOutcome {
                            termination: Termination::Analyst,
                            record: report.record,
                            rounds,
                        });
                    }
                    prior = report.outcomes;
                }
            }
        }

        info!(session_id, rounds, "round cap reached");
        Ok(LoopOutcome {
            termination: Termination::RoundCap,
            record: self.store.get(session_id).await?,
            rounds,
        })
    }

    /// `run_to_completion` on a background task.
    pub fn spawn_to_completion(
        self: Arc<Self>,
        session_id: i64,
        max_rounds: Option<u32>,
    ) -> JoinHandle<Result<LoopOutcome, EngineError>> {
        tokio::spawn(async move { self.run_to_completion(session_id, max_rounds).await })
    }

    /// Apply an intervention under the session lease and persist it.
    pub async fn intervene(
        &self,
        session_id: i64,
        action: Intervention,
    ) -> Result<InterventionOutcome, EngineError> {
        let lease = self.lease(session_id).await?;
        let outcome = self.apply_leased(session_id, action).await;
        self.release(lease).await;
        outcome
    }

    async fn apply_leased(
        &self,
        session_id: i64,
        action: Intervention,
    ) -> Result<InterventionOutcome, EngineError> {
        let mut record = self.store.get(session_id).await?;
        let outcome = intervention::apply(&mut record, action)?;
        self.store.save(session_id, &record).await?;
        info!(session_id, outcome = ?outcome, "intervention applied");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Backends;
    use crate::llm::testing::StubBackend;
    use crate::research::{Action, IterationResult, SubTask};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Analyst that never changes the record and stops on a chosen call.
    struct ScriptedAnalyst {
        calls: AtomicUsize,
        stop_on_call: Option<usize>,
        tasks: Vec<SubTask>,
        seen_prior: Mutex<Vec<usize>>,
        delay: Duration,
        forget_operator_input: bool,
        active: AtomicUsize,
        peak_active: AtomicUsize,
    }

    impl ScriptedAnalyst {
        fn new(stop_on_call: Option<usize>, tasks: Vec<SubTask>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                stop_on_call,
                tasks,
                seen_prior: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
                forget_operator_input: false,
                active: AtomicUsize::new(0),
                peak_active: AtomicUsize::new(0),
            }
        }

        /// Sleep this long inside every call.
        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Reply with a record stripped of notes and evidence.
        fn forgetful(mut self) -> Self {
            self.forget_operator_input = true;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn peak_active(&self) -> usize {
            self.peak_active.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Analyst for ScriptedAnalyst {
        async fn run(&self, record: &ResearchRecord, prior: &[TaskOutcome]) -> IterationResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen_prior.lock().unwrap().push(prior.len());

            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_active.fetch_max(active, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            let mut updated = record.clone();
            if self.forget_operator_input {
                updated.user_notes.clear();
                updated.evidence_list.clear();
            }
            IterationResult {
                updated_record: updated,
                reasoning: format!("round {} reasoning", call),
                tasks: self.tasks.clone(),
                should_stop: self.stop_on_call == Some(call),
            }
        }
    }

    struct Harness {
        engine: Arc<ResearchEngine>,
        store: Arc<SqliteStore>,
        analyst: Arc<ScriptedAnalyst>,
        search: StubBackend,
        artifacts: tempfile::TempDir,
    }

    fn router_with(reasoning: StubBackend) -> (TaskRouter, StubBackend) {
        let search = StubBackend::new("gemini").reply_ok("two supplier listings");
        let extraction = StubBackend::new("glm").reply_err("unused");
        let router = TaskRouter::new(
            Backends {
                reasoning: Arc::new(reasoning),
                search: Arc::new(search.clone()),
                extraction: Arc::new(extraction),
            },
            "sonnet",
            "haiku",
        );
        (router, search)
    }

    fn test_options(artifacts: &Path) -> EngineOptions {
        EngineOptions {
            artifacts_dir: artifacts.to_path_buf(),
            parallel_dispatch: true,
            max_rounds: 20,
            lease_ttl: Duration::from_secs(60),
            lease_wait: Duration::from_secs(10),
            lease_poll: Duration::from_millis(10),
        }
    }

    fn harness(analyst: ScriptedAnalyst) -> Harness {
        let (router, search) = router_with(StubBackend::new("claude").reply_err("unused"));
        let artifacts = tempfile::tempdir().unwrap();
        let analyst = Arc::new(analyst);
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let engine = ResearchEngine::new(
            store.clone(),
            analyst.clone(),
            Arc::new(router),
            test_options(artifacts.path()),
        );
        Harness {
            engine: Arc::new(engine),
            store,
            analyst,
            search,
            artifacts,
        }
    }

    /// An engine with its own connection to the database file at `db`.
    fn file_engine(db: &Path, analyst: Arc<ScriptedAnalyst>, artifacts: &Path) -> ResearchEngine {
        let (router, _) = router_with(StubBackend::new("claude").reply_err("unused"));
        ResearchEngine::new(
            Arc::new(SqliteStore::new(db).unwrap()),
            analyst,
            Arc::new(router),
            test_options(artifacts),
        )
    }

    fn web_search() -> SubTask {
        SubTask::builder(Action::WebSearch)
            .query("ACME factory address")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_round_cap_stops_after_exact_count() {
        let h = harness(ScriptedAnalyst::new(None, Vec::new()));
        let (id, _) = h.engine.create_session("G", "").await.unwrap();

        let outcome = h.engine.run_to_completion(id, Some(5)).await.unwrap();
        assert_eq!(h.analyst.calls(), 5);
        assert_eq!(outcome.rounds, 5);
        assert_eq!(outcome.termination, Termination::RoundCap);
        assert_eq!(outcome.record.iteration_count, 5);
        assert!(outcome.record.stop_reason.is_none());
    }

    #[tokio::test]
    async fn test_single_round_stop_end_to_end() {
        let h = harness(ScriptedAnalyst::new(Some(1), vec![web_search()]));
        let (id, _) = h.engine.create_session("G", "").await.unwrap();

        let outcome = h.engine.run_to_completion(id, None).await.unwrap();
        assert_eq!(outcome.termination, Termination::Analyst);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(h.analyst.calls(), 1);

        let stored = h.engine.get_state(id).await.unwrap();
        assert_eq!(stored.iteration_count, 1);
        assert_eq!(stored.stop_reason.as_deref(), Some("round 1 reasoning"));

        let files = h.engine.list_artifacts(id).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("iteration-001.evidence.json"));
        let artifact = artifacts::read_artifact(&files[0]).unwrap();
        assert_eq!(artifact.task_results.len(), 1);
        assert!(artifact.task_results[0].ok);
        assert_eq!(artifact.task_results[0].llm, "gemini");
        assert_eq!(artifact.task_results[0].query, "ACME factory address");
        assert_eq!(h.search.calls().len(), 1);
        assert!(h.artifacts.path().join("sessions").exists());
    }

    #[tokio::test]
    async fn test_prior_outputs_are_carried_one_round() {
        let h = harness(ScriptedAnalyst::new(None, vec![web_search()]));
        let (id, _) = h.engine.create_session("G", "").await.unwrap();

        h.engine.run_to_completion(id, Some(3)).await.unwrap();
        assert_eq!(*h.analyst.seen_prior.lock().unwrap(), vec![0, 1, 1]);
    }

    #[tokio::test]
    async fn test_force_stop_halts_next_round() {
        let h = harness(ScriptedAnalyst::new(None, Vec::new()));
        let (id, _) = h.engine.create_session("G", "").await.unwrap();

        h.engine.run_round(id, &[]).await.unwrap();
        h.engine
            .intervene(id, Intervention::ForceStop { reason: None })
            .await
            .unwrap();

        let outcome = h.engine.run_to_completion(id, Some(5)).await.unwrap();
        assert_eq!(
            outcome.termination,
            Termination::Intervention {
                reason: "User forced stop".to_string()
            }
        );
        assert_eq!(outcome.rounds, 0);
        assert_eq!(h.analyst.calls(), 1);
        assert_eq!(outcome.record.iteration_count, 1);
    }

    #[tokio::test]
    async fn test_interventions_persist() {
        let h = harness(ScriptedAnalyst::new(None, Vec::new()));
        let (id, _) = h.engine.create_session("G", "").await.unwrap();

        h.engine
            .intervene(id, Intervention::AddNote { text: "check customs data".into() })
            .await
            .unwrap();
        let added = h
            .engine
            .intervene(
                id,
                Intervention::AddEvidence {
                    claim: "registered in 2015".into(),
                    content: "business licence".into(),
                    source_url: String::new(),
                    source_type: Some("official".into()),
                },
            )
            .await
            .unwrap();

        let record = h.engine.get_state(id).await.unwrap();
        assert_eq!(record.user_notes, vec!["check customs data"]);
        let InterventionOutcome::EvidenceAdded { id: evidence_id } = added else {
            panic!("Expected EvidenceAdded");
        };
        assert!(record.has_evidence_id(&evidence_id));
    }

    #[tokio::test]
    async fn test_unknown_session_is_reported() {
        let h = harness(ScriptedAnalyst::new(None, Vec::new()));

        let err = h.engine.run_round(404, &[]).await.unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound { id: 404 }));

        let err = h
            .engine
            .intervene(404, Intervention::AddNote { text: "x".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionNotFound { id: 404 }));
        assert_eq!(h.analyst.calls(), 0);
    }

    #[tokio::test]
    async fn test_spawned_run_completes() {
        let h = harness(ScriptedAnalyst::new(Some(2), Vec::new()));
        let (id, _) = h.engine.create_session("G", "").await.unwrap();

        let outcome = h
            .engine
            .clone()
            .spawn_to_completion(id, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.termination, Termination::Analyst);
        assert_eq!(outcome.rounds, 2);
    }

    #[tokio::test]
    async fn test_artifact_failure_does_not_abort_round() {
        let h = harness(ScriptedAnalyst::new(None, Vec::new()));
        let (id, _) = h.engine.create_session("G", "").await.unwrap();
        std::fs::write(h.artifacts.path().join("sessions"), "not a directory").unwrap();

        let Round::Completed(report) = h.engine.run_round(id, &[]).await.unwrap() else {
            panic!("Expected a completed round");
        };
        assert!(report.artifact.is_none());
        assert_eq!(h.engine.get_state(id).await.unwrap().iteration_count, 1);
    }

    #[tokio::test]
    async fn test_unparseable_analyst_replies_run_to_the_cap_unchanged() {
        let reasoning = StubBackend::new("claude").reply_ok("I am not sure what to do next.");
        let (router, search) = router_with(reasoning.clone());
        let artifacts = tempfile::tempdir().unwrap();
        let engine = ResearchEngine::new(
            Arc::new(SqliteStore::new_in_memory().unwrap()),
            Arc::new(ReasoningAnalyst::new(Arc::new(reasoning.clone()), "sonnet")),
            Arc::new(router),
            test_options(artifacts.path()),
        );
        let (id, fresh) = engine.create_session("Audit ACME", "buy or not").await.unwrap();

        let outcome = engine.run_to_completion(id, Some(3)).await.unwrap();
        assert_eq!(outcome.rounds, 3);
        assert_eq!(outcome.termination, Termination::RoundCap);
        assert_eq!(outcome.record.iteration_count, 3);

        let mut expected = fresh;
        expected.iteration_count = 3;
        assert_eq!(outcome.record, expected);
        assert_eq!(engine.get_state(id).await.unwrap(), expected);
        assert_eq!(reasoning.calls().len(), 3);
        assert!(search.calls().is_empty());

        let files = engine.list_artifacts(id).unwrap();
        assert_eq!(files.len(), 3);
        for (index, file) in files.iter().enumerate() {
            let artifact = artifacts::read_artifact(file).unwrap();
            assert_eq!(artifact.iteration as usize, index + 1);
            assert!(artifact.task_results.is_empty());
        }
    }

    #[tokio::test]
    async fn test_operator_input_survives_forgetful_analyst() {
        let h = harness(ScriptedAnalyst::new(None, Vec::new()).forgetful());
        let (id, _) = h.engine.create_session("G", "").await.unwrap();
        h.engine
            .intervene(id, Intervention::AddNote { text: "check customs data".into() })
            .await
            .unwrap();
        let InterventionOutcome::EvidenceAdded { id: evidence_id } = h
            .engine
            .intervene(
                id,
                Intervention::AddEvidence {
                    claim: "registered in 2015".into(),
                    content: "business licence".into(),
                    source_url: String::new(),
                    source_type: None,
                },
            )
            .await
            .unwrap()
        else {
            panic!("Expected EvidenceAdded");
        };

        h.engine.run_to_completion(id, Some(2)).await.unwrap();

        let record = h.engine.get_state(id).await.unwrap();
        assert_eq!(record.iteration_count, 2);
        assert_eq!(record.user_notes, vec!["check customs data"]);
        assert_eq!(record.evidence_list.len(), 1);
        assert!(record.has_evidence_id(&evidence_id));
    }

    #[tokio::test]
    async fn test_stop_from_another_engine_waits_for_running_round() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("sleuth.db");
        let analyst = Arc::new(
            ScriptedAnalyst::new(None, Vec::new()).slow(Duration::from_millis(300)),
        );
        let first = Arc::new(file_engine(&db, analyst.clone(), dir.path()));
        let second = file_engine(&db, analyst.clone(), dir.path());
        let (id, _) = first.create_session("G", "").await.unwrap();

        let running = tokio::spawn({
            let first = first.clone();
            async move { first.run_round(id, &[]).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        second
            .intervene(
                id,
                Intervention::ForceStop {
                    reason: Some("operator".into()),
                },
            )
            .await
            .unwrap();
        assert!(matches!(running.await.unwrap().unwrap(), Round::Completed(_)));

        let record = second.get_state(id).await.unwrap();
        assert_eq!(record.stop_reason.as_deref(), Some("operator"));
        assert_eq!(record.iteration_count, 1);
        assert!(matches!(
            first.run_round(id, &[]).await.unwrap(),
            Round::Halted { .. }
        ));
        assert_eq!(analyst.calls(), 1);
    }

    #[tokio::test]
    async fn test_rounds_from_two_engines_do_not_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("sleuth.db");
        let analyst = Arc::new(
            ScriptedAnalyst::new(None, Vec::new()).slow(Duration::from_millis(100)),
        );
        let first = file_engine(&db, analyst.clone(), dir.path());
        let second = file_engine(&db, analyst.clone(), dir.path());
        let (id, _) = first.create_session("G", "").await.unwrap();

        let (a, b) = tokio::join!(first.run_round(id, &[]), second.run_round(id, &[]));
        let mut rounds: Vec<u32> = [a.unwrap(), b.unwrap()]
            .into_iter()
            .map(|round| match round {
                Round::Completed(report) => report.round,
                Round::Halted { reason } => panic!("unexpected halt: {}", reason),
            })
            .collect();
        rounds.sort();

        assert_eq!(rounds, vec![1, 2]);
        assert_eq!(analyst.calls(), 2);
        assert_eq!(analyst.peak_active(), 1);
        assert_eq!(first.get_state(id).await.unwrap().iteration_count, 2);
    }

    #[tokio::test]
    async fn test_leased_session_is_busy_after_wait() {
        let h = harness(ScriptedAnalyst::new(None, Vec::new()));
        let (id, _) = h.engine.create_session("G", "").await.unwrap();
        let (router, _) = router_with(StubBackend::new("claude").reply_err("unused"));
        let impatient = ResearchEngine::new(
            h.store.clone(),
            h.analyst.clone(),
            Arc::new(router),
            EngineOptions {
                lease_wait: Duration::from_millis(50),
                ..test_options(h.artifacts.path())
            },
        );
        assert!(
            h.store
                .try_lease(id, "other-process", Duration::from_secs(60))
                .await
                .unwrap()
        );

        let err = impatient.run_round(id, &[]).await.unwrap_err();
        assert!(matches!(err, EngineError::SessionBusy { id: busy } if busy == id));
        let err = impatient
            .intervene(id, Intervention::AddNote { text: "x".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionBusy { .. }));
        assert_eq!(h.analyst.calls(), 0);

        h.store.release_lease(id, "other-process").await.unwrap();
        impatient
            .intervene(id, Intervention::AddNote { text: "x".into() })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expired_lease_does_not_block_rounds() {
        let h = harness(ScriptedAnalyst::new(None, Vec::new()));
        let (id, _) = h.engine.create_session("G", "").await.unwrap();
        assert!(h.store.try_lease(id, "crashed", Duration::ZERO).await.unwrap());

        assert!(matches!(
            h.engine.run_round(id, &[]).await.unwrap(),
            Round::Completed(_)
        ));
        // The round released its own lease.
        assert!(
            h.store
                .try_lease(id, "next", Duration::from_secs(60))
                .await
                .unwrap()
        );
    }
}
