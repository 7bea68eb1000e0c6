//! Per-round evidence files.
//!
//! Layout: `<root>/sessions/<session_id>/iteration-NNN.evidence.json`.

use super::TaskOutcome;
use crate::util::preview;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationArtifact {
    pub session_id: i64,
    pub iteration: u32,
    pub created_at: String,
    pub task_results: Vec<TaskResultArtifact>,
}

/// One dispatched sub-task and what came back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResultArtifact {
    pub llm: String,
    pub action: String,
    pub query: String,
    pub content_preview: String,
    pub ok: bool,
    pub error: Option<String>,
    pub output_preview: String,
    pub output_text: String,
}

impl TaskResultArtifact {
    pub fn from_outcome(outcome: &TaskOutcome) -> Self {
        let response = &outcome.response;
        let llm = if response.backend.is_empty() {
            outcome.task.backend().to_string()
        } else {
            response.backend.clone()
        };
        Self {
            llm,
            action: outcome.task.action().to_string(),
            query: outcome.task.query().to_string(),
            content_preview: preview(outcome.task.content()),
            ok: response.is_ok(),
            error: response.error.clone(),
            output_preview: preview(&response.text),
            output_text: response.text.clone(),
        }
    }
}

impl IterationArtifact {
    pub fn new(session_id: i64, iteration: u32, outcomes: &[TaskOutcome]) -> Self {
        Self {
            session_id,
            iteration,
            created_at: Utc::now().to_rfc3339(),
            task_results: outcomes.iter().map(TaskResultArtifact::from_outcome).collect(),
        }
    }
}

pub fn session_dir(root: &Path, session_id: i64) -> PathBuf {
    root.join("sessions").join(session_id.to_string())
}

pub fn artifact_path(root: &Path, session_id: i64, iteration: u32) -> PathBuf {
    session_dir(root, session_id).join(format!("iteration-{:03}.evidence.json", iteration))
}

/// Write the artifact as pretty JSON, creating directories as needed.
pub fn write_artifact(root: &Path, artifact: &IterationArtifact) -> Result<PathBuf> {
    let path = artifact_path(root, artifact.session_id, artifact.iteration);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(artifact).context("Failed to serialize artifact")?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// `write_artifact` on the blocking pool, for use inside a round.
pub async fn write_artifact_blocking(root: &Path, artifact: IterationArtifact) -> Result<PathBuf> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || write_artifact(&root, &artifact))
        .await
        .context("Artifact writer task panicked")?
}

pub fn read_artifact(path: &Path) -> Result<IterationArtifact> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Artifact files of a session in round order. Empty when none were written.
pub fn list_artifacts(root: &Path, session_id: i64) -> Result<Vec<PathBuf>> {
    let dir = session_dir(root, session_id);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut rounds: Vec<(u32, PathBuf)> = std::fs::read_dir(&dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| round_of(&path).map(|round| (round, path)))
        .collect();
    rounds.sort_by_key(|(round, _)| *round);
    Ok(rounds.into_iter().map(|(_, path)| path).collect())
}

/// Round number encoded in an artifact file name.
fn round_of(path: &Path) -> Option<u32> {
    path.file_name()?
        .to_str()?
        .strip_prefix("iteration-")?
        .strip_suffix(".evidence.json")?
        .parse()
        .ok()
}
