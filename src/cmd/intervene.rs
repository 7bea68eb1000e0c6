//! Operator edits: `sleuth intervene <id> ...`.

use anyhow::Result;
use console::style;
use sleuth::engine::{Intervention, InterventionOutcome};
use sleuth::ui::icons::CHECK;
use std::path::Path;

use super::super::InterveneCommands;
use super::open_engine;

impl From<InterveneCommands> for Intervention {
    fn from(command: InterveneCommands) -> Self {
        match command {
            InterveneCommands::Evidence {
                claim,
                content,
                source_url,
                source_type,
            } => Intervention::AddEvidence {
                claim,
                content,
                source_url,
                source_type,
            },
            InterveneCommands::Note { text } => Intervention::AddNote { text },
            InterveneCommands::Stop { reason } => Intervention::ForceStop { reason },
            InterveneCommands::Skip { question_id } => Intervention::SkipQuestion { question_id },
        }
    }
}

pub async fn cmd_intervene(
    project_dir: &Path,
    session_id: i64,
    command: InterveneCommands,
) -> Result<()> {
    let (_, engine) = open_engine(project_dir)?;
    let outcome = engine.intervene(session_id, command.into()).await?;

    match outcome {
        InterventionOutcome::EvidenceAdded { id } => {
            println!("{}Added evidence {}", CHECK, style(id).cyan());
        }
        InterventionOutcome::NoteAdded { notes } => {
            println!("{}Note added ({} total)", CHECK, notes);
        }
        InterventionOutcome::Stopped { reason } => {
            println!("{}Session {} stopped: {}", CHECK, session_id, reason);
        }
        InterventionOutcome::QuestionSkipped { matched: 0 } => {
            println!("No question matched; record unchanged.");
        }
        InterventionOutcome::QuestionSkipped { matched } => {
            println!("{}Skipped {} question(s)", CHECK, matched);
        }
    }
    Ok(())
}
