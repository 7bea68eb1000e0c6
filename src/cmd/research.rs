//! Round execution: `sleuth step` and `sleuth run`.

use anyhow::Result;
use console::style;
use sleuth::engine::Round;
use sleuth::ui::{ResearchUI, round_lines, spinner};
use std::path::Path;

use super::super::Cli;
use super::open_engine;

pub async fn cmd_step(project_dir: &Path, cli: &Cli, session_id: i64) -> Result<()> {
    let (_, engine) = open_engine(project_dir)?;

    let progress = spinner(format!("Running one round of session {}", session_id));
    let round = engine.run_round(session_id, &[]).await;
    progress.finish_and_clear();

    match round? {
        Round::Halted { reason } => {
            println!("Session {} is already stopped: {}", session_id, reason);
        }
        Round::Completed(report) => {
            for line in round_lines(&report, cli.verbose) {
                println!("{}", line);
            }
            if let Some(path) = &report.artifact {
                println!("    {}", style(path.display()).dim());
            }
        }
    }
    Ok(())
}

pub async fn cmd_run(
    project_dir: &Path,
    cli: &Cli,
    session_id: i64,
    max_rounds: Option<u32>,
) -> Result<()> {
    let (settings, engine) = open_engine(project_dir)?;
    for warning in settings.validate() {
        eprintln!("{} {}", style("warning:").yellow(), warning);
    }

    let record = engine.get_state(session_id).await?;
    let cap = max_rounds.unwrap_or(settings.max_rounds);
    let ui = ResearchUI::new(cap, cli.verbose);
    ui.start(session_id, &record.research_goal);

    match engine
        .run_with_observer(session_id, Some(cap), |report| ui.round_complete(report))
        .await
    {
        Ok(outcome) => {
            ui.finish(&outcome);
            Ok(())
        }
        Err(e) => {
            ui.abandon(&e.to_string());
            Err(e.into())
        }
    }
}
