//! Session commands: `sleuth new`, `list`, `state`, `artifacts`.

use anyhow::{Context, Result};
use console::style;
use sleuth::research::ResearchRecord;
use sleuth::ui::icons::{CHECK, FOLDER};
use std::path::Path;

use super::open_engine;

pub async fn cmd_new(project_dir: &Path, goal: &str, context: &str) -> Result<()> {
    if goal.trim().is_empty() {
        anyhow::bail!("Research goal must not be empty");
    }
    let (_, engine) = open_engine(project_dir)?;
    let (id, _) = engine.create_session(goal.trim(), context.trim()).await?;

    println!("{}Created session {}", CHECK, style(id).yellow().bold());
    println!();
    println!("Next steps:");
    println!("  sleuth step {}   # run one round", id);
    println!("  sleuth run {}    # run until the analyst stops", id);
    Ok(())
}

pub async fn cmd_list(project_dir: &Path) -> Result<()> {
    let (_, engine) = open_engine(project_dir)?;
    let sessions = engine.list_sessions().await?;

    if sessions.is_empty() {
        println!("No research sessions yet. Create one with 'sleuth new <goal>'.");
        return Ok(());
    }

    println!(
        "{:>4}  {:<10} {:>5} {:>10}  {}",
        "ID", "STATUS", "ROUND", "CONFIDENCE", "GOAL"
    );
    for s in sessions {
        let status = if s.status == "completed" {
            style(format!("{:<10}", s.status)).green()
        } else {
            style(format!("{:<10}", s.status)).yellow()
        };
        println!(
            "{:>4}  {} {:>5} {:>10.1}  {}",
            s.id, status, s.iteration_count, s.confidence_score, s.goal
        );
    }
    Ok(())
}

pub async fn cmd_state(project_dir: &Path, session_id: i64, json: bool) -> Result<()> {
    let (_, engine) = open_engine(project_dir)?;
    let record = engine.get_state(session_id).await?;

    if json {
        let out = serde_json::to_string_pretty(&record).context("Failed to serialize record")?;
        println!("{}", out);
    } else {
        print_record(session_id, &record);
    }
    Ok(())
}

fn print_section(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{}", style(title).bold());
    for item in items {
        println!("  - {}", item);
    }
    println!();
}

fn print_record(session_id: i64, record: &ResearchRecord) {
    println!();
    println!(
        "Session {}: {}",
        style(session_id).yellow().bold(),
        record.research_goal
    );
    if !record.decision_context.is_empty() {
        println!("Decision: {}", record.decision_context);
    }
    println!(
        "Round {}  confidence {:.1}",
        record.iteration_count, record.confidence_score
    );
    match &record.stop_reason {
        Some(reason) => println!("Status: {} ({})", style("stopped").green(), reason),
        None => println!("Status: {}", style("active").yellow()),
    }
    println!();

    print_section("Hypotheses", &record.current_hypotheses);
    print_section("Assumptions", &record.assumptions);
    print_section("Uncertainties", &record.uncertainties);
    print_section("Notes", &record.user_notes);

    if !record.evidence_list.is_empty() {
        println!("{}", style("Evidence").bold());
        for e in &record.evidence_list {
            println!(
                "  [{}] {} {}",
                style(&e.id).cyan(),
                e.claim,
                style(format!("({}, {})", e.quality.source_type, e.quality.analyzed_by)).dim()
            );
        }
        println!();
    }

    if !record.next_questions.is_empty() {
        println!("{}", style("Questions").bold());
        for q in &record.next_questions {
            println!(
                "  [{}] {} {}",
                style(&q.id).cyan(),
                q.text,
                style(format!("{:?}/{:?}", q.kind, q.status).to_lowercase()).dim()
            );
        }
        println!();
    }
}

pub async fn cmd_artifacts(project_dir: &Path, session_id: i64) -> Result<()> {
    let (settings, engine) = open_engine(project_dir)?;
    engine.get_state(session_id).await?;
    let paths = engine.list_artifacts(session_id)?;

    if paths.is_empty() {
        println!("No artifacts for session {}.", session_id);
        return Ok(());
    }

    println!(
        "{}{}",
        FOLDER,
        settings
            .artifacts_dir
            .join("sessions")
            .join(session_id.to_string())
            .display()
    );
    for path in paths {
        if let Some(name) = path.file_name() {
            println!("  {}", name.to_string_lossy());
        }
    }
    Ok(())
}
