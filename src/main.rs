use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, prelude::*};

mod cmd;

#[derive(Parser)]
#[command(name = "sleuth")]
#[command(version, about = "Iterative multi-backend deep-research engine")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a research session
    New {
        /// What the investigation should establish
        goal: String,
        /// The decision the research feeds into
        #[arg(short, long, default_value = "")]
        context: String,
    },
    /// List research sessions
    List,
    /// Print the research record of a session
    State {
        session_id: i64,
        /// Print the raw JSON record
        #[arg(long)]
        json: bool,
    },
    /// Run a single round
    Step { session_id: i64 },
    /// Run rounds until the analyst stops or the round cap is hit
    Run {
        session_id: i64,
        /// Overrides engine.max_rounds
        #[arg(short, long)]
        max_rounds: Option<u32>,
    },
    /// List the evidence artifacts written for a session
    Artifacts { session_id: i64 },
    /// Edit a session's record between rounds
    Intervene {
        session_id: i64,
        #[command(subcommand)]
        command: InterveneCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum InterveneCommands {
    /// Add a piece of evidence
    Evidence {
        claim: String,
        content: String,
        #[arg(long, default_value = "")]
        source_url: String,
        /// official, commercial, user_generated, media
        #[arg(long)]
        source_type: Option<String>,
    },
    /// Add a note for the analyst
    Note { text: String },
    /// Stop the session; the next round halts
    Stop {
        #[arg(long)]
        reason: Option<String>,
    },
    /// Mark a question as skipped
    Skip { question_id: String },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default sleuth.toml file
    Init,
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("sleuth={},warn", level).into());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::New { goal, context } => cmd::cmd_new(&project_dir, goal, context).await?,
        Commands::List => cmd::cmd_list(&project_dir).await?,
        Commands::State { session_id, json } => {
            cmd::cmd_state(&project_dir, *session_id, *json).await?
        }
        Commands::Step { session_id } => cmd::cmd_step(&project_dir, &cli, *session_id).await?,
        Commands::Run {
            session_id,
            max_rounds,
        } => cmd::cmd_run(&project_dir, &cli, *session_id, *max_rounds).await?,
        Commands::Artifacts { session_id } => {
            cmd::cmd_artifacts(&project_dir, *session_id).await?
        }
        Commands::Intervene {
            session_id,
            command,
        } => cmd::cmd_intervene(&project_dir, *session_id, command.clone()).await?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
