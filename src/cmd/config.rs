//! Configuration view and validation commands: `sleuth config`.

use anyhow::{Context, Result};
use sleuth::config::{CONFIG_DIR, CONFIG_FILE, Settings, SleuthToml};
use std::path::Path;

use super::super::ConfigCommands;

fn print_settings(settings: &Settings) {
    println!("[claude]");
    println!("  cmd = \"{}\"", settings.claude_cmd);
    println!("  main_model = \"{}\"", settings.claude_main_model);
    println!("  cheap_model = \"{}\"", settings.claude_cheap_model);
    println!();
    println!("[gemini]");
    println!("  cmd = \"{}\"", settings.gemini_cmd);
    println!();
    println!("[glm]");
    println!(
        "  api_key = {}",
        if settings.glm_api_key.is_some() {
            "(set)"
        } else {
            "(not set)"
        }
    );
    println!("  model = \"{}\"", settings.glm_model);
    println!("  base_url = \"{}\"", settings.glm_base_url);
    println!();
    println!("[engine]");
    println!("  max_rounds = {}", settings.max_rounds);
    println!(
        "  adapter_timeout_secs = {}",
        settings.adapter_timeout.as_secs()
    );
    println!("  parallel_dispatch = {}", settings.parallel_dispatch);
    println!("  lease_ttl_secs = {}", settings.lease_ttl.as_secs());
    println!("  lease_wait_secs = {}", settings.lease_wait.as_secs());
    println!();
    println!("[storage]");
    println!("  database = \"{}\"", settings.database.display());
    println!("  artifacts_dir = \"{}\"", settings.artifacts_dir.display());
    println!();
}

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_dir = project_dir.join(CONFIG_DIR);
    let config_path = config_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Sleuth Configuration");
            println!("====================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No sleuth.toml found at {}", config_path.display());
                println!("Run 'sleuth config init' to create one.");
            }
            println!();
            println!("Effective values (with env overrides):");
            print_settings(&Settings::load(project_dir)?);
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let settings = Settings::load(project_dir)?;
            let warnings = settings.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("sleuth.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create {}", config_dir.display()))?;
            SleuthToml::default().save(&config_path)?;

            println!("Created sleuth.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [claude] cmd, main_model, cheap_model");
            println!("  - [glm] api_key (or set GLM_API_KEY)");
            println!("  - [engine] max_rounds, adapter_timeout_secs, lease_ttl_secs");
            println!();
        }
    }

    Ok(())
}
