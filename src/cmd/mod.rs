//! CLI command implementations.
//!
//! | Module       | Commands handled                         |
//! |--------------|------------------------------------------|
//! | `session`    | `New`, `List`, `State`, `Artifacts`      |
//! | `research`   | `Step`, `Run`                            |
//! | `intervene`  | `Intervene`                              |
//! | `config`     | `Config`                                 |

pub mod config;
pub mod intervene;
pub mod research;
pub mod session;

pub use config::cmd_config;
pub use intervene::cmd_intervene;
pub use research::{cmd_run, cmd_step};
pub use session::{cmd_artifacts, cmd_list, cmd_new, cmd_state};

use anyhow::{Context, Result};
use sleuth::config::Settings;
use sleuth::engine::ResearchEngine;
use std::path::Path;

/// Resolve settings for `project_dir` and wire the engine.
pub fn open_engine(project_dir: &Path) -> Result<(Settings, ResearchEngine)> {
    let settings = Settings::load(project_dir)?;
    let engine = ResearchEngine::from_settings(&settings).with_context(|| {
        format!("Failed to open session database {}", settings.database.display())
    })?;
    Ok((settings, engine))
}
