//! Configuration for sleuth.
//!
//! Settings are read from `.sleuth/sleuth.toml`, then overridden by environment
//! variables (a `.env` file is honoured), then by CLI flags. The result is an
//! immutable `Settings` value handed to the router and the engine; nothing
//! reads configuration from global state after startup.
//!
//! # Configuration File Format
//!
//! ```toml
//! [claude]
//! cmd = "claude"
//! main_model = "sonnet"
//! cheap_model = "haiku"
//!
//! [gemini]
//! cmd = "gemini"
//!
//! [glm]
//! api_key = "..."
//! model = "glm-4.7"
//! base_url = "https://open.bigmodel.cn/api/paas/v4"
//!
//! [engine]
//! max_rounds = 20
//! adapter_timeout_secs = 300
//! parallel_dispatch = true
//! lease_ttl_secs = 3600
//! lease_wait_secs = 900
//!
//! [storage]
//! database = ".sleuth/sleuth.db"
//! artifacts_dir = ".sleuth/artifacts"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_DIR: &str = ".sleuth";
pub const CONFIG_FILE: &str = "sleuth.toml";
pub const DEFAULT_MAX_ROUNDS: u32 = 20;
const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 300;
const DEFAULT_LEASE_TTL_SECS: u64 = 3600;
const DEFAULT_LEASE_WAIT_SECS: u64 = 900;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaudeSection {
    pub cmd: String,
    pub main_model: String,
    pub cheap_model: String,
}

impl Default for ClaudeSection {
    fn default() -> Self {
        Self {
            cmd: "claude".to_string(),
            main_model: "sonnet".to_string(),
            cheap_model: "haiku".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSection {
    pub cmd: String,
}

impl Default for GeminiSection {
    fn default() -> Self {
        Self {
            cmd: "gemini".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlmSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for GlmSection {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "glm-4.7".to_string(),
            base_url: "https://open.bigmodel.cn/api/paas/v4".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub max_rounds: u32,
    pub adapter_timeout_secs: u64,
    pub parallel_dispatch: bool,
    /// Lifetime of a session lease; a holder that dies frees it after this long.
    pub lease_ttl_secs: u64,
    /// How long a round or intervention waits for a busy session.
    pub lease_wait_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            adapter_timeout_secs: DEFAULT_ADAPTER_TIMEOUT_SECS,
            parallel_dispatch: true,
            lease_ttl_secs: DEFAULT_LEASE_TTL_SECS,
            lease_wait_secs: DEFAULT_LEASE_WAIT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub database: PathBuf,
    pub artifacts_dir: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database: PathBuf::from(CONFIG_DIR).join("sleuth.db"),
            artifacts_dir: PathBuf::from(CONFIG_DIR).join("artifacts"),
        }
    }
}

/// The complete sleuth.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SleuthToml {
    #[serde(default)]
    pub claude: ClaudeSection,
    #[serde(default)]
    pub gemini: GeminiSection,
    #[serde(default)]
    pub glm: GlmSection,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub storage: StorageSection,
}

impl SleuthToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse sleuth.toml")
    }

    /// Load `<config_dir>/sleuth.toml`, or defaults when it does not exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize sleuth.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides read through `env`.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = env("CLAUDE_CLI_PATH") {
            self.claude.cmd = v;
        }
        if let Some(v) = env("CLAUDE_MODEL_MAIN") {
            self.claude.main_model = v;
        }
        if let Some(v) = env("CLAUDE_MODEL_CHEAP") {
            self.claude.cheap_model = v;
        }
        if let Some(v) = env("GEMINI_CLI_PATH") {
            self.gemini.cmd = v;
        }
        if let Some(v) = env("GLM_API_KEY") {
            self.glm.api_key = Some(v);
        }
        if let Some(v) = env("GLM_MODEL") {
            self.glm.model = v;
        }
        if let Some(v) = env("SLEUTH_MAX_ROUNDS") {
            self.engine.max_rounds = v
                .parse()
                .with_context(|| format!("Invalid SLEUTH_MAX_ROUNDS '{}'", v))?;
        }
        if let Some(v) = env("SLEUTH_ARTIFACTS_DIR") {
            self.storage.artifacts_dir = PathBuf::from(v);
        }
        if let Some(v) = env("SLEUTH_DATABASE") {
            self.storage.database = PathBuf::from(v);
        }
        Ok(())
    }
}

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub project_dir: PathBuf,
    pub claude_cmd: String,
    pub claude_main_model: String,
    pub claude_cheap_model: String,
    pub gemini_cmd: String,
    pub glm_api_key: Option<String>,
    pub glm_model: String,
    pub glm_base_url: String,
    pub max_rounds: u32,
    pub adapter_timeout: Duration,
    pub parallel_dispatch: bool,
    pub lease_ttl: Duration,
    pub lease_wait: Duration,
    pub database: PathBuf,
    pub artifacts_dir: PathBuf,
}

impl Settings {
    /// Load settings for `project_dir`: file, then process environment.
    pub fn load(project_dir: &Path) -> Result<Self> {
        dotenvy::from_path(project_dir.join(".env")).ok();
        let mut toml = SleuthToml::load_or_default(&project_dir.join(CONFIG_DIR))?;
        toml.apply_env(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))?;
        Ok(Self::from_toml(project_dir, toml))
    }

    /// Resolve a parsed file against `project_dir`. Relative paths are project-relative.
    pub fn from_toml(project_dir: &Path, toml: SleuthToml) -> Self {
        let resolve = |p: PathBuf| {
            if p.is_absolute() {
                p
            } else {
                project_dir.join(p)
            }
        };
        Self {
            project_dir: project_dir.to_path_buf(),
            claude_cmd: toml.claude.cmd,
            claude_main_model: toml.claude.main_model,
            claude_cheap_model: toml.claude.cheap_model,
            gemini_cmd: toml.gemini.cmd,
            glm_api_key: toml.glm.api_key.filter(|k| !k.trim().is_empty()),
            glm_model: toml.glm.model,
            glm_base_url: toml.glm.base_url,
            max_rounds: toml.engine.max_rounds,
            adapter_timeout: Duration::from_secs(toml.engine.adapter_timeout_secs),
            parallel_dispatch: toml.engine.parallel_dispatch,
            lease_ttl: Duration::from_secs(toml.engine.lease_ttl_secs),
            lease_wait: Duration::from_secs(toml.engine.lease_wait_secs),
            database: resolve(toml.storage.database),
            artifacts_dir: resolve(toml.storage.artifacts_dir),
        }
    }

    /// Defaults rooted at `project_dir`, ignoring files and environment.
    pub fn defaults(project_dir: &Path) -> Self {
        Self::from_toml(project_dir, SleuthToml::default())
    }

    pub fn config_dir(&self) -> PathBuf {
        self.project_dir.join(CONFIG_DIR)
    }

    /// Human-readable warnings about settings that will make backends fail.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.glm_api_key.is_none() {
            warnings.push(
                "GLM API key is not set; extraction tasks will fall back to claude".to_string(),
            );
        }
        if self.max_rounds == 0 {
            warnings.push("engine.max_rounds is 0; run will stop before the first round".to_string());
        }
        if self.adapter_timeout.is_zero() {
            warnings.push("engine.adapter_timeout_secs is 0; every backend call will time out".to_string());
        }
        // A round runs the analyst and then one fallback chain per task.
        if self.lease_ttl < self.adapter_timeout * 3 {
            warnings.push(format!(
                "engine.lease_ttl_secs ({}) is shorter than three adapter timeouts; \
                 a slow round may lose its session lease",
                self.lease_ttl.as_secs()
            ));
        }
        if self.claude_main_model.trim().is_empty() {
            warnings.push("claude.main_model is empty".to_string());
        }
        warnings
    }
}
