//! Worker backends behind one capability interface.
//!
//! | Kind         | Adapter       | Transport                         |
//! |--------------|---------------|-----------------------------------|
//! | `Reasoning`  | `ClaudeCli`   | `claude --print`, prompt on stdin |
//! | `Search`     | `GeminiCli`   | `gemini -p <prompt>`              |
//! | `Extraction` | `GlmClient`   | GLM chat-completions over HTTPS   |
//!
//! Adapters never return `Err`: every failure (missing executable, missing
//! credentials, non-zero exit, timeout) is carried in `BackendResponse::error`.

pub mod claude;
pub mod gemini;
pub mod glm;
pub mod process;
pub mod prompts;
pub mod router;
#[cfg(test)]
pub mod testing;

pub use claude::ClaudeCli;
pub use gemini::GeminiCli;
pub use glm::GlmClient;
pub use router::{Backends, ModelHint, Route, TaskRouter, resolve};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend identity used when every attempt for a sub-task failed.
pub const NO_BACKEND: &str = "none";

/// The three backend roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Reasoning,
    Search,
    Extraction,
}

impl BackendKind {
    /// Canonical backend name, as used on the analyst wire and in artifacts.
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Reasoning => "claude",
            BackendKind::Search => "gemini",
            BackendKind::Extraction => "glm",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "claude" | "reasoning" => Ok(BackendKind::Reasoning),
            "gemini" | "search" => Ok(BackendKind::Search),
            "glm" | "extraction" => Ok(BackendKind::Extraction),
            _ => anyhow::bail!(
                "Invalid backend '{}'. Valid values: claude, gemini, glm (or reasoning, search, extraction)",
                s
            ),
        }
    }
}

/// Result of one backend invocation. Exactly one of `text` / `error` is meaningful.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BackendResponse {
    pub text: String,
    pub error: Option<String>,
    pub backend: String,
}

impl BackendResponse {
    pub fn ok(backend: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: None,
            backend: backend.into(),
        }
    }

    pub fn failed(backend: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            error: Some(error.into()),
            backend: backend.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Uniform invoke wrapper around one external backend.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Name reported in responses (`claude`, `gemini`, `glm`).
    fn name(&self) -> &str;

    /// Send `prompt`, optionally pinning a model. Failures come back in the response.
    async fn invoke(&self, prompt: &str, model: Option<&str>) -> BackendResponse;
}
