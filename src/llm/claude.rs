use super::process::{CliCall, run_cli};
use super::{BackendKind, BackendResponse, Capability};
use async_trait::async_trait;
use std::time::Duration;

/// Primary reasoning backend: the `claude` CLI in print mode, prompt on stdin.
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    cmd: String,
    timeout: Duration,
}

impl ClaudeCli {
    pub fn new(cmd: impl Into<String>, timeout: Duration) -> Self {
        Self {
            cmd: cmd.into(),
            timeout,
        }
    }

    fn args(model: Option<&str>) -> Vec<String> {
        let mut args = vec!["--print".to_string()];
        if let Some(model) = model.filter(|m| !m.is_empty()) {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        args
    }
}

#[async_trait]
impl Capability for ClaudeCli {
    fn name(&self) -> &str {
        BackendKind::Reasoning.name()
    }

    async fn invoke(&self, prompt: &str, model: Option<&str>) -> BackendResponse {
        run_cli(CliCall {
            backend: self.name(),
            program: &self.cmd,
            args: Self::args(model),
            stdin: Some(prompt),
            timeout: self.timeout,
        })
        .await
    }
}
