use super::process::{CliCall, run_cli};
use super::{BackendKind, BackendResponse, Capability};
use async_trait::async_trait;
use std::time::Duration;

/// Search backend: the `gemini` CLI in non-interactive mode.
#[derive(Debug, Clone)]
pub struct GeminiCli {
    cmd: String,
    timeout: Duration,
}

impl GeminiCli {
    pub fn new(cmd: impl Into<String>, timeout: Duration) -> Self {
        Self {
            cmd: cmd.into(),
            timeout,
        }
    }

    fn args(prompt: &str, model: Option<&str>) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(model) = model.filter(|m| !m.is_empty()) {
            args.push("-m".to_string());
            args.push(model.to_string());
        }
        args.push("-p".to_string());
        args.push(prompt.to_string());
        args
    }
}

#[async_trait]
impl Capability for GeminiCli {
    fn name(&self) -> &str {
        BackendKind::Search.name()
    }

    async fn invoke(&self, prompt: &str, model: Option<&str>) -> BackendResponse {
        run_cli(CliCall {
            backend: self.name(),
            program: &self.cmd,
            args: Self::args(prompt, model),
            stdin: None,
            timeout: self.timeout,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_is_passed_as_argument() {
        assert_eq!(GeminiCli::args("find x", None), vec!["-p", "find x"]);
        assert_eq!(
            GeminiCli::args("find x", Some("gemini-2.5-flash")),
            vec!["-m", "gemini-2.5-flash", "-p", "find x"]
        );
    }
}
