//! Subprocess invocation shared by the CLI-backed adapters.

use super::BackendResponse;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// One CLI call: program, arguments, optional stdin payload.
#[derive(Debug, Clone)]
pub struct CliCall<'a> {
    pub backend: &'a str,
    pub program: &'a str,
    pub args: Vec<String>,
    pub stdin: Option<&'a str>,
    pub timeout: Duration,
}

/// Run the call to completion and fold every failure into the response.
pub async fn run_cli(call: CliCall<'_>) -> BackendResponse {
    let start = Instant::now();
    let mut cmd = Command::new(call.program);
    cmd.args(&call.args)
        .stdin(if call.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return BackendResponse::failed(
                call.backend,
                format!(
                    "{} CLI not found at '{}'. Install it or set its path in sleuth.toml.",
                    call.backend, call.program
                ),
            );
        }
        Err(e) => {
            return BackendResponse::failed(
                call.backend,
                format!("Failed to spawn {} process: {}", call.backend, e),
            );
        }
    };

    // Stdin is written concurrently with draining stdout/stderr.
    let writer = match (child.stdin.take(), call.stdin) {
        (Some(mut stdin), Some(payload)) => {
            let payload = payload.to_owned();
            Some(tokio::spawn(async move {
                stdin.write_all(payload.as_bytes()).await?;
                stdin.shutdown().await
            }))
        }
        _ => None,
    };

    let output = match tokio::time::timeout(call.timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return BackendResponse::failed(
                call.backend,
                format!("Failed to wait for {} process: {}", call.backend, e),
            );
        }
        Err(_) => {
            warn!(backend = call.backend, timeout_secs = call.timeout.as_secs(), "backend call timed out");
            return BackendResponse::failed(
                call.backend,
                format!("{} timed out after {}s", call.backend, call.timeout.as_secs()),
            );
        }
    };

    if let Some(writer) = writer {
        if let Ok(Err(e)) = writer.await {
            debug!(backend = call.backend, error = %e, "stdin write did not complete");
        }
    }

    let exit_code = output.status.code().unwrap_or(-1);
    debug!(
        backend = call.backend,
        exit_code,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "backend process finished"
    );

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("{} exited with code {}", call.backend, exit_code)
        } else {
            stderr
        };
        warn!(backend = call.backend, exit_code, "backend call failed");
        return BackendResponse::failed(call.backend, message);
    }

    BackendResponse::ok(call.backend, String::from_utf8_lossy(&output.stdout).into_owned())
}
