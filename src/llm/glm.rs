use super::{BackendKind, BackendResponse, Capability};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Extraction backend: GLM chat completions over HTTPS.
#[derive(Debug, Clone)]
pub struct GlmClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl GlmClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            timeout,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn complete(&self, api_key: &str, prompt: &str, model: &str) -> Result<String, String> {
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("glm timed out after {}s", self.timeout.as_secs())
                } else {
                    format!("GLM request failed: {}", e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(format!("GLM API returned {}: {}", status, detail.trim()));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| format!("Failed to decode GLM response: {}", e))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| "GLM response contained no choices".to_string())
    }
}

#[async_trait]
impl Capability for GlmClient {
    fn name(&self) -> &str {
        BackendKind::Extraction.name()
    }

    async fn invoke(&self, prompt: &str, model: Option<&str>) -> BackendResponse {
        let Some(api_key) = self.api_key.as_deref() else {
            return BackendResponse::failed(
                self.name(),
                "GLM API key not configured. Set GLM_API_KEY or [glm] api_key in sleuth.toml.",
            );
        };
        let model = model.filter(|m| !m.is_empty()).unwrap_or(&self.model);
        debug!(backend = self.name(), model, "calling GLM");

        match self.complete(api_key, prompt, model).await {
            Ok(text) => BackendResponse::ok(self.name(), text),
            Err(error) => {
                warn!(backend = self.name(), %error, "GLM call failed");
                BackendResponse::failed(self.name(), error)
            }
        }
    }
}
