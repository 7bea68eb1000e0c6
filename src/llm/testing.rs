//! Scripted `Capability` stub shared by unit tests.

use super::{BackendResponse, Capability};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub prompt: String,
    pub model: Option<String>,
}

#[derive(Debug, Default)]
struct StubState {
    replies: VecDeque<Result<String, String>>,
    last: Option<Result<String, String>>,
    calls: Vec<RecordedCall>,
}

/// Replays queued replies in order, repeating the last one once the queue drains.
#[derive(Debug, Clone)]
pub struct StubBackend {
    name: String,
    state: Arc<Mutex<StubState>>,
}

impl StubBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::default(),
        }
    }

    pub fn reply_ok(self, text: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .replies
            .push_back(Ok(text.to_string()));
        self
    }

    pub fn reply_err(self, error: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .replies
            .push_back(Err(error.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl Capability for StubBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, prompt: &str, model: Option<&str>) -> BackendResponse {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RecordedCall {
            prompt: prompt.to_string(),
            model: model.map(str::to_string),
        });
        let reply = match state.replies.pop_front() {
            Some(reply) => {
                state.last = Some(reply.clone());
                reply
            }
            None => state
                .last
                .clone()
                .unwrap_or_else(|| Err("no scripted reply".to_string())),
        };
        match reply {
            Ok(text) => BackendResponse::ok(&self.name, text),
            Err(error) => BackendResponse::failed(&self.name, error),
        }
    }
}
