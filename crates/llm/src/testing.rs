//! Scripted provider for tests in this crate and downstream stages.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::provider::{Completion, LlmError, LlmProvider, Message};

enum Script {
    /// Pop responses in order; panics when exhausted.
    Sequence(Mutex<Vec<Result<Completion, LlmError>>>),
    /// Same successful text for every call.
    AlwaysOk(String),
    /// Same error for every call (status/body are cloned).
    AlwaysErr(u16, String),
    /// Echo a deterministic completion derived from the prompt, for
    /// idempotence tests.
    Echo,
}

/// Deterministic [`LlmProvider`] driven by a prepared script.
pub struct ScriptedProvider {
    script: Script,
    calls: AtomicU64,
}

impl ScriptedProvider {
    pub fn new(mut responses: Vec<Result<Completion, LlmError>>) -> Self {
        responses.reverse(); // pop() returns them in submission order
        Self {
            script: Script::Sequence(Mutex::new(responses)),
            calls: AtomicU64::new(0),
        }
    }

    pub fn always_ok(text: impl Into<String>) -> Self {
        Self {
            script: Script::AlwaysOk(text.into()),
            calls: AtomicU64::new(0),
        }
    }

    pub fn always(err: LlmError) -> Self {
        let (status, body) = match err {
            LlmError::ApiError { status, body } => (status, body),
            other => (0, other.to_string()),
        };
        Self {
            script: Script::AlwaysErr(status, body),
            calls: AtomicU64::new(0),
        }
    }

    pub fn echo() -> Self {
        Self {
            script: Script::Echo,
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Sequence(responses) => responses
                .lock()
                .unwrap()
                .pop()
                .expect("scripted provider ran out of responses"),
            Script::AlwaysOk(text) => Ok(Completion {
                text: text.clone(),
                prompt_tokens: 10,
                completion_tokens: 20,
            }),
            Script::AlwaysErr(0, body) => Err(LlmError::ParseError(body.clone())),
            Script::AlwaysErr(status, body) => Err(LlmError::ApiError {
                status: *status,
                body: body.clone(),
            }),
            Script::Echo => {
                let prompt = messages
                    .last()
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                Ok(Completion {
                    text: format!("echo: {prompt}"),
                    prompt_tokens: prompt.len() as u64 / 4,
                    completion_tokens: prompt.len() as u64 / 4,
                })
            }
        }
    }
}
