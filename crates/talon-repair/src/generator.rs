use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use talon_core::{Result, TalonError};

/// The external code-generating collaborator: takes a repair prompt, returns
/// replacement source text. Everything about how it works is out of scope —
/// the pipeline only relies on this contract.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Queue-backed generator for deterministic tests. Records every prompt it
/// receives so tests can assert on what the planner produced.
#[derive(Default)]
pub struct MockGenerator {
    responses: Arc<Mutex<Vec<Result<String>>>>,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a source-text response.
    pub fn with_source(self, source: &str) -> Self {
        self.responses.lock().push(Ok(source.to_string()));
        self
    }

    /// Queue an error response.
    pub fn with_error(self, message: &str) -> Self {
        self.responses
            .lock()
            .push(Err(TalonError::Generator(message.to_string())));
        self
    }

    pub fn recorded_prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        let mut responses = self.responses.lock();
        if responses.is_empty() {
            return Err(TalonError::Generator("no more queued responses".into()));
        }
        responses.remove(0)
    }
}
