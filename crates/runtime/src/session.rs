//! Session management.

use crate::dispatch::{Dispatcher, TurnReport};
use crate::model::{Backend, Message};
use crate::Result;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A conversation session.
pub struct Session<B> {
    pub id: SessionId,
    dispatcher: Dispatcher<B>,
    system: String,
    messages: Vec<Message>,
}

impl<B: Backend> Session<B> {
    pub fn new(dispatcher: Dispatcher<B>) -> Self {
        let id = SessionId::new();
        tracing::debug!(session = %id, "session started");
        Self {
            id,
            dispatcher,
            system: String::new(),
            messages: Vec::new(),
        }
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    /// Send a user message and get the assistant's response.
    ///
    /// History is only extended when the turn completes; a cancelled turn
    /// leaves it untouched.
    pub async fn chat(&mut self, input: &str, cancel: &CancellationToken) -> Result<TurnReport> {
        let report = self
            .dispatcher
            .run_turn(&self.messages, &self.system, input, cancel)
            .await?;

        self.messages.push(Message::user(input));
        self.messages.push(Message::assistant(report.text.clone()));
        tracing::debug!(session = %self.id, messages = self.messages.len(), "turn complete");
        Ok(report)
    }

    /// Forget the conversation so far.
    pub fn reset(&mut self) {
        self.messages.clear();
    }

    /// Messages exchanged so far, oldest first.
    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn dispatcher(&self) -> &Dispatcher<B> {
        &self.dispatcher
    }
}
