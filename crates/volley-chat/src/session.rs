//! Conversation sessions: ordered messages under a token budget.
//!
//! A session always starts with a system message. Every append checks that
//! the messages plus the tokens reserved for the next completion fit the
//! model's context. When they don't, the oldest non-system messages are
//! evicted first; if even that is not enough the append fails and nothing
//! changes.

use serde::{Deserialize, Serialize};
use volley_ai::{ChatMessage, CompletionRequest, Role};

use crate::{
    error::{Error, Result},
    generation::GenerationConfig,
    message::Message,
    model::ModelDescriptor,
};

/// Whether a session still accepts messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Ended,
}

/// One ongoing conversation.
///
/// Deserializing re-checks everything construction guarantees, so a stored
/// document that was edited by hand cannot break the budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SessionRecord")]
pub struct Session {
    id: String,
    user_id: String,
    model: ModelDescriptor,
    config: GenerationConfig,
    messages: Vec<Message>,
    /// Messages removed by eviction, oldest first
    #[serde(default)]
    erased_messages: Vec<Message>,
    status: SessionStatus,
    created_at: i64,
}

impl Session {
    /// Create a session with a freshly generated id
    pub fn create(
        user_id: impl Into<String>,
        initial_system_message: Message,
        model: ModelDescriptor,
        config: GenerationConfig,
    ) -> Result<Self> {
        Self::create_with_id(
            uuid::Uuid::new_v4().to_string(),
            user_id,
            initial_system_message,
            model,
            config,
        )
    }

    /// Create a session under a caller-chosen id
    pub fn create_with_id(
        id: impl Into<String>,
        user_id: impl Into<String>,
        initial_system_message: Message,
        model: ModelDescriptor,
        config: GenerationConfig,
    ) -> Result<Self> {
        let id = id.into();
        let user_id = user_id.into();

        if id.trim().is_empty() {
            return Err(Error::validation("session id is empty"));
        }
        if user_id.trim().is_empty() {
            return Err(Error::validation("user id is empty"));
        }
        config.validate()?;
        check_priced(&model, &initial_system_message)?;
        if initial_system_message.role() != Role::System {
            return Err(Error::validation(format!(
                "initial message must be a system message, got {}",
                initial_system_message.role()
            )));
        }

        let required =
            u64::from(initial_system_message.token_cost()) + u64::from(config.max_tokens);
        if required > u64::from(model.max_tokens()) {
            return Err(Error::validation(format!(
                "initial system message costs {} tokens and {} are reserved for completions, \
                 but {} holds {}",
                initial_system_message.token_cost(),
                config.max_tokens,
                model.name(),
                model.max_tokens()
            )));
        }

        Ok(Self {
            id,
            user_id,
            model,
            config,
            messages: vec![initial_system_message],
            erased_messages: Vec::new(),
            status: SessionStatus::Active,
            created_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn model(&self) -> &ModelDescriptor {
        &self.model
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Current messages, system message first
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages evicted to satisfy the budget, oldest first
    pub fn erased_messages(&self) -> &[Message] {
        &self.erased_messages
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_ended(&self) -> bool {
        self.status == SessionStatus::Ended
    }

    /// Creation time in UTC milliseconds
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Sum of the token costs of the current messages
    pub fn token_usage(&self) -> u32 {
        self.messages.iter().map(|m| m.token_cost()).sum()
    }

    /// Tokens still free once the completion reservation is taken out
    pub fn remaining_budget(&self) -> u32 {
        self.model
            .max_tokens()
            .saturating_sub(self.token_usage())
            .saturating_sub(self.config.max_tokens)
    }

    /// Stop accepting messages
    pub fn end(&mut self) {
        self.status = SessionStatus::Ended;
    }

    /// Append a message, evicting the oldest non-system messages if the
    /// budget requires it.
    ///
    /// Fails with [`Error::BudgetExceeded`] when the message does not fit
    /// even with every non-system message evicted; the session is left
    /// unchanged in that case.
    pub fn append_message(&mut self, message: Message) -> Result<()> {
        if self.is_ended() {
            return Err(Error::validation("session has ended; no more messages allowed"));
        }
        check_priced(&self.model, &message)?;

        let capacity = u64::from(self.model.max_tokens());
        let mut total = u64::from(self.token_usage())
            + u64::from(message.token_cost())
            + u64::from(self.config.max_tokens);

        // Plan the eviction before touching anything
        let mut evict = Vec::new();
        for (idx, existing) in self.messages.iter().enumerate() {
            if total <= capacity {
                break;
            }
            if existing.role() == Role::System {
                continue;
            }
            total -= u64::from(existing.token_cost());
            evict.push(idx);
        }

        if total > capacity {
            return Err(Error::BudgetExceeded {
                required: u32::try_from(total).unwrap_or(u32::MAX),
                capacity: self.model.max_tokens(),
            });
        }

        if !evict.is_empty() {
            tracing::debug!(
                session_id = %self.id,
                evicted = evict.len(),
                "evicting oldest messages to fit token budget"
            );
            let mut pending = evict.into_iter().peekable();
            let mut kept = Vec::with_capacity(self.messages.len());
            for (idx, existing) in std::mem::take(&mut self.messages).into_iter().enumerate() {
                if pending.peek() == Some(&idx) {
                    pending.next();
                    self.erased_messages.push(existing);
                } else {
                    kept.push(existing);
                }
            }
            self.messages = kept;
        }

        self.messages.push(message);
        Ok(())
    }

    /// Role and content of every current message, in order
    pub fn messages_as_transcript(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(Message::to_chat_message).collect()
    }

    /// Streaming completion request for the current transcript
    pub fn completion_request(&self) -> CompletionRequest {
        CompletionRequest {
            model: self.model.name().to_string(),
            messages: self.messages_as_transcript(),
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            n: self.config.n,
            stop: self.config.stop_sequences(),
            max_tokens: self.config.max_tokens,
            presence_penalty: self.config.presence_penalty,
            frequency_penalty: self.config.frequency_penalty,
            stream: true,
        }
    }
}

/// A message must carry the cost `model` gives its content
fn check_priced(model: &ModelDescriptor, message: &Message) -> Result<()> {
    if message.content().is_empty() {
        return Err(Error::validation(format!(
            "{} message content is empty",
            message.role()
        )));
    }
    if message.model_name() != model.name()
        || message.token_cost() != model.count_tokens(message.content())
    {
        return Err(Error::validation(format!(
            "message {} was priced for {}, not {}",
            message.id(),
            message.model_name(),
            model.name()
        )));
    }
    Ok(())
}

/// Stored form of a session, checked before it becomes a [`Session`]
#[derive(Deserialize)]
struct SessionRecord {
    id: String,
    user_id: String,
    model: ModelDescriptor,
    config: GenerationConfig,
    messages: Vec<Message>,
    #[serde(default)]
    erased_messages: Vec<Message>,
    status: SessionStatus,
    created_at: i64,
}

impl TryFrom<SessionRecord> for Session {
    type Error = Error;

    fn try_from(record: SessionRecord) -> Result<Self> {
        let SessionRecord {
            id,
            user_id,
            model,
            config,
            messages,
            erased_messages,
            status,
            created_at,
        } = record;

        if id.trim().is_empty() {
            return Err(Error::validation("session id is empty"));
        }
        if user_id.trim().is_empty() {
            return Err(Error::validation("user id is empty"));
        }
        let model = ModelDescriptor::new(model.name(), model.max_tokens())?;
        config.validate()?;

        match messages.first() {
            Some(first) if first.role() == Role::System => {}
            _ => {
                return Err(Error::validation(
                    "session must start with a system message",
                ));
            }
        }
        for message in messages.iter().chain(&erased_messages) {
            check_priced(&model, message)?;
        }

        let required = messages
            .iter()
            .map(|m| u64::from(m.token_cost()))
            .sum::<u64>()
            + u64::from(config.max_tokens);
        if required > u64::from(model.max_tokens()) {
            return Err(Error::BudgetExceeded {
                required: u32::try_from(required).unwrap_or(u32::MAX),
                capacity: model.max_tokens(),
            });
        }

        Ok(Self {
            id,
            user_id,
            model,
            config,
            messages,
            erased_messages,
            status,
            created_at,
        })
    }
}
