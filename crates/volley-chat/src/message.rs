//! Conversation messages

use serde::{Deserialize, Serialize};
use volley_ai::{ChatMessage, Role};

use crate::error::{Error, Result};
use crate::model::ModelDescriptor;

/// An immutable message with its token cost fixed at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: String,
    role: Role,
    content: String,
    token_cost: u32,
    /// Name of the model the cost was computed for
    model: String,
    created_at: i64,
}

impl Message {
    /// Create a message, pricing its content under `model`
    pub fn new(role: Role, content: impl Into<String>, model: &ModelDescriptor) -> Result<Self> {
        let content = content.into();
        if content.is_empty() {
            return Err(Error::validation(format!("{} message content is empty", role)));
        }
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            token_cost: model.count_tokens(&content),
            model: model.name().to_string(),
            content,
            created_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Tokens this message consumes from the context budget
    pub fn token_cost(&self) -> u32 {
        self.token_cost
    }

    /// Model the token cost was computed for
    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Creation time in UTC milliseconds
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Transcript entry for a completion request
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage::new(self.role, self.content.clone())
    }
}
