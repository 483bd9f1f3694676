//! Core types for chat completion requests

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Message roles understood by chat completion endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Get the wire name of this role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("invalid role: {}", other)),
        }
    }
}

/// One entry of the transcript sent to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Create a transcript entry
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A chat completion request
///
/// Carries everything the endpoint needs; the client adds credentials and
/// the wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier (e.g., "gpt-4o-mini")
    pub model: String,
    /// Ordered transcript, system message first
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    /// Number of choices to generate
    pub n: u32,
    /// Stop sequences
    pub stop: Vec<String>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    /// Whether to stream the response
    pub stream: bool,
}

/// Reason why generation stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of response or a stop sequence
    Stop,
    /// Maximum tokens reached
    Length,
    /// Output withheld by a content filter
    ContentFilter,
    /// Anything else the endpoint reported
    Other(String),
}

impl FinishReason {
    /// Parse the `finish_reason` string reported by the endpoint
    pub fn parse(reason: &str) -> Self {
        match reason {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            other => FinishReason::Other(other.to_string()),
        }
    }
}
