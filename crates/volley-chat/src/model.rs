//! Model descriptors and token accounting

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Average characters per token used by the estimate
const CHARS_PER_TOKEN: usize = 4;

/// Context capacities of commonly used chat models
const KNOWN_MODELS: &[(&str, u32)] = &[
    ("gpt-3.5-turbo", 16_385),
    ("gpt-4", 8_192),
    ("gpt-4-turbo", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-4o-mini", 128_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-4.1-mini", 1_047_576),
];

/// A model's name and its maximum context size in tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    name: String,
    max_tokens: u32,
}

impl ModelDescriptor {
    /// Create a descriptor. The name must be non-empty and the capacity positive.
    pub fn new(name: impl Into<String>, max_tokens: u32) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::validation("model name is empty"));
        }
        if max_tokens == 0 {
            return Err(Error::validation("model max tokens must be positive"));
        }
        Ok(Self { name, max_tokens })
    }

    /// Look up a model whose context capacity is known
    pub fn known(name: &str) -> Option<Self> {
        KNOWN_MODELS
            .iter()
            .find(|(id, _)| *id == name)
            .map(|(id, max_tokens)| Self {
                name: id.to_string(),
                max_tokens: *max_tokens,
            })
    }

    /// Model identifier sent to the endpoint
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Context capacity in tokens
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Estimate the token cost of `text` under this model (chars/4, rounded up)
    pub fn count_tokens(&self, text: &str) -> u32 {
        let chars = text.chars().count();
        u32::try_from(chars.div_ceil(CHARS_PER_TOKEN)).unwrap_or(u32::MAX)
    }
}
