//! Generation parameters fixed per session

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upper bound on stop sequences accepted by OpenAI-compatible endpoints
pub const MAX_STOP_SEQUENCES: usize = 4;

/// Sampling parameters sent with every completion of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
    /// Nucleus sampling mass (0.0 - 1.0)
    pub top_p: f32,
    /// Number of choices to request
    pub n: u32,
    /// Stop sequences
    #[serde(default)]
    pub stop: BTreeSet<String>,
    /// Tokens reserved for each completion
    pub max_tokens: u32,
    /// Presence penalty (-2.0 - 2.0)
    pub presence_penalty: f32,
    /// Frequency penalty (-2.0 - 2.0)
    pub frequency_penalty: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 1.0,
            n: 1,
            stop: BTreeSet::new(),
            max_tokens: 256,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
        }
    }
}

impl GenerationConfig {
    /// Check every parameter against the ranges endpoints accept
    pub fn validate(&self) -> Result<()> {
        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("top_p", self.top_p, 0.0, 1.0)?;
        check_range("presence_penalty", self.presence_penalty, -2.0, 2.0)?;
        check_range("frequency_penalty", self.frequency_penalty, -2.0, 2.0)?;

        if self.n == 0 {
            return Err(Error::validation("n must be at least 1"));
        }
        if self.max_tokens == 0 {
            return Err(Error::validation("max_tokens must be at least 1"));
        }
        if self.stop.len() > MAX_STOP_SEQUENCES {
            return Err(Error::validation(format!(
                "at most {} stop sequences are allowed, got {}",
                MAX_STOP_SEQUENCES,
                self.stop.len()
            )));
        }
        if self.stop.iter().any(|s| s.is_empty()) {
            return Err(Error::validation("stop sequences must not be empty"));
        }
        Ok(())
    }

    /// Stop sequences in request order
    pub fn stop_sequences(&self) -> Vec<String> {
        self.stop.iter().cloned().collect()
    }
}

fn check_range(name: &str, value: f32, min: f32, max: f32) -> Result<()> {
    if value.is_nan() || value < min || value > max {
        return Err(Error::validation(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        GenerationConfig::default().validate().unwrap();
    }

    #[test]
    fn test_temperature_out_of_range() {
        let config = GenerationConfig {
            temperature: 2.5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_nan_is_rejected() {
        let config = GenerationConfig {
            top_p: f32::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_n_and_max_tokens() {
        let config = GenerationConfig {
            n: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GenerationConfig {
            max_tokens: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stop_is_a_set() {
        let config = GenerationConfig {
            stop: ["END", "STOP", "END"].into_iter().map(String::from).collect(),
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.stop_sequences(), vec!["END", "STOP"]);
    }

    #[test]
    fn test_too_many_stop_sequences() {
        let config = GenerationConfig {
            stop: ["a", "b", "c", "d", "e"].into_iter().map(String::from).collect(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
