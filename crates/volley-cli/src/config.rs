//! Configuration file support

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use volley_chat::{ChatCompletionConfig, GenerationConfig, ModelDescriptor};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Configuration for volley
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model to use
    pub model: Option<String>,
    /// Context capacity of the model; required for models volley doesn't know
    pub model_max_tokens: Option<u32>,
    /// System message that opens every new chat
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub n: Option<u32>,
    pub stop: Option<Vec<String>>,
    /// Tokens reserved for each answer
    pub max_tokens: Option<u32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    /// OpenAI-compatible endpoint
    pub base_url: Option<String>,
    /// API key (alternative to OPENAI_API_KEY)
    pub api_key: Option<String>,
    /// User id recorded on new chats
    pub user_id: Option<String>,
    /// Where chats are stored
    pub sessions_dir: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("volley")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("VOLLEY_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default path, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`. A missing or unreadable file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let defaults = GenerationConfig::default();
        let default_config = Config {
            model: Some(DEFAULT_MODEL.to_string()),
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: Some(defaults.temperature),
            max_tokens: Some(defaults.max_tokens),
            ..Default::default()
        };

        default_config.save_to(&path)?;
        Ok(path)
    }

    /// API key from the config, then OPENAI_API_KEY
    pub fn api_key(&self) -> Option<String> {
        volley_ai::providers::get_api_key(self.api_key.as_deref(), "OPENAI_API_KEY").ok()
    }

    /// User id for new chats: the config value, then $USER, then "local"
    pub fn user_id(&self) -> String {
        self.user_id
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| "local".to_string())
    }

    /// Directory holding one JSON document per chat
    pub fn sessions_dir(&self) -> PathBuf {
        match self.sessions_dir {
            Some(ref dir) => PathBuf::from(dir),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("volley")
                .join("sessions"),
        }
    }

    /// Build the settings used to create new chats
    pub fn completion_config(&self) -> anyhow::Result<ChatCompletionConfig> {
        let name = self.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let model = match self.model_max_tokens {
            Some(max_tokens) => ModelDescriptor::new(name, max_tokens)?,
            None => match ModelDescriptor::known(name) {
                Some(model) => model,
                None => bail!(
                    "context size of model '{}' is unknown; set model_max_tokens in {}",
                    name,
                    Self::config_path().display()
                ),
            },
        };

        let defaults = GenerationConfig::default();
        let generation = GenerationConfig {
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            n: self.n.unwrap_or(defaults.n),
            stop: self.stop.clone().unwrap_or_default().into_iter().collect(),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            presence_penalty: self.presence_penalty.unwrap_or(defaults.presence_penalty),
            frequency_penalty: self.frequency_penalty.unwrap_or(defaults.frequency_penalty),
        };
        generation
            .validate()
            .context("invalid generation settings")?;

        Ok(ChatCompletionConfig {
            model,
            generation,
            initial_system_message: self
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# volley configuration file
# Place at ~/.config/volley/config.toml (Linux) or set VOLLEY_CONFIG_PATH

# Model to use
model = "gpt-4o-mini"

# Context size in tokens; only needed for models volley doesn't know
# model_max_tokens = 128000

# System message that opens every new chat
system_prompt = "You are a helpful assistant."

# Sampling
temperature = 1.0
# top_p = 1.0
# n = 1
# stop = ["END"]
# presence_penalty = 0.0
# frequency_penalty = 0.0

# Tokens reserved for each answer
max_tokens = 256

# OpenAI-compatible endpoint and key (OPENAI_API_KEY is used when unset)
# base_url = "https://api.openai.com/v1"
# api_key = "sk-..."

# user_id = "alice"
# sessions_dir = "~/.local/share/volley/sessions"
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("absent.toml"));
        assert!(cfg.model.is_none());
    }

    #[test]
    fn test_example_config_parses() {
        let cfg: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(cfg.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(cfg.max_tokens, Some(256));
        cfg.completion_config().unwrap();
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            model: Some("local-llama".into()),
            model_max_tokens: Some(4096),
            stop: Some(vec!["###".into()]),
            ..Default::default()
        };
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        let completion = loaded.completion_config().unwrap();
        assert_eq!(completion.model.name(), "local-llama");
        assert_eq!(completion.model.max_tokens(), 4096);
        assert_eq!(completion.generation.stop_sequences(), vec!["###"]);
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "model = [").unwrap();
        assert!(Config::load_from(&path).model.is_none());
    }

    #[test]
    fn test_unknown_model_needs_capacity() {
        let cfg = Config {
            model: Some("mystery".into()),
            ..Default::default()
        };
        let err = cfg.completion_config().unwrap_err();
        assert!(err.to_string().contains("model_max_tokens"));
    }

    #[test]
    fn test_invalid_generation_settings_rejected() {
        let cfg = Config {
            temperature: Some(3.0),
            ..Default::default()
        };
        assert!(cfg.completion_config().is_err());
    }

    #[test]
    fn test_config_api_key_wins() {
        let cfg = Config {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        assert_eq!(cfg.api_key().as_deref(), Some("sk-test"));
    }
}
