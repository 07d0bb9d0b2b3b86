use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    // Chat model (OpenAI-compatible: OpenAI, Ollama, vLLM, LM Studio, etc.)
    #[serde(default = "default_llm_url")]
    pub llm_api_url: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default)]
    pub llm_api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    // Embeddings used by the employee vector index
    #[serde(default = "default_embedding_url")]
    pub embedding_api_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub embedding_api_key: Option<String>,

    /// Timeout applied to every outbound model/embedding request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    // Agent loop
    #[serde(default = "default_system_message")]
    pub system_message: String,
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,
    #[serde(default = "default_lookup_results")]
    pub default_lookup_results: usize,

    // Storage (checkpoints + employee index share one SQLite file)
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Checkpoint snapshots kept per thread; 0 keeps every snapshot.
    #[serde(default = "default_checkpoint_retention")]
    pub checkpoint_retention: usize,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_llm_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_embedding_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_system_message() -> String {
    "You are helpful HR Chatbot Agent.".to_string()
}

fn default_recursion_limit() -> usize {
    15
}

fn default_lookup_results() -> usize {
    10
}

fn default_database_path() -> String {
    "hr_agent.db".to_string()
}

fn default_checkpoint_retention() -> usize {
    50
}

fn default_bind_address() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            llm_api_url: default_llm_url(),
            llm_model: default_llm_model(),
            llm_api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            embedding_api_url: default_embedding_url(),
            embedding_model: default_embedding_model(),
            embedding_api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            system_message: default_system_message(),
            recursion_limit: default_recursion_limit(),
            default_lookup_results: default_lookup_results(),
            database_path: default_database_path(),
            checkpoint_retention: default_checkpoint_retention(),
            bind_address: default_bind_address(),
        }
    }
}

impl AgentConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// Get the path to the config file (relative to executable)
    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join("hr_agent_config.toml")
    }

    /// Load config from hr_agent_config.toml (next to executable), then apply env overrides.
    pub fn load() -> Self {
        let path = Self::config_path();

        let base = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to parse {:?}: {:#}", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::warn!("No config file found, using defaults + env vars");
                Self::default()
            }
        };

        base.with_env_overrides()
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str::<AgentConfig>(contents).context("Failed to parse config TOML")
    }

    /// Save config to file (next to executable)
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, toml_string)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = env::var("LLM_API_URL") {
            self.llm_api_url = url;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            self.llm_model = model;
        }

        if let Ok(key) = env::var("LLM_API_KEY") {
            self.llm_api_key = Some(key).filter(|k| !k.trim().is_empty());
        }

        if let Ok(url) = env::var("EMBEDDING_API_URL") {
            self.embedding_api_url = url;
        }

        if let Ok(model) = env::var("EMBEDDING_MODEL") {
            self.embedding_model = model;
        }

        if let Ok(key) = env::var("EMBEDDING_API_KEY") {
            self.embedding_api_key = Some(key).filter(|k| !k.trim().is_empty());
        }

        if let Ok(path) = env::var("HR_AGENT_DATABASE_PATH") {
            if !path.trim().is_empty() {
                self.database_path = path;
            }
        }

        if let Ok(limit) = env::var("HR_AGENT_RECURSION_LIMIT") {
            if let Ok(limit) = limit.parse() {
                self.recursion_limit = limit;
            }
        }

        if let Ok(retention) = env::var("HR_AGENT_CHECKPOINT_RETENTION") {
            if let Ok(retention) = retention.parse() {
                self.checkpoint_retention = retention;
            }
        }

        if let Ok(bind) = env::var("HR_AGENT_BIND") {
            if !bind.trim().is_empty() {
                self.bind_address = bind;
            }
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_agent_loop_expectations() {
        let config = AgentConfig::default();
        assert_eq!(config.recursion_limit, 15);
        assert_eq!(config.checkpoint_retention, 50);
        assert_eq!(config.default_lookup_results, 10);
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.system_message, "You are helpful HR Chatbot Agent.");
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = AgentConfig::from_toml_str(
            r#"
                llm_model = "claude-3-5-sonnet"
                recursion_limit = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.llm_model, "claude-3-5-sonnet");
        assert_eq!(config.recursion_limit, 4);
        assert_eq!(config.database_path, "hr_agent.db");
        assert!(config.llm_api_key.is_none());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(AgentConfig::from_toml_str("recursion_limit = \"many\"").is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let config = AgentConfig::default();
        let encoded = toml::to_string_pretty(&config).unwrap();
        let decoded = AgentConfig::from_toml_str(&encoded).unwrap();
        assert_eq!(decoded.bind_address, config.bind_address);
        assert_eq!(decoded.embedding_model, config.embedding_model);
    }
}
