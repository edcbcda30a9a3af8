use std::sync::Arc;

use crate::error::{LlmError, LlmResult};
use crate::provider::LanguageModel;
use crate::providers::{ClaudeProvider, GeminiProvider, OllamaProvider, OpenAIProvider};

pub const DEFAULT_MODEL: &str = "google:gemini-2.5-flash-lite";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Google,
    OpenAI,
    Anthropic,
    Ollama,
}

/// Configuration for the analysis model, selected by `AI_MODEL=provider:model-id`
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl ModelConfig {
    /// Create config from environment variables
    pub fn from_env() -> LlmResult<Self> {
        let value = std::env::var("AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::parse(&value, |key| std::env::var(key).ok())
    }

    /// Parse a `provider:model-id` string, resolving keys and urls through `lookup`.
    /// Only the first colon separates provider from model, so `ollama:llama3.2:3b` works.
    pub fn parse(value: &str, lookup: impl Fn(&str) -> Option<String>) -> LlmResult<Self> {
        let (provider, model) = value.split_once(':').ok_or_else(|| {
            LlmError::Config(format!(
                "malformed AI_MODEL \"{}\" (expected \"provider:model-id\")",
                value
            ))
        })?;

        if model.is_empty() {
            return Err(LlmError::Config(format!("missing model id in \"{}\"", value)));
        }

        let (provider, api_key, base_url) = match provider {
            "google" => (
                ProviderKind::Google,
                Some(lookup("GOOGLE_GENERATIVE_AI_API_KEY").ok_or_else(|| {
                    LlmError::Config(
                        "GOOGLE_GENERATIVE_AI_API_KEY required for google provider".to_string(),
                    )
                })?),
                lookup("GOOGLE_GENERATIVE_AI_BASE_URL"),
            ),
            "openai" => (
                ProviderKind::OpenAI,
                Some(lookup("OPENAI_API_KEY").ok_or_else(|| {
                    LlmError::Config("OPENAI_API_KEY required for openai provider".to_string())
                })?),
                lookup("OPENAI_BASE_URL"),
            ),
            "anthropic" => (
                ProviderKind::Anthropic,
                Some(lookup("ANTHROPIC_API_KEY").ok_or_else(|| {
                    LlmError::Config("ANTHROPIC_API_KEY required for anthropic provider".to_string())
                })?),
                None,
            ),
            "ollama" => (ProviderKind::Ollama, None, lookup("OLLAMA_URL")),
            other => {
                return Err(LlmError::Config(format!("unsupported provider \"{}\"", other)));
            }
        };

        let timeout_secs = lookup("AI_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Ok(Self {
            provider,
            model: model.to_string(),
            api_key,
            base_url,
            timeout_secs,
        })
    }

    /// Instantiate the configured provider
    pub fn build(&self) -> LlmResult<Arc<dyn LanguageModel>> {
        let model = Some(self.model.clone());
        let provider: Arc<dyn LanguageModel> = match self.provider {
            ProviderKind::Google => Arc::new(GeminiProvider::new(
                self.api_key.clone().unwrap_or_default(),
                model,
                self.base_url.clone(),
                self.timeout_secs,
            )?),
            ProviderKind::OpenAI => Arc::new(OpenAIProvider::new(
                self.api_key.clone().unwrap_or_default(),
                model,
                self.base_url.clone(),
                self.timeout_secs,
            )?),
            ProviderKind::Anthropic => Arc::new(ClaudeProvider::new(
                self.api_key.clone().unwrap_or_default(),
                model,
                self.timeout_secs,
            )?),
            ProviderKind::Ollama => Arc::new(OllamaProvider::new(
                model,
                self.base_url.clone(),
                self.timeout_secs,
            )?),
        };
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_model_is_google() {
        assert!(matches!(
            ModelConfig::parse(DEFAULT_MODEL, env(&[])),
            Err(LlmError::Config(_))
        ));

        let config =
            ModelConfig::parse(DEFAULT_MODEL, env(&[("GOOGLE_GENERATIVE_AI_API_KEY", "g-test")]))
                .unwrap();
        assert_eq!(config.provider, ProviderKind::Google);
        assert_eq!(config.model, "gemini-2.5-flash-lite");
        assert_eq!(config.api_key.as_deref(), Some("g-test"));
        assert_eq!(config.timeout_secs, 60);

        let model = config.build().unwrap();
        assert_eq!(model.name(), "google");
    }

    #[test]
    fn test_ollama_model_keeps_inner_colon() {
        let config = ModelConfig::parse("ollama:llama3.2:3b", env(&[])).unwrap();
        assert_eq!(config.provider, ProviderKind::Ollama);
        assert_eq!(config.model, "llama3.2:3b");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_openai_requires_key() {
        assert!(ModelConfig::parse("openai:gpt-4o-mini", env(&[])).is_err());

        let config = ModelConfig::parse(
            "openai:gpt-4o-mini",
            env(&[("OPENAI_API_KEY", "sk-test"), ("AI_TIMEOUT_SECS", "15")]),
        )
        .unwrap();
        assert_eq!(config.provider, ProviderKind::OpenAI);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.timeout_secs, 15);
    }

    #[test]
    fn test_malformed_and_unknown_provider() {
        assert!(matches!(
            ModelConfig::parse("gemini-2.5-flash", env(&[])),
            Err(LlmError::Config(_))
        ));
        assert!(matches!(
            ModelConfig::parse("mistral:large", env(&[])),
            Err(LlmError::Config(_))
        ));
        assert!(ModelConfig::parse("ollama:", env(&[])).is_err());
    }

    #[test]
    fn test_build_ollama() {
        let config = ModelConfig::parse("ollama:qwen2.5", env(&[])).unwrap();
        let model = config.build().unwrap();
        assert_eq!(model.name(), "ollama");
    }
}
