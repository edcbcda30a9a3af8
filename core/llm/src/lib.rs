pub mod config;
pub mod error;
pub mod provider;
pub mod providers;

pub use config::{ModelConfig, ProviderKind};
pub use error::{LlmError, LlmResult};
pub use provider::{extract_json_block, generate_object, LanguageModel};
pub use providers::{ClaudeProvider, GeminiProvider, OllamaProvider, OpenAIProvider};
