//! Model-agnostic generation interface
//! Analysis code only ever sees `dyn LanguageModel`; the concrete providers
//! live in `providers.rs`.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::LlmResult;

/// LLM interface consumed by the analysis pipeline
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Free-form completion
    async fn generate_text(&self, prompt: &str) -> LlmResult<String>;

    /// Completion constrained to a single JSON document.
    /// Providers that support a native JSON mode override this.
    async fn generate_json(&self, prompt: &str) -> LlmResult<String> {
        self.generate_text(prompt).await
    }
}

/// Generate a JSON document and decode it into `T`.
/// Shape mismatches (missing fields, unknown enum values, wrong types)
/// surface as `LlmError::Decode`.
pub async fn generate_object<T: DeserializeOwned>(
    model: &dyn LanguageModel,
    prompt: &str,
) -> LlmResult<T> {
    let response = model.generate_json(prompt).await?;
    let json_str = extract_json_block(&response);
    debug!("{} returned {} bytes of JSON", model.name(), json_str.len());
    Ok(serde_json::from_str(json_str)?)
}

/// Strip markdown fences or leading prose around a JSON object or array.
pub fn extract_json_block(response: &str) -> &str {
    let trimmed = response.trim();
    let open = trimmed.find(|c| c == '{' || c == '[');
    let close = trimmed.rfind(|c| c == '}' || c == ']');

    match (open, close) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}
