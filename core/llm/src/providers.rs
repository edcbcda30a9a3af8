/// LLM Providers for monthly analysis
/// Supports Gemini, OpenAI, Claude and Ollama for remote/local inference

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::error::{LlmError, LlmResult};
use crate::provider::LanguageModel;

const SYSTEM_PROMPT: &str =
    "You are a careful coaching analyst. Follow the requested output format exactly.";

fn http_client(timeout_secs: u64) -> LlmResult<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

async fn ensure_success(
    provider: &'static str,
    response: reqwest::Response,
) -> LlmResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::Api {
        provider,
        status,
        body,
    })
}

/// OpenAI chat-completions provider
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIProvider {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout_secs: u64,
    ) -> LlmResult<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
        })
    }

    async fn call_openai(&self, prompt: &str, json_mode: bool) -> LlmResult<String> {
        let mut request_body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.3
        });

        if json_mode {
            request_body["response_format"] = json!({ "type": "json_object" });
        }

        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!("Calling OpenAI at {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let response_json: OpenAIResponse = ensure_success("OpenAI", response).await?.json().await?;

        response_json
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse("OpenAI"))
    }
}

#[async_trait]
impl LanguageModel for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate_text(&self, prompt: &str) -> LlmResult<String> {
        self.call_openai(prompt, false).await
    }

    async fn generate_json(&self, prompt: &str) -> LlmResult<String> {
        self.call_openai(prompt, true).await
    }
}

/// Claude Provider for Anthropic's Messages API
pub struct ClaudeProvider {
    client: Client,
    api_key: String,
    model: String,
}

impl ClaudeProvider {
    pub fn new(api_key: String, model: Option<String>, timeout_secs: u64) -> LlmResult<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key,
            model: model.unwrap_or_else(|| "claude-3-5-haiku-latest".to_string()),
        })
    }

    async fn call_claude(&self, prompt: &str) -> LlmResult<String> {
        let request_body = json!({
            "model": self.model,
            "max_tokens": 4096,
            "system": SYSTEM_PROMPT,
            "messages": [{
                "role": "user",
                "content": prompt
            }]
        });

        debug!("Calling Claude model {}", self.model);

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request_body)
            .send()
            .await?;

        let response_json: ClaudeResponse = ensure_success("Claude", response).await?.json().await?;

        response_json
            .content
            .into_iter()
            .find_map(|c| c.text)
            .ok_or(LlmError::EmptyResponse("Claude"))
    }
}

#[async_trait]
impl LanguageModel for ClaudeProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate_text(&self, prompt: &str) -> LlmResult<String> {
        self.call_claude(prompt).await
    }
}

/// Gemini provider for Google's generateContent API
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout_secs: u64,
    ) -> LlmResult<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            model: model.unwrap_or_else(|| "gemini-2.5-flash-lite".to_string()),
        })
    }

    fn request_body(prompt: &str, json_mode: bool) -> serde_json::Value {
        let mut generation_config = json!({ "temperature": 0.3 });
        if json_mode {
            generation_config["responseMimeType"] = json!("application/json");
        }

        json!({
            "systemInstruction": { "parts": [{ "text": SYSTEM_PROMPT }] },
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": generation_config
        })
    }

    async fn call_gemini(&self, prompt: &str, json_mode: bool) -> LlmResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        debug!("Calling Gemini at {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(prompt, json_mode))
            .send()
            .await?;

        let response_json: GeminiResponse = ensure_success("Gemini", response).await?.json().await?;

        let text: String = response_json
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse("Gemini"));
        }
        Ok(text)
    }
}

#[async_trait]
impl LanguageModel for GeminiProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn generate_text(&self, prompt: &str) -> LlmResult<String> {
        self.call_gemini(prompt, false).await
    }

    async fn generate_json(&self, prompt: &str) -> LlmResult<String> {
        self.call_gemini(prompt, true).await
    }
}

/// Ollama Provider for local LLM inference
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(model: Option<String>, base_url: Option<String>, timeout_secs: u64) -> LlmResult<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: model.unwrap_or_else(|| "llama3.2:3b".to_string()),
        })
    }

    async fn call_ollama(&self, prompt: &str, json_mode: bool) -> LlmResult<String> {
        let mut request_body = json!({
            "model": self.model,
            "prompt": prompt,
            "system": SYSTEM_PROMPT,
            "stream": false,
            "options": {
                "temperature": 0.3,
            }
        });

        if json_mode {
            request_body["format"] = json!("json");
        }

        let url = format!("{}/api/generate", self.base_url);
        debug!("Calling Ollama at {}", url);

        let response = self.client.post(&url).json(&request_body).send().await?;
        let response_json: OllamaResponse = ensure_success("Ollama", response).await?.json().await?;

        if response_json.response.trim().is_empty() {
            return Err(LlmError::EmptyResponse("Ollama"));
        }
        Ok(response_json.response)
    }
}

#[async_trait]
impl LanguageModel for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate_text(&self, prompt: &str) -> LlmResult<String> {
        self.call_ollama(prompt, false).await
    }

    async fn generate_json(&self, prompt: &str) -> LlmResult<String> {
        self.call_ollama(prompt, true).await
    }
}

// Response structures
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    text: Option<String>,
}
