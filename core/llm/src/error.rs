use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("invalid model configuration: {0}")]
    Config(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("empty response from {0}")]
    EmptyResponse(&'static str),

    #[error("failed to decode structured output: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type LlmResult<T> = Result<T, LlmError>;
