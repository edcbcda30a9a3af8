use thiserror::Error;

/// Structured failures of a subject's analysis or of the run itself.
/// Transport errors from storage or the model travel as `anyhow::Error`.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("incomplete score extraction: {found} items (expected {expected})")]
    IncompleteExtraction { found: usize, expected: usize },

    #[error("questionnaire item {0} has no response")]
    MissingItem(u8),

    #[error("unknown trait: \"{0}\"")]
    UnknownTrait(String),

    #[error("generator output failed validation: {0}")]
    Validation(String),

    #[error("a monthly analysis run is already in progress")]
    AlreadyRunning,
}
