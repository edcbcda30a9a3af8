use anyhow::{Context, Result};
use goal_insight_llm::{generate_object, LanguageModel};
use goal_insight_schemas::{PersonalityAnalysis, SentimentAnalysis, SuggestedQuestion};
use serde::Deserialize;
use tracing::debug;

use crate::error::AnalysisError;
use crate::prompts::question_prompt;

pub const SUGGESTION_COUNT: usize = 5;

#[derive(Debug, Deserialize)]
struct QuestionSet {
    questions: Vec<SuggestedQuestion>,
}

/// Exactly five questions, each with priority 1..=5. Categories are
/// enforced by deserialization.
pub fn validate_questions(questions: &[SuggestedQuestion]) -> Result<(), AnalysisError> {
    if questions.len() != SUGGESTION_COUNT {
        return Err(AnalysisError::Validation(format!(
            "expected {} questions, got {}",
            SUGGESTION_COUNT,
            questions.len()
        )));
    }

    if let Some(q) = questions.iter().find(|q| !(1..=5).contains(&q.priority)) {
        return Err(AnalysisError::Validation(format!(
            "question priority {} outside 1..=5",
            q.priority
        )));
    }

    Ok(())
}

pub async fn generate_questions(
    model: &dyn LanguageModel,
    sentiment: &SentimentAnalysis,
    personality: &PersonalityAnalysis,
    summary: &str,
) -> Result<Vec<SuggestedQuestion>> {
    let prompt = question_prompt(
        sentiment.score,
        &sentiment.positive_keywords,
        &sentiment.negative_keywords,
        &personality.traits,
        summary,
    );

    let set: QuestionSet = generate_object(model, &prompt)
        .await
        .context("Question generation failed")?;
    validate_questions(&set.questions)?;

    debug!("Generated {} question suggestions", set.questions.len());
    Ok(set.questions)
}
