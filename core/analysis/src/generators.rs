use anyhow::{Context, Result};
use goal_insight_llm::{generate_object, LanguageModel};
use goal_insight_schemas::{PersonalityAnalysis, SentimentAnalysis};
use tracing::debug;

use crate::error::AnalysisError;
use crate::prompts::{personality_prompt, sentiment_prompt, summary_prompt};
use crate::scorer::analyze_personality_text;

pub const MAX_KEYWORDS: usize = 5;

/// Output of the three diagnosis generators for one corpus
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyAnalysis {
    pub sentiment: SentimentAnalysis,
    pub personality: PersonalityAnalysis,
    pub summary: String,
}

/// Reject out-of-range sentiment output instead of clamping it
pub fn validate_sentiment(sentiment: &SentimentAnalysis) -> Result<(), AnalysisError> {
    let in_range = |value: f64, lo: f64, hi: f64| value.is_finite() && (lo..=hi).contains(&value);

    if !in_range(sentiment.score, -1.0, 1.0) {
        return Err(AnalysisError::Validation(format!(
            "sentiment score {} outside [-1, 1]",
            sentiment.score
        )));
    }

    for (name, ratio) in [
        ("positive_ratio", sentiment.positive_ratio),
        ("negative_ratio", sentiment.negative_ratio),
        ("neutral_ratio", sentiment.neutral_ratio),
    ] {
        if !in_range(ratio, 0.0, 1.0) {
            return Err(AnalysisError::Validation(format!(
                "{} {} outside [0, 1]",
                name, ratio
            )));
        }
    }

    if sentiment.positive_keywords.len() > MAX_KEYWORDS {
        return Err(AnalysisError::Validation(format!(
            "{} positive keywords (max {})",
            sentiment.positive_keywords.len(),
            MAX_KEYWORDS
        )));
    }
    if sentiment.negative_keywords.len() > MAX_KEYWORDS {
        return Err(AnalysisError::Validation(format!(
            "{} negative keywords (max {})",
            sentiment.negative_keywords.len(),
            MAX_KEYWORDS
        )));
    }

    Ok(())
}

pub async fn analyze_sentiment(model: &dyn LanguageModel, text: &str) -> Result<SentimentAnalysis> {
    let sentiment: SentimentAnalysis = generate_object(model, &sentiment_prompt(text))
        .await
        .context("Sentiment generation failed")?;
    validate_sentiment(&sentiment)?;
    Ok(sentiment)
}

pub async fn analyze_personality(
    model: &dyn LanguageModel,
    text: &str,
) -> Result<PersonalityAnalysis> {
    let response = model
        .generate_text(&personality_prompt(text))
        .await
        .context("Personality generation failed")?;
    Ok(analyze_personality_text(&response)?)
}

pub async fn generate_summary(model: &dyn LanguageModel, text: &str) -> Result<String> {
    let summary = model
        .generate_text(&summary_prompt(text))
        .await
        .context("Summary generation failed")?;
    Ok(summary.trim().to_string())
}

/// Run the three generators concurrently. The first failure aborts the join
/// and nothing is returned for the other two.
pub async fn run_diagnosis(model: &dyn LanguageModel, text: &str) -> Result<MonthlyAnalysis> {
    let (sentiment, personality, summary) = tokio::try_join!(
        analyze_sentiment(model, text),
        analyze_personality(model, text),
        generate_summary(model, text),
    )?;

    debug!(
        "Diagnosis generated: sentiment {:.2}, {} traits, {} char summary",
        sentiment.score,
        personality.traits.len(),
        summary.len()
    );

    Ok(MonthlyAnalysis {
        sentiment,
        personality,
        summary,
    })
}
