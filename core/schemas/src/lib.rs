use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// ULID and ID Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReflectionId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiagnosisId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuggestionId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ReflectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DiagnosisId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SuggestionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Source Text Schema (goals -> activities -> reflections)
// ============================================================================

/// A goal with its nested activities, as read by the text collector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalText {
    pub content: Option<String>,
    pub activities: Vec<ActivityText>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityText {
    pub content: Option<String>,
    pub reflections: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
}

// ============================================================================
// Personality Schema
// ============================================================================

/// The seven personality dimensions scored from the 60-item questionnaire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PersonalityTrait {
    #[serde(rename = "extraversion")]
    Extraversion,
    #[serde(rename = "agreeableness")]
    Agreeableness,
    #[serde(rename = "conscientiousness")]
    Conscientiousness,
    #[serde(rename = "emotionality")]
    Emotionality,
    #[serde(rename = "openness")]
    Openness,
    #[serde(rename = "honesty_humility")]
    HonestyHumility,
    #[serde(rename = "curiosity")]
    Curiosity,
}

impl PersonalityTrait {
    pub const ALL: [PersonalityTrait; 7] = [
        PersonalityTrait::Extraversion,
        PersonalityTrait::Agreeableness,
        PersonalityTrait::Conscientiousness,
        PersonalityTrait::Emotionality,
        PersonalityTrait::Openness,
        PersonalityTrait::HonestyHumility,
        PersonalityTrait::Curiosity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PersonalityTrait::Extraversion => "extraversion",
            PersonalityTrait::Agreeableness => "agreeableness",
            PersonalityTrait::Conscientiousness => "conscientiousness",
            PersonalityTrait::Emotionality => "emotionality",
            PersonalityTrait::Openness => "openness",
            PersonalityTrait::HonestyHumility => "honesty_humility",
            PersonalityTrait::Curiosity => "curiosity",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for PersonalityTrait {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraitLevel {
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "LOW")]
    Low,
}

impl TraitLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraitLevel::High => "HIGH",
            TraitLevel::Low => "LOW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraitScore {
    pub score: f64,
    pub level: TraitLevel,
}

/// Raw questionnaire responses (item number -> 1..=5) and the derived trait map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityAnalysis {
    pub raw_scores: BTreeMap<u8, u8>,
    pub traits: BTreeMap<PersonalityTrait, TraitScore>,
}

// ============================================================================
// Sentiment Schema
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    pub score: f64,
    pub positive_ratio: f64,
    pub negative_ratio: f64,
    pub neutral_ratio: f64,
    pub positive_keywords: Vec<String>,
    pub negative_keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentTrend {
    #[serde(rename = "improving")]
    Improving,
    #[serde(rename = "stable")]
    Stable,
    #[serde(rename = "declining")]
    Declining,
}

impl SentimentTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentTrend::Improving => "improving",
            SentimentTrend::Stable => "stable",
            SentimentTrend::Declining => "declining",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "improving" => Some(SentimentTrend::Improving),
            "stable" => Some(SentimentTrend::Stable),
            "declining" => Some(SentimentTrend::Declining),
            _ => None,
        }
    }
}

// ============================================================================
// Diagnosis Schema
// ============================================================================

/// Monthly analysis record, unique per (user_id, year, month).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub id: DiagnosisId,
    pub user_id: UserId,
    pub year: i32,
    pub month: u32,
    pub sentiment_score: f64,
    pub sentiment_positive_ratio: f64,
    pub sentiment_negative_ratio: f64,
    pub sentiment_neutral_ratio: f64,
    pub sentiment_positive_keywords: Vec<String>,
    pub sentiment_negative_keywords: Vec<String>,
    pub sentiment_trend: SentimentTrend,
    pub personality_raw_scores: BTreeMap<u8, u8>,
    pub personality_traits: BTreeMap<PersonalityTrait, TraitScore>,
    pub summary: String,
    pub source_text_length: usize,
    pub analyzed_at: String, // RFC3339
}

// ============================================================================
// Question Suggestion Schema
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionCategory {
    #[serde(rename = "growth")]
    Growth,
    #[serde(rename = "challenge")]
    Challenge,
    #[serde(rename = "strength")]
    Strength,
    #[serde(rename = "emotion")]
    Emotion,
    #[serde(rename = "next_step")]
    NextStep,
}

impl QuestionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionCategory::Growth => "growth",
            QuestionCategory::Challenge => "challenge",
            QuestionCategory::Strength => "strength",
            QuestionCategory::Emotion => "emotion",
            QuestionCategory::NextStep => "next_step",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "growth" => Some(QuestionCategory::Growth),
            "challenge" => Some(QuestionCategory::Challenge),
            "strength" => Some(QuestionCategory::Strength),
            "emotion" => Some(QuestionCategory::Emotion),
            "next_step" => Some(QuestionCategory::NextStep),
            _ => None,
        }
    }
}

/// A trainer-facing question as produced by the generator, before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedQuestion {
    pub question: String,
    pub category: QuestionCategory,
    pub intent: String,
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSuggestion {
    pub id: SuggestionId,
    pub diagnosis_id: DiagnosisId,
    pub question: String,
    pub category: QuestionCategory,
    pub intent: String,
    pub priority: u8,
    pub created_at: String, // RFC3339
}

// ============================================================================
// Batch Result Types
// ============================================================================

/// Terminal state of one subject within a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectState {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "skipped")]
    Skipped,
    #[serde(rename = "processed")]
    Processed,
    #[serde(rename = "failed")]
    Failed,
}

/// Aggregate counts reported to the trigger caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTally {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub partial: bool,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraineeDiagnosis {
    pub trainee: UserSummary,
    pub diagnosis: Option<Diagnosis>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Helper Functions
// ============================================================================

pub fn generate_user_id() -> UserId {
    UserId(format!("usr_{}", ulid::Ulid::new()))
}

pub fn generate_goal_id() -> GoalId {
    GoalId(format!("goal_{}", ulid::Ulid::new()))
}

pub fn generate_activity_id() -> ActivityId {
    ActivityId(format!("act_{}", ulid::Ulid::new()))
}

pub fn generate_reflection_id() -> ReflectionId {
    ReflectionId(format!("refl_{}", ulid::Ulid::new()))
}

pub fn generate_diagnosis_id() -> DiagnosisId {
    DiagnosisId(format!("diag_{}", ulid::Ulid::new()))
}

pub fn generate_suggestion_id() -> SuggestionId {
    SuggestionId(format!("sug_{}", ulid::Ulid::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_generation() {
        let diagnosis_id = generate_diagnosis_id();
        assert!(diagnosis_id.0.starts_with("diag_"));
        assert_eq!(diagnosis_id.0.len(), 31); // "diag_" + 26 chars

        assert!(generate_user_id().0.starts_with("usr_"));
        assert!(generate_goal_id().0.starts_with("goal_"));
        assert!(generate_suggestion_id().0.starts_with("sug_"));
    }

    #[test]
    fn test_trait_names_round_trip() {
        for t in PersonalityTrait::ALL {
            assert_eq!(PersonalityTrait::parse(t.as_str()), Some(t));
        }
        assert_eq!(PersonalityTrait::parse("neuroticism"), None);
    }

    #[test]
    fn test_trait_map_serializes_with_snake_case_keys() {
        let mut traits = BTreeMap::new();
        traits.insert(
            PersonalityTrait::HonestyHumility,
            TraitScore {
                score: 4.3,
                level: TraitLevel::High,
            },
        );

        let json = serde_json::to_value(&traits).unwrap();
        assert_eq!(json["honesty_humility"]["level"], "HIGH");
        assert_eq!(json["honesty_humility"]["score"], 4.3);
    }

    #[test]
    fn test_suggested_question_rejects_unknown_category() {
        let ok: Result<SuggestedQuestion, _> = serde_json::from_str(
            r#"{"question":"q","category":"next_step","intent":"i","priority":2}"#,
        );
        assert_eq!(ok.unwrap().category, QuestionCategory::NextStep);

        let bad: Result<SuggestedQuestion, _> = serde_json::from_str(
            r#"{"question":"q","category":"hobby","intent":"i","priority":2}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_tally_serialization() {
        let tally = BatchTally {
            processed: 3,
            skipped: 1,
            failed: 0,
            partial: true,
        };
        let json = serde_json::to_value(tally).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"processed": 3, "skipped": 1, "failed": 0, "partial": true})
        );
    }
}
