//! Psychometric scoring for the 60-item personality questionnaire.
//!
//! The model answers every item on a 1-5 scale as `N. SCORE: S` lines and may
//! assert a HIGH/LOW level per trait. Scores are aggregated per trait after
//! reverse-item correction; asserted levels win over the score threshold.

use goal_insight_schemas::{PersonalityAnalysis, PersonalityTrait, TraitLevel, TraitScore};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

use crate::error::AnalysisError;

pub const TOTAL_ITEMS: usize = 60;

/// Items whose raw response is inverted (6 - raw) before aggregation.
pub const REVERSE_ITEMS: [u8; 22] = [
    2, 4, 6, 8, 10, // extraversion
    12, 14, 16, 18, // agreeableness
    22, 24, 26, 28, // conscientiousness
    32, 34, 39, // emotionality
    42, 44, 46, // openness
    51, 52, 53, // honesty-humility
];

/// Disjoint item groups per trait; sizes 10,10,10,10,10,3,7.
pub const TRAIT_ITEMS: [(PersonalityTrait, &[u8]); 7] = [
    (PersonalityTrait::Extraversion, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]),
    (PersonalityTrait::Agreeableness, &[11, 12, 13, 14, 15, 16, 17, 18, 19, 20]),
    (PersonalityTrait::Conscientiousness, &[21, 22, 23, 24, 25, 26, 27, 28, 29, 30]),
    (PersonalityTrait::Emotionality, &[31, 32, 33, 34, 35, 36, 37, 38, 39, 40]),
    (PersonalityTrait::Openness, &[41, 42, 43, 44, 45, 46, 47, 48, 49, 50]),
    (PersonalityTrait::HonestyHumility, &[51, 52, 53]),
    (PersonalityTrait::Curiosity, &[54, 55, 56, 57, 58, 59, 60]),
];

/// Fallback threshold when the model did not assert a level.
const HIGH_THRESHOLD: f64 = 3.0;

/// Raw extraction from model text, before aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPersonality {
    pub scores: BTreeMap<u8, u8>,
    pub levels: BTreeMap<PersonalityTrait, TraitLevel>,
}

pub fn is_reverse_item(item: u8) -> bool {
    REVERSE_ITEMS.contains(&item)
}

/// Response after reverse correction.
pub fn corrected_score(item: u8, raw: u8) -> u8 {
    if is_reverse_item(item) {
        6 - raw
    } else {
        raw
    }
}

pub fn trait_items(target: PersonalityTrait) -> &'static [u8] {
    TRAIT_ITEMS
        .iter()
        .find(|(t, _)| *t == target)
        .map(|(_, items)| *items)
        .unwrap_or(&[])
}

/// Mean of the trait's corrected responses, rounded half-up to one decimal.
/// The mean is over the trait's fixed item count and computed in integers so
/// that e.g. 3.45 rounds to 3.5 rather than to a float artefact.
pub fn trait_score(
    target: PersonalityTrait,
    scores: &BTreeMap<u8, u8>,
) -> Result<f64, AnalysisError> {
    let items = trait_items(target);
    if items.is_empty() {
        return Err(AnalysisError::UnknownTrait(target.as_str().to_string()));
    }

    let mut sum: u32 = 0;
    for &item in items {
        let raw = scores.get(&item).ok_or(AnalysisError::MissingItem(item))?;
        sum += u32::from(corrected_score(item, *raw));
    }

    let n = items.len() as u32;
    let tenths = (20 * sum + n) / (2 * n);
    Ok(f64::from(tenths) / 10.0)
}

/// Score and level for every trait.
pub fn score_traits(
    scores: &BTreeMap<u8, u8>,
    asserted: &BTreeMap<PersonalityTrait, TraitLevel>,
) -> Result<BTreeMap<PersonalityTrait, TraitScore>, AnalysisError> {
    if scores.len() != TOTAL_ITEMS {
        return Err(AnalysisError::IncompleteExtraction {
            found: scores.len(),
            expected: TOTAL_ITEMS,
        });
    }

    let mut result = BTreeMap::new();
    for target in PersonalityTrait::ALL {
        let score = trait_score(target, scores)?;
        let level = asserted.get(&target).copied().unwrap_or(if score >= HIGH_THRESHOLD {
            TraitLevel::High
        } else {
            TraitLevel::Low
        });
        result.insert(target, TraitScore { score, level });
    }

    Ok(result)
}

fn item_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\.\s*SCORE:\s*(\d)").expect("valid item regex"))
}

fn level_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i:\b(honesty[-_ ]humility|emotionality|extraversion|agreeableness|conscientiousness|openness|curiosity)\b).*?\b(HIGH|LOW)\b",
        )
        .expect("valid level regex")
    })
}

fn trait_from_label(label: &str) -> Option<PersonalityTrait> {
    let normalized = label.to_lowercase().replace(['-', ' '], "_");
    PersonalityTrait::parse(&normalized)
}

/// Extract item responses and asserted trait levels from model text.
///
/// Items outside 1..=60 and responses outside 1..=5 are ignored. Fewer than
/// 60 distinct items is a hard failure; no partial map is returned.
pub fn parse_personality_response(text: &str) -> Result<ParsedPersonality, AnalysisError> {
    let mut parsed = ParsedPersonality::default();

    for caps in item_regex().captures_iter(text) {
        let item: u32 = match caps[1].parse() {
            Ok(n) => n,
            Err(_) => continue,
        };
        let score: u8 = match caps[2].parse() {
            Ok(n) => n,
            Err(_) => continue,
        };
        if (1..=TOTAL_ITEMS as u32).contains(&item) && (1..=5).contains(&score) {
            parsed.scores.insert(item as u8, score);
        }
    }

    if parsed.scores.len() != TOTAL_ITEMS {
        return Err(AnalysisError::IncompleteExtraction {
            found: parsed.scores.len(),
            expected: TOTAL_ITEMS,
        });
    }

    for caps in level_regex().captures_iter(text) {
        if let Some(target) = trait_from_label(&caps[1]) {
            let level = if &caps[2] == "HIGH" {
                TraitLevel::High
            } else {
                TraitLevel::Low
            };
            parsed.levels.insert(target, level);
        }
    }

    debug!(
        "Parsed {} item scores and {} asserted levels",
        parsed.scores.len(),
        parsed.levels.len()
    );
    Ok(parsed)
}

/// Parse model text and aggregate it into a personality analysis.
pub fn analyze_personality_text(text: &str) -> Result<PersonalityAnalysis, AnalysisError> {
    let parsed = parse_personality_response(text)?;
    let traits = score_traits(&parsed.scores, &parsed.levels)?;
    Ok(PersonalityAnalysis {
        raw_scores: parsed.scores,
        traits,
    })
}
