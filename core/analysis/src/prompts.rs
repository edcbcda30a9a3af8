use goal_insight_schemas::{PersonalityTrait, TraitScore};
use std::collections::BTreeMap;

use crate::scorer::{TOTAL_ITEMS, TRAIT_ITEMS};

/// Questionnaire statements, item 1 first. Reverse-keyed items are worded
/// negatively; the correction itself happens in the scorer.
const PERSONALITY_ITEMS: [&str; TOTAL_ITEMS] = [
    "I feel comfortable around people.",
    "I prefer to stay in the background.",
    "I start conversations.",
    "I have little to say.",
    "I talk to many different people at gatherings.",
    "I keep in the background during group work.",
    "I enjoy being the center of attention.",
    "I am quiet around strangers.",
    "I bring energy to a group.",
    "I avoid drawing attention to myself.",
    "I sympathize with others' feelings.",
    "I am not really interested in others.",
    "I take time out for others.",
    "I am critical of others' mistakes.",
    "I make people feel at ease.",
    "I hold grudges.",
    "I cooperate willingly with teammates.",
    "I belittle people.",
    "I am patient with others.",
    "I assume the best about people.",
    "I am always prepared.",
    "I leave my work unorganized.",
    "I pay attention to details.",
    "I put off tasks I should do now.",
    "I follow a schedule.",
    "I avoid my responsibilities.",
    "I finish what I start.",
    "I make careless mistakes.",
    "I set concrete plans for my goals.",
    "I keep the promises I make to myself.",
    "I get stressed out easily.",
    "I am relaxed most of the time.",
    "I worry about things.",
    "I rarely feel anxious.",
    "I am easily disturbed.",
    "I get upset easily.",
    "I feel strong empathy in sad situations.",
    "I need emotional support from others when struggling.",
    "I stay calm under pressure.",
    "My mood changes often.",
    "I have a vivid imagination.",
    "I am not interested in abstract ideas.",
    "I enjoy trying new approaches.",
    "I prefer routine over variety.",
    "I reflect on my experiences.",
    "I avoid unfamiliar situations.",
    "I appreciate art and beauty.",
    "I come up with original ideas.",
    "I am open to feedback that changes my thinking.",
    "I enjoy thinking about complex problems.",
    "I would bend the rules to get ahead.",
    "I want people to know I am important.",
    "I exaggerate my achievements.",
    "I love learning new things.",
    "I ask questions to understand things deeply.",
    "I explore topics beyond what is required.",
    "I seek out challenges that stretch me.",
    "I read or research out of personal interest.",
    "I am eager to learn from others.",
    "I look for the reasons behind how things work.",
];

fn trait_label(target: PersonalityTrait) -> &'static str {
    match target {
        PersonalityTrait::Extraversion => "Extraversion",
        PersonalityTrait::Agreeableness => "Agreeableness",
        PersonalityTrait::Conscientiousness => "Conscientiousness",
        PersonalityTrait::Emotionality => "Emotionality",
        PersonalityTrait::Openness => "Openness",
        PersonalityTrait::HonestyHumility => "Honesty-Humility",
        PersonalityTrait::Curiosity => "Curiosity",
    }
}

pub fn sentiment_prompt(text: &str) -> String {
    format!(
        r#"Analyze the overall sentiment of the following monthly journal of a trainee
(goals, activity logs and reflections).

Text:
{}

Return a JSON object with this structure:
{{
  "score": -1.0 to 1.0,           // overall sentiment, negative to positive
  "positive_ratio": 0.0 to 1.0,   // share of positive statements
  "negative_ratio": 0.0 to 1.0,   // share of negative statements
  "neutral_ratio": 0.0 to 1.0,    // share of neutral statements
  "positive_keywords": ["..."],   // at most 5 representative positive words
  "negative_keywords": ["..."]    // at most 5 representative negative words
}}

The three ratios should sum to 1.0. Return only the JSON object."#,
        text
    )
}

pub fn personality_prompt(text: &str) -> String {
    let items: Vec<String> = PERSONALITY_ITEMS
        .iter()
        .enumerate()
        .map(|(i, statement)| format!("{}. {}", i + 1, statement))
        .collect();

    let labels: Vec<&str> = TRAIT_ITEMS.iter().map(|(t, _)| trait_label(*t)).collect();

    format!(
        r#"Read the following monthly journal of a trainee and answer the questionnaire
as the writer would most likely answer it about themselves.

Text:
{}

Questionnaire (1 = strongly disagree, 5 = strongly agree):
{}

Output format, one line per item, all {} items:
1. SCORE: <1-5>
2. SCORE: <1-5>
...

Then a section "TRAITS:" with one line per trait, giving HIGH or LOW:
{}"#,
        text,
        items.join("\n"),
        TOTAL_ITEMS,
        labels
            .iter()
            .map(|l| format!("{}: HIGH|LOW", l))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

pub fn summary_prompt(text: &str) -> String {
    format!(
        r#"Write a short monthly summary (3-5 sentences) of the following trainee journal for
their trainer. Cover what they worked on, how they felt, and where they grew or struggled.

Text:
{}"#,
        text
    )
}

/// `name: score (LEVEL)` pairs joined by ", ".
pub fn traits_summary(traits: &BTreeMap<PersonalityTrait, TraitScore>) -> String {
    traits
        .iter()
        .map(|(t, s)| format!("{}: {} ({})", t.as_str(), s.score, s.level.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn question_prompt(
    sentiment_score: f64,
    positive_keywords: &[String],
    negative_keywords: &[String],
    traits: &BTreeMap<PersonalityTrait, TraitScore>,
    summary: &str,
) -> String {
    format!(
        r#"You support a trainer who holds monthly 1-on-1 sessions with a trainee.
Based on the analysis below, propose exactly 5 questions the trainer could ask.

Sentiment score (-1 to 1): {}
Positive keywords: {}
Negative keywords: {}
Personality traits: {}
Monthly summary:
{}

Return a JSON object with this structure:
{{
  "questions": [
    {{
      "question": "the question to ask",
      "category": "growth|challenge|strength|emotion|next_step",
      "intent": "why this question helps",
      "priority": 1-5
    }}
  ]
}}

Exactly 5 questions. Return only the JSON object."#,
        sentiment_score,
        positive_keywords.join(", "),
        negative_keywords.join(", "),
        traits_summary(traits),
        summary
    )
}
