use anyhow::Result;
use chrono::{DateTime, Utc};
use goal_insight_schemas::{GoalText, UserId};
use tracing::debug;

use crate::store::AnalysisStore;

/// Flatten goals, their activities and those activities' reflections into one
/// newline-joined corpus. Empty or missing texts are dropped.
pub fn concatenate(goals: &[GoalText]) -> String {
    let mut texts: Vec<&str> = Vec::new();

    for goal in goals {
        texts.extend(goal.content.as_deref());
        for activity in &goal.activities {
            texts.extend(activity.content.as_deref());
            texts.extend(activity.reflections.iter().map(String::as_str));
        }
    }

    texts
        .into_iter()
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collect the subject's corpus for goals created in [start, end).
/// Only the goal's creation time gates inclusion.
pub async fn collect_text(
    store: &dyn AnalysisStore,
    subject: &UserId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<String> {
    let goals = store.goal_texts(subject, start, end).await?;
    let corpus = concatenate(&goals);
    debug!(
        "Collected {} chars from {} goals for {}",
        corpus.chars().count(),
        goals.len(),
        subject
    );
    Ok(corpus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use goal_insight_schemas::ActivityText;

    #[test]
    fn test_concatenate_nested_order() {
        let goals = vec![
            GoalText {
                content: Some("Run a 10k".to_string()),
                activities: vec![
                    ActivityText {
                        content: Some("Jogged 3km".to_string()),
                        reflections: vec!["Felt slow".to_string(), "Knee ok".to_string()],
                    },
                    ActivityText {
                        content: None,
                        reflections: vec!["Rested".to_string()],
                    },
                ],
            },
            GoalText {
                content: Some("Read more".to_string()),
                activities: vec![],
            },
        ];

        assert_eq!(
            concatenate(&goals),
            "Run a 10k\nJogged 3km\nFelt slow\nKnee ok\nRested\nRead more"
        );
    }

    #[test]
    fn test_concatenate_drops_empty_texts() {
        let goals = vec![GoalText {
            content: Some(String::new()),
            activities: vec![ActivityText {
                content: Some("Did it".to_string()),
                reflections: vec![String::new()],
            }],
        }];
        assert_eq!(concatenate(&goals), "Did it");
        assert_eq!(concatenate(&[]), "");
    }
}
