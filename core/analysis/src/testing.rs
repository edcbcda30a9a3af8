//! Scripted in-process `LanguageModel` for tests and offline runs.
//!
//! Prompts are routed by the generator they came from; every prompt is
//! recorded so callers can assert on what was (or was not) sent.

use async_trait::async_trait;
use goal_insight_llm::{LanguageModel, LlmError, LlmResult};
use std::sync::Mutex;
use std::time::Duration;

use crate::scorer::TOTAL_ITEMS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Sentiment,
    Personality,
    Summary,
    Questions,
}

impl Route {
    /// Identify the generator from marker phrases in its prompt template
    pub fn of(prompt: &str) -> Option<Self> {
        if prompt.contains("propose exactly 5 questions") {
            Some(Route::Questions)
        } else if prompt.contains("SCORE:") {
            Some(Route::Personality)
        } else if prompt.contains("monthly summary (3-5 sentences)") {
            Some(Route::Summary)
        } else if prompt.contains("overall sentiment") {
            Some(Route::Sentiment)
        } else {
            None
        }
    }
}

struct Failure {
    marker: String,
    route: Option<Route>,
    remaining: Option<usize>,
}

pub struct ScriptedModel {
    defaults: Vec<(Route, String)>,
    overrides: Vec<(String, Route, String)>,
    failures: Mutex<Vec<Failure>>,
    prompts: Mutex<Vec<String>>,
    latency: Duration,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    /// A model that answers every generator with valid output
    pub fn new() -> Self {
        Self {
            defaults: vec![
                (Route::Sentiment, sentiment_json(0.5)),
                (Route::Personality, uniform_personality(3)),
                (
                    Route::Summary,
                    "Steady progress on goals this month with consistent reflections.".to_string(),
                ),
                (Route::Questions, questions_json(5)),
            ],
            overrides: Vec::new(),
            failures: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    /// Sleep this long inside every call before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Replace the default answer for `route`
    pub fn respond(mut self, route: Route, response: impl Into<String>) -> Self {
        let response = response.into();
        for (r, text) in self.defaults.iter_mut() {
            if *r == route {
                *text = response.clone();
            }
        }
        self
    }

    /// Answer `route` with `response` when the prompt contains `marker`
    pub fn respond_when(
        mut self,
        marker: impl Into<String>,
        route: Route,
        response: impl Into<String>,
    ) -> Self {
        self.overrides.push((marker.into(), route, response.into()));
        self
    }

    /// Fail every call whose prompt contains `marker`
    pub fn fail_when(self, marker: impl Into<String>) -> Self {
        self.push_failure(marker.into(), None, None)
    }

    /// Fail the first `times` calls whose prompt contains `marker`
    pub fn fail_times(self, marker: impl Into<String>, times: usize) -> Self {
        self.push_failure(marker.into(), None, Some(times))
    }

    /// Fail calls for one generator only when the prompt contains `marker`
    pub fn fail_route_when(self, marker: impl Into<String>, route: Route) -> Self {
        self.push_failure(marker.into(), Some(route), None)
    }

    fn push_failure(self, marker: String, route: Option<Route>, remaining: Option<usize>) -> Self {
        lock(&self.failures).push(Failure {
            marker,
            route,
            remaining,
        });
        self
    }

    /// Every prompt received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    /// Number of prompts routed to `route` that contained `marker`
    pub fn calls(&self, route: Route, marker: &str) -> usize {
        lock(&self.prompts)
            .iter()
            .filter(|p| Route::of(p) == Some(route) && p.contains(marker))
            .count()
    }

    fn should_fail(&self, prompt: &str, route: Option<Route>) -> bool {
        let mut failures = lock(&self.failures);
        for failure in failures.iter_mut() {
            if !prompt.contains(&failure.marker) {
                continue;
            }
            if failure.route.is_some() && failure.route != route {
                continue;
            }
            match failure.remaining.as_mut() {
                None => return true,
                Some(0) => continue,
                Some(n) => {
                    *n -= 1;
                    return true;
                }
            }
        }
        false
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_text(&self, prompt: &str) -> LlmResult<String> {
        lock(&self.prompts).push(prompt.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let route = Route::of(prompt);

        if self.should_fail(prompt, route) {
            return Err(LlmError::Api {
                provider: "scripted",
                status: 503,
                body: "scripted failure".to_string(),
            });
        }

        let route = route.ok_or(LlmError::EmptyResponse("scripted"))?;

        let response = self
            .overrides
            .iter()
            .find(|(marker, r, _)| *r == route && prompt.contains(marker.as_str()))
            .map(|(_, _, text)| text)
            .or_else(|| {
                self.defaults
                    .iter()
                    .find(|(r, _)| *r == route)
                    .map(|(_, text)| text)
            })
            .ok_or(LlmError::EmptyResponse("scripted"))?;

        Ok(response.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A valid sentiment payload with the given score
pub fn sentiment_json(score: f64) -> String {
    serde_json::json!({
        "score": score,
        "positive_ratio": 0.6,
        "negative_ratio": 0.1,
        "neutral_ratio": 0.3,
        "positive_keywords": ["progress", "consistent"],
        "negative_keywords": ["tired"]
    })
    .to_string()
}

/// Every questionnaire item answered with `score`
pub fn uniform_personality(score: u8) -> String {
    (1..=TOTAL_ITEMS)
        .map(|i| format!("{}. SCORE: {}", i, score))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A question payload with `count` entries
pub fn questions_json(count: usize) -> String {
    let categories = ["growth", "challenge", "strength", "emotion", "next_step"];
    let questions: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            serde_json::json!({
                "question": format!("Question {}?", i + 1),
                "category": categories[i % categories.len()],
                "intent": "Open a conversation",
                "priority": (i % 5) + 1
            })
        })
        .collect();
    serde_json::json!({ "questions": questions }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_routes_and_records() {
        let model = ScriptedModel::new().respond_when("alice", Route::Summary, "Alice summary");

        let answer = model
            .generate_text("Write a short monthly summary (3-5 sentences) about alice")
            .await
            .unwrap();
        assert_eq!(answer, "Alice summary");

        let answer = model
            .generate_text("Write a short monthly summary (3-5 sentences) about bob")
            .await
            .unwrap();
        assert!(answer.starts_with("Steady progress"));

        assert_eq!(model.calls(Route::Summary, "about"), 2);
        assert!(model.generate_text("unrelated").await.is_err());
    }

    #[tokio::test]
    async fn test_fail_times_recovers() {
        let model = ScriptedModel::new().fail_times("bob", 1);
        let prompt = "Analyze the overall sentiment of bob";

        assert!(model.generate_text(prompt).await.is_err());
        assert!(model.generate_text(prompt).await.is_ok());
    }

    #[tokio::test]
    async fn test_latency_delays_answer() {
        let model = ScriptedModel::new().with_latency(Duration::from_millis(30));
        let started = std::time::Instant::now();
        model
            .generate_text("Analyze the overall sentiment of carol")
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
