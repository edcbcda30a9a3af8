use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use goal_insight_schemas::{Diagnosis, DiagnosisId, GoalText, SuggestedQuestion, UserId};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::database::Database;
use crate::period::AnalysisPeriod;

/// Everything the batch needs from persistence
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn list_subjects(&self, role: &str) -> Result<Vec<UserId>>;

    async fn goal_texts(
        &self,
        subject: &UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GoalText>>;

    async fn get_diagnosis(
        &self,
        subject: &UserId,
        period: AnalysisPeriod,
    ) -> Result<Option<Diagnosis>>;

    /// Upsert the diagnosis and replace its suggestions as one unit
    async fn commit_analysis(
        &self,
        diagnosis: &Diagnosis,
        questions: &[SuggestedQuestion],
    ) -> Result<DiagnosisId>;

    /// Sentiment score persisted for `period`, if any
    async fn sentiment_score(&self, subject: &UserId, period: AnalysisPeriod) -> Result<Option<f64>> {
        Ok(self
            .get_diagnosis(subject, period)
            .await?
            .map(|d| d.sentiment_score))
    }
}

#[async_trait]
impl AnalysisStore for Arc<Mutex<Database>> {
    async fn list_subjects(&self, role: &str) -> Result<Vec<UserId>> {
        self.lock().await.list_subjects_with_role(role)
    }

    async fn goal_texts(
        &self,
        subject: &UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GoalText>> {
        self.lock().await.goal_texts(subject, start, end)
    }

    async fn get_diagnosis(
        &self,
        subject: &UserId,
        period: AnalysisPeriod,
    ) -> Result<Option<Diagnosis>> {
        self.lock()
            .await
            .get_diagnosis(subject, period.year(), period.month())
    }

    async fn commit_analysis(
        &self,
        diagnosis: &Diagnosis,
        questions: &[SuggestedQuestion],
    ) -> Result<DiagnosisId> {
        self.lock().await.commit_analysis(diagnosis, questions)
    }
}
