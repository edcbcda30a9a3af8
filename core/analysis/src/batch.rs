use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Local, Utc};
use goal_insight_llm::LanguageModel;
use goal_insight_schemas::{generate_diagnosis_id, BatchTally, Diagnosis, SubjectState, UserId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::collector::collect_text;
use crate::config::BatchConfig;
use crate::database::db_timestamp;
use crate::error::AnalysisError;
use crate::generators::run_diagnosis;
use crate::period::{week_start, AnalysisPeriod};
use crate::questions::generate_questions;
use crate::store::AnalysisStore;
use crate::trend::calc_trend;

/// Result of one batch run: the aggregate tally plus the terminal state of
/// every listed subject. Subjects never reached before the budget ran out
/// stay `Pending`.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub tally: BatchTally,
    pub subjects: Vec<(UserId, SubjectState)>,
}

impl BatchReport {
    pub fn state_of(&self, subject: &UserId) -> Option<SubjectState> {
        self.subjects
            .iter()
            .find(|(id, _)| id == subject)
            .map(|(_, state)| *state)
    }

    fn set_state(&mut self, index: usize, state: SubjectState) {
        if let Some(entry) = self.subjects.get_mut(index) {
            entry.1 = state;
        }
    }
}

/// Sequential monthly analysis over every subject with the target role.
/// At most one run is in flight per runner.
pub struct BatchRunner {
    store: Arc<dyn AnalysisStore>,
    model: Arc<dyn LanguageModel>,
    config: BatchConfig,
    run_guard: Mutex<()>,
}

impl BatchRunner {
    pub fn new(
        store: Arc<dyn AnalysisStore>,
        model: Arc<dyn LanguageModel>,
        config: BatchConfig,
    ) -> Self {
        Self {
            store,
            model,
            config,
            run_guard: Mutex::new(()),
        }
    }

    /// Run against the local wall clock
    pub async fn run(&self) -> Result<BatchReport> {
        self.run_at(Local::now().fixed_offset()).await
    }

    /// Run as if the current time were `now`. The analysis month and the
    /// staleness week are both taken from `now`'s timezone.
    ///
    /// Fails with [`AnalysisError::AlreadyRunning`] while another run holds
    /// this runner, and when subjects cannot be listed. Per-subject failures
    /// are counted and retried once.
    pub async fn run_at(&self, now: DateTime<FixedOffset>) -> Result<BatchReport> {
        let _guard = self.run_guard.try_lock().map_err(|_| {
            warn!("Monthly analysis requested while a run is in progress");
            AnalysisError::AlreadyRunning
        })?;

        let started = Instant::now();
        let period = AnalysisPeriod::containing(&now);

        let subjects = self
            .store
            .list_subjects(&self.config.target_role)
            .await
            .context("Failed to list subjects")?;

        info!(
            "Monthly analysis started for {} ({} subjects)",
            period,
            subjects.len()
        );

        let mut report = BatchReport {
            tally: BatchTally::default(),
            subjects: subjects
                .iter()
                .map(|s| (s.clone(), SubjectState::Pending))
                .collect(),
        };
        let mut failed: Vec<usize> = Vec::new();

        for (index, subject) in subjects.iter().enumerate() {
            if self.budget_exhausted(started) {
                warn!(
                    "Time budget exhausted after {} of {} subjects",
                    index,
                    subjects.len()
                );
                report.tally.partial = true;
                return Ok(report);
            }

            let state = self.process_subject(subject, &now).await;
            report.set_state(index, state);

            match state {
                SubjectState::Skipped => report.tally.skipped += 1,
                SubjectState::Processed => report.tally.processed += 1,
                SubjectState::Failed => {
                    report.tally.failed += 1;
                    failed.push(index);
                }
                SubjectState::Pending => {}
            }

            // Only subjects that reached the model are paced
            if state != SubjectState::Skipped && index + 1 < subjects.len() {
                self.pause(started, self.config.inter_call_delay).await;
            }
        }

        if !failed.is_empty() {
            if self.budget_exhausted(started) {
                warn!(
                    "Time budget exhausted before retrying {} failed subjects",
                    failed.len()
                );
                report.tally.partial = true;
                return Ok(self.finish(report, started));
            }

            info!(
                "Retrying {} failed subjects after {:?}",
                failed.len(),
                self.config.retry_cooldown
            );
            self.pause(started, self.config.retry_cooldown).await;

            for (attempt, &index) in failed.iter().enumerate() {
                if self.budget_exhausted(started) {
                    warn!(
                        "Time budget exhausted during retry pass ({} of {} retried)",
                        attempt,
                        failed.len()
                    );
                    report.tally.partial = true;
                    break;
                }

                let subject = &subjects[index];
                match self.process_subject(subject, &now).await {
                    SubjectState::Processed => {
                        info!("Retry succeeded for {}", subject);
                        report.tally.failed -= 1;
                        report.tally.processed += 1;
                        report.set_state(index, SubjectState::Processed);
                    }
                    other => {
                        warn!("Retry for {} ended {:?}", subject, other);
                    }
                }

                if attempt + 1 < failed.len() {
                    self.pause(started, self.config.inter_call_delay).await;
                }
            }
        }

        Ok(self.finish(report, started))
    }

    fn finish(&self, report: BatchReport, started: Instant) -> BatchReport {
        info!(
            "Monthly analysis finished: processed={} skipped={} failed={} partial={} ({:?})",
            report.tally.processed,
            report.tally.skipped,
            report.tally.failed,
            report.tally.partial,
            started.elapsed()
        );
        report
    }

    fn budget_exhausted(&self, started: Instant) -> bool {
        started.elapsed() >= self.config.time_budget
    }

    /// Sleep for `delay`, cut short at the end of the time budget. The next
    /// budget check then marks the run partial.
    async fn pause(&self, started: Instant, delay: Duration) {
        let remaining = self.config.time_budget.saturating_sub(started.elapsed());
        let delay = delay.min(remaining);
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    /// Analyze one subject, turning any error into `Failed`
    async fn process_subject(&self, subject: &UserId, now: &DateTime<FixedOffset>) -> SubjectState {
        match self.analyze_subject(subject, now).await {
            Ok(state) => state,
            Err(e) => {
                error!("Analysis failed for {}: {:#}", subject, e);
                SubjectState::Failed
            }
        }
    }

    async fn analyze_subject(
        &self,
        subject: &UserId,
        now: &DateTime<FixedOffset>,
    ) -> Result<SubjectState> {
        let period = AnalysisPeriod::containing(now);

        if let Some(existing) = self.store.get_diagnosis(subject, period).await? {
            if analyzed_this_week(&existing.analyzed_at, now) {
                debug!(
                    "Skipping {}: already analyzed at {}",
                    subject, existing.analyzed_at
                );
                return Ok(SubjectState::Skipped);
            }
        }

        let (start, end) = period.bounds_utc();
        let corpus = collect_text(self.store.as_ref(), subject, start, end).await?;
        let length = corpus.chars().count();

        if length < self.config.min_text_length {
            info!(
                "Skipping {}: {} chars of text (minimum {})",
                subject, length, self.config.min_text_length
            );
            return Ok(SubjectState::Skipped);
        }

        let analysis = run_diagnosis(self.model.as_ref(), &corpus).await?;

        let previous = self
            .store
            .sentiment_score(subject, period.previous())
            .await?;
        let trend = calc_trend(analysis.sentiment.score, previous);

        // Generate before writing so a failure leaves the stored month untouched
        let questions = generate_questions(
            self.model.as_ref(),
            &analysis.sentiment,
            &analysis.personality,
            &analysis.summary,
        )
        .await?;

        let diagnosis = Diagnosis {
            id: generate_diagnosis_id(),
            user_id: subject.clone(),
            year: period.year(),
            month: period.month(),
            sentiment_score: analysis.sentiment.score,
            sentiment_positive_ratio: analysis.sentiment.positive_ratio,
            sentiment_negative_ratio: analysis.sentiment.negative_ratio,
            sentiment_neutral_ratio: analysis.sentiment.neutral_ratio,
            sentiment_positive_keywords: analysis.sentiment.positive_keywords,
            sentiment_negative_keywords: analysis.sentiment.negative_keywords,
            sentiment_trend: trend,
            personality_raw_scores: analysis.personality.raw_scores,
            personality_traits: analysis.personality.traits,
            summary: analysis.summary,
            source_text_length: length,
            analyzed_at: db_timestamp(&now.with_timezone(&Utc)),
        };

        let id = self
            .store
            .commit_analysis(&diagnosis, &questions)
            .await
            .context("Failed to persist analysis")?;

        info!(
            "Analyzed {} for {}: diagnosis {} (trend {})",
            subject,
            period,
            id,
            trend.as_str()
        );
        Ok(SubjectState::Processed)
    }
}

/// True when `analyzed_at` falls on or after Monday 00:00 of `now`'s week.
/// Unparseable timestamps count as stale.
pub fn analyzed_this_week(analyzed_at: &str, now: &DateTime<FixedOffset>) -> bool {
    match DateTime::parse_from_rfc3339(analyzed_at) {
        Ok(at) => at >= week_start(now),
        Err(e) => {
            warn!("Unparseable analyzed_at \"{}\": {}", analyzed_at, e);
            false
        }
    }
}
