use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use goal_insight_analysis::testing::{questions_json, sentiment_json, Route, ScriptedModel};
use goal_insight_analysis::{AnalysisError, BatchConfig, BatchRunner, Database};
use goal_insight_schemas::{SentimentTrend, SubjectState, UserId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::Mutex;

const ALICE: &str = "ALICE worked on the marathon plan and felt steady progress every single week.";
const BOB: &str = "BOB struggled with the reading goal but kept a short journal every evening.";
const CAROL: &str = "CAROL finished the certification course and wants to mentor a newcomer next.";

fn jst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap()
}

/// Saturday 2026-10-17 10:00 +09:00
fn october_now() -> DateTime<FixedOffset> {
    jst().with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap()
}

fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
}

fn setup() -> (TempDir, Arc<Mutex<Database>>) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(temp_dir.path().join("test.db")).unwrap();
    (temp_dir, Arc::new(Mutex::new(db)))
}

async fn seed(db: &Arc<Mutex<Database>>, name: &str, text: &str, created: DateTime<Utc>) -> UserId {
    let db = db.lock().await;
    let user = db
        .insert_user(name, &format!("{}@example.com", name.to_lowercase()), "trainee")
        .unwrap();
    db.insert_goal(&user, Some(text), created).unwrap();
    user
}

fn runner(db: &Arc<Mutex<Database>>, model: &Arc<ScriptedModel>, config: BatchConfig) -> BatchRunner {
    BatchRunner::new(Arc::new(db.clone()), model.clone(), config)
}

#[tokio::test]
async fn test_failing_subject_is_isolated_and_retried_once() {
    let (_dir, db) = setup();
    let alice = seed(&db, "Alice", ALICE, utc(2026, 10, 3)).await;
    let bob = seed(&db, "Bob", BOB, utc(2026, 10, 4)).await;
    let carol = seed(&db, "Carol", CAROL, utc(2026, 10, 5)).await;

    let model = Arc::new(ScriptedModel::new().fail_when("BOB"));
    let report = runner(&db, &model, BatchConfig::immediate())
        .run_at(october_now())
        .await
        .unwrap();

    assert_eq!(report.tally.processed, 2);
    assert_eq!(report.tally.skipped, 0);
    assert_eq!(report.tally.failed, 1);
    assert!(!report.tally.partial);

    assert_eq!(report.state_of(&alice), Some(SubjectState::Processed));
    assert_eq!(report.state_of(&bob), Some(SubjectState::Failed));
    assert_eq!(report.state_of(&carol), Some(SubjectState::Processed));

    // First pass plus exactly one retry; the join stops at Bob's first failed call
    let bob_calls = model.prompts().iter().filter(|p| p.contains("BOB")).count();
    assert_eq!(bob_calls, 2);
    assert_eq!(model.calls(Route::Sentiment, "ALICE"), 1);

    let db = db.lock().await;
    assert!(db.get_diagnosis(&bob, 2026, 10).unwrap().is_none());
    for subject in [&alice, &carol] {
        let diagnosis = db.get_diagnosis(subject, 2026, 10).unwrap().unwrap();
        assert_eq!(db.suggestions_for(&diagnosis.id).unwrap().len(), 5);
    }
}

#[tokio::test]
async fn test_retry_success_moves_subject_to_processed() {
    let (_dir, db) = setup();
    seed(&db, "Alice", ALICE, utc(2026, 10, 3)).await;
    let bob = seed(&db, "Bob", BOB, utc(2026, 10, 4)).await;

    let model = Arc::new(ScriptedModel::new().fail_times("BOB", 1));
    let report = runner(&db, &model, BatchConfig::immediate())
        .run_at(october_now())
        .await
        .unwrap();

    assert_eq!(report.tally.processed, 2);
    assert_eq!(report.tally.failed, 0);
    assert_eq!(report.state_of(&bob), Some(SubjectState::Processed));
    assert!(db.lock().await.get_diagnosis(&bob, 2026, 10).unwrap().is_some());
}

#[tokio::test]
async fn test_same_week_rerun_skips_without_changes() {
    let (_dir, db) = setup();
    let alice = seed(&db, "Alice", ALICE, utc(2026, 10, 3)).await;

    let first_model = Arc::new(ScriptedModel::new().respond(Route::Sentiment, sentiment_json(0.4)));
    let report = runner(&db, &first_model, BatchConfig::immediate())
        .run_at(october_now())
        .await
        .unwrap();
    assert_eq!(report.tally.processed, 1);

    let (before, suggestions_before) = {
        let db = db.lock().await;
        let d = db.get_diagnosis(&alice, 2026, 10).unwrap().unwrap();
        let s = db.suggestions_for(&d.id).unwrap();
        (d, s)
    };

    // Sunday of the same week
    let sunday = jst().with_ymd_and_hms(2026, 10, 18, 23, 0, 0).unwrap();
    let second_model = Arc::new(ScriptedModel::new().respond(Route::Sentiment, sentiment_json(0.9)));
    let report = runner(&db, &second_model, BatchConfig::immediate())
        .run_at(sunday)
        .await
        .unwrap();

    assert_eq!(report.tally.skipped, 1);
    assert_eq!(report.tally.processed, 0);
    assert!(second_model.prompts().is_empty());
    {
        let db = db.lock().await;
        let after = db.get_diagnosis(&alice, 2026, 10).unwrap().unwrap();
        assert_eq!(after, before);
        assert_eq!(db.suggestions_for(&after.id).unwrap(), suggestions_before);
    }

    // Next Monday the month is re-analyzed in place
    let monday = jst().with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
    let report = runner(&db, &second_model, BatchConfig::immediate())
        .run_at(monday)
        .await
        .unwrap();
    assert_eq!(report.tally.processed, 1);

    let db = db.lock().await;
    let rerun = db.get_diagnosis(&alice, 2026, 10).unwrap().unwrap();
    assert_eq!(rerun.id, before.id);
    assert_eq!(rerun.sentiment_score, 0.9);
    assert_eq!(db.count_diagnoses().unwrap(), 1);
    assert_eq!(db.count_suggestions().unwrap(), 5);
}

#[tokio::test]
async fn test_minimum_length_boundary() {
    let (_dir, db) = setup();
    let short = seed(&db, "Short", &"s".repeat(49), utc(2026, 10, 2)).await;
    let exact = seed(&db, "Exact", &"e".repeat(50), utc(2026, 10, 2)).await;

    let model = Arc::new(ScriptedModel::new());
    let report = runner(&db, &model, BatchConfig::immediate())
        .run_at(october_now())
        .await
        .unwrap();

    assert_eq!(report.state_of(&short), Some(SubjectState::Skipped));
    assert_eq!(report.state_of(&exact), Some(SubjectState::Processed));
    assert_eq!(model.calls(Route::Sentiment, &"s".repeat(49)), 0);

    let db = db.lock().await;
    assert!(db.get_diagnosis(&short, 2026, 10).unwrap().is_none());
    let diagnosis = db.get_diagnosis(&exact, 2026, 10).unwrap().unwrap();
    assert_eq!(diagnosis.source_text_length, 50);
    assert_eq!(diagnosis.sentiment_trend, SentimentTrend::Stable);

    let suggestions = db.suggestions_for(&diagnosis.id).unwrap();
    assert_eq!(suggestions.len(), 5);
    assert!(suggestions.iter().all(|s| (1..=5).contains(&s.priority)));
}

#[tokio::test]
async fn test_only_goals_created_this_month_count() {
    let (_dir, db) = setup();
    // Plenty of text, but the goal belongs to September
    let late = seed(&db, "Late", ALICE, utc(2026, 9, 28)).await;
    {
        let db = db.lock().await;
        let goal = db.insert_goal(&late, Some("short"), utc(2026, 10, 1)).unwrap();
        db.insert_activity(&goal, Some("tiny"), utc(2026, 10, 2)).unwrap();
    }

    let model = Arc::new(ScriptedModel::new());
    let report = runner(&db, &model, BatchConfig::immediate())
        .run_at(october_now())
        .await
        .unwrap();

    assert_eq!(report.state_of(&late), Some(SubjectState::Skipped));
    assert!(model.prompts().is_empty());
}

#[tokio::test]
async fn test_trend_compares_with_previous_month() {
    let (_dir, db) = setup();
    let alice = seed(&db, "Alice", ALICE, utc(2026, 9, 10)).await;
    {
        let db = db.lock().await;
        db.insert_goal(&alice, Some(ALICE), utc(2026, 10, 6)).unwrap();
    }
    let carol = seed(&db, "Carol", CAROL, utc(2026, 10, 6)).await;

    let september = jst().with_ymd_and_hms(2026, 9, 20, 12, 0, 0).unwrap();
    let model = Arc::new(ScriptedModel::new().respond(Route::Sentiment, sentiment_json(0.2)));
    runner(&db, &model, BatchConfig::immediate())
        .run_at(september)
        .await
        .unwrap();

    let model = Arc::new(ScriptedModel::new().respond(Route::Sentiment, sentiment_json(0.5)));
    let report = runner(&db, &model, BatchConfig::immediate())
        .run_at(october_now())
        .await
        .unwrap();
    assert_eq!(report.tally.processed, 2);

    let db = db.lock().await;
    let previous = db.get_diagnosis(&alice, 2026, 9).unwrap().unwrap();
    assert_eq!(previous.sentiment_trend, SentimentTrend::Stable);

    let current = db.get_diagnosis(&alice, 2026, 10).unwrap().unwrap();
    assert_eq!(current.sentiment_trend, SentimentTrend::Improving);

    // No September record for Carol
    let carol_current = db.get_diagnosis(&carol, 2026, 10).unwrap().unwrap();
    assert_eq!(carol_current.sentiment_trend, SentimentTrend::Stable);
}

#[tokio::test]
async fn test_question_failure_keeps_previous_record() {
    let (_dir, db) = setup();
    let alice = seed(&db, "Alice", ALICE, utc(2026, 10, 3)).await;

    let model = Arc::new(ScriptedModel::new());
    runner(&db, &model, BatchConfig::immediate())
        .run_at(october_now())
        .await
        .unwrap();
    let before = db.lock().await.get_diagnosis(&alice, 2026, 10).unwrap().unwrap();

    // A week later the question generator returns four items
    let next_week = jst().with_ymd_and_hms(2026, 10, 24, 10, 0, 0).unwrap();
    let model = Arc::new(
        ScriptedModel::new()
            .respond(Route::Sentiment, sentiment_json(-0.6))
            .respond(Route::Questions, questions_json(4)),
    );
    let report = runner(&db, &model, BatchConfig::immediate())
        .run_at(next_week)
        .await
        .unwrap();

    assert_eq!(report.tally.failed, 1);
    let db = db.lock().await;
    let after = db.get_diagnosis(&alice, 2026, 10).unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(db.suggestions_for(&after.id).unwrap().len(), 5);
}

#[tokio::test]
async fn test_pacing_skips_delay_after_skipped_subjects() {
    let delay = Duration::from_millis(400);
    let config = BatchConfig {
        inter_call_delay: delay,
        ..BatchConfig::immediate()
    };

    // Three subjects without text: no model calls, no pacing
    let (_dir, db) = setup();
    for name in ["A", "B", "C"] {
        db.lock()
            .await
            .insert_user(name, &format!("{}@example.com", name), "trainee")
            .unwrap();
    }
    let model = Arc::new(ScriptedModel::new());
    let started = Instant::now();
    let report = runner(&db, &model, config.clone())
        .run_at(october_now())
        .await
        .unwrap();
    assert_eq!(report.tally.skipped, 3);
    assert!(started.elapsed() < delay);

    // Two processed subjects: one delay between them, none after the last
    let (_dir2, db) = setup();
    seed(&db, "Alice", ALICE, utc(2026, 10, 3)).await;
    seed(&db, "Carol", CAROL, utc(2026, 10, 4)).await;
    let started = Instant::now();
    let report = runner(&db, &model, config)
        .run_at(october_now())
        .await
        .unwrap();
    assert_eq!(report.tally.processed, 2);
    assert!(started.elapsed() >= delay);
}

#[tokio::test]
async fn test_non_target_roles_are_ignored() {
    let (_dir, db) = setup();
    {
        let db = db.lock().await;
        let trainer = db.insert_user("Tess", "tess@example.com", "trainer").unwrap();
        db.insert_goal(&trainer, Some(ALICE), utc(2026, 10, 3)).unwrap();
    }

    let model = Arc::new(ScriptedModel::new());
    let report = runner(&db, &model, BatchConfig::immediate())
        .run_at(october_now())
        .await
        .unwrap();

    assert!(report.subjects.is_empty());
    assert_eq!(db.lock().await.count_diagnoses().unwrap(), 0);
}

#[tokio::test]
async fn test_overlapping_runs_analyze_once() {
    let (_dir, db) = setup();
    let alice = seed(&db, "Alice", ALICE, utc(2026, 10, 3)).await;

    let model = Arc::new(ScriptedModel::new().with_latency(Duration::from_millis(100)));
    let runner = runner(&db, &model, BatchConfig::immediate());

    let (first, second) = tokio::join!(runner.run_at(october_now()), runner.run_at(october_now()));

    let (report, rejected) = match (first, second) {
        (Ok(report), Err(e)) | (Err(e), Ok(report)) => (report, e),
        (first, second) => panic!("expected exactly one run, got {:?} and {:?}", first, second),
    };
    assert!(matches!(
        rejected.downcast_ref::<AnalysisError>(),
        Some(AnalysisError::AlreadyRunning)
    ));
    assert_eq!(report.state_of(&alice), Some(SubjectState::Processed));
    assert_eq!(model.calls(Route::Sentiment, "ALICE"), 1);
    assert_eq!(db.lock().await.count_diagnoses().unwrap(), 1);

    // Once the first run ends the runner accepts work again
    let report = runner.run_at(october_now()).await.unwrap();
    assert_eq!(report.state_of(&alice), Some(SubjectState::Skipped));
}

#[tokio::test]
async fn test_budget_exhausted_mid_run_keeps_counts() {
    let (_dir, db) = setup();
    let alice = seed(&db, "Alice", ALICE, utc(2026, 10, 3)).await;
    let bob = seed(&db, "Bob", BOB, utc(2026, 10, 4)).await;
    let carol = seed(&db, "Carol", CAROL, utc(2026, 10, 5)).await;

    // Each subject takes two model rounds (joined generators, then questions)
    let model = Arc::new(ScriptedModel::new().with_latency(Duration::from_millis(100)));
    let config = BatchConfig {
        time_budget: Duration::from_millis(150),
        ..BatchConfig::immediate()
    };
    let report = runner(&db, &model, config)
        .run_at(october_now())
        .await
        .unwrap();

    assert!(report.tally.partial);
    assert_eq!(report.tally.processed, 1);
    assert_eq!(report.tally.skipped, 0);
    assert_eq!(report.tally.failed, 0);

    assert_eq!(report.state_of(&alice), Some(SubjectState::Processed));
    assert_eq!(report.state_of(&bob), Some(SubjectState::Pending));
    assert_eq!(report.state_of(&carol), Some(SubjectState::Pending));
    assert_eq!(model.calls(Route::Sentiment, "BOB"), 0);
    assert_eq!(model.calls(Route::Sentiment, "CAROL"), 0);
    assert_eq!(db.lock().await.count_diagnoses().unwrap(), 1);
}

#[tokio::test]
async fn test_budget_exhausted_during_retry_keeps_failure() {
    let (_dir, db) = setup();
    let bob = seed(&db, "Bob", BOB, utc(2026, 10, 4)).await;

    let model = Arc::new(
        ScriptedModel::new()
            .with_latency(Duration::from_millis(50))
            .fail_when("BOB"),
    );
    let config = BatchConfig {
        retry_cooldown: Duration::from_secs(5),
        time_budget: Duration::from_millis(200),
        ..BatchConfig::immediate()
    };
    let started = Instant::now();
    let report = runner(&db, &model, config)
        .run_at(october_now())
        .await
        .unwrap();

    assert!(report.tally.partial);
    assert_eq!(report.tally.failed, 1);
    assert_eq!(report.tally.processed, 0);
    assert_eq!(report.state_of(&bob), Some(SubjectState::Failed));

    // The cooldown is cut at the budget and the retry never starts
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(model.calls(Route::Sentiment, "BOB"), 1);
}

#[tokio::test]
async fn test_retry_pass_waits_for_cooldown_and_delay() {
    let (_dir, db) = setup();
    seed(&db, "Bob", BOB, utc(2026, 10, 4)).await;
    let dave = "DAVE wrote a weekly budget review and tracked every grocery receipt.";
    seed(&db, "Dave", dave, utc(2026, 10, 5)).await;

    let delay = Duration::from_millis(200);
    let cooldown = Duration::from_millis(300);
    let model = Arc::new(ScriptedModel::new().fail_times("BOB", 1).fail_times("DAVE", 1));
    let config = BatchConfig {
        inter_call_delay: delay,
        retry_cooldown: cooldown,
        ..BatchConfig::immediate()
    };

    let started = Instant::now();
    let report = runner(&db, &model, config)
        .run_at(october_now())
        .await
        .unwrap();

    assert_eq!(report.tally.processed, 2);
    assert_eq!(report.tally.failed, 0);
    assert!(!report.tally.partial);

    // One delay in the first pass, the cooldown, then one delay between retries
    assert!(started.elapsed() >= delay + cooldown + delay);
}

