use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use goal_insight_schemas::{
    generate_activity_id, generate_goal_id, generate_reflection_id, generate_suggestion_id,
    generate_user_id, ActivityId, ActivityText, Diagnosis, DiagnosisId, GoalId, GoalText,
    QuestionCategory, QuestionSuggestion, ReflectionId, SentimentTrend, SuggestedQuestion,
    SuggestionId, TraineeDiagnosis, UserId, UserSummary,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};
use ulid::Ulid;

use crate::period::AnalysisPeriod;

const DIAGNOSIS_COLUMNS: &str = "id, user_id, year, month, sentiment_score,
    sentiment_positive_ratio, sentiment_negative_ratio, sentiment_neutral_ratio,
    sentiment_positive_keywords, sentiment_negative_keywords, sentiment_trend,
    personality_raw_scores, personality_traits, summary, source_text_length, analyzed_at";

/// Timestamps are stored as fixed-width RFC3339 UTC so that text comparison
/// orders them correctly.
pub fn db_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database and ensure the schema exists
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self { conn };
        db.init_schema()?;

        info!("Database initialized");
        Ok(db)
    }

    /// Create all tables and indexes
    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS roles (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                name TEXT NOT NULL,
                role_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (role_id) REFERENCES roles(id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS trainer_trainees (
                id TEXT PRIMARY KEY,
                trainer_id TEXT NOT NULL,
                trainee_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (trainer_id, trainee_id),
                FOREIGN KEY (trainer_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (trainee_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // === SOURCE TEXT TABLES ===

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS goals (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                content TEXT,
                deadline TEXT,
                status TEXT DEFAULT 'in_progress',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS activities (
                id TEXT PRIMARY KEY,
                goal_id TEXT NOT NULL,
                content TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (goal_id) REFERENCES goals(id) ON DELETE CASCADE
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS reflections (
                id TEXT PRIMARY KEY,
                activity_id TEXT NOT NULL,
                content TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (activity_id) REFERENCES activities(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // === ANALYSIS TABLES ===

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS ai_diagnoses (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                sentiment_score REAL NOT NULL,
                sentiment_positive_ratio REAL NOT NULL,
                sentiment_negative_ratio REAL NOT NULL,
                sentiment_neutral_ratio REAL NOT NULL,
                sentiment_positive_keywords TEXT NOT NULL DEFAULT '[]',
                sentiment_negative_keywords TEXT NOT NULL DEFAULT '[]',
                sentiment_trend TEXT NOT NULL,
                personality_raw_scores TEXT NOT NULL DEFAULT '{}',
                personality_traits TEXT NOT NULL DEFAULT '{}',
                summary TEXT NOT NULL,
                source_text_length INTEGER NOT NULL,
                analyzed_at TEXT NOT NULL,
                UNIQUE (user_id, year, month),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS ai_question_suggests (
                id TEXT PRIMARY KEY,
                diagnosis_id TEXT NOT NULL,
                question TEXT NOT NULL,
                category TEXT NOT NULL,
                intent TEXT NOT NULL,
                priority INTEGER NOT NULL CHECK (priority BETWEEN 1 AND 5),
                created_at TEXT NOT NULL,
                FOREIGN KEY (diagnosis_id) REFERENCES ai_diagnoses(id) ON DELETE CASCADE
            )",
            [],
        )?;

        // Indexes for the collector and the batch lookups
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_goals_user_created ON goals(user_id, created_at)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_activities_goal ON activities(goal_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reflections_activity ON reflections(activity_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_suggests_diagnosis ON ai_question_suggests(diagnosis_id)",
            [],
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Users and source text
    // ------------------------------------------------------------------------

    /// Get or create a role by name, returning its id
    pub fn ensure_role(&self, name: &str) -> Result<String> {
        let existing: Option<String> = self
            .conn
            .query_row("SELECT id FROM roles WHERE name = ?1", params![name], |row| row.get(0))
            .optional()?;

        if let Some(id) = existing {
            return Ok(id);
        }

        let id = format!("role_{}", Ulid::new());
        self.conn.execute(
            "INSERT INTO roles (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![id, name, db_timestamp(&Utc::now())],
        )?;
        Ok(id)
    }

    pub fn insert_user(&self, name: &str, email: &str, role: &str) -> Result<UserId> {
        let role_id = self.ensure_role(role)?;
        let id = generate_user_id();
        let now = db_timestamp(&Utc::now());

        self.conn.execute(
            "INSERT INTO users (id, email, name, role_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id.0, email, name, role_id, now],
        )?;
        Ok(id)
    }

    pub fn assign_trainee(&self, trainer: &UserId, trainee: &UserId) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO trainer_trainees (id, trainer_id, trainee_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                format!("tt_{}", Ulid::new()),
                trainer.0,
                trainee.0,
                db_timestamp(&Utc::now())
            ],
        )?;
        Ok(())
    }

    pub fn insert_goal(
        &self,
        user: &UserId,
        content: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<GoalId> {
        let id = generate_goal_id();
        let ts = db_timestamp(&created_at);
        self.conn.execute(
            "INSERT INTO goals (id, user_id, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id.0, user.0, content, ts],
        )?;
        Ok(id)
    }

    pub fn insert_activity(
        &self,
        goal: &GoalId,
        content: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<ActivityId> {
        let id = generate_activity_id();
        let ts = db_timestamp(&created_at);
        self.conn.execute(
            "INSERT INTO activities (id, goal_id, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id.0, goal.0, content, ts],
        )?;
        Ok(id)
    }

    pub fn insert_reflection(
        &self,
        activity: &ActivityId,
        content: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<ReflectionId> {
        let id = generate_reflection_id();
        let ts = db_timestamp(&created_at);
        self.conn.execute(
            "INSERT INTO reflections (id, activity_id, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id.0, activity.0, content, ts],
        )?;
        Ok(id)
    }

    /// All users holding `role`, in creation order
    pub fn list_subjects_with_role(&self, role: &str) -> Result<Vec<UserId>> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id FROM users u
             JOIN roles r ON r.id = u.role_id
             WHERE r.name = ?1
             ORDER BY u.created_at, u.rowid",
        )?;

        let ids = stmt
            .query_map(params![role], |row| Ok(UserId(row.get(0)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Goals created by `user` in [start, end), with all of their activities and
    /// reflections regardless of when those were written
    pub fn goal_texts(
        &self,
        user: &UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GoalText>> {
        let mut goal_stmt = self.conn.prepare(
            "SELECT id, content FROM goals
             WHERE user_id = ?1 AND created_at >= ?2 AND created_at < ?3
             ORDER BY created_at, rowid",
        )?;
        let mut activity_stmt = self.conn.prepare(
            "SELECT id, content FROM activities WHERE goal_id = ?1 ORDER BY created_at, rowid",
        )?;
        let mut reflection_stmt = self.conn.prepare(
            "SELECT content FROM reflections
             WHERE activity_id = ?1 AND content IS NOT NULL
             ORDER BY created_at, rowid",
        )?;

        let goals = goal_stmt
            .query_map(
                params![user.0, db_timestamp(&start), db_timestamp(&end)],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = Vec::with_capacity(goals.len());
        for (goal_id, content) in goals {
            let activities = activity_stmt
                .query_map(params![goal_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut activity_texts = Vec::with_capacity(activities.len());
            for (activity_id, content) in activities {
                let reflections = reflection_stmt
                    .query_map(params![activity_id], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                activity_texts.push(ActivityText {
                    content,
                    reflections,
                });
            }

            result.push(GoalText {
                content,
                activities: activity_texts,
            });
        }

        Ok(result)
    }

    // ------------------------------------------------------------------------
    // Diagnoses
    // ------------------------------------------------------------------------

    pub fn get_diagnosis(&self, user: &UserId, year: i32, month: u32) -> Result<Option<Diagnosis>> {
        let sql = format!(
            "SELECT {} FROM ai_diagnoses WHERE user_id = ?1 AND year = ?2 AND month = ?3",
            DIAGNOSIS_COLUMNS
        );
        let diagnosis = self
            .conn
            .query_row(&sql, params![user.0, year, month], row_to_diagnosis)
            .optional()?;
        Ok(diagnosis)
    }

    pub fn get_diagnosis_by_id(&self, id: &DiagnosisId) -> Result<Option<Diagnosis>> {
        let sql = format!("SELECT {} FROM ai_diagnoses WHERE id = ?1", DIAGNOSIS_COLUMNS);
        let diagnosis = self
            .conn
            .query_row(&sql, params![id.0], row_to_diagnosis)
            .optional()?;
        Ok(diagnosis)
    }

    /// Insert or overwrite by (user_id, year, month). An existing row keeps its id.
    pub fn upsert_diagnosis(&self, diagnosis: &Diagnosis) -> Result<DiagnosisId> {
        upsert_diagnosis_on(&self.conn, diagnosis)
    }

    /// Delete-then-insert in one transaction, so readers never see a diagnosis
    /// without its suggestions
    pub fn replace_suggestions(
        &self,
        diagnosis_id: &DiagnosisId,
        questions: &[SuggestedQuestion],
    ) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        delete_suggestions_on(&tx, diagnosis_id)?;
        let inserted = insert_suggestions_on(&tx, diagnosis_id, questions)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Upsert the diagnosis and replace its suggestions atomically
    pub fn commit_analysis(
        &self,
        diagnosis: &Diagnosis,
        questions: &[SuggestedQuestion],
    ) -> Result<DiagnosisId> {
        let tx = self.conn.unchecked_transaction()?;
        let id = upsert_diagnosis_on(&tx, diagnosis)?;
        delete_suggestions_on(&tx, &id)?;
        insert_suggestions_on(&tx, &id, questions)?;
        tx.commit().context("Failed to commit analysis")?;

        debug!(
            "Committed diagnosis {} with {} suggestions",
            id,
            questions.len()
        );
        Ok(id)
    }

    pub fn suggestions_for(&self, diagnosis_id: &DiagnosisId) -> Result<Vec<QuestionSuggestion>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, diagnosis_id, question, category, intent, priority, created_at
             FROM ai_question_suggests
             WHERE diagnosis_id = ?1
             ORDER BY priority ASC, rowid ASC",
        )?;

        let suggestions = stmt
            .query_map(params![diagnosis_id.0], row_to_suggestion)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(suggestions)
    }

    /// Diagnoses for `user` between two months inclusive, oldest first
    pub fn diagnosis_history(
        &self,
        user: &UserId,
        from: AnalysisPeriod,
        to: AnalysisPeriod,
    ) -> Result<Vec<Diagnosis>> {
        let sql = format!(
            "SELECT {} FROM ai_diagnoses
             WHERE user_id = ?1 AND (year * 12 + month) BETWEEN ?2 AND ?3
             ORDER BY year ASC, month ASC",
            DIAGNOSIS_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let key = |p: AnalysisPeriod| i64::from(p.year()) * 12 + i64::from(p.month());

        let diagnoses = stmt
            .query_map(params![user.0, key(from), key(to)], row_to_diagnosis)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(diagnoses)
    }

    /// Latest diagnosis (if any) for each trainee assigned to `trainer`
    pub fn latest_diagnoses_for_trainer(&self, trainer: &UserId) -> Result<Vec<TraineeDiagnosis>> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id, u.name FROM trainer_trainees tt
             JOIN users u ON u.id = tt.trainee_id
             WHERE tt.trainer_id = ?1
             ORDER BY tt.created_at, tt.rowid",
        )?;
        let trainees = stmt
            .query_map(params![trainer.0], |row| {
                Ok(UserSummary {
                    id: UserId(row.get(0)?),
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let latest_sql = format!(
            "SELECT {} FROM ai_diagnoses WHERE user_id = ?1
             ORDER BY year DESC, month DESC LIMIT 1",
            DIAGNOSIS_COLUMNS
        );
        let mut latest = self.conn.prepare(&latest_sql)?;

        let mut result = Vec::with_capacity(trainees.len());
        for trainee in trainees {
            let diagnosis = latest
                .query_row(params![trainee.id.0], row_to_diagnosis)
                .optional()?;
            result.push(TraineeDiagnosis { trainee, diagnosis });
        }
        Ok(result)
    }

    pub fn count_diagnoses(&self) -> Result<usize> {
        let count: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM ai_diagnoses", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn count_suggestions(&self) -> Result<usize> {
        let count: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM ai_question_suggests", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn upsert_diagnosis_on(conn: &Connection, d: &Diagnosis) -> Result<DiagnosisId> {
    conn.execute(
        "INSERT INTO ai_diagnoses (
            id, user_id, year, month, sentiment_score,
            sentiment_positive_ratio, sentiment_negative_ratio, sentiment_neutral_ratio,
            sentiment_positive_keywords, sentiment_negative_keywords, sentiment_trend,
            personality_raw_scores, personality_traits, summary, source_text_length, analyzed_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
         ON CONFLICT (user_id, year, month) DO UPDATE SET
            sentiment_score = excluded.sentiment_score,
            sentiment_positive_ratio = excluded.sentiment_positive_ratio,
            sentiment_negative_ratio = excluded.sentiment_negative_ratio,
            sentiment_neutral_ratio = excluded.sentiment_neutral_ratio,
            sentiment_positive_keywords = excluded.sentiment_positive_keywords,
            sentiment_negative_keywords = excluded.sentiment_negative_keywords,
            sentiment_trend = excluded.sentiment_trend,
            personality_raw_scores = excluded.personality_raw_scores,
            personality_traits = excluded.personality_traits,
            summary = excluded.summary,
            source_text_length = excluded.source_text_length,
            analyzed_at = excluded.analyzed_at",
        params![
            d.id.0,
            d.user_id.0,
            d.year,
            d.month,
            d.sentiment_score,
            d.sentiment_positive_ratio,
            d.sentiment_negative_ratio,
            d.sentiment_neutral_ratio,
            serde_json::to_string(&d.sentiment_positive_keywords)?,
            serde_json::to_string(&d.sentiment_negative_keywords)?,
            d.sentiment_trend.as_str(),
            serde_json::to_string(&d.personality_raw_scores)?,
            serde_json::to_string(&d.personality_traits)?,
            d.summary,
            d.source_text_length,
            d.analyzed_at,
        ],
    )?;

    let id: String = conn.query_row(
        "SELECT id FROM ai_diagnoses WHERE user_id = ?1 AND year = ?2 AND month = ?3",
        params![d.user_id.0, d.year, d.month],
        |row| row.get(0),
    )?;
    Ok(DiagnosisId(id))
}

fn delete_suggestions_on(conn: &Connection, diagnosis_id: &DiagnosisId) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM ai_question_suggests WHERE diagnosis_id = ?1",
        params![diagnosis_id.0],
    )?;
    Ok(deleted)
}

fn insert_suggestions_on(
    conn: &Connection,
    diagnosis_id: &DiagnosisId,
    questions: &[SuggestedQuestion],
) -> Result<usize> {
    let now = db_timestamp(&Utc::now());
    let mut stmt = conn.prepare(
        "INSERT INTO ai_question_suggests
            (id, diagnosis_id, question, category, intent, priority, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;

    for q in questions {
        stmt.execute(params![
            generate_suggestion_id().0,
            diagnosis_id.0,
            q.question,
            q.category.as_str(),
            q.intent,
            q.priority,
            now,
        ])?;
    }
    Ok(questions.len())
}

fn row_to_diagnosis(row: &Row) -> rusqlite::Result<Diagnosis> {
    let positive_json: String = row.get(8)?;
    let negative_json: String = row.get(9)?;
    let trend_raw: String = row.get(10)?;
    let raw_scores_json: String = row.get(11)?;
    let traits_json: String = row.get(12)?;

    let sentiment_trend = SentimentTrend::parse(&trend_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            Type::Text,
            format!("unknown sentiment trend \"{}\"", trend_raw).into(),
        )
    })?;

    Ok(Diagnosis {
        id: DiagnosisId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        year: row.get(2)?,
        month: row.get(3)?,
        sentiment_score: row.get(4)?,
        sentiment_positive_ratio: row.get(5)?,
        sentiment_negative_ratio: row.get(6)?,
        sentiment_neutral_ratio: row.get(7)?,
        sentiment_positive_keywords: serde_json::from_str(&positive_json).map_err(json_error)?,
        sentiment_negative_keywords: serde_json::from_str(&negative_json).map_err(json_error)?,
        sentiment_trend,
        personality_raw_scores: serde_json::from_str(&raw_scores_json).map_err(json_error)?,
        personality_traits: serde_json::from_str(&traits_json).map_err(json_error)?,
        summary: row.get(13)?,
        source_text_length: row.get(14)?,
        analyzed_at: row.get(15)?,
    })
}

fn row_to_suggestion(row: &Row) -> rusqlite::Result<QuestionSuggestion> {
    let category_raw: String = row.get(3)?;
    let category = QuestionCategory::parse(&category_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown question category \"{}\"", category_raw).into(),
        )
    })?;

    Ok(QuestionSuggestion {
        id: SuggestionId(row.get(0)?),
        diagnosis_id: DiagnosisId(row.get(1)?),
        question: row.get(2)?,
        category,
        intent: row.get(4)?,
        priority: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn json_error(err: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(err))
}
