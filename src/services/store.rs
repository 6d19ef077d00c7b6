use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{types::Json, PgPool};

use crate::models::{
    interview::{Interview, InterviewConfig, InterviewStatus, InterviewSummary},
    message::{Message, MessageRole},
    report::{Report, ReportDraft},
    user::OwnerProfile,
};
use crate::services::session::SessionError;
use crate::utils::logger::LOGGER;

/// Persistence used by the session service. Every read of an interview is
/// scoped to its owner; every status change is conditional on the status the
/// caller observed, so a transition is won by exactly one writer.
#[async_trait]
pub trait InterviewStore: Send + Sync {
    async fn insert_interview(
        &self,
        user_id: i32,
        config: &InterviewConfig,
    ) -> Result<Interview, SessionError>;

    async fn find_interview(&self, id: i32, user_id: i32)
        -> Result<Option<Interview>, SessionError>;

    async fn list_interviews(&self, user_id: i32) -> Result<Vec<InterviewSummary>, SessionError>;

    async fn append_message(
        &self,
        interview_id: i32,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, SessionError>;

    /// Messages in insertion order.
    async fn transcript(&self, interview_id: i32) -> Result<Vec<Message>, SessionError>;

    /// Persists a `setup -> active` transition together with the greeting.
    /// Returns false when the row had already left `setup`.
    async fn begin_with_greeting(
        &self,
        interview: &Interview,
        greeting: &str,
    ) -> Result<bool, SessionError>;

    /// Stores one AI turn and the new round of an active interview.
    async fn record_ai_turn(
        &self,
        interview_id: i32,
        round: i32,
        content: &str,
    ) -> Result<bool, SessionError>;

    /// Persists a terminal transition, plus an optional closing AI message,
    /// only if the row is still `active`.
    async fn close_interview(
        &self,
        interview: &Interview,
        closing: Option<&str>,
    ) -> Result<bool, SessionError>;

    async fn set_warning_count(&self, interview_id: i32, count: i32) -> Result<(), SessionError>;

    /// Inserts the report or overwrites the existing one for the same interview.
    async fn upsert_report(&self, draft: &ReportDraft) -> Result<Report, SessionError>;

    async fn find_report(&self, interview_id: i32, user_id: i32)
        -> Result<Option<Report>, SessionError>;

    async fn find_owner(&self, user_id: i32) -> Result<Option<OwnerProfile>, SessionError>;
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn timed(sql: &str, started: Instant, rows: Option<usize>) {
    LOGGER.log_database_query(sql, started.elapsed().as_millis(), rows);
}

#[async_trait]
impl InterviewStore for PgStore {
    async fn insert_interview(
        &self,
        user_id: i32,
        config: &InterviewConfig,
    ) -> Result<Interview, SessionError> {
        let interview = sqlx::query_as::<_, Interview>(
            r#"
            INSERT INTO interviews (user_id, interview_type, skills, duration_minutes)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(config.interview_type)
        .bind(&config.skills)
        .bind(config.duration_minutes)
        .fetch_one(&self.pool)
        .await?;

        Ok(interview)
    }

    async fn find_interview(
        &self,
        id: i32,
        user_id: i32,
    ) -> Result<Option<Interview>, SessionError> {
        let interview = sqlx::query_as::<_, Interview>(
            "SELECT * FROM interviews WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(interview)
    }

    async fn list_interviews(&self, user_id: i32) -> Result<Vec<InterviewSummary>, SessionError> {
        let sql = r#"
            SELECT i.*, r.overall_score, r.id AS report_id
            FROM interviews i
            LEFT JOIN interview_reports r ON r.interview_id = i.id
            WHERE i.user_id = $1
            ORDER BY i.created_at DESC
        "#;
        let started = Instant::now();
        let rows = sqlx::query_as::<_, InterviewSummary>(sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        timed(sql, started, Some(rows.len()));

        Ok(rows)
    }

    async fn append_message(
        &self,
        interview_id: i32,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, SessionError> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO interview_messages (interview_id, role, content)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(interview_id)
        .bind(role)
        .bind(content)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    async fn transcript(&self, interview_id: i32) -> Result<Vec<Message>, SessionError> {
        let sql = "SELECT * FROM interview_messages WHERE interview_id = $1 ORDER BY id";
        let started = Instant::now();
        let messages = sqlx::query_as::<_, Message>(sql)
            .bind(interview_id)
            .fetch_all(&self.pool)
            .await?;
        timed(sql, started, Some(messages.len()));

        Ok(messages)
    }

    async fn begin_with_greeting(
        &self,
        interview: &Interview,
        greeting: &str,
    ) -> Result<bool, SessionError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE interviews SET status = $2, started_at = $3, round = $4
            WHERE id = $1 AND status = 'setup'
            "#,
        )
        .bind(interview.id)
        .bind(interview.status)
        .bind(interview.started_at)
        .bind(interview.round)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO interview_messages (interview_id, role, content) VALUES ($1, $2, $3)",
        )
        .bind(interview.id)
        .bind(MessageRole::Ai)
        .bind(greeting)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn record_ai_turn(
        &self,
        interview_id: i32,
        round: i32,
        content: &str,
    ) -> Result<bool, SessionError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE interviews SET round = $2 WHERE id = $1 AND status = 'active'",
        )
        .bind(interview_id)
        .bind(round)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO interview_messages (interview_id, role, content) VALUES ($1, $2, $3)",
        )
        .bind(interview_id)
        .bind(MessageRole::Ai)
        .bind(content)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn close_interview(
        &self,
        interview: &Interview,
        closing: Option<&str>,
    ) -> Result<bool, SessionError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE interviews
            SET status = $2, ended_at = $3, termination_reason = $4, round = $5, warning_count = $6
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(interview.id)
        .bind(interview.status)
        .bind(interview.ended_at)
        .bind(interview.termination_reason)
        .bind(interview.round)
        .bind(interview.warning_count)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(content) = closing {
            sqlx::query(
                "INSERT INTO interview_messages (interview_id, role, content) VALUES ($1, $2, $3)",
            )
            .bind(interview.id)
            .bind(MessageRole::Ai)
            .bind(content)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn set_warning_count(&self, interview_id: i32, count: i32) -> Result<(), SessionError> {
        sqlx::query("UPDATE interviews SET warning_count = $2 WHERE id = $1")
            .bind(interview_id)
            .bind(count)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn upsert_report(&self, draft: &ReportDraft) -> Result<Report, SessionError> {
        let scores = &draft.scores;
        let report = sqlx::query_as::<_, Report>(
            r#"
            INSERT INTO interview_reports (
                interview_id, overall_score, technical_score, communication_score, hr_score,
                strengths, improvements, summary, learning_path, document_path
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (interview_id) DO UPDATE SET
                overall_score = EXCLUDED.overall_score,
                technical_score = EXCLUDED.technical_score,
                communication_score = EXCLUDED.communication_score,
                hr_score = EXCLUDED.hr_score,
                strengths = EXCLUDED.strengths,
                improvements = EXCLUDED.improvements,
                summary = EXCLUDED.summary,
                learning_path = EXCLUDED.learning_path,
                document_path = EXCLUDED.document_path,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(draft.interview_id)
        .bind(scores.overall_score)
        .bind(scores.technical_score)
        .bind(scores.communication_score)
        .bind(scores.hr_score)
        .bind(Json(&scores.strengths))
        .bind(Json(&scores.improvements))
        .bind(&scores.summary)
        .bind(Json(&draft.learning_path))
        .bind(&draft.document_path)
        .fetch_one(&self.pool)
        .await?;

        Ok(report)
    }

    async fn find_report(
        &self,
        interview_id: i32,
        user_id: i32,
    ) -> Result<Option<Report>, SessionError> {
        let report = sqlx::query_as::<_, Report>(
            r#"
            SELECT r.* FROM interview_reports r
            JOIN interviews i ON i.id = r.interview_id
            WHERE r.interview_id = $1 AND i.user_id = $2
            "#,
        )
        .bind(interview_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(report)
    }

    async fn find_owner(&self, user_id: i32) -> Result<Option<OwnerProfile>, SessionError> {
        let owner = sqlx::query_as::<_, OwnerProfile>(
            "SELECT id, name, email, education FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(owner)
    }
}
