use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::services::session::SessionError;

/// Durations (in minutes) a candidate may pick at setup.
pub const ALLOWED_DURATIONS: &[i32] = &[5, 10, 15, 20, 30, 45, 60];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Interview {
    pub id: i32,
    pub user_id: i32,
    pub status: InterviewStatus,
    pub interview_type: InterviewType,
    pub skills: String,
    pub duration_minutes: i32,
    pub round: i32,
    pub warning_count: i32,
    pub termination_reason: Option<TerminationReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "interview_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InterviewStatus {
    Setup,
    Active,
    Completed,
    Terminated,
}

impl InterviewStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, InterviewStatus::Completed | InterviewStatus::Terminated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InterviewStatus::Setup => "setup",
            InterviewStatus::Active => "active",
            InterviewStatus::Completed => "completed",
            InterviewStatus::Terminated => "terminated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "interview_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InterviewType {
    Technical,
    Hr,
    Mixed,
}

impl InterviewType {
    /// Strict parse used when a session is configured.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "technical" => Some(InterviewType::Technical),
            "hr" => Some(InterviewType::Hr),
            "mixed" => Some(InterviewType::Mixed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InterviewType::Technical => "technical",
            InterviewType::Hr => "hr",
            InterviewType::Mixed => "mixed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "termination_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    ProctoringViolation,
}

/// Validated setup parameters for a new interview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterviewConfig {
    pub interview_type: InterviewType,
    pub skills: String,
    pub duration_minutes: i32,
}

impl InterviewConfig {
    pub fn new(
        interview_type: &str,
        skills: &str,
        duration_minutes: i32,
    ) -> Result<Self, SessionError> {
        let interview_type = InterviewType::parse(interview_type).ok_or_else(|| {
            SessionError::InvalidConfig(format!(
                "interview_type must be one of technical, hr, mixed (got '{}')",
                interview_type
            ))
        })?;

        if !ALLOWED_DURATIONS.contains(&duration_minutes) {
            return Err(SessionError::InvalidConfig(format!(
                "duration_minutes must be one of {:?} (got {})",
                ALLOWED_DURATIONS, duration_minutes
            )));
        }

        Ok(Self {
            interview_type,
            skills: skills.trim().to_string(),
            duration_minutes,
        })
    }
}

// Lifecycle transitions. Every mutation of `status`, `round`, `started_at` and
// `ended_at` goes through these so the timestamp invariants hold by construction.
impl Interview {
    fn require(&self, expected: InterviewStatus, action: &'static str) -> Result<(), SessionError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                from: self.status,
                action,
            })
        }
    }

    pub fn ensure_active(&self, action: &'static str) -> Result<(), SessionError> {
        self.require(InterviewStatus::Active, action)
    }

    /// setup -> active, recording the opening AI turn as round 1.
    pub fn begin(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.require(InterviewStatus::Setup, "start")?;
        self.status = InterviewStatus::Active;
        self.started_at = Some(now);
        self.round = 1;
        Ok(())
    }

    /// Records one more AI turn on an active interview.
    pub fn next_round(&mut self) -> Result<i32, SessionError> {
        self.ensure_active("advance")?;
        self.round += 1;
        Ok(self.round)
    }

    /// active -> completed.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.require(InterviewStatus::Active, "complete")?;
        self.status = InterviewStatus::Completed;
        self.ended_at = Some(now);
        Ok(())
    }

    /// active -> terminated.
    pub fn terminate(
        &mut self,
        reason: TerminationReason,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.require(InterviewStatus::Active, "terminate")?;
        self.status = InterviewStatus::Terminated;
        self.termination_reason = Some(reason);
        self.ended_at = Some(now);
        Ok(())
    }

    /// Seconds since the server recorded the start of the interview.
    pub fn server_elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        self.started_at
            .map(|started| (now - started).num_seconds().max(0))
            .unwrap_or(0)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInterviewRequest {
    #[serde(default = "default_duration")]
    pub duration_minutes: i32,
    #[serde(default = "default_type")]
    pub interview_type: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub skills: String,
}

fn default_duration() -> i32 {
    10
}

fn default_type() -> String {
    "mixed".to_string()
}

#[derive(Debug, Serialize)]
pub struct CreateInterviewResponse {
    pub interview_id: i32,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct InterviewResponse {
    pub id: i32,
    pub user_id: i32,
    pub status: InterviewStatus,
    pub interview_type: InterviewType,
    pub skills: String,
    pub duration_minutes: i32,
    pub round: i32,
    pub warning_count: i32,
    pub termination_reason: Option<TerminationReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Interview> for InterviewResponse {
    fn from(interview: Interview) -> Self {
        Self {
            id: interview.id,
            user_id: interview.user_id,
            status: interview.status,
            interview_type: interview.interview_type,
            skills: interview.skills,
            duration_minutes: interview.duration_minutes,
            round: interview.round,
            warning_count: interview.warning_count,
            termination_reason: interview.termination_reason,
            started_at: interview.started_at,
            ended_at: interview.ended_at,
            created_at: interview.created_at,
        }
    }
}

/// One row of the history listing: the interview plus its report headline, if any.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InterviewSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub interview: Interview,
    pub overall_score: Option<f64>,
    pub report_id: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct WarningResponse {
    pub warning_count: u32,
    pub terminate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EndResponse {
    pub message: &'static str,
    pub report_id: i32,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub interviews: Vec<InterviewSummary>,
}

#[cfg(test)]
pub(crate) fn sample_interview(status: InterviewStatus) -> Interview {
    let now = Utc::now();
    Interview {
        id: 1,
        user_id: 7,
        status,
        interview_type: InterviewType::Technical,
        skills: "Go,SQL".to_string(),
        duration_minutes: 10,
        round: if status == InterviewStatus::Setup { 0 } else { 1 },
        warning_count: 0,
        termination_reason: None,
        started_at: (status != InterviewStatus::Setup).then_some(now),
        ended_at: status.is_terminal().then_some(now),
        created_at: now,
    }
}
