use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub interview_id: i32,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Ai,
    User,
}

impl MessageRole {
    /// Speaker label used in rendered transcripts and scoring prompts.
    pub fn speaker(self) -> &'static str {
        match self {
            MessageRole::Ai => "AI Interviewer",
            MessageRole::User => "Candidate",
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 10000))]
    pub user_answer: String,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub elapsed_seconds: i64,
}

/// What the candidate sees after every AI turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub question: String,
    pub audio_url: Option<String>,
    pub round: i32,
    pub is_finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_warning: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interview_id: Option<i32>,
}
