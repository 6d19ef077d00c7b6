use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};

use crate::models::{interview::InterviewResponse, message::Message, user::OwnerProfile};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Report {
    pub id: i32,
    pub interview_id: i32,
    pub overall_score: f64,
    pub technical_score: f64,
    pub communication_score: f64,
    pub hr_score: f64,
    pub strengths: Json<Vec<String>>,
    pub improvements: Json<Vec<String>>,
    pub summary: String,
    pub learning_path: Json<Vec<LearningPathItem>>,
    pub document_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Scorer output. Scores are clamped to [0, 100] before they are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub overall_score: f64,
    pub technical_score: f64,
    pub communication_score: f64,
    pub hr_score: f64,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

impl ScoreCard {
    pub fn clamped(mut self) -> Self {
        for score in [
            &mut self.overall_score,
            &mut self.technical_score,
            &mut self.communication_score,
            &mut self.hr_score,
        ] {
            *score = if score.is_finite() {
                score.clamp(0.0, 100.0)
            } else {
                0.0
            };
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPathItem {
    pub category: String,
    pub topic: String,
    pub description: String,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub estimated_hours: f64,
    pub priority: String,
}

/// Everything the pipeline upserts for one interview.
#[derive(Debug, Clone)]
pub struct ReportDraft {
    pub interview_id: i32,
    pub scores: ScoreCard,
    pub learning_path: Vec<LearningPathItem>,
    pub document_path: String,
}

#[derive(Debug, Serialize)]
pub struct ReportView {
    pub interview: InterviewResponse,
    pub report: Report,
    pub transcript: Vec<Message>,
    pub user: OwnerProfile,
}
