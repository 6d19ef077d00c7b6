//! Seams to the external capabilities the interview flow depends on.
//!
//! Every call returns `Result<_, CollaboratorError>`; the session and report
//! services decide which fallback applies when a call fails.

pub mod llm;
pub mod pdf;
pub mod resume;
pub mod scoring;
pub mod speech;
pub mod vision;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{
    interview::Interview,
    message::Message,
    report::{LearningPathItem, ScoreCard},
    user::OwnerProfile,
};

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{0} is not configured")]
    Disabled(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        CollaboratorError::Transport(err.to_string())
    }
}

impl From<std::io::Error> for CollaboratorError {
    fn from(err: std::io::Error) -> Self {
        CollaboratorError::Io(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    Assistant,
    User,
}

/// One entry of the message list handed to the question generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, CollaboratorError>;
}

/// Turns text into a stored audio artifact and returns its relative path.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait ResumeExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8]) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait ResumeIndex: Send + Sync {
    /// Replaces the owner's indexed resume. Returns the number of stored chunks.
    async fn store(&self, owner_id: i32, text: &str) -> Result<usize, CollaboratorError>;

    /// Top-`k` passages relevant to `query`, newline-joined; empty when nothing matches.
    async fn retrieve(
        &self,
        owner_id: i32,
        query: &str,
        k: usize,
    ) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(
        &self,
        interview: &Interview,
        transcript: &[Message],
    ) -> Result<ScoreCard, CollaboratorError>;
}

#[async_trait]
pub trait LearningPlanner: Send + Sync {
    async fn plan(
        &self,
        interview: &Interview,
        scores: &ScoreCard,
    ) -> Result<Vec<LearningPathItem>, CollaboratorError>;
}

/// Inputs of a rendered report document.
#[derive(Debug, Clone)]
pub struct ReportDocument {
    pub owner: OwnerProfile,
    pub interview: Interview,
    pub scores: ScoreCard,
    pub transcript: Vec<Message>,
    pub learning_path: Vec<LearningPathItem>,
}

#[async_trait]
pub trait ReportRenderer: Send + Sync {
    /// Renders the document and returns where it was written.
    async fn render(&self, document: &ReportDocument) -> Result<String, CollaboratorError>;
}

/// A detected face, in pixels of the submitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FaceBox {
    pub origin_x: f64,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrameDetections {
    pub frame_width: f64,
    pub faces: Vec<FaceBox>,
}

#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, image: &[u8]) -> Result<FrameDetections, CollaboratorError>;
}
