use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::{llm::ChatCompletionClient, ChatMessage, CollaboratorError, LearningPlanner, Scorer};
use crate::models::{
    interview::Interview,
    message::Message,
    report::{LearningPathItem, ScoreCard},
};

pub struct LlmScorer {
    client: Arc<ChatCompletionClient>,
    model: String,
}

impl LlmScorer {
    pub fn new(client: Arc<ChatCompletionClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

pub fn transcript_text(transcript: &[Message]) -> String {
    transcript
        .iter()
        .map(|m| format!("{}: {}", m.role.speaker(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn scoring_prompt(interview: &Interview, transcript: &[Message]) -> String {
    format!(
        r#"You are an expert interview evaluator. Analyze the following interview transcript and provide a structured evaluation.

Interview Type: {kind}
Candidate Skills: {skills}

TRANSCRIPT:
{transcript}

Return a JSON object with EXACTLY this structure (no markdown, pure JSON):
{{
  "overall_score": <0-100 integer>,
  "technical_score": <0-100 integer>,
  "communication_score": <0-100 integer>,
  "hr_score": <0-100 integer>,
  "strengths": ["strength1", "strength2", "strength3"],
  "improvements": ["area1", "area2", "area3"],
  "summary": "<2-3 sentence overall assessment>"
}}

Be strict and honest. Score based on:
- technical_score: depth of technical knowledge, accuracy of answers
- communication_score: clarity, fluency, structure of responses
- hr_score: behavioral responses, professionalism, soft skills
- overall_score: weighted average"#,
        kind = interview.interview_type.as_str(),
        skills = interview.skills,
        transcript = transcript_text(transcript),
    )
}

fn learning_path_prompt(interview: &Interview, scores: &ScoreCard) -> String {
    let improvements = scores
        .improvements
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Based on the following interview performance data, create a personalized learning path.

Skills: {skills}
Interview Type: {kind}
Overall Score: {overall}/100
Technical Score: {technical}/100
Communication Score: {communication}/100
HR Score: {hr}/100

Areas to Improve:
{improvements}

Generate a learning path JSON array with 5-7 items. Each item must have this structure:
{{
  "category": "Technical" | "Communication" | "Behavioral",
  "topic": "<specific topic to learn>",
  "description": "<1-2 sentence explanation of why this is important>",
  "resources": ["<resource1>", "<resource2>"],
  "estimated_hours": <number>,
  "priority": "High" | "Medium" | "Low"
}}

Return ONLY the JSON array, no markdown."#,
        skills = interview.skills,
        kind = interview.interview_type.as_str(),
        overall = scores.overall_score,
        technical = scores.technical_score,
        communication = scores.communication_score,
        hr = scores.hr_score,
        improvements = improvements,
    )
}

/// Parses the outermost `open ... close` span of a model reply, ignoring any
/// prose or code fences around it.
pub fn extract_json<T: DeserializeOwned>(
    raw: &str,
    open: char,
    close: char,
) -> Result<T, CollaboratorError> {
    let start = raw.find(open);
    let end = raw.rfind(close);
    match (start, end) {
        (Some(start), Some(end)) if end > start => serde_json::from_str(&raw[start..=end])
            .map_err(|e| CollaboratorError::Malformed(e.to_string())),
        _ => Err(CollaboratorError::Malformed(format!(
            "no JSON {}...{} span in reply",
            open, close
        ))),
    }
}

#[async_trait]
impl Scorer for LlmScorer {
    async fn score(
        &self,
        interview: &Interview,
        transcript: &[Message],
    ) -> Result<ScoreCard, CollaboratorError> {
        if transcript.is_empty() {
            return Err(CollaboratorError::Malformed("empty transcript".to_string()));
        }

        let prompt = scoring_prompt(interview, transcript);
        let raw = self
            .client
            .complete(&self.model, &[ChatMessage::user(prompt)], 600, 0.3)
            .await?;

        extract_json::<ScoreCard>(&raw, '{', '}').map(ScoreCard::clamped)
    }
}

pub struct LlmPlanner {
    client: Arc<ChatCompletionClient>,
    model: String,
}

impl LlmPlanner {
    pub fn new(client: Arc<ChatCompletionClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl LearningPlanner for LlmPlanner {
    async fn plan(
        &self,
        interview: &Interview,
        scores: &ScoreCard,
    ) -> Result<Vec<LearningPathItem>, CollaboratorError> {
        let prompt = learning_path_prompt(interview, scores);
        let raw = self
            .client
            .complete(&self.model, &[ChatMessage::user(prompt)], 1000, 0.4)
            .await?;

        let items: Vec<LearningPathItem> = extract_json(&raw, '[', ']')?;
        if items.is_empty() {
            return Err(CollaboratorError::Malformed("empty learning path".to_string()));
        }
        Ok(items)
    }
}
