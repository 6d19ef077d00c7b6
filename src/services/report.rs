use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::clients::{LearningPlanner, ReportDocument, ReportRenderer, Scorer};
use crate::models::{
    interview::Interview,
    report::{Report, ReportDraft},
};
use crate::services::{defaults::DefaultArtifacts, session::SessionError, store::InterviewStore};
use crate::utils::logger::LOGGER;

/// Scoring, learning path, rendering and upsert for one finished interview.
/// Steps before the upsert fall back to `DefaultArtifacts`; only the upsert
/// (or loading the transcript) can fail the run.
pub struct ReportPipeline {
    store: Arc<dyn InterviewStore>,
    scorer: Arc<dyn Scorer>,
    planner: Arc<dyn LearningPlanner>,
    renderer: Arc<dyn ReportRenderer>,
    defaults: Arc<DefaultArtifacts>,
}

impl ReportPipeline {
    pub fn new(
        store: Arc<dyn InterviewStore>,
        scorer: Arc<dyn Scorer>,
        planner: Arc<dyn LearningPlanner>,
        renderer: Arc<dyn ReportRenderer>,
        defaults: Arc<DefaultArtifacts>,
    ) -> Self {
        Self {
            store,
            scorer,
            planner,
            renderer,
            defaults,
        }
    }

    pub async fn run(&self, interview: &Interview) -> Result<Report, SessionError> {
        let id = interview.id;
        let transcript = self.store.transcript(id).await?;

        let scores = match self.scorer.score(interview, &transcript).await {
            Ok(scores) => scores.clamped(),
            Err(e) => {
                LOGGER.log_fallback("scorer", Some(id), &e.to_string());
                self.defaults.scores()
            }
        };

        let learning_path = match self.planner.plan(interview, &scores).await {
            Ok(path) => path,
            Err(e) => {
                LOGGER.log_fallback("learning_planner", Some(id), &e.to_string());
                self.defaults.learning_path()
            }
        };

        let document_path = match self.store.find_owner(interview.user_id).await? {
            Some(owner) => {
                let document = ReportDocument {
                    owner,
                    interview: interview.clone(),
                    scores: scores.clone(),
                    transcript,
                    learning_path: learning_path.clone(),
                };
                match self.renderer.render(&document).await {
                    Ok(path) => path,
                    Err(e) => {
                        LOGGER.log_fallback("report_renderer", Some(id), &e.to_string());
                        self.defaults.document_path()
                    }
                }
            }
            None => {
                LOGGER.log_fallback("report_renderer", Some(id), "owner profile missing");
                self.defaults.document_path()
            }
        };

        let report = self
            .store
            .upsert_report(&ReportDraft {
                interview_id: id,
                scores,
                learning_path,
                document_path,
            })
            .await?;

        let mut metadata = HashMap::new();
        metadata.insert("interview_id".to_string(), json!(id));
        metadata.insert("report_id".to_string(), json!(report.id));
        metadata.insert("overall_score".to_string(), json!(report.overall_score));
        metadata.insert("has_document".to_string(), json!(!report.document_path.is_empty()));
        LOGGER.log_business_event("report_generated", Some(interview.user_id), metadata);

        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod stubs {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::clients::CollaboratorError;
    use crate::models::{
        message::Message,
        report::{LearningPathItem, ScoreCard},
    };

    use super::*;

    /// Scorer that returns a growing overall score per call, or always fails.
    pub(crate) struct CountingScorer {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl CountingScorer {
        pub(crate) fn new(fail: bool) -> Self {
            Self { calls: AtomicUsize::new(0), fail }
        }
    }

    #[async_trait]
    impl Scorer for CountingScorer {
        async fn score(
            &self,
            _interview: &Interview,
            transcript: &[Message],
        ) -> Result<ScoreCard, CollaboratorError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(CollaboratorError::Transport("scorer down".to_string()));
            }
            Ok(ScoreCard {
                overall_score: 50.0 + call as f64,
                technical_score: 120.0,
                communication_score: 60.0,
                hr_score: 55.0,
                strengths: vec!["Concise".to_string()],
                improvements: vec!["Depth".to_string()],
                summary: format!("Scored {} messages.", transcript.len()),
            })
        }
    }

    pub(crate) struct FixedPlanner(pub bool);

    #[async_trait]
    impl LearningPlanner for FixedPlanner {
        async fn plan(
            &self,
            _interview: &Interview,
            _scores: &ScoreCard,
        ) -> Result<Vec<LearningPathItem>, CollaboratorError> {
            if self.0 {
                return Err(CollaboratorError::Malformed("no JSON array".to_string()));
            }
            Ok(vec![LearningPathItem {
                category: "Technical".to_string(),
                topic: "Indexes".to_string(),
                description: "B-trees and query plans.".to_string(),
                resources: vec![],
                estimated_hours: 4.0,
                priority: "High".to_string(),
            }])
        }
    }

    pub(crate) struct FixedRenderer(pub bool);

    #[async_trait]
    impl ReportRenderer for FixedRenderer {
        async fn render(&self, document: &ReportDocument) -> Result<String, CollaboratorError> {
            if self.0 {
                return Err(CollaboratorError::Io("disk full".to_string()));
            }
            Ok(format!("reports/report_interview_{}.pdf", document.interview.id))
        }
    }
}
