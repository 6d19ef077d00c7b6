use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::clients::{
    resume::detect_resume_kind, FaceDetector, LearningPlanner, QuestionGenerator, ReportRenderer,
    ResumeExtractor, ResumeIndex, Scorer, SpeechSynthesizer,
};
use crate::models::{
    interview::{
        Interview, InterviewConfig, InterviewStatus, InterviewSummary, TerminationReason,
        WarningResponse,
    },
    message::{Message, MessageRole, TurnResponse},
    report::{Report, ReportView},
};
use crate::services::{
    context::{ContextAssembler, OPENING_PROMPT},
    defaults::DefaultArtifacts,
    proctoring::{classify_frame, ProctorReply, ProctoringTracker},
    report::ReportPipeline,
    store::InterviewStore,
    time_budget::TimeBudget,
};
use crate::utils::{config::Config, logger::LOGGER};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    InvalidConfig(String),
    #[error("interview not found")]
    NotFound,
    #[error("report not found")]
    ReportNotFound,
    #[error("report document is not available")]
    DocumentUnavailable,
    #[error("cannot {action} an interview that is {}", .from.as_str())]
    InvalidTransition {
        from: InterviewStatus,
        action: &'static str,
    },
    #[error("{0}")]
    UnsupportedResume(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<sqlx::Error> for SessionError {
    fn from(err: sqlx::Error) -> Self {
        SessionError::Persistence(err.to_string())
    }
}

type LockMap = DashMap<i32, Arc<Mutex<()>>>;

/// One async mutex per interview id. Turn processing, violation recording
/// and terminal transitions of the same interview queue behind it.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: Arc<LockMap>,
}

impl SessionLocks {
    pub async fn acquire(&self, interview_id: i32) -> SessionGuard {
        let lock = self.locks.entry(interview_id).or_default().clone();
        SessionGuard {
            guard: Some(lock.lock_owned().await),
            locks: self.locks.clone(),
            interview_id,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Exclusive access to one interview. The registry entry is removed when the
/// last holder or waiter lets go.
pub struct SessionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
    interview_id: i32,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.interview_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// External capabilities the session flow calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn QuestionGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub extractor: Arc<dyn ResumeExtractor>,
    pub resume_index: Arc<dyn ResumeIndex>,
    pub scorer: Arc<dyn Scorer>,
    pub planner: Arc<dyn LearningPlanner>,
    pub renderer: Arc<dyn ReportRenderer>,
    pub face_detector: Arc<dyn FaceDetector>,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub upload_dir: PathBuf,
    pub public_base_url: String,
    pub resume_context_top_k: usize,
    pub warning_limit: u32,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            public_base_url: config.public_base_url.clone(),
            resume_context_top_k: config.resume_context_top_k,
            warning_limit: config.proctor_warning_limit,
        }
    }

    /// Public URL for a stored artifact path such as `audio/<uuid>.mp3`.
    fn public_url(&self, artifact: &str) -> String {
        format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            artifact.trim_start_matches('/')
        )
    }
}

/// Drives interviews through `setup -> active -> completed | terminated`.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn InterviewStore>,
    collaborators: Collaborators,
    pipeline: Arc<ReportPipeline>,
    defaults: Arc<DefaultArtifacts>,
    locks: Arc<SessionLocks>,
    tracker: Arc<ProctoringTracker>,
    settings: Arc<SessionSettings>,
}

/// Runs session work on its own task so a dropped request cannot cancel it
/// halfway through a turn.
async fn detached<T, F>(task: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, SessionError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(task)
        .await
        .map_err(|e| SessionError::Persistence(format!("session task failed: {}", e)))?
}

fn business_event(name: &str, interview: &Interview, extra: Vec<(&str, serde_json::Value)>) {
    let mut metadata: HashMap<String, serde_json::Value> = extra
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();
    metadata.insert("interview_id".to_string(), json!(interview.id));
    LOGGER.log_business_event(name, Some(interview.user_id), metadata);
}

impl SessionService {
    pub fn new(
        store: Arc<dyn InterviewStore>,
        collaborators: Collaborators,
        settings: SessionSettings,
    ) -> Self {
        let defaults = Arc::new(DefaultArtifacts);
        let pipeline = Arc::new(ReportPipeline::new(
            store.clone(),
            collaborators.scorer.clone(),
            collaborators.planner.clone(),
            collaborators.renderer.clone(),
            defaults.clone(),
        ));

        Self {
            store,
            pipeline,
            defaults,
            locks: Arc::new(SessionLocks::default()),
            tracker: Arc::new(ProctoringTracker::new(settings.warning_limit)),
            settings: Arc::new(settings),
            collaborators,
        }
    }

    pub async fn create(
        &self,
        user_id: i32,
        interview_type: &str,
        skills: &str,
        duration_minutes: i32,
    ) -> Result<Interview, SessionError> {
        let config = InterviewConfig::new(interview_type, skills, duration_minutes)?;
        let interview = self.store.insert_interview(user_id, &config).await?;

        business_event(
            "interview_created",
            &interview,
            vec![
                ("interview_type", json!(interview.interview_type.as_str())),
                ("duration_minutes", json!(interview.duration_minutes)),
            ],
        );
        Ok(interview)
    }

    pub async fn get(&self, user_id: i32, interview_id: i32) -> Result<Interview, SessionError> {
        self.store
            .find_interview(interview_id, user_id)
            .await?
            .ok_or(SessionError::NotFound)
    }

    pub async fn history(&self, user_id: i32) -> Result<Vec<InterviewSummary>, SessionError> {
        self.store.list_interviews(user_id).await
    }

    pub async fn start(
        &self,
        user_id: i32,
        interview_id: i32,
        resume: Vec<u8>,
    ) -> Result<TurnResponse, SessionError> {
        let this = self.clone();
        detached(async move { this.start_turn(user_id, interview_id, resume).await }).await
    }

    pub async fn advance(
        &self,
        user_id: i32,
        interview_id: i32,
        answer: String,
        elapsed_seconds: i64,
    ) -> Result<TurnResponse, SessionError> {
        let this = self.clone();
        detached(async move {
            this.advance_turn(user_id, interview_id, answer, elapsed_seconds)
                .await
        })
        .await
    }

    pub async fn end(&self, user_id: i32, interview_id: i32) -> Result<Report, SessionError> {
        let this = self.clone();
        detached(async move { this.end_session(user_id, interview_id).await }).await
    }

    pub async fn record_warning(
        &self,
        user_id: i32,
        interview_id: i32,
    ) -> Result<WarningResponse, SessionError> {
        let this = self.clone();
        detached(async move { this.escalate(user_id, interview_id).await }).await
    }

    async fn start_turn(
        &self,
        user_id: i32,
        interview_id: i32,
        resume: Vec<u8>,
    ) -> Result<TurnResponse, SessionError> {
        let _guard = self.locks.acquire(interview_id).await;
        let interview = self.get(user_id, interview_id).await?;
        let mut started = interview.clone();
        started.begin(Utc::now())?;

        let kind = detect_resume_kind(&resume).ok_or_else(|| {
            SessionError::UnsupportedResume("resume must be a PDF or plain-text file".to_string())
        })?;
        let path = self.settings.upload_dir.join(format!(
            "resume_{}_{}.{}",
            user_id,
            interview_id,
            kind.extension()
        ));
        tokio::fs::create_dir_all(&self.settings.upload_dir)
            .await
            .map_err(|e| SessionError::Persistence(format!("failed to create upload dir: {}", e)))?;
        tokio::fs::write(&path, &resume)
            .await
            .map_err(|e| SessionError::Persistence(format!("failed to save resume: {}", e)))?;

        let resume_context = self.index_resume(&interview, &resume).await;
        let messages = ContextAssembler {
            interview_type: interview.interview_type,
            skills: &interview.skills,
            duration_minutes: interview.duration_minutes,
            resume_context: &resume_context,
        }
        .assemble(&[], false, OPENING_PROMPT);

        let greeting = match self.collaborators.generator.generate(&messages).await {
            Ok(text) => text,
            Err(e) => {
                LOGGER.log_fallback("question_generator", Some(interview_id), &e.to_string());
                self.defaults.opening_greeting()
            }
        };

        if !self.store.begin_with_greeting(&started, &greeting).await? {
            return Err(self.lost_race(user_id, interview_id, "start").await);
        }
        self.tracker.seed(interview_id, 0);

        let audio_url = self.synthesize(interview_id, &greeting).await;
        business_event(
            "interview_started",
            &started,
            vec![("resume_indexed", json!(!resume_context.is_empty()))],
        );

        Ok(TurnResponse {
            question: greeting,
            audio_url,
            round: started.round,
            is_finished: false,
            time_remaining: None,
            time_warning: None,
            interview_id: Some(interview_id),
        })
    }

    async fn advance_turn(
        &self,
        user_id: i32,
        interview_id: i32,
        answer: String,
        elapsed_seconds: i64,
    ) -> Result<TurnResponse, SessionError> {
        let _guard = self.locks.acquire(interview_id).await;
        let interview = self.get(user_id, interview_id).await?;
        interview.ensure_active("answer")?;

        // The answer is stored before the clock is consulted.
        let answer_message = self
            .store
            .append_message(interview_id, MessageRole::User, &answer)
            .await?;

        let now = Utc::now();
        let elapsed = elapsed_seconds.max(interview.server_elapsed_seconds(now));
        let budget = TimeBudget::evaluate(interview.duration_minutes, elapsed);
        if budget == TimeBudget::Expired {
            return self.expire(interview, now).await;
        }

        let resume_context = self.resume_context(&interview, &answer).await;
        let prior: Vec<Message> = self
            .store
            .transcript(interview_id)
            .await?
            .into_iter()
            .filter(|message| message.id != answer_message.id)
            .collect();
        let messages = ContextAssembler {
            interview_type: interview.interview_type,
            skills: &interview.skills,
            duration_minutes: interview.duration_minutes,
            resume_context: &resume_context,
        }
        .assemble(&prior, budget.is_warning(), &answer);

        let question = match self.collaborators.generator.generate(&messages).await {
            Ok(text) => text,
            Err(e) => {
                LOGGER.log_fallback("question_generator", Some(interview_id), &e.to_string());
                self.defaults.question(interview.round, &e)
            }
        };

        let mut next = interview.clone();
        let round = next.next_round()?;
        if !self.store.record_ai_turn(interview_id, round, &question).await? {
            return Err(self.lost_race(user_id, interview_id, "answer").await);
        }

        let audio_url = self.synthesize(interview_id, &question).await;
        Ok(TurnResponse {
            question,
            audio_url,
            round,
            is_finished: false,
            time_remaining: Some(budget.remaining()),
            time_warning: Some(budget.is_warning()),
            interview_id: None,
        })
    }

    async fn expire(
        &self,
        interview: Interview,
        now: DateTime<Utc>,
    ) -> Result<TurnResponse, SessionError> {
        let closing = self.defaults.closing_message();
        let mut closed = interview;
        closed.next_round()?;
        closed.complete(now)?;

        if !self.store.close_interview(&closed, Some(&closing)).await? {
            return Err(self.lost_race(closed.user_id, closed.id, "answer").await);
        }
        self.finish(&closed, "time_expired").await?;

        let audio_url = self.synthesize(closed.id, &closing).await;
        Ok(TurnResponse {
            question: closing,
            audio_url,
            round: closed.round,
            is_finished: true,
            time_remaining: Some(0),
            time_warning: Some(false),
            interview_id: None,
        })
    }

    async fn end_session(&self, user_id: i32, interview_id: i32) -> Result<Report, SessionError> {
        let _guard = self.locks.acquire(interview_id).await;
        let mut closed = self.get(user_id, interview_id).await?;
        closed.complete(Utc::now())?;

        if !self.store.close_interview(&closed, None).await? {
            return Err(self.lost_race(user_id, interview_id, "end").await);
        }
        self.finish(&closed, "explicit_end").await
    }

    async fn escalate(
        &self,
        user_id: i32,
        interview_id: i32,
    ) -> Result<WarningResponse, SessionError> {
        let _guard = self.locks.acquire(interview_id).await;
        let interview = self.get(user_id, interview_id).await?;
        interview.ensure_active("record a warning for")?;

        let persisted = u32::try_from(interview.warning_count).unwrap_or(0);
        let escalation = self.tracker.next_violation(interview_id, persisted);
        let count = i32::try_from(escalation.count).unwrap_or(i32::MAX);

        if !escalation.should_terminate {
            self.store.set_warning_count(interview_id, count).await?;
            self.tracker.commit(interview_id, escalation.count);
            business_event(
                "violation_recorded",
                &interview,
                vec![("warning_count", json!(escalation.count))],
            );
            return Ok(WarningResponse {
                warning_count: escalation.count,
                terminate: false,
                message: None,
            });
        }

        let mut closed = interview;
        closed.warning_count = count;
        closed.terminate(TerminationReason::ProctoringViolation, Utc::now())?;
        if !self.store.close_interview(&closed, None).await? {
            return Err(self.lost_race(user_id, interview_id, "terminate").await);
        }
        business_event(
            "violation_recorded",
            &closed,
            vec![("warning_count", json!(escalation.count))],
        );
        self.finish(&closed, "proctoring_violation").await?;

        Ok(WarningResponse {
            warning_count: escalation.count,
            terminate: true,
            message: Some(format!(
                "Interview terminated due to {} proctoring violations.",
                escalation.count
            )),
        })
    }

    /// Report generation for an interview whose terminal transition this
    /// caller just persisted.
    async fn finish(&self, interview: &Interview, trigger: &str) -> Result<Report, SessionError> {
        self.tracker.forget(interview.id);
        let report = self.pipeline.run(interview).await?;

        let event = match interview.status {
            InterviewStatus::Terminated => "interview_terminated",
            _ => "interview_completed",
        };
        business_event(
            event,
            interview,
            vec![
                ("trigger", json!(trigger)),
                ("round", json!(interview.round)),
                ("report_id", json!(report.id)),
            ],
        );
        Ok(report)
    }

    /// The conditional write found the row in another state; report that state.
    async fn lost_race(&self, user_id: i32, interview_id: i32, action: &'static str) -> SessionError {
        match self.store.find_interview(interview_id, user_id).await {
            Ok(Some(current)) => SessionError::InvalidTransition {
                from: current.status,
                action,
            },
            Ok(None) => SessionError::NotFound,
            Err(e) => e,
        }
    }

    /// Extracts and indexes the resume, then retrieves the passages closest to
    /// the interview's skills. Failures leave the context empty.
    async fn index_resume(&self, interview: &Interview, resume: &[u8]) -> String {
        let text = match self.collaborators.extractor.extract(resume).await {
            Ok(text) => text,
            Err(e) => {
                LOGGER.log_fallback("resume_extractor", Some(interview.id), &e.to_string());
                return String::new();
            }
        };

        if let Err(e) = self
            .collaborators
            .resume_index
            .store(interview.user_id, &text)
            .await
        {
            LOGGER.log_fallback("resume_index", Some(interview.id), &e.to_string());
            return String::new();
        }

        self.resume_context(interview, &interview.skills).await
    }

    async fn resume_context(&self, interview: &Interview, query: &str) -> String {
        match self
            .collaborators
            .resume_index
            .retrieve(interview.user_id, query, self.settings.resume_context_top_k)
            .await
        {
            Ok(context) => context,
            Err(e) => {
                LOGGER.log_fallback("resume_index", Some(interview.id), &e.to_string());
                String::new()
            }
        }
    }

    async fn synthesize(&self, interview_id: i32, text: &str) -> Option<String> {
        match self.collaborators.speech.synthesize(text).await {
            Ok(artifact) => Some(self.settings.public_url(&artifact)),
            Err(e) => {
                LOGGER.log_fallback("speech_synthesizer", Some(interview_id), &e.to_string());
                None
            }
        }
    }

    pub async fn report_view(
        &self,
        user_id: i32,
        interview_id: i32,
    ) -> Result<ReportView, SessionError> {
        let interview = self.get(user_id, interview_id).await?;
        let report = self
            .store
            .find_report(interview_id, user_id)
            .await?
            .ok_or(SessionError::ReportNotFound)?;
        let transcript = self.store.transcript(interview_id).await?;
        let owner = self
            .store
            .find_owner(user_id)
            .await?
            .ok_or(SessionError::NotFound)?;

        Ok(ReportView {
            interview: interview.into(),
            report,
            transcript,
            user: owner,
        })
    }

    /// The report whose rendered document can be downloaded.
    pub async fn report_document(
        &self,
        user_id: i32,
        interview_id: i32,
    ) -> Result<Report, SessionError> {
        let report = self
            .store
            .find_report(interview_id, user_id)
            .await?
            .ok_or(SessionError::ReportNotFound)?;

        if report.document_path.is_empty() {
            return Err(SessionError::DocumentUnavailable);
        }
        Ok(report)
    }

    /// Checks ownership before a proctoring stream opens and makes sure the
    /// violation counter of a live interview reflects the persisted count.
    pub async fn open_proctoring(
        &self,
        user_id: i32,
        interview_id: i32,
    ) -> Result<Interview, SessionError> {
        let interview = self.get(user_id, interview_id).await?;
        if !interview.status.is_terminal() {
            self.tracker
                .seed(interview_id, u32::try_from(interview.warning_count).unwrap_or(0));
        }
        Ok(interview)
    }

    /// Classifies one frame and reports the current violation standing. Frames
    /// never change the count; violations are recorded through `record_warning`.
    pub async fn inspect_frame(&self, user_id: i32, interview_id: i32, image: &str) -> ProctorReply {
        let alert = classify_frame(self.collaborators.face_detector.as_ref(), image).await;
        let (warning_count, terminate) = match self.tracker.current(interview_id) {
            Some(count) => (count, count >= self.tracker.limit()),
            None => self.persisted_standing(user_id, interview_id).await,
        };

        ProctorReply {
            alert,
            warning_count,
            terminate,
        }
    }

    /// Standing of an interview without a live counter, read from its row.
    async fn persisted_standing(&self, user_id: i32, interview_id: i32) -> (u32, bool) {
        match self.store.find_interview(interview_id, user_id).await {
            Ok(Some(interview)) => {
                let count = u32::try_from(interview.warning_count).unwrap_or(0);
                if interview.status.is_terminal() {
                    (count, interview.status == InterviewStatus::Terminated)
                } else {
                    (self.tracker.seed(interview_id, count), false)
                }
            }
            Ok(None) => (0, false),
            Err(e) => {
                tracing::warn!("proctoring standing unavailable for interview {}: {}", interview_id, e);
                (0, false)
            }
        }
    }
}
