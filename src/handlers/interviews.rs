use axum::{
    extract::{Extension, Multipart, Path, State},
    http::StatusCode,
    response::Json,
};
use validator::Validate;

use crate::{
    middleware::auth::AuthUser,
    models::{
        interview::{
            CreateInterviewRequest, CreateInterviewResponse, EndResponse, HistoryResponse,
            InterviewResponse, WarningResponse,
        },
        message::{ChatRequest, TurnResponse},
    },
    utils::{errors::AppError, logger::LOGGER},
    AppState,
};

pub async fn create_interview(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<CreateInterviewRequest>,
) -> Result<(StatusCode, Json<CreateInterviewResponse>), AppError> {
    payload.validate()?;

    let interview = state
        .sessions
        .create(
            auth_user.user_id,
            &payload.interview_type,
            &payload.skills,
            payload.duration_minutes,
        )
        .await?;
    LOGGER.log_request("POST", "/interviews", Some(auth_user.user_id), 201);

    Ok((
        StatusCode::CREATED,
        Json(CreateInterviewResponse {
            interview_id: interview.id,
            message: "Interview created. Upload resume to start.".to_string(),
        }),
    ))
}

/// Accepts the resume as multipart field `file` and returns the opening question.
pub async fn start_interview(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
    mut multipart: Multipart,
) -> Result<Json<TurnResponse>, AppError> {
    let mut resume = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::BadRequest("Malformed multipart body".to_string()))?
    {
        if field.name() == Some("file") {
            let data = field
                .bytes()
                .await
                .map_err(|_| AppError::BadRequest("Failed to read resume upload".to_string()))?;
            resume = Some(data.to_vec());
        }
    }

    let resume = resume
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| AppError::BadRequest("A non-empty 'file' field is required".to_string()))?;

    let turn = state.sessions.start(auth_user.user_id, id, resume).await?;
    LOGGER.log_request("POST", "/interviews/:id/start", Some(auth_user.user_id), 200);
    Ok(Json(turn))
}

pub async fn chat(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    payload.validate()?;

    let turn = state
        .sessions
        .advance(
            auth_user.user_id,
            id,
            payload.user_answer,
            payload.elapsed_seconds,
        )
        .await?;
    LOGGER.log_request("POST", "/interviews/:id/chat", Some(auth_user.user_id), 200);

    Ok(Json(turn))
}

pub async fn record_warning(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<WarningResponse>, AppError> {
    let outcome = state.sessions.record_warning(auth_user.user_id, id).await?;
    LOGGER.log_request("POST", "/interviews/:id/warning", Some(auth_user.user_id), 200);
    Ok(Json(outcome))
}

pub async fn end_interview(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<EndResponse>, AppError> {
    let report = state.sessions.end(auth_user.user_id, id).await?;
    LOGGER.log_request("POST", "/interviews/:id/end", Some(auth_user.user_id), 200);

    Ok(Json(EndResponse {
        message: "Interview ended",
        report_id: report.id,
    }))
}

pub async fn get_history(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<HistoryResponse>, AppError> {
    let interviews = state.sessions.history(auth_user.user_id).await?;
    LOGGER.log_request("GET", "/interviews", Some(auth_user.user_id), 200);
    Ok(Json(HistoryResponse { interviews }))
}

pub async fn get_interview(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<InterviewResponse>, AppError> {
    let interview = state.sessions.get(auth_user.user_id, id).await?;
    LOGGER.log_request("GET", "/interviews/:id", Some(auth_user.user_id), 200);
    Ok(Json(InterviewResponse::from(interview)))
}
