use axum::{
    body::Body,
    extract::{Extension, Path, State},
    http::{header, StatusCode},
    response::{Json, Response},
};
use tokio::fs;

use crate::{
    middleware::auth::AuthUser,
    models::report::ReportView,
    utils::{errors::AppError, logger::LOGGER},
    AppState,
};

/// `:id` is the interview the report was generated for.
pub async fn get_report(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<ReportView>, AppError> {
    let view = state.sessions.report_view(auth_user.user_id, id).await?;
    LOGGER.log_request("GET", "/reports/:id", Some(auth_user.user_id), 200);
    Ok(Json(view))
}

pub async fn download_report(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Response<Body>, AppError> {
    let report = state.sessions.report_document(auth_user.user_id, id).await?;

    let content = fs::read(&report.document_path).await.map_err(|e| {
        tracing::warn!("Report document {} unreadable: {}", report.document_path, e);
        AppError::NotFound("Report document is not available".to_string())
    })?;

    LOGGER.log_request("GET", "/reports/:id/download", Some(auth_user.user_id), 200);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime::APPLICATION_PDF.as_ref())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"interview_report_{}.pdf\"", id),
        )
        .body(Body::from(content))
        .map_err(|_| AppError::InternalServerError("Failed to build response".to_string()))
}
