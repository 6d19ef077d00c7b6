//! Proctoring websocket.
//!
//! Client -> Server (JSON):
//! ```json
//! {"image": "data:image/jpeg;base64,..."}
//! ```
//!
//! Server -> Client (JSON):
//! ```json
//! {"alert": "LOOKING_LEFT", "warning_count": 1, "terminate": false}
//! ```

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::{
    middleware::auth::AuthUser,
    services::session::SessionService,
    utils::{errors::AppError, logger::LOGGER},
    AppState,
};

#[derive(Deserialize)]
pub struct ProctorQuery {
    token: String,
}

#[derive(Debug, Deserialize)]
struct FrameIn {
    image: String,
}

/// Browsers cannot set headers on a websocket handshake, so the bearer token
/// travels as `?token=`.
pub async fn proctor_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(interview_id): Path<i32>,
    Query(params): Query<ProctorQuery>,
) -> Result<Response, AppError> {
    let auth_user = AuthUser::from_token(&params.token, &state.config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    state
        .sessions
        .open_proctoring(auth_user.user_id, interview_id)
        .await?;

    LOGGER.log_request("GET", "/ws/proctor/:id", Some(auth_user.user_id), 101);

    let sessions = state.sessions.clone();
    let user_id = auth_user.user_id;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, sessions, user_id, interview_id)))
}

async fn handle_socket(
    socket: WebSocket,
    sessions: SessionService,
    user_id: i32,
    interview_id: i32,
) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let reply = match serde_json::from_str::<FrameIn>(&text) {
            Ok(frame) => sessions.inspect_frame(user_id, interview_id, &frame.image).await,
            Err(e) => {
                tracing::warn!("invalid proctoring frame for interview {}: {}", interview_id, e);
                sessions.inspect_frame(user_id, interview_id, "").await
            }
        };

        if reply.alert.is_violation() {
            tracing::debug!(
                "interview {} proctoring alert {:?} ({} warnings)",
                interview_id,
                reply.alert,
                reply.warning_count
            );
        }

        let payload = match serde_json::to_string(&reply) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("failed to encode proctoring reply: {}", e);
                break;
            }
        };
        if sender.send(Message::Text(payload)).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::proctoring::{ProctorAlert, ProctorReply};

    #[test]
    fn frame_requires_image_field() {
        let frame: FrameIn = serde_json::from_str(r#"{"image": "data:image/png;base64,AAAA"}"#).unwrap();
        assert!(frame.image.starts_with("data:image/png"));
        assert!(serde_json::from_str::<FrameIn>(r#"{"frame": "x"}"#).is_err());
    }

    #[test]
    fn reply_serializes_wire_shape() {
        let reply = ProctorReply {
            alert: ProctorAlert::MultiplePeople,
            warning_count: 2,
            terminate: false,
        };
        assert_eq!(
            serde_json::to_value(reply).unwrap(),
            serde_json::json!({"alert": "MULTIPLE_PEOPLE", "warning_count": 2, "terminate": false})
        );
    }
}
