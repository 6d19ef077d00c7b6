use crate::{utils::jwt::verify_jwt, AppState};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: i32,
}

impl AuthUser {
    /// Resolves a bearer token into the caller it was issued for.
    pub fn from_token(token: &str, secret: &str) -> Result<Self, StatusCode> {
        let claims = verify_jwt(token, secret).map_err(|_| StatusCode::UNAUTHORIZED)?;
        Ok(Self { user_id: claims.sub })
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let auth_user = AuthUser::from_token(token, &state.config.jwt_secret)?;

    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}
