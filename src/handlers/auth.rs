use axum::{extract::State, http::StatusCode, response::Json};
use bcrypt::{hash, verify, DEFAULT_COST};
use std::collections::HashMap;
use validator::Validate;

use crate::{
    models::user::{CreateUserRequest, LoginRequest, LoginResponse, User, UserResponse},
    utils::{errors::AppError, jwt::create_jwt, logger::LOGGER},
    AppState,
};

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    payload.validate()?;

    let password_hash = hash(&payload.password, DEFAULT_COST)
        .map_err(|_| AppError::InternalServerError("Failed to hash password".to_string()))?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, email, password_hash, education)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.email.to_lowercase())
    .bind(&password_hash)
    .bind(payload.education.trim())
    .fetch_one(&state.db)
    .await
    .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::Conflict("Email already registered".to_string()),
        other => other,
    })?;

    LOGGER.log_business_event("user_registered", Some(user.id), HashMap::new());
    LOGGER.log_request("POST", "/auth/register", Some(user.id), 201);

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    payload.validate()?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(payload.email.to_lowercase())
        .fetch_one(&state.db)
        .await
        .map_err(|_| AppError::Unauthorized("Invalid email or password".to_string()))?;

    let is_valid = verify(&payload.password, &user.password_hash)
        .map_err(|_| AppError::InternalServerError("Failed to verify password".to_string()))?;

    if !is_valid {
        return Err(AppError::Unauthorized("Invalid email or password".to_string()));
    }

    let token = create_jwt(user.id, &state.config.jwt_secret, state.config.jwt_ttl_hours)
        .map_err(|_| AppError::InternalServerError("Failed to create token".to_string()))?;

    LOGGER.log_request("POST", "/auth/login", Some(user.id), 200);

    Ok(Json(LoginResponse {
        token,
        token_type: "bearer",
        user: UserResponse::from(user),
    }))
}
