use axum::{
    extract::{Extension, Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppError,
    limits::{Action, Subject},
    middleware::{AuthUser, ClientIp},
    routes::{enforce_quota, page_limit, page_offset},
    utils::{generate_token, success_to_api_response},
};

use super::model::{
    DirectoryQuery, ProfileResponse, RegisterRequest, RegisterResponse, User, validate_username,
};

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    // Invalid names must not use up the address's quota.
    let username = req.username.trim();
    validate_username(username)?;

    let subject = Subject::ip(&ip).map_err(|e| AppError::Validation(e.to_string()))?;
    enforce_quota(&state, &subject, Action::Register).await?;

    let user = User::create(&state.pool, username, &ip, state.clock.now())
        .await?
        .ok_or_else(|| AppError::Conflict(format!("username `{username}` is already taken")))?;

    let (token, expires_at) = generate_token(user.id, &state.config)?;

    Ok((
        StatusCode::CREATED,
        success_to_api_response(RegisterResponse {
            id: user.id,
            username: user.username,
            token,
            expires_at,
        }),
    ))
}

#[axum::debug_handler]
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let user = User::find_by_id(&state.pool, auth.id)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    let eligibility = state.edit_gate.check_eligibility(user.id).await?;

    Ok(success_to_api_response(ProfileResponse {
        id: user.id,
        created_at: user.created_at(),
        last_edit_at: user.last_edit_at(),
        username: user.username,
        can_edit: eligibility.is_eligible(),
        next_edit_at: eligibility.next_eligible_at(),
    }))
}

#[axum::debug_handler]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<DirectoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = page_limit(query.limit, 50, 100)?;
    let offset = page_offset(query.offset)?;
    let directory = User::directory(&state.pool, limit, offset).await?;
    Ok(success_to_api_response(directory))
}
