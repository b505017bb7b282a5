use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppError,
    limits::{Action, Subject},
    middleware::AuthUser,
    routes::{enforce_quota, page_limit},
    utils::success_to_api_response,
};

use super::model::{
    Channel, CreateChannelRequest, Message, MessagesQuery, PostMessageRequest,
    normalize_channel_name, validate_description, validate_message,
};

#[axum::debug_handler]
pub async fn list_channels(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let channels = Channel::list(&state.pool).await?;
    Ok(success_to_api_response(channels))
}

#[axum::debug_handler]
pub async fn create_channel(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = normalize_channel_name(&req.name)?;
    let description = req.description.trim();
    validate_description(description)?;

    let taken = || AppError::Conflict(format!("channel `{name}` already exists"));
    if Channel::find_by_name(&state.pool, &name).await?.is_some() {
        return Err(taken());
    }

    enforce_quota(&state, &Subject::user(auth.id), Action::CreateChannel).await?;

    // A concurrent create can still win between the lookup and the insert.
    let channel = Channel::create(&state.pool, &name, description, auth.id, state.clock.now())
        .await?
        .ok_or_else(taken)?;

    tracing::info!("{} created channel {}", auth.username, channel.name);
    Ok((StatusCode::CREATED, success_to_api_response(channel)))
}

#[axum::debug_handler]
pub async fn get_channel(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let channel = Channel::find_by_name(&state.pool, &name.to_lowercase())
        .await?
        .ok_or(AppError::NotFound("channel"))?;
    Ok(success_to_api_response(channel))
}

#[axum::debug_handler]
pub async fn list_messages(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = page_limit(query.limit, 50, 100)?;
    let channel = Channel::find_by_name(&state.pool, &name.to_lowercase())
        .await?
        .ok_or(AppError::NotFound("channel"))?;

    let messages = match query.since {
        Some(since) => Message::since(&state.pool, channel.id, since, limit).await?,
        None => Message::recent(&state.pool, channel.id, limit).await?,
    };
    Ok(success_to_api_response(messages))
}

#[axum::debug_handler]
pub async fn post_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(name): Path<String>,
    Json(req): Json<PostMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_message(&req.content)?;
    let channel = Channel::find_by_name(&state.pool, &name.to_lowercase())
        .await?
        .ok_or(AppError::NotFound("channel"))?;

    enforce_quota(&state, &Subject::user(auth.id), Action::PostMessage).await?;

    let message = Message::create(
        &state.pool,
        channel.id,
        auth.id,
        &auth.username,
        &req.content,
        state.clock.now(),
    )
    .await?;

    Ok((StatusCode::CREATED, success_to_api_response(message)))
}
