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
    routes::{enforce_quota, page_limit, page_offset, user::User},
    utils::success_to_api_response,
};

use super::model::{
    InboxQuery, Mail, MailDeleted, SendMailRequest, SentMail, validate_mail_body,
};

#[axum::debug_handler]
pub async fn send_mail(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<SendMailRequest>,
) -> Result<impl IntoResponse, AppError> {
    let to = req.to.trim();
    if to.is_empty() {
        return Err(AppError::Validation("recipient is required".to_string()));
    }
    if to == auth.username {
        return Err(AppError::Validation("cannot send mail to yourself".to_string()));
    }
    validate_mail_body(&req.body)?;

    let recipient = User::find_by_username(&state.pool, to)
        .await?
        .ok_or(AppError::NotFound("recipient"))?;

    enforce_quota(&state, &Subject::user(auth.id), Action::SendMail).await?;

    let now = state.clock.now();
    let id = Mail::send(&state.pool, auth.id, recipient.id, &req.body, now).await?;
    tracing::debug!("{} mailed {} (#{})", auth.username, recipient.username, id);

    Ok((
        StatusCode::CREATED,
        success_to_api_response(SentMail {
            id,
            to: recipient.username,
            created_at: now,
        }),
    ))
}

#[axum::debug_handler]
pub async fn inbox(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<InboxQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = page_limit(query.limit, 50, 100)?;
    let offset = page_offset(query.offset)?;

    let inbox = Mail::inbox(&state.pool, auth.id, limit, offset).await?;
    Ok(success_to_api_response(inbox))
}

#[axum::debug_handler]
pub async fn read_mail(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mail = Mail::open(&state.pool, auth.id, id, state.clock.now())
        .await?
        .ok_or(AppError::NotFound("message"))?;
    Ok(success_to_api_response(mail))
}

#[axum::debug_handler]
pub async fn delete_mail(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !Mail::delete(&state.pool, auth.id, id).await? {
        return Err(AppError::NotFound("message"));
    }
    Ok(success_to_api_response(MailDeleted { id }))
}
