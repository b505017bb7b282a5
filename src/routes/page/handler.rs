use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    http::header,
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
    MyPage, PAGE_CSP, Page, PageDeleted, PageUpdated, RandomPagesQuery, validate_page,
};

fn page_url(state: &AppState, username: &str) -> String {
    format!("{}/pages/{}", state.config.api_base_uri, username)
}

#[axum::debug_handler]
pub async fn update_page(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    validate_page(&body)?;
    let content = std::str::from_utf8(&body)
        .map_err(|_| AppError::Validation("page content must be UTF-8".to_string()))?;

    enforce_quota(&state, &Subject::user(auth.id), Action::UpdatePage).await?;

    Page::upsert(&state.pool, auth.id, content, state.clock.now()).await?;

    Ok(success_to_api_response(PageUpdated {
        url: page_url(&state, &auth.username),
        size: content.len(),
    }))
}

#[axum::debug_handler]
pub async fn get_page(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let content = Page::content_for(&state.pool, &username)
        .await?
        .ok_or(AppError::NotFound("page"))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CONTENT_SECURITY_POLICY, PAGE_CSP),
        ],
        content,
    ))
}

#[axum::debug_handler]
pub async fn my_page(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let summary = Page::summary_for(&state.pool, auth.id).await?;
    Ok(success_to_api_response(MyPage {
        exists: summary.is_some(),
        url: page_url(&state, &auth.username),
        summary,
    }))
}

#[axum::debug_handler]
pub async fn delete_page(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = Page::delete(&state.pool, auth.id).await?;
    if deleted {
        tracing::info!("{} deleted their page", auth.username);
    }
    Ok(success_to_api_response(PageDeleted { deleted }))
}

#[axum::debug_handler]
pub async fn random_pages(
    State(state): State<AppState>,
    Query(query): Query<RandomPagesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = page_limit(query.limit, 10, 50)?;
    let listing = Page::random(&state.pool, limit).await?;
    Ok(success_to_api_response(listing))
}
