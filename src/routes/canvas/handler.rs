use axum::{
    body::Bytes,
    extract::{Extension, Json, Query, State},
    http::header,
    response::IntoResponse,
};

use crate::{
    AppState,
    canvas::{Color, MAX_REGION, RenderError, render_png, validate_point, validate_region},
    error::AppError,
    limits::Eligibility,
    middleware::AuthUser,
    routes::{describe_window, page_limit},
    utils::success_to_api_response,
};

use super::model::{
    Edit, EditStatusResponse, PaintRequest, PaintResponse, Pixel, PointQuery, Region, RegionQuery,
    Stats,
};

fn required_point(query: &PointQuery, size: u32) -> Result<(u32, u32), AppError> {
    match (query.x, query.y) {
        (Some(x), Some(y)) => Ok(validate_point(x, y, size)?),
        _ => Err(AppError::Validation("missing x or y parameter".to_string())),
    }
}

/// The whole canvas as PNG, served from the snapshot cache.
#[axum::debug_handler]
pub async fn image(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let size = state.config.canvas_size;
    let pool = state.pool.clone();

    let png = state
        .snapshot
        .get_or_render(state.config.snapshot_ttl(), || async move {
            let pixels = Pixel::all(&pool).await?;
            let encoded = tokio::task::spawn_blocking(move || render_png(size, pixels)).await??;
            tracing::debug!(bytes = encoded.len(), "rendered canvas snapshot");
            Ok::<_, RenderError>(Bytes::from(encoded))
        })
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", state.config.image_max_age_secs),
            ),
        ],
        png,
    ))
}

#[axum::debug_handler]
pub async fn get_pixel(
    State(state): State<AppState>,
    Query(query): Query<PointQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (x, y) = required_point(&query, state.config.canvas_size)?;
    let pixel = Pixel::get(&state.pool, x, y).await?;
    Ok(success_to_api_response(pixel))
}

/// A rectangle of pixel colors; width and height default to the largest
/// area that fits from the origin.
#[axum::debug_handler]
pub async fn region(
    State(state): State<AppState>,
    Query(query): Query<RegionQuery>,
) -> Result<impl IntoResponse, AppError> {
    let size = state.config.canvas_size;
    let (x, y) = (query.x.unwrap_or(0), query.y.unwrap_or(0));
    let fit = |origin: i64| (i64::from(size) - origin).clamp(1, i64::from(MAX_REGION));

    let rect = validate_region(
        x,
        y,
        query.width.unwrap_or_else(|| fit(x)),
        query.height.unwrap_or_else(|| fit(y)),
        size,
    )?;
    let region = Region::load(&state.pool, rect).await?;

    Ok((
        [(
            header::CACHE_CONTROL,
            format!("public, max-age={}", state.config.image_max_age_secs),
        )],
        success_to_api_response(region),
    ))
}

#[axum::debug_handler]
pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let stats = Stats::load(&state.pool).await?;
    Ok(success_to_api_response(stats))
}

#[axum::debug_handler]
pub async fn pixel_history(
    State(state): State<AppState>,
    Query(query): Query<PointQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (x, y) = required_point(&query, state.config.canvas_size)?;
    let limit = page_limit(query.limit, 10, 100)?;
    let edits = Edit::history(&state.pool, x, y, limit).await?;
    Ok(success_to_api_response(edits))
}

#[axum::debug_handler]
pub async fn paint(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<PaintRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (x, y) = validate_point(req.x, req.y, state.config.canvas_size)?;
    let color: Color = req.color.parse()?;

    match Pixel::paint(&state.pool, &state.edit_gate, auth.id, x, y, color).await? {
        Eligibility::Eligible => {
            state.snapshot.invalidate();
            Ok(success_to_api_response(PaintResponse {
                x,
                y,
                color,
                next_edit_at: state.edit_gate.now() + state.edit_gate.cooldown(),
            }))
        }
        Eligibility::NotEligibleYet { next_eligible_at } => {
            tracing::debug!(user_id = auth.id, %next_eligible_at, "edit refused, cooling down");
            Err(AppError::RateLimited {
                message: format!(
                    "You can only edit one pixel per {}",
                    describe_window(state.edit_gate.cooldown())
                ),
                retry_at: Some(next_eligible_at),
            })
        }
    }
}

#[axum::debug_handler]
pub async fn edit_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let eligibility = state.edit_gate.check_eligibility(auth.id).await?;
    Ok(success_to_api_response(EditStatusResponse {
        can_edit: eligibility.is_eligible(),
        next_edit_at: eligibility.next_eligible_at(),
    }))
}
