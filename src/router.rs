use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use tower::ServiceBuilder;
#[cfg(debug_assertions)]
use tower_http::cors::CorsLayer;

use crate::{
    AppState,
    middleware::{auth_middleware, log_errors},
    routes,
};

// Reachable without a token.
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(routes::user::list_users))
        .route("/users/register", post(routes::user::register))
        .route("/canvas/image", get(routes::canvas::image))
        .route("/canvas/region", get(routes::canvas::region))
        .route("/canvas/pixel", get(routes::canvas::get_pixel))
        .route("/canvas/pixel/history", get(routes::canvas::pixel_history))
        .route("/stats", get(routes::canvas::stats))
        .route("/channels", get(routes::channel::list_channels))
        .route("/channels/{name}", get(routes::channel::get_channel))
        .route("/channels/{name}/messages", get(routes::channel::list_messages))
        .route("/pages/random", get(routes::page::random_pages))
        .route("/pages/{username}", get(routes::page::get_page))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/users/me", get(routes::user::me))
        .route("/canvas/pixel", post(routes::canvas::paint))
        .route("/canvas/edit-status", get(routes::canvas::edit_status))
        .route("/channels", post(routes::channel::create_channel))
        .route("/channels/{name}/messages", post(routes::channel::post_message))
        .route("/mail", post(routes::mail::send_mail).get(routes::mail::inbox))
        .route(
            "/mail/{id}",
            get(routes::mail::read_mail).delete(routes::mail::delete_mail),
        )
        .route(
            "/pages",
            get(routes::page::my_page)
                .put(routes::page::update_page)
                .delete(routes::page::delete_page),
        )
        .route_layer(from_fn_with_state(state, auth_middleware))
}

/// The full application: `/health` at the root, everything else nested
/// under `config.api_base_uri`.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(public_routes())
        .merge(protected_routes(state.clone()));

    let router = Router::new()
        .route("/health", get(routes::health::health))
        .nest(&state.config.api_base_uri, api)
        .layer(ServiceBuilder::new().layer(from_fn(log_errors)));

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding permissive CORS layer");
        router.layer(CorsLayer::permissive())
    };

    router.with_state(state)
}
