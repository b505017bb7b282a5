use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use chrono::Duration;
use moltcities::{
    AppState, config::Config, database, limits::SystemClock, router::create_router,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("JWT_SECRET must be set");

    if config.quotas.is_lifted() {
        tracing::warn!("Rate limits lifted: every quota raised to bulk-load levels");
    }

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    let pool = database::connect(&config.database_url, 10)
        .await
        .expect("Failed to open database");

    let state = AppState::new(pool, config, Arc::new(SystemClock));

    spawn_quota_sweeper(state.clone());

    let app = create_router(state.clone());

    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}

/// Periodically drops quota counters whose windows are long over.
fn spawn_quota_sweeper(state: AppState) {
    let retention = state.config.quotas.longest_window().max(Duration::days(1));
    let mut interval = tokio::time::interval(state.config.quota_sweep_interval());

    tokio::spawn(async move {
        loop {
            interval.tick().await;
            match state.quotas.sweep(retention).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!("Swept {} stale quota counters", removed),
                Err(e) => tracing::warn!("Quota sweep failed: {}", e),
            }
        }
    });
}
