use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Duration;
use sessiond::{config::Config, routes::app_router, state::AppState};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sessiond=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env();
    let state = Arc::new(AppState::new(cfg).await.expect("init state"));

    spawn_purge_task(&state);

    let app = app_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener =
        TcpListener::bind(&std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into()))
            .await
            .unwrap();

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

/// Housekeeping: expired-and-revoked records are never deleted inline, only
/// by this sweep, once they are past the retention window.
fn spawn_purge_task(state: &Arc<AppState>) {
    let store = state.store.clone();
    let interval = std::time::Duration::from_secs(state.cfg.purge_interval_seconds);
    let retention = Duration::seconds(state.cfg.purge_retention_seconds);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let before = chrono::Utc::now() - retention;
            match store.purge_expired_revoked(before).await {
                Ok(purged) if purged > 0 => {
                    tracing::info!(purged, "purged expired refresh records")
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "refresh record purge failed"),
            }
        }
    });
}
