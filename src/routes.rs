use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer};

use crate::{
    handlers::{auth as auth_handlers, sessions as session_handlers},
    state::AppState,
};

pub fn app_router(state: Arc<AppState>) -> Router {
    // Login is the only credential-guessing surface; throttle it per client
    // IP before it reaches the password check.
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(1)
            .burst_size(10)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    let auth = Router::new()
        .route(
            "/login",
            post(auth_handlers::login).route_layer(GovernorLayer::new(governor_conf)),
        )
        .route("/refresh", post(auth_handlers::refresh))
        .route("/logout", post(auth_handlers::logout))
        .route("/logout-all", post(auth_handlers::logout_all))
        .route("/me", get(auth_handlers::me))
        .route("/sessions", get(session_handlers::list_sessions))
        .route("/sessions/{id}", delete(session_handlers::revoke_session));

    Router::new().nest("/auth", auth).with_state(state)
}
