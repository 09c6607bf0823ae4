use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use mongodb::bson::oid::ObjectId;

use crate::{
    auth::guard::CurrentUser,
    dto::auth::{ListSessionsQuery, SessionView},
    errors::AppError,
    state::AppState,
};

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<SessionView>>, AppError> {
    let owner_id = match query.owner.as_deref() {
        Some(hex) => ObjectId::parse_str(hex).map_err(|_| AppError::NotFound)?,
        None => user.id,
    };

    let records = state.sessions.list_sessions(&user, owner_id).await?;
    Ok(Json(records.into_iter().map(SessionView::from).collect()))
}

pub async fn revoke_session(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let record_id = ObjectId::parse_str(&id).map_err(|_| AppError::NotFound)?;
    state.sessions.revoke_session(&user, record_id).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
