//! Users service routes.
//!
//! Every handler receives the [`RequestContext`] stamped by the
//! correlation-id middleware and passes it to the database, so each SQL
//! record carries the id of the request that issued it.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use dblog_core::{RequestContext, Value};
use dblog_db::DriverError;

use crate::error::ApiError;
use crate::middleware::correlation_id_middleware;
use crate::AppState;

const SELECT_USER: &str = "SELECT id, name, email FROM users WHERE id = $1";
const LIST_USERS: &str = "SELECT id, name, email FROM users ORDER BY id LIMIT $1 OFFSET $2";
const INSERT_USER: &str = "INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id";

/// Default page size for `GET /api/v1/users`.
pub const DEFAULT_LIMIT: i64 = 50;
/// Largest accepted page size.
pub const MAX_LIMIT: i64 = 500;

/// Build the service router.
///
/// The correlation-id middleware is the outermost layer, so the trace span
/// and every handler already see the request's id.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/users", get(list_users).post(create_user))
        .route("/api/v1/users/:id", get(get_user))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    state.db.ping().await?;
    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

async fn list_users(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }
    let offset = params.offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::BadRequest("offset must not be negative".to_string()));
    }

    let rows = state
        .db
        .query_with(&ctx, LIST_USERS, &[Value::from(limit), Value::from(offset)])
        .await?;
    Ok(Json(rows.to_json()))
}

async fn get_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .db
        .query_with(&ctx, SELECT_USER, &[Value::from(id)])
        .await?;

    rows.to_json()
        .into_iter()
        .next()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("user {}", id)))
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
}

async fn create_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<CreateUser>,
) -> Result<impl IntoResponse, ApiError> {
    let name = body.name.trim();
    let email = body.email.trim();
    if name.is_empty() || email.is_empty() {
        return Err(ApiError::BadRequest(
            "name and email are required".to_string(),
        ));
    }

    let rows = state
        .db
        .query_with(&ctx, INSERT_USER, &[Value::from(name), Value::from(email)])
        .await?;
    let id = rows
        .get(0, "id")
        .cloned()
        .ok_or_else(|| DriverError::Other("insert returned no id".to_string()))?;

    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}
