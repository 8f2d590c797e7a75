pub mod admin;
pub mod auth;
pub mod cleanup;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod rate_limit;
pub mod views;

use axum::{
    Json, Router,
    extract::{
        Path, Query,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// Run blocking store work off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow::anyhow!("task join error: {}", e))
    })?
}

/// Unwrap a JSON body, turning malformed input into a 400.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value).map_err(|e| ApiError::validation(e.body_text()))
}

/// Unwrap a path parameter, turning a malformed one into a 400.
pub(crate) fn path_param<T>(path: Result<Path<T>, PathRejection>) -> ApiResult<T> {
    path.map(|Path(value)| value).map_err(|e| ApiError::validation(e.body_text()))
}

/// Unwrap query parameters, turning malformed ones into a 400.
pub(crate) fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    query.map(|Query(value)| value).map_err(|e| ApiError::validation(e.body_text()))
}

async fn health() -> &'static str {
    "ok"
}

/// The full HTTP surface.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route(
            "/cron/cleanup-messages",
            get(cleanup::cleanup_messages).post(cleanup::cleanup_messages),
        )
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route(
            "/conversations/{conversation_id}",
            get(conversations::get_conversation).delete(conversations::delete_conversation),
        )
        .route("/conversations/{conversation_id}/messages", post(messages::send_message))
        .route("/notifications", get(notifications::list_notifications))
        .route("/admin/conversations", get(admin::list_conversations))
        .route("/admin/conversations/{conversation_id}", get(admin::get_conversation))
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, SubsecRound, Utc};
    use uuid::Uuid;

    use campus_db::Database;
    use campus_types::api::Claims;
    use campus_types::models::Role;

    use crate::auth::AppStateInner;

    /// Timestamps round-trip through the store at microsecond precision.
    pub fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }

    pub fn state() -> AppStateInner {
        let db = Database::open_in_memory().expect("in-memory db");
        AppStateInner::new(db, "test-jwt", "test-cron")
    }

    /// Insert a student and return the claims its token would carry.
    pub fn user(state: &AppStateInner, name: Option<&str>) -> Claims {
        let id = Uuid::new_v4();
        let email = format!("{}@campus.test", id.simple());
        state.db.create_user(id, name, &email, "unused-hash", now()).expect("create user");
        Claims {
            sub: id,
            name: name.map(str::to_string),
            email,
            role: Role::Student,
            exp: usize::MAX,
        }
    }
}
