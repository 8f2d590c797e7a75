use axum::{Extension, Json, extract::State};

use campus_types::api::{Claims, NotificationResponse};

use crate::auth::{AppState, AppStateInner};
use crate::error::ApiResult;
use crate::{blocking, views};

pub const NOTIFICATION_PAGE_SIZE: u32 = 50;

pub fn list_for_user(state: &AppStateInner, caller: &Claims) -> ApiResult<Vec<NotificationResponse>> {
    let rows = state.db.list_notifications(caller.sub, NOTIFICATION_PAGE_SIZE)?;
    Ok(rows.into_iter().map(views::notification).collect())
}

/// GET /notifications, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<NotificationResponse>>> {
    let notifications = blocking(move || list_for_user(&state, &claims)).await?;
    Ok(Json(notifications))
}
