use axum::{
    Extension, Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use campus_types::api::{Claims, MessageResponse, SendMessageRequest};

use crate::auth::{AppState, AppStateInner};
use crate::error::{ApiError, ApiResult};
use crate::rate_limit::MESSAGE_POLICY;
use crate::{blocking, json_body, path_param, views};

/// Longest message accepted, in characters, measured before trimming.
pub const MAX_MESSAGE_CHARS: usize = 2000;

pub const NEW_MESSAGE_TITLE: &str = "New Message";
pub const NEW_MESSAGE_KIND: &str = "NEW_MESSAGE";

/// Check message content and return it trimmed.
pub fn validate_content(content: &str) -> ApiResult<&str> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation("Message content is required"));
    }
    if content.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ApiError::validation("Message is too long (max 2000 characters)"));
    }
    Ok(trimmed)
}

/// Post a message from the caller to the other participant of
/// `conversation_id` and leave them a notification.
pub fn send(
    state: &AppStateInner,
    caller: &Claims,
    conversation_id: Uuid,
    content: &str,
    now: DateTime<Utc>,
) -> ApiResult<MessageResponse> {
    let decision = state.limiter.check_user(&MESSAGE_POLICY, caller.sub, now);
    if !decision.allowed {
        return Err(ApiError::RateLimited {
            message: "You're sending messages too quickly. Please slow down.",
            remaining: decision.remaining,
            reset_time: decision.reset_time,
        });
    }

    let content = validate_content(content)?;

    if state.db.get_participant(conversation_id, caller.sub)?.is_none() {
        return Err(ApiError::forbidden("You are not a participant in this conversation"));
    }

    let receiver_id = state
        .db
        .other_participant_id(conversation_id, caller.sub)?
        .ok_or_else(|| ApiError::not_found("Receiver not found"))?;

    let row = state.db.insert_message(conversation_id, caller.sub, receiver_id, content, now)?;
    debug!("Message {} stored in {}", row.id, conversation_id);

    // The message is already committed; a lost notification must not turn
    // into a failed send that the client would retry as a duplicate.
    let sender_name = caller.name.as_deref().filter(|n| !n.trim().is_empty()).unwrap_or("Someone");
    let body = format!("{} sent you a message", sender_name);
    if let Err(e) = state.db.create_notification(receiver_id, NEW_MESSAGE_TITLE, &body, NEW_MESSAGE_KIND, now) {
        warn!("Failed to notify {} about message {}: {:#}", receiver_id, row.id, e);
    }

    Ok(views::message(row))
}

/// POST /conversations/{id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    conversation_id: Result<Path<Uuid>, PathRejection>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let conversation_id = path_param(conversation_id)?;
    let req = json_body(body)?;
    let message =
        blocking(move || send(&state, &claims, conversation_id, &req.content, Utc::now())).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
