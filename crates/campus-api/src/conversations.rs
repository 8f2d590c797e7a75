use axum::{
    Extension, Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use campus_types::api::{
    Claims, ConversationResponse, ConversationSummary, CreateConversationRequest,
    DeleteConversationResponse,
};
use campus_types::models::ItemRef;

use crate::auth::{AppState, AppStateInner};
use crate::error::{ApiError, ApiResult};
use crate::rate_limit::CONVERSATION_POLICY;
use crate::{blocking, json_body, path_param, views};

/// Return the conversation between the caller and `receiver_id` about
/// `item`, creating it if this is their first exchange about that listing.
/// The boolean is true when a new conversation was created.
pub fn find_or_create(
    state: &AppStateInner,
    caller: &Claims,
    item: ItemRef,
    receiver_id: Uuid,
    now: DateTime<Utc>,
) -> ApiResult<(ConversationResponse, bool)> {
    if item.id().trim().is_empty() {
        return Err(ApiError::validation("Missing required fields"));
    }
    if caller.sub == receiver_id {
        return Err(ApiError::validation("Cannot message yourself"));
    }

    let decision = state.limiter.check_user(&CONVERSATION_POLICY, caller.sub, now);
    if !decision.allowed {
        return Err(ApiError::RateLimited {
            message: "Rate limit exceeded. Please try again later.",
            remaining: decision.remaining,
            reset_time: decision.reset_time,
        });
    }

    if !state.db.user_exists(receiver_id)? {
        return Err(ApiError::not_found("Receiver not found"));
    }

    let (detail, created) = state.db.find_or_create_conversation(&item, caller.sub, receiver_id, now)?;
    if created {
        info!("Conversation {} opened about {} by {}", detail.conversation.id, item, caller.sub);
    }

    Ok((views::conversation(detail), created))
}

/// The caller's conversations, most recently active first.
pub fn list_for_user(state: &AppStateInner, caller: &Claims) -> ApiResult<Vec<ConversationSummary>> {
    let entries = state.db.list_conversations_for_user(caller.sub)?;
    Ok(entries
        .into_iter()
        .map(|entry| ConversationSummary {
            conversation: views::conversation(entry.detail),
            unread_count: entry.unread_count,
        })
        .collect())
}

/// Full history of one conversation. Fetching is what marks the caller's
/// incoming messages as read.
pub fn open(
    state: &AppStateInner,
    caller: &Claims,
    conversation_id: Uuid,
    now: DateTime<Utc>,
) -> ApiResult<ConversationResponse> {
    let detail = state
        .db
        .open_conversation(conversation_id, caller.sub, now)?
        .ok_or_else(|| ApiError::forbidden("You are not a participant in this conversation"))?;
    Ok(views::conversation(detail))
}

/// Irreversibly delete a conversation. Either participant may do this.
pub fn delete(state: &AppStateInner, caller: &Claims, conversation_id: Uuid) -> ApiResult<()> {
    if state.db.get_participant(conversation_id, caller.sub)?.is_none() {
        return Err(ApiError::forbidden("You are not authorized to delete this conversation"));
    }

    if !state.db.delete_conversation(conversation_id)? {
        return Err(ApiError::not_found("Conversation not found"));
    }
    info!("Conversation {} deleted by {}", conversation_id, caller.sub);
    Ok(())
}

// -- Handlers --

/// POST /conversations
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<CreateConversationRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ConversationResponse>)> {
    let req = json_body(body)?;
    let item = ItemRef::new(req.item_type, req.item_id);

    let (conversation, created) =
        blocking(move || find_or_create(&state, &claims, item, req.receiver_id, Utc::now())).await?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(conversation)))
}

/// GET /conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let conversations = blocking(move || list_for_user(&state, &claims)).await?;
    Ok(Json(conversations))
}

/// GET /conversations/{id}
pub async fn get_conversation(
    State(state): State<AppState>,
    conversation_id: Result<Path<Uuid>, PathRejection>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ConversationResponse>> {
    let conversation_id = path_param(conversation_id)?;
    let conversation = blocking(move || open(&state, &claims, conversation_id, Utc::now())).await?;
    Ok(Json(conversation))
}

/// DELETE /conversations/{id}
pub async fn delete_conversation(
    State(state): State<AppState>,
    conversation_id: Result<Path<Uuid>, PathRejection>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<DeleteConversationResponse>> {
    let conversation_id = path_param(conversation_id)?;
    blocking(move || delete(&state, &claims, conversation_id)).await?;
    Ok(Json(DeleteConversationResponse {
        success: true,
        message: "Conversation deleted successfully".into(),
    }))
}
