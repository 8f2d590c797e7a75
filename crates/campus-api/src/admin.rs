use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
};
use serde::Deserialize;
use uuid::Uuid;

use campus_db::models::{ConversationDetail, MessageSelection};
use campus_types::api::{AdminConversation, AdminConversationPage, Claims, Pagination};
use campus_types::models::Role;

use crate::auth::{AppState, AppStateInner};
use crate::error::{ApiError, ApiResult};
use crate::{blocking, path_param, query_params, views};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    /// Page is 1-based; limit is clamped to 1..=100.
    fn resolve(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        (page, limit)
    }
}

fn require_admin(caller: &Claims) -> ApiResult<()> {
    if caller.role != Role::Admin {
        return Err(ApiError::forbidden("Forbidden - Admin access required"));
    }
    Ok(())
}

fn with_item_details(state: &AppStateInner, detail: ConversationDetail) -> ApiResult<AdminConversation> {
    let item_details = state.db.resolve_item(&detail.conversation.item)?;
    let message_count = detail.conversation.message_count;
    Ok(AdminConversation {
        conversation: views::conversation(detail),
        item_details,
        message_count,
    })
}

/// Every conversation, most recently active first, with resolved listing
/// details and full history newest first.
pub fn list_all(state: &AppStateInner, caller: &Claims, query: &PageQuery) -> ApiResult<AdminConversationPage> {
    require_admin(caller)?;
    let (page, limit) = query.resolve();

    let total = state.db.count_conversations()?;
    let offset = u64::from(page - 1) * u64::from(limit);
    let conversations = state
        .db
        .list_all_conversations(offset, limit)?
        .into_iter()
        .map(|detail| with_item_details(state, detail))
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(AdminConversationPage {
        conversations,
        pagination: Pagination {
            page,
            limit,
            total,
            pages: total.div_ceil(u64::from(limit)),
        },
    })
}

/// One conversation, history oldest first. Unlike the participant view this
/// never marks anything read.
pub fn inspect(state: &AppStateInner, caller: &Claims, conversation_id: Uuid) -> ApiResult<AdminConversation> {
    require_admin(caller)?;
    let detail = state
        .db
        .get_conversation(conversation_id, MessageSelection::All)?
        .ok_or_else(|| ApiError::not_found("Conversation not found"))?;
    with_item_details(state, detail)
}

/// GET /admin/conversations
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<AdminConversationPage>> {
    let query = query_params(query)?;
    let page = blocking(move || list_all(&state, &claims, &query)).await?;
    Ok(Json(page))
}

/// GET /admin/conversations/{id}
pub async fn get_conversation(
    State(state): State<AppState>,
    conversation_id: Result<Path<Uuid>, PathRejection>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<AdminConversation>> {
    let conversation_id = path_param(conversation_id)?;
    let conversation = blocking(move || inspect(&state, &claims, conversation_id)).await?;
    Ok(Json(conversation))
}
