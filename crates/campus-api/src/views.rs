//! Row → response conversions shared by the handlers.

use campus_db::models::{ConversationDetail, MessageRow, NotificationRow, ParticipantRow};
use campus_types::api::{
    ConversationResponse, MessageResponse, NotificationResponse, ParticipantResponse, ParticipantUser,
};
use campus_types::models::UserProfile;

pub fn message(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: row.id,
        conversation_id: row.conversation_id,
        sender_id: row.sender_id,
        receiver_id: row.receiver_id,
        content: row.content,
        read: row.read,
        created_at: row.created_at,
        sender: UserProfile {
            id: row.sender_id,
            name: row.sender_name,
            image: row.sender_image,
        },
        receiver: UserProfile {
            id: row.receiver_id,
            name: row.receiver_name,
            image: row.receiver_image,
        },
    }
}

pub fn participant(row: ParticipantRow) -> ParticipantResponse {
    ParticipantResponse {
        id: row.id,
        conversation_id: row.conversation_id,
        user_id: row.user_id,
        last_read_at: row.last_read_at,
        user: ParticipantUser {
            id: row.user_id,
            name: row.name,
            email: row.email,
            image: row.image,
            role: row.role,
        },
    }
}

pub fn conversation(detail: ConversationDetail) -> ConversationResponse {
    let ConversationDetail { conversation, participants, messages } = detail;
    ConversationResponse {
        id: conversation.id,
        item_type: conversation.item.kind(),
        item_id: conversation.item.id().to_string(),
        created_at: conversation.created_at,
        updated_at: conversation.updated_at,
        participants: participants.into_iter().map(participant).collect(),
        messages: messages.into_iter().map(message).collect(),
    }
}

pub fn notification(row: NotificationRow) -> NotificationResponse {
    NotificationResponse {
        id: row.id,
        user_id: row.user_id,
        title: row.title,
        message: row.message,
        kind: row.kind,
        read: row.read,
        created_at: row.created_at,
    }
}
