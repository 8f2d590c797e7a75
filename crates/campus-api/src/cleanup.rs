use std::time::Duration;

use axum::{Json, extract::State, http::StatusCode};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{error, info, warn};

use campus_db::Database;
use campus_types::api::CleanupResponse;

use crate::auth::AppState;
use crate::blocking;
use crate::error::{ApiError, ApiResult};

/// Messages older than this are purged.
pub const MESSAGE_RETENTION_HOURS: i64 = 24;

/// Reported to the caller on failure; the cause stays in the server log.
const CLEANUP_FAILED: &str = "Cleanup failed";

/// Purge expired messages, then drop conversations left with none.
///
/// The two passes commit independently: if the second fails the purge
/// stands and the report still carries `deleted_messages`.
pub fn sweep(db: &Database, now: DateTime<Utc>) -> CleanupResponse {
    let cutoff = now - TimeDelta::hours(MESSAGE_RETENTION_HOURS);

    let deleted_messages = match db.delete_messages_before(cutoff) {
        Ok(count) => count,
        Err(e) => {
            error!("Retention: message purge failed: {:#}", e);
            return CleanupResponse {
                success: false,
                deleted_messages: None,
                deleted_conversations: None,
                error: Some(CLEANUP_FAILED.into()),
            };
        }
    };

    match db.delete_empty_conversations() {
        Ok(deleted_conversations) => {
            if deleted_messages > 0 || deleted_conversations > 0 {
                info!(
                    "Retention: deleted {} messages and {} empty conversations",
                    deleted_messages, deleted_conversations
                );
            }
            CleanupResponse {
                success: true,
                deleted_messages: Some(deleted_messages),
                deleted_conversations: Some(deleted_conversations),
                error: None,
            }
        }
        Err(e) => {
            error!(
                "Retention: deleted {} messages but conversation cleanup failed: {:#}",
                deleted_messages, e
            );
            CleanupResponse {
                success: false,
                deleted_messages: Some(deleted_messages),
                deleted_conversations: None,
                error: Some(CLEANUP_FAILED.into()),
            }
        }
    }
}

/// GET|POST /cron/cleanup-messages: external trigger, authenticated with
/// `Authorization: Bearer <CRON_SECRET>`.
pub async fn cleanup_messages(
    State(state): State<AppState>,
    auth: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
) -> ApiResult<(StatusCode, Json<CleanupResponse>)> {
    let presented = auth.map_err(|_| ApiError::Unauthenticated)?;
    if presented.token() != state.cron_secret {
        warn!("Retention trigger rejected: bad cron secret");
        return Err(ApiError::Unauthenticated);
    }

    let report = blocking(move || Ok(sweep(&state.db, Utc::now()))).await?;
    let status = if report.success { StatusCode::OK } else { StatusCode::INTERNAL_SERVER_ERROR };
    Ok((status, Json(report)))
}

/// Optional in-process trigger for deployments without an external scheduler.
pub async fn run_cleanup_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let db_state = state.clone();
        match tokio::task::spawn_blocking(move || sweep(&db_state.db, Utc::now())).await {
            Ok(report) if !report.success => {
                warn!("Retention sweep failed: {}", report.error.unwrap_or_default());
            }
            Ok(_) => {}
            Err(e) => error!("spawn_blocking join error: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{now, state, user};
    use campus_db::models::MessageSelection;
    use campus_types::models::ItemRef;

    #[test]
    fn test_sweep_respects_retention_window() {
        let state = state();
        let alice = user(&state, Some("Alice"));
        let bob = user(&state, Some("Bob"));
        let now = now();

        let (stale, _) = state
            .db
            .find_or_create_conversation(&ItemRef::Book("b1".into()), alice.sub, bob.sub, now - TimeDelta::hours(30))
            .unwrap();
        let (fresh, _) = state
            .db
            .find_or_create_conversation(&ItemRef::Book("b2".into()), alice.sub, bob.sub, now - TimeDelta::hours(30))
            .unwrap();
        let stale_id = stale.conversation.id;
        let fresh_id = fresh.conversation.id;
        state.db.insert_message(stale_id, alice.sub, bob.sub, "25h old", now - TimeDelta::hours(25)).unwrap();
        state.db.insert_message(fresh_id, alice.sub, bob.sub, "23h old", now - TimeDelta::hours(23)).unwrap();

        let report = sweep(&state.db, now);
        assert_eq!(
            report,
            CleanupResponse {
                success: true,
                deleted_messages: Some(1),
                deleted_conversations: Some(1),
                error: None,
            }
        );

        assert!(state.db.get_conversation(stale_id, MessageSelection::All).unwrap().is_none());
        assert!(state.db.get_participant(stale_id, alice.sub).unwrap().is_none());
        assert!(state.db.get_participant(stale_id, bob.sub).unwrap().is_none());

        let survivor = state.db.get_conversation(fresh_id, MessageSelection::All).unwrap().unwrap();
        assert_eq!(survivor.messages.len(), 1);
        assert_eq!(survivor.messages[0].content, "23h old");
    }

    #[test]
    fn test_failed_purge_reports_no_counts_and_hides_cause() {
        let state = state();
        state.db.with_conn(|conn| Ok(conn.execute_batch("DROP TABLE messages")?)).unwrap();

        let report = sweep(&state.db, now());
        assert_eq!(
            report,
            CleanupResponse {
                success: false,
                deleted_messages: None,
                deleted_conversations: None,
                error: Some("Cleanup failed".into()),
            }
        );
    }

    #[test]
    fn test_failed_conversation_pass_keeps_purge_count() {
        let state = state();
        let alice = user(&state, Some("Alice"));
        let bob = user(&state, Some("Bob"));
        let now = now();

        let (stale, _) = state
            .db
            .find_or_create_conversation(&ItemRef::Book("b1".into()), alice.sub, bob.sub, now - TimeDelta::hours(30))
            .unwrap();
        state
            .db
            .insert_message(stale.conversation.id, alice.sub, bob.sub, "old", now - TimeDelta::hours(25))
            .unwrap();
        state
            .db
            .with_conn(|conn| Ok(conn.execute_batch("DROP TABLE conversation_participants")?))
            .unwrap();

        let report = sweep(&state.db, now);
        assert!(!report.success);
        assert_eq!(report.deleted_messages, Some(1));
        assert_eq!(report.deleted_conversations, None);
        assert_eq!(report.error.as_deref(), Some("Cleanup failed"));

        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("conversation_participants"));
    }

    #[test]
    fn test_sweep_on_empty_store() {
        let state = state();
        let report = sweep(&state.db, now());
        assert!(report.success);
        assert_eq!(report.deleted_messages, Some(0));
        assert_eq!(report.deleted_conversations, Some(0));
    }
}
