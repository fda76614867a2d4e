use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::SecondsFormat;
use tracing::debug;
use uuid::Uuid;

use parley_db::models::DirectMessageRow;
use parley_types::api::{
    ConversationResponse, DirectMessageResponse, SendMessageRequest, SendMessageResponse,
    UserSummary,
};
use parley_types::events::GatewayEvent;

use crate::auth::AppState;
use crate::convert::{parse_db_timestamp, parse_db_uuid};
use crate::error::ApiError;
use crate::session::Session;

/// Full two-way history with the named friend, oldest first.
pub async fn conversation(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let user_id = session.user_id.to_string();

    let (friend, rows) = tokio::task::spawn_blocking(move || {
        let friend = db
            .db
            .get_user_by_username(&username)?
            .ok_or(ApiError::NotFound("Friend not found."))?;

        if !db.db.are_friends(&user_id, &friend.id)? {
            return Err(ApiError::Forbidden("You are not friends with this user."));
        }

        let rows = db.db.conversation(&user_id, &friend.id)?;
        Ok::<_, ApiError>((friend, rows))
    })
    .await
    .map_err(anyhow::Error::from)??;

    Ok(Json(ConversationResponse {
        friend: UserSummary {
            id: parse_db_uuid(&friend.id, "friend"),
            username: friend.username,
            profile_picture: friend.profile_picture,
        },
        messages: rows.into_iter().map(message_response).collect(),
    }))
}

/// Append a message and fan it out to the recipient's live connections.
/// Friendship is re-checked on every call since it can have changed, and
/// the publish only fires after the insert commits, so the durable record
/// and the realtime event always agree.
pub async fn send_message(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(session): Extension<Session>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.content.is_empty() {
        return Err(ApiError::Validation("Message content is required."));
    }

    let message_id = Uuid::new_v4();
    let now = chrono::Utc::now();

    let db = state.clone();
    let sender_id = session.user_id.to_string();
    let content = req.content.clone();

    let (receiver_id, sender_profile_picture) =
        tokio::task::spawn_blocking(move || {
            let friend = db
                .db
                .get_user_by_username(&username)?
                .ok_or(ApiError::NotFound("Friend not found."))?;

            if !db.db.are_friends(&sender_id, &friend.id)? {
                return Err(ApiError::Forbidden("You are not friends with this user."));
            }

            let sender = db
                .db
                .get_user_by_id(&sender_id)?
                .ok_or_else(|| anyhow::anyhow!("session user {} has no row", sender_id))?;

            // Content is an opaque payload: stored verbatim, never inspected.
            db.db.insert_direct_message(
                &message_id.to_string(),
                &sender_id,
                &friend.id,
                &content,
                &now.to_rfc3339_opts(SecondsFormat::Micros, true),
            )?;

            Ok::<_, ApiError>((friend.id, sender.profile_picture))
        })
        .await
        .map_err(anyhow::Error::from)??;

    let receiver_id = parse_db_uuid(&receiver_id, "direct message receiver");
    let delivered = state
        .dispatcher
        .publish(
            receiver_id,
            GatewayEvent::ReceiveMessage {
                sender_id: session.user_id,
                sender_username: session.username.clone(),
                sender_profile_picture,
                content: req.content,
                timestamp: now,
            },
        )
        .await;
    debug!(
        "direct message {} delivered to {} live connection(s) of {}",
        message_id, delivered, receiver_id
    );

    Ok(Json(SendMessageResponse {
        id: message_id,
        timestamp: now,
    }))
}

fn message_response(row: DirectMessageRow) -> DirectMessageResponse {
    DirectMessageResponse {
        id: parse_db_uuid(&row.id, "direct message"),
        sender_id: parse_db_uuid(&row.sender_id, "direct message sender"),
        receiver_id: parse_db_uuid(&row.receiver_id, "direct message receiver"),
        sender_username: row.sender_username,
        sender_profile_picture: row.sender_profile_picture,
        content: row.content,
        timestamp: parse_db_timestamp(&row.created_at, "direct message"),
    }
}
