use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use parley_db::models::{ContactRow, PendingRequestRow};
use parley_types::api::{
    FriendRequestsResponse, FriendsListResponse, PendingRequestEntry, SendFriendRequestBody,
    StatusMessage, UserSummary,
};

use crate::auth::AppState;
use crate::convert::{parse_db_timestamp, parse_db_uuid};
use crate::error::ApiError;
use crate::session::Session;

/// Uniform response for every masked `send_request` outcome. The caller
/// cannot distinguish an unknown user from an existing friendship from a
/// duplicate request; only a genuinely created request answers differently.
const MASKED_REQUEST_MESSAGE: &str =
    "Friend request processed (if user exists and is not already friends).";

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let user_id = session.user_id.to_string();
    let rows = tokio::task::spawn_blocking(move || db.db.list_friends(&user_id))
        .await
        .map_err(anyhow::Error::from)??;

    Ok(Json(FriendsListResponse {
        friends: rows.into_iter().map(contact_summary).collect(),
    }))
}

pub async fn send_request(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<SendFriendRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.username.trim().is_empty() {
        return Err(ApiError::Validation("Username is required."));
    }

    enum Outcome {
        Masked,
        Created,
    }

    let db = state.clone();
    let sender_id = session.user_id.to_string();
    let target = body.username.clone();

    let outcome = tokio::task::spawn_blocking(move || -> Result<Outcome, ApiError> {
        let Some(receiver) = db.db.get_user_by_username(&target)? else {
            return Ok(Outcome::Masked);
        };
        if receiver.id == sender_id {
            return Ok(Outcome::Masked);
        }
        if db.db.are_friends(&sender_id, &receiver.id)? {
            return Ok(Outcome::Masked);
        }
        if db.db.has_pending_request_between(&sender_id, &receiver.id)? {
            return Ok(Outcome::Masked);
        }

        // A concurrent request can still win the pending-pair slot between
        // the check and the insert; that loss is masked like the rest.
        let created = db.db.create_friend_request(
            &Uuid::new_v4().to_string(),
            &sender_id,
            &receiver.id,
        )?;
        Ok(if created {
            Outcome::Created
        } else {
            Outcome::Masked
        })
    })
    .await
    .map_err(anyhow::Error::from)??;

    let message = match outcome {
        Outcome::Masked => MASKED_REQUEST_MESSAGE,
        Outcome::Created => "Friend request sent successfully.",
    };

    Ok(Json(StatusMessage {
        message: message.to_string(),
    }))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let user_id = session.user_id.to_string();

    let (incoming, outgoing) = tokio::task::spawn_blocking(move || {
        let incoming = db.db.incoming_requests(&user_id)?;
        let outgoing = db.db.outgoing_requests(&user_id)?;
        Ok::<_, anyhow::Error>((incoming, outgoing))
    })
    .await
    .map_err(anyhow::Error::from)??;

    Ok(Json(FriendRequestsResponse {
        incoming: incoming.into_iter().map(request_entry).collect(),
        outgoing: outgoing.into_iter().map(request_entry).collect(),
    }))
}

pub async fn accept_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let user_id = session.user_id.to_string();
    let accepted = tokio::task::spawn_blocking(move || {
        db.db
            .accept_friend_request(&request_id.to_string(), &user_id)
    })
    .await
    .map_err(anyhow::Error::from)??;

    if !accepted {
        return Err(ApiError::NotFound("Friend request not found or not pending."));
    }

    Ok(Json(StatusMessage {
        message: "Friend request accepted.".to_string(),
    }))
}

pub async fn reject_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let user_id = session.user_id.to_string();
    let rejected = tokio::task::spawn_blocking(move || {
        db.db
            .reject_friend_request(&request_id.to_string(), &user_id)
    })
    .await
    .map_err(anyhow::Error::from)??;

    if !rejected {
        return Err(ApiError::NotFound("Friend request not found or not pending."));
    }

    Ok(Json(StatusMessage {
        message: "Friend request rejected.".to_string(),
    }))
}

pub async fn cancel_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(session): Extension<Session>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let user_id = session.user_id.to_string();
    let canceled = tokio::task::spawn_blocking(move || {
        db.db
            .cancel_friend_request(&request_id.to_string(), &user_id)
    })
    .await
    .map_err(anyhow::Error::from)??;

    if !canceled {
        return Err(ApiError::NotFound("Friend request not found or not pending."));
    }

    Ok(Json(StatusMessage {
        message: "Friend request canceled.".to_string(),
    }))
}

fn contact_summary(row: ContactRow) -> UserSummary {
    UserSummary {
        id: parse_db_uuid(&row.id, "friend"),
        username: row.username,
        profile_picture: row.profile_picture,
    }
}

fn request_entry(row: PendingRequestRow) -> PendingRequestEntry {
    PendingRequestEntry {
        id: parse_db_uuid(&row.id, "friend request"),
        user: UserSummary {
            id: parse_db_uuid(&row.user_id, "friend request counterpart"),
            username: row.username,
            profile_picture: row.profile_picture,
        },
        created_at: parse_db_timestamp(&row.created_at, "friend request"),
    }
}
