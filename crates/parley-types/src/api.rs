use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
    pub csrf_token: String,
}

// -- Users --

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub profile_picture: Option<String>,
}

// -- Friends --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendFriendRequestBody {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct FriendsListResponse {
    pub friends: Vec<UserSummary>,
}

/// One pending request joined with the counterpart's display identity:
/// the sender for incoming entries, the receiver for outgoing ones.
#[derive(Debug, Serialize)]
pub struct PendingRequestEntry {
    pub id: Uuid,
    pub user: UserSummary,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct FriendRequestsResponse {
    pub incoming: Vec<PendingRequestEntry>,
    pub outgoing: Vec<PendingRequestEntry>,
}

/// Uniform body for friend-request mutations. `sendRequest` reuses one
/// masked message for every failure mode so callers cannot probe the graph.
#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub message: String,
}

// -- Direct messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub id: Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct DirectMessageResponse {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub sender_username: String,
    pub sender_profile_picture: Option<String>,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub friend: UserSummary,
    pub messages: Vec<DirectMessageResponse>,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
