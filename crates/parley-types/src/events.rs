use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events pushed to clients over the WebSocket gateway.
///
/// Each identity owns one logical channel; every live connection bound to
/// that identity receives every event published to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Server confirms the connection is bound to a session identity.
    Ready { user_id: Uuid, username: String },

    /// A direct message was delivered to this identity. The content is an
    /// opaque payload stored and forwarded verbatim.
    ReceiveMessage {
        sender_id: Uuid,
        sender_username: String,
        sender_profile_picture: Option<String>,
        content: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}
