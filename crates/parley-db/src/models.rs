/// Database row types — these map directly to SQLite rows.
/// Distinct from the parley-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub profile_picture: Option<String>,
    pub created_at: String,
}

/// Display identity of a counterpart: a friend, or the other party of a
/// pending request.
pub struct ContactRow {
    pub id: String,
    pub username: String,
    pub profile_picture: Option<String>,
}

pub struct FriendRequestRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: String,
    pub created_at: String,
}

/// A pending request joined with the counterpart's identity.
pub struct PendingRequestRow {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub profile_picture: Option<String>,
    pub created_at: String,
}

pub struct DirectMessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub sender_username: String,
    pub sender_profile_picture: Option<String>,
    pub content: String,
    pub created_at: String,
}
