use crate::Database;
use crate::models::{ContactRow, DirectMessageRow, FriendRequestRow, PendingRequestRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;

/// Friendship rows store the pair in canonical order so uniqueness holds
/// over the unordered pair.
fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a < b { (a, b) } else { (b, a) }
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    /// Username lookups go through the column's NOCASE collation, so
    /// `Alice` and `alice` resolve to the same account.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    // -- Friendships --

    pub fn are_friends(&self, a: &str, b: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM friendships
                 WHERE (user_id1 = ?1 AND user_id2 = ?2)
                    OR (user_id1 = ?2 AND user_id2 = ?1)",
                [a, b],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Everyone the given user shares a friendship with, whichever slot of
    /// the pair they occupy.
    pub fn list_friends(&self, user_id: &str) -> Result<Vec<ContactRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.profile_picture
                 FROM users u
                 JOIN friendships f
                   ON (u.id = f.user_id1 AND f.user_id2 = ?1)
                   OR (u.id = f.user_id2 AND f.user_id1 = ?1)
                 WHERE u.id <> ?1
                 ORDER BY u.username",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ContactRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        profile_picture: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Friend requests --

    pub fn has_pending_request_between(&self, a: &str, b: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM friend_requests
                 WHERE ((sender_id = ?1 AND receiver_id = ?2)
                     OR (sender_id = ?2 AND receiver_id = ?1))
                   AND status = 'pending'",
                [a, b],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Insert a new pending request. Returns `false` when the pending-pair
    /// index rejects the insert, i.e. a concurrent request already holds the
    /// slot for this pair; the caller masks that outcome.
    pub fn create_friend_request(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            match conn.execute(
                "INSERT INTO friend_requests (id, sender_id, receiver_id) VALUES (?1, ?2, ?3)",
                (id, sender_id, receiver_id),
            ) {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_friend_request(&self, id: &str) -> Result<Option<FriendRequestRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, status, created_at
                 FROM friend_requests WHERE id = ?1",
            )?;

            let row = stmt
                .query_row([id], |row| {
                    Ok(FriendRequestRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        receiver_id: row.get(2)?,
                        status: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })
                .optional()?;

            Ok(row)
        })
    }

    /// Pending requests addressed to the user, joined with the sender's
    /// display identity.
    pub fn incoming_requests(&self, user_id: &str) -> Result<Vec<PendingRequestRow>> {
        self.with_conn(|conn| {
            query_pending_requests(
                conn,
                "SELECT fr.id, u.id, u.username, u.profile_picture, fr.created_at
                 FROM friend_requests fr
                 JOIN users u ON fr.sender_id = u.id
                 WHERE fr.receiver_id = ?1 AND fr.status = 'pending'
                 ORDER BY fr.created_at",
                user_id,
            )
        })
    }

    /// Pending requests the user has sent, joined with the receiver's
    /// display identity.
    pub fn outgoing_requests(&self, user_id: &str) -> Result<Vec<PendingRequestRow>> {
        self.with_conn(|conn| {
            query_pending_requests(
                conn,
                "SELECT fr.id, u.id, u.username, u.profile_picture, fr.created_at
                 FROM friend_requests fr
                 JOIN users u ON fr.receiver_id = u.id
                 WHERE fr.sender_id = ?1 AND fr.status = 'pending'
                 ORDER BY fr.created_at",
                user_id,
            )
        })
    }

    /// Flip a pending request to accepted and insert the friendship row as
    /// one transaction. The UPDATE only matches while the request is still
    /// pending and addressed to `receiver_id`, so a concurrent accept or
    /// cancel has exactly one winner; the loser observes `false`.
    pub fn accept_friend_request(&self, request_id: &str, receiver_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let updated = tx.execute(
                "UPDATE friend_requests SET status = 'accepted'
                 WHERE id = ?1 AND receiver_id = ?2 AND status = 'pending'",
                [request_id, receiver_id],
            )?;
            if updated == 0 {
                return Ok(false);
            }

            let (sender_id, recv_id): (String, String) = tx.query_row(
                "SELECT sender_id, receiver_id FROM friend_requests WHERE id = ?1",
                [request_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let (first, second) = canonical_pair(&sender_id, &recv_id);
            tx.execute(
                "INSERT INTO friendships (user_id1, user_id2) VALUES (?1, ?2)",
                [first, second],
            )?;

            tx.commit()?;
            Ok(true)
        })
    }

    /// Conditional transition to `rejected`; only the receiver of a
    /// still-pending request succeeds.
    pub fn reject_friend_request(&self, request_id: &str, receiver_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE friend_requests SET status = 'rejected'
                 WHERE id = ?1 AND receiver_id = ?2 AND status = 'pending'",
                [request_id, receiver_id],
            )?;
            Ok(updated > 0)
        })
    }

    /// Conditional transition to `canceled`; only the sender of a
    /// still-pending request succeeds.
    pub fn cancel_friend_request(&self, request_id: &str, sender_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE friend_requests SET status = 'canceled'
                 WHERE id = ?1 AND sender_id = ?2 AND status = 'pending'",
                [request_id, sender_id],
            )?;
            Ok(updated > 0)
        })
    }

    // -- Direct messages --

    /// The caller supplies the timestamp so the persisted record and the
    /// realtime event carry the same instant.
    pub fn insert_direct_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO direct_messages (id, sender_id, receiver_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, sender_id, receiver_id, content, created_at),
            )?;
            Ok(())
        })
    }

    /// Both directions of the conversation between two users, ascending by
    /// timestamp, joined with the sender's display identity.
    pub fn conversation(&self, a: &str, b: &str) -> Result<Vec<DirectMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT dm.id, dm.sender_id, dm.receiver_id, u.username, u.profile_picture,
                        dm.content, dm.created_at
                 FROM direct_messages dm
                 JOIN users u ON dm.sender_id = u.id
                 WHERE (dm.sender_id = ?1 AND dm.receiver_id = ?2)
                    OR (dm.sender_id = ?2 AND dm.receiver_id = ?1)
                 ORDER BY dm.created_at ASC",
            )?;

            let rows = stmt
                .query_map([a, b], |row| {
                    Ok(DirectMessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        receiver_id: row.get(2)?,
                        sender_username: row.get(3)?,
                        sender_profile_picture: row.get(4)?,
                        content: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_pending_requests(
    conn: &Connection,
    sql: &str,
    user_id: &str,
) -> Result<Vec<PendingRequestRow>> {
    let mut stmt = conn.prepare(sql)?;

    let rows = stmt
        .query_map([user_id], |row| {
            Ok(PendingRequestRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                username: row.get(2)?,
                profile_picture: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, password, profile_picture, created_at
         FROM users WHERE username = ?1",
    )?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                profile_picture: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, password, profile_picture, created_at
         FROM users WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                profile_picture: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn add_user(db: &Database, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_user(&id, username, "argon2-hash").unwrap();
        id
    }

    fn friendship_count(db: &Database) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM friendships", [], |row| row.get(0))?)
        })
        .unwrap()
    }

    #[test]
    fn username_lookup_is_case_insensitive() {
        let db = test_db();
        let id = add_user(&db, "alice");

        let row = db.get_user_by_username("ALICE").unwrap().unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.username, "alice");
    }

    #[test]
    fn accept_establishes_symmetric_friendship() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let req = Uuid::new_v4().to_string();
        db.create_friend_request(&req, &alice, &bob).unwrap();

        let incoming = db.incoming_requests(&bob).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].username, "alice");

        let outgoing = db.outgoing_requests(&alice).unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].username, "bob");

        assert!(db.accept_friend_request(&req, &bob).unwrap());

        assert!(db.are_friends(&alice, &bob).unwrap());
        assert!(db.are_friends(&bob, &alice).unwrap());
        assert!(db.incoming_requests(&bob).unwrap().is_empty());
        assert!(db.outgoing_requests(&alice).unwrap().is_empty());

        let friends_of_bob = db.list_friends(&bob).unwrap();
        assert_eq!(friends_of_bob.len(), 1);
        assert_eq!(friends_of_bob[0].username, "alice");
    }

    #[test]
    fn only_the_receiver_can_accept() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let req = Uuid::new_v4().to_string();
        db.create_friend_request(&req, &alice, &bob).unwrap();

        assert!(!db.accept_friend_request(&req, &alice).unwrap());
        assert!(!db.are_friends(&alice, &bob).unwrap());

        let row = db.get_friend_request(&req).unwrap().unwrap();
        assert_eq!(row.status, "pending");
    }

    #[test]
    fn second_accept_loses_the_race() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let req = Uuid::new_v4().to_string();
        db.create_friend_request(&req, &alice, &bob).unwrap();

        assert!(db.accept_friend_request(&req, &bob).unwrap());
        assert!(!db.accept_friend_request(&req, &bob).unwrap());
        assert_eq!(friendship_count(&db), 1);
    }

    #[test]
    fn terminal_states_admit_no_further_transitions() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let req = Uuid::new_v4().to_string();
        db.create_friend_request(&req, &alice, &bob).unwrap();
        assert!(db.accept_friend_request(&req, &bob).unwrap());

        assert!(!db.cancel_friend_request(&req, &alice).unwrap());
        assert!(!db.reject_friend_request(&req, &bob).unwrap());

        let row = db.get_friend_request(&req).unwrap().unwrap();
        assert_eq!(row.status, "accepted");
    }

    #[test]
    fn reject_creates_no_friendship() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let req = Uuid::new_v4().to_string();
        db.create_friend_request(&req, &alice, &bob).unwrap();

        assert!(db.reject_friend_request(&req, &bob).unwrap());
        assert!(!db.are_friends(&alice, &bob).unwrap());
        assert_eq!(friendship_count(&db), 0);

        let row = db.get_friend_request(&req).unwrap().unwrap();
        assert_eq!(row.status, "rejected");
    }

    #[test]
    fn cancel_is_sender_only() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let req = Uuid::new_v4().to_string();
        db.create_friend_request(&req, &alice, &bob).unwrap();

        assert!(!db.cancel_friend_request(&req, &bob).unwrap());
        assert!(db.cancel_friend_request(&req, &alice).unwrap());

        let row = db.get_friend_request(&req).unwrap().unwrap();
        assert_eq!(row.status, "canceled");
    }

    #[test]
    fn pending_check_covers_both_directions() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let req = Uuid::new_v4().to_string();
        db.create_friend_request(&req, &alice, &bob).unwrap();

        assert!(db.has_pending_request_between(&alice, &bob).unwrap());
        assert!(db.has_pending_request_between(&bob, &alice).unwrap());
    }

    #[test]
    fn duplicate_pending_request_is_rejected_by_the_schema() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        assert!(
            db.create_friend_request(&Uuid::new_v4().to_string(), &alice, &bob)
                .unwrap()
        );

        // Same direction and the reverse direction both hit the
        // pending-pair index.
        assert!(
            !db.create_friend_request(&Uuid::new_v4().to_string(), &alice, &bob)
                .unwrap()
        );
        assert!(
            !db.create_friend_request(&Uuid::new_v4().to_string(), &bob, &alice)
                .unwrap()
        );
    }

    #[test]
    fn resolved_requests_do_not_block_new_ones() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let req = Uuid::new_v4().to_string();
        db.create_friend_request(&req, &alice, &bob).unwrap();
        assert!(db.reject_friend_request(&req, &bob).unwrap());

        // A rejected request leaves the pair free for another attempt.
        assert!(
            db.create_friend_request(&Uuid::new_v4().to_string(), &bob, &alice)
                .unwrap()
        );
    }

    #[test]
    fn friendship_rows_are_stored_canonically() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let req = Uuid::new_v4().to_string();
        db.create_friend_request(&req, &alice, &bob).unwrap();
        assert!(db.accept_friend_request(&req, &bob).unwrap());

        let ordered: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM friendships WHERE user_id1 < user_id2",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(ordered, 1);
    }

    #[test]
    fn conversation_is_two_way_and_timestamp_ordered() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        db.insert_direct_message(
            &Uuid::new_v4().to_string(),
            &alice,
            &bob,
            "first",
            "2026-01-01T10:00:00Z",
        )
        .unwrap();
        db.insert_direct_message(
            &Uuid::new_v4().to_string(),
            &bob,
            &alice,
            "second",
            "2026-01-01T10:00:01Z",
        )
        .unwrap();
        db.insert_direct_message(
            &Uuid::new_v4().to_string(),
            &alice,
            &bob,
            "third",
            "2026-01-01T10:00:02Z",
        )
        .unwrap();

        let messages = db.conversation(&bob, &alice).unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["first", "second", "third"]);
        assert_eq!(messages[1].sender_username, "bob");
    }

    #[test]
    fn conversation_excludes_third_parties() {
        let db = test_db();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let carol = add_user(&db, "carol");

        db.insert_direct_message(
            &Uuid::new_v4().to_string(),
            &alice,
            &bob,
            "for bob",
            "2026-01-01T10:00:00Z",
        )
        .unwrap();
        db.insert_direct_message(
            &Uuid::new_v4().to_string(),
            &alice,
            &carol,
            "for carol",
            "2026-01-01T10:00:01Z",
        )
        .unwrap();

        let messages = db.conversation(&alice, &bob).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "for bob");
    }
}
