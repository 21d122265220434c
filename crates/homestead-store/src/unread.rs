//! Read/unread tracking.
//!
//! Counters live on the thread row and are only ever changed by single
//! atomic SQL statements (`count = count + 1`, or a reset together with the
//! read marker), so buyer and owner can act at the same instant without
//! losing updates. [`Database::reconcile_unread`] recomputes the same
//! numbers from the ledger.

use chrono::{DateTime, Utc};
use rusqlite::params;

use homestead_shared::{Role, Sender, ThreadId};

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{encode_ts, now, Message, Participant, SeenState, Thread, UnreadCounts};
use crate::threads::ts_column;

impl Database {
    /// Account for a freshly appended message: raise the counterpart's
    /// unread counter and move the thread's activity time forward.
    pub fn on_message_appended(&self, message: &Message) -> Result<()> {
        let sql = match message.sender {
            Sender::Buyer => {
                "UPDATE inquiries
                 SET owner_unread_count = owner_unread_count + 1,
                     last_activity_at = MAX(last_activity_at, ?2)
                 WHERE id = ?1"
            }
            Sender::Owner | Sender::Admin => {
                "UPDATE inquiries
                 SET buyer_unread_count = buyer_unread_count + 1,
                     last_activity_at = MAX(last_activity_at, ?2)
                 WHERE id = ?1"
            }
        };

        let affected = self.conn().execute(
            sql,
            params![
                message.thread_id.to_string(),
                encode_ts(&message.created_at)
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }

        tracing::debug!(
            thread_id = %message.thread_id,
            notified = %message.sender.notifies(),
            "raised unread counter"
        );
        Ok(())
    }

    /// Clear `role`'s unread counter and stamp its read marker.
    ///
    /// The marker is the call time, or the latest message's time if that is
    /// later, so a read always covers everything already in the ledger.
    /// Returns the stored marker.
    pub fn mark_read(&self, thread_id: ThreadId, role: Role) -> Result<DateTime<Utc>> {
        let sql = match role {
            Role::Buyer => {
                "UPDATE inquiries
                 SET buyer_unread_count = 0,
                     buyer_last_read_at = MAX(?2, COALESCE(
                         (SELECT MAX(created_at) FROM inquiry_messages WHERE inquiry_id = ?1), ''))
                 WHERE id = ?1
                 RETURNING buyer_last_read_at"
            }
            Role::Owner => {
                "UPDATE inquiries
                 SET owner_unread_count = 0,
                     owner_last_read_at = MAX(?2, COALESCE(
                         (SELECT MAX(created_at) FROM inquiry_messages WHERE inquiry_id = ?1), ''))
                 WHERE id = ?1
                 RETURNING owner_last_read_at"
            }
        };

        let read_at = self
            .conn()
            .query_row(
                sql,
                params![thread_id.to_string(), encode_ts(&now())],
                |row| ts_column(row, 0),
            )
            .map_err(not_found)?;

        tracing::debug!(thread_id = %thread_id, role = %role, "marked thread read");
        Ok(read_at)
    }

    /// Recompute both unread counters from the ledger and read markers.
    pub fn reconcile_unread(&self, thread_id: ThreadId) -> Result<UnreadCounts> {
        let sql = format!(
            "SELECT
                 (SELECT COUNT(*) FROM inquiry_messages m
                  WHERE m.inquiry_id = i.id AND m.sender IN ({buyer_senders})
                    AND (i.buyer_last_read_at IS NULL OR m.created_at > i.buyer_last_read_at)),
                 (SELECT COUNT(*) FROM inquiry_messages m
                  WHERE m.inquiry_id = i.id AND m.sender IN ({owner_senders})
                    AND (i.owner_last_read_at IS NULL OR m.created_at > i.owner_last_read_at))
             FROM inquiries i WHERE i.id = ?1",
            buyer_senders = sender_list(Role::Buyer),
            owner_senders = sender_list(Role::Owner),
        );

        self.conn()
            .query_row(&sql, params![thread_id.to_string()], |row| {
                Ok(UnreadCounts {
                    buyer: row.get(0)?,
                    owner: row.get(1)?,
                })
            })
            .map_err(not_found)
    }

    /// Sum of a participant's unread counters across their threads.
    pub fn unread_total(&self, participant: &Participant) -> Result<u64> {
        let (sql, key) = match participant {
            Participant::Owner(owner_id) => (
                "SELECT COALESCE(SUM(owner_unread_count), 0) FROM inquiries WHERE owner_id = ?1",
                owner_id.trim().to_string(),
            ),
            Participant::Buyer(email) => (
                "SELECT COALESCE(SUM(buyer_unread_count), 0) FROM inquiries WHERE buyer_email = ?1",
                homestead_shared::normalize_email(email),
            ),
        };

        let total: i64 = self.conn().query_row(sql, params![key], |row| row.get(0))?;
        Ok(total.max(0) as u64)
    }
}

/// SQL `IN` list of the senders that notify `role`.
fn sender_list(role: Role) -> String {
    Sender::notifying(role)
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Whether the latest message written on `side` has been read by the other
/// side. False when `side` has not written anything yet.
pub fn seen_by_counterpart(thread: &Thread, messages: &[Message], side: Role) -> bool {
    let Some(last) = messages.iter().rev().find(|m| m.sender.side() == side) else {
        return false;
    };

    let read_at = match side.counterpart() {
        Role::Buyer => thread.buyer_last_read_at,
        Role::Owner => thread.owner_last_read_at,
    };

    read_at.is_some_and(|read_at| read_at >= last.created_at)
}

/// Seen indicators for both sides of a thread.
pub fn seen_state(thread: &Thread, messages: &[Message]) -> SeenState {
    SeenState {
        buyer: seen_by_counterpart(thread, messages, Role::Buyer),
        owner: seen_by_counterpart(thread, messages, Role::Owner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewThread;
    use tempfile::TempDir;

    fn test_db() -> (Database, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (db, dir)
    }

    fn thread(db: &Database) -> ThreadId {
        db.find_or_create_thread(&NewThread {
            property_id: "P1".into(),
            owner_id: "O1".into(),
            buyer_email: "b@x.com".into(),
            buyer_name: "Bea".into(),
            buyer_id: None,
        })
        .unwrap()
        .id
    }

    fn send(db: &Database, id: ThreadId, sender: Sender, text: &str) -> Message {
        let message = db.append_message(id, sender, text, &[]).unwrap();
        db.on_message_appended(&message).unwrap();
        message
    }

    fn assert_reconciles(db: &Database, id: ThreadId) {
        let thread = db.get_thread(id).unwrap();
        let counts = db.reconcile_unread(id).unwrap();
        assert_eq!(counts.buyer, thread.buyer_unread_count);
        assert_eq!(counts.owner, thread.owner_unread_count);
    }

    #[test]
    fn counterpart_counter_is_raised() {
        let (db, _dir) = test_db();
        let id = thread(&db);

        send(&db, id, Sender::Buyer, "Is this available?");
        let t = db.get_thread(id).unwrap();
        assert_eq!((t.owner_unread_count, t.buyer_unread_count), (1, 0));

        let reply = send(&db, id, Sender::Owner, "Yes");
        let t = db.get_thread(id).unwrap();
        assert_eq!((t.owner_unread_count, t.buyer_unread_count), (1, 1));
        assert_eq!(t.last_activity_at, reply.created_at);
        assert_reconciles(&db, id);
    }

    #[test]
    fn admin_message_notifies_buyer_only() {
        let (db, _dir) = test_db();
        let id = thread(&db);

        send(&db, id, Sender::Admin, "Support here");
        let t = db.get_thread(id).unwrap();
        assert_eq!(t.buyer_unread_count, 1);
        assert_eq!(t.owner_unread_count, 0);
        assert_reconciles(&db, id);
    }

    #[test]
    fn mark_read_resets_and_is_idempotent() {
        let (db, _dir) = test_db();
        let id = thread(&db);

        send(&db, id, Sender::Owner, "Yes");
        let first = db.mark_read(id, Role::Buyer).unwrap();
        let second = db.mark_read(id, Role::Buyer).unwrap();

        let t = db.get_thread(id).unwrap();
        assert_eq!(t.buyer_unread_count, 0);
        assert!(second >= first);
        assert_eq!(t.buyer_last_read_at, Some(second));
        assert_eq!(t.owner_last_read_at, None);
        assert_reconciles(&db, id);
    }

    #[test]
    fn unread_counts_messages_since_last_read() {
        let (db, _dir) = test_db();
        let id = thread(&db);

        send(&db, id, Sender::Buyer, "hello");
        let first_read = db.mark_read(id, Role::Owner).unwrap();
        send(&db, id, Sender::Buyer, "are you there?");
        send(&db, id, Sender::Buyer, "still interested");

        let t = db.get_thread(id).unwrap();
        assert_eq!(t.owner_unread_count, 2);
        assert_reconciles(&db, id);

        let second_read = db.mark_read(id, Role::Owner).unwrap();
        let t = db.get_thread(id).unwrap();
        assert_eq!(t.owner_unread_count, 0);
        assert!(second_read > first_read);
        assert_eq!(t.owner_last_read_at, Some(second_read));
        assert_reconciles(&db, id);
    }

    #[test]
    fn mark_read_unknown_thread_is_not_found() {
        let (db, _dir) = test_db();
        assert!(matches!(
            db.mark_read(ThreadId::new(), Role::Owner),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            db.reconcile_unread(ThreadId::new()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn mixed_sequence_stays_reconcilable() {
        let (db, _dir) = test_db();
        let id = thread(&db);

        let script: [(Option<Sender>, Option<Role>); 9] = [
            (Some(Sender::Buyer), None),
            (Some(Sender::Owner), None),
            (None, Some(Role::Owner)),
            (Some(Sender::Buyer), None),
            (Some(Sender::Admin), None),
            (None, Some(Role::Buyer)),
            (Some(Sender::Owner), None),
            (Some(Sender::Buyer), None),
            (None, Some(Role::Owner)),
        ];
        for (sender, reader) in script {
            if let Some(sender) = sender {
                send(&db, id, sender, "msg");
            }
            if let Some(role) = reader {
                db.mark_read(id, role).unwrap();
            }
            assert_reconciles(&db, id);
        }

        let t = db.get_thread(id).unwrap();
        assert_eq!(t.owner_unread_count, 0);
        assert_eq!(t.buyer_unread_count, 1);
    }

    #[test]
    fn seen_follows_counterpart_read_marker() {
        let (db, _dir) = test_db();
        let id = thread(&db);

        send(&db, id, Sender::Owner, "Yes");
        let t = db.get_thread(id).unwrap();
        let messages = db.list_messages(id).unwrap();
        assert!(!seen_by_counterpart(&t, &messages, Role::Owner));
        assert!(!seen_by_counterpart(&t, &messages, Role::Buyer));

        db.mark_read(id, Role::Buyer).unwrap();
        let t = db.get_thread(id).unwrap();
        assert_eq!(
            seen_state(&t, &messages),
            SeenState {
                buyer: false,
                owner: true
            }
        );

        send(&db, id, Sender::Owner, "Still there?");
        let t = db.get_thread(id).unwrap();
        let messages = db.list_messages(id).unwrap();
        assert!(!seen_by_counterpart(&t, &messages, Role::Owner));
    }

    #[test]
    fn unread_total_sums_participant_threads() {
        let (db, _dir) = test_db();
        let a = thread(&db);
        let b = db
            .find_or_create_thread(&NewThread {
                property_id: "P2".into(),
                owner_id: "O1".into(),
                buyer_email: "c@x.com".into(),
                buyer_name: "Cy".into(),
                buyer_id: None,
            })
            .unwrap()
            .id;

        send(&db, a, Sender::Buyer, "one");
        send(&db, b, Sender::Buyer, "two");
        send(&db, b, Sender::Buyer, "three");
        send(&db, a, Sender::Owner, "reply");

        assert_eq!(db.unread_total(&Participant::Owner("O1".into())).unwrap(), 3);
        assert_eq!(db.unread_total(&Participant::Owner(" O1 ".into())).unwrap(), 3);
        assert_eq!(db.unread_total(&Participant::Buyer("B@X.com".into())).unwrap(), 1);
        assert_eq!(db.unread_total(&Participant::Owner("nobody".into())).unwrap(), 0);
    }

    #[test]
    fn concurrent_sends_lose_no_increments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");
        let id = thread(&Database::open_at(&path).unwrap());

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let db = Database::open_at(&path).unwrap();
                    let sender = if i % 2 == 0 { Sender::Buyer } else { Sender::Owner };
                    for _ in 0..5 {
                        db.post_message(id, sender, "ping", &[]).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let db = Database::open_at(&path).unwrap();
        let t = db.get_thread(id).unwrap();
        assert_eq!(t.owner_unread_count, 15);
        assert_eq!(t.buyer_unread_count, 15);
        assert_eq!(db.list_messages(id).unwrap().len(), 30);
        assert_reconciles(&db, id);
    }
}
