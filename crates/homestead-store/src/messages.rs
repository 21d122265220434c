//! The message ledger: append-only, ordered per thread.
//!
//! Appending never touches a thread's read/unread state; see `unread.rs`.

use rusqlite::params;

use homestead_shared::{MessageId, Sender, ThreadId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{after, decode_ts, encode_ts, now, Message};
use crate::threads::{id_column, parsed_column, ts_column};

impl Database {
    /// Append a message to an existing thread.
    ///
    /// `text` may be empty only when at least one attachment is given. Text
    /// and attachment URLs are stored exactly as given. The stored timestamp
    /// is strictly later than every earlier message and read marker on the
    /// thread.
    pub fn append_message(
        &self,
        thread_id: ThreadId,
        sender: Sender,
        text: &str,
        attachments: &[String],
    ) -> Result<Message> {
        if text.is_empty() && attachments.is_empty() {
            return Err(StoreError::Validation(
                "text or attachments required".to_string(),
            ));
        }

        self.ensure_thread_exists(thread_id)?;

        let created_at = after(now(), self.latest_instant(thread_id)?);
        let message = Message {
            id: MessageId::new(),
            thread_id,
            sender,
            text: text.to_string(),
            attachments: attachments.to_vec(),
            created_at,
        };

        self.conn().execute(
            "INSERT INTO inquiry_messages (id, inquiry_id, sender, text, attachments, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id.to_string(),
                thread_id.to_string(),
                sender.as_str(),
                message.text,
                serde_json::to_string(&message.attachments)?,
                encode_ts(&message.created_at),
            ],
        )?;

        tracing::debug!(
            thread_id = %thread_id,
            message_id = %message.id,
            sender = %sender,
            attachments = message.attachments.len(),
            "appended message"
        );
        Ok(message)
    }

    /// All messages of a thread, oldest first. Ties on `created_at` are
    /// broken by id.
    pub fn list_messages(&self, thread_id: ThreadId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, inquiry_id, sender, text, attachments, created_at
             FROM inquiry_messages
             WHERE inquiry_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![thread_id.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Latest message timestamp or read marker recorded on the thread.
    fn latest_instant(&self, thread_id: ThreadId) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        let latest: Option<String> = self.conn().query_row(
            "SELECT MAX(
                 COALESCE((SELECT MAX(created_at) FROM inquiry_messages WHERE inquiry_id = i.id), ''),
                 COALESCE(i.buyer_last_read_at, ''),
                 COALESCE(i.owner_last_read_at, '')
             )
             FROM inquiries i WHERE i.id = ?1",
            params![thread_id.to_string()],
            |row| row.get(0),
        )?;

        match latest.filter(|s| !s.is_empty()) {
            Some(s) => Ok(Some(decode_ts(&s)?)),
            None => Ok(None),
        }
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let attachments_json: String = row.get(4)?;
    let attachments: Vec<String> = serde_json::from_str(&attachments_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Message {
        id: MessageId(id_column(row, 0)?),
        thread_id: ThreadId(id_column(row, 1)?),
        sender: parsed_column(row, 2)?,
        text: row.get(3)?,
        attachments,
        created_at: ts_column(row, 5)?,
    })
}
