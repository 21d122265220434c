//! Request-level inquiry operations.
//!
//! Each one composes the resolver, the ledger and the tracker inside a single
//! SQLite transaction, so a request either lands completely or not at all.

use homestead_shared::{Sender, ThreadId};

use crate::database::Database;
use crate::error::Result;
use crate::models::{InquiryRequest, Message, Thread, ThreadDetail};
use crate::unread::seen_state;

/// What a submitted inquiry produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub thread: Thread,
    /// `None` when the request carried neither text nor attachments.
    pub message: Option<Message>,
}

impl Database {
    /// Open or continue a buyer's thread about a listing.
    ///
    /// When the request carries text or attachments they are appended as a
    /// buyer message and the owner's unread counter is raised. Empty
    /// attachment entries are skipped. A request with neither only resolves
    /// the thread.
    pub fn submit_inquiry(&self, request: &InquiryRequest) -> Result<Submission> {
        let tx = self.write_tx()?;

        let thread = self.find_or_create_thread(&request.new_thread())?;

        let text = request.message.as_deref().unwrap_or("");
        let attachments: Vec<String> = request
            .attachments
            .iter()
            .filter(|url| !url.is_empty())
            .cloned()
            .collect();

        let message = if !text.is_empty() || !attachments.is_empty() {
            let message = self.append_message(thread.id, Sender::Buyer, text, &attachments)?;
            self.on_message_appended(&message)?;
            Some(message)
        } else {
            None
        };

        let thread = self.get_thread(thread.id)?;
        tx.commit()?;

        tracing::info!(
            thread_id = %thread.id,
            with_message = message.is_some(),
            "inquiry submitted"
        );
        Ok(Submission { thread, message })
    }

    /// Append a message to an existing thread and update its unread state.
    pub fn post_message(
        &self,
        thread_id: ThreadId,
        sender: Sender,
        text: &str,
        attachments: &[String],
    ) -> Result<Message> {
        let tx = self.write_tx()?;
        let message = self.append_message(thread_id, sender, text, attachments)?;
        self.on_message_appended(&message)?;
        tx.commit()?;

        tracing::info!(
            thread_id = %thread_id,
            message_id = %message.id,
            sender = %sender,
            "message posted"
        );
        Ok(message)
    }

    /// A thread with its full history and derived seen indicators.
    pub fn thread_detail(&self, thread_id: ThreadId) -> Result<ThreadDetail> {
        let tx = self.read_tx()?;
        let inquiry = self.get_thread(thread_id)?;
        let messages = self.list_messages(thread_id)?;
        tx.commit()?;

        let seen = seen_state(&inquiry, &messages);
        Ok(ThreadDetail {
            inquiry,
            messages,
            seen,
        })
    }
}
