//! Domain model structs persisted in the inquiry database.
//!
//! Every struct derives `Serialize` so it can be handed directly to the HTTP
//! layer. Field names are rendered in camelCase, which is what the web UI
//! reads.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use homestead_shared::{MessageId, Sender, ThreadId, ThreadStatus};

// ---------------------------------------------------------------------------
// Thread
// ---------------------------------------------------------------------------

/// Conversation between one buyer and one owner about one listing.
///
/// `(property_id, owner_id, buyer_email)` is the natural key; the store keeps
/// exactly one row per key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: ThreadId,
    pub property_id: String,
    pub owner_id: String,
    /// Authenticated buyer account, absent for anonymous inquiries.
    pub buyer_id: Option<String>,
    pub buyer_name: String,
    /// Stored lowercased.
    pub buyer_email: String,
    pub status: ThreadStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub buyer_unread_count: u32,
    pub owner_unread_count: u32,
    pub buyer_last_read_at: Option<DateTime<Utc>>,
    pub owner_last_read_at: Option<DateTime<Utc>>,
}

/// Fields supplied when resolving a thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewThread {
    pub property_id: String,
    pub owner_id: String,
    pub buyer_email: String,
    pub buyer_name: String,
    #[serde(default)]
    pub buyer_id: Option<String>,
}

/// Result of the compare-and-swap insert on the thread key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(Thread),
    /// Another writer already holds the key.
    Conflict,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single immutable ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub sender: Sender,
    pub text: String,
    /// Hosted attachment URLs, in the order the sender supplied them.
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Inquiry submission
// ---------------------------------------------------------------------------

/// A buyer's first-contact (or follow-up) submission for a listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InquiryRequest {
    pub property_id: String,
    pub owner_id: String,
    #[serde(default)]
    pub buyer_id: Option<String>,
    pub buyer_name: String,
    pub buyer_email: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl InquiryRequest {
    pub fn new_thread(&self) -> NewThread {
        NewThread {
            property_id: self.property_id.clone(),
            owner_id: self.owner_id.clone(),
            buyer_email: self.buyer_email.clone(),
            buyer_name: self.buyer_name.clone(),
            buyer_id: self.buyer_id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Which threads a listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadScope {
    Owner(String),
    Buyer(String),
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadFilter {
    pub scope: ThreadScope,
    pub status: Option<ThreadStatus>,
}

impl ThreadFilter {
    pub fn new(scope: ThreadScope) -> Self {
        Self {
            scope,
            status: None,
        }
    }

    pub fn with_status(mut self, status: Option<ThreadStatus>) -> Self {
        self.status = status;
        self
    }
}

/// A participant's whole inbox, for unread badges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Participant {
    Owner(String),
    Buyer(String),
}

// ---------------------------------------------------------------------------
// Read state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCounts {
    pub buyer: u32,
    pub owner: u32,
}

/// Whether each side's most recent message has been read by the other side.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SeenState {
    pub buyer: bool,
    pub owner: bool,
}

/// A thread with its full history, as served to either participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadDetail {
    pub inquiry: Thread,
    pub messages: Vec<Message>,
    pub seen: SeenState,
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Current time at the precision the database stores.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// First instant strictly after `floor`, or `candidate` when it already is.
pub(crate) fn after(candidate: DateTime<Utc>, floor: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match floor {
        Some(floor) if candidate <= floor => floor + Duration::microseconds(1),
        _ => candidate,
    }
}

/// Fixed-width RFC 3339 so that text order equals time order in SQLite.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}
