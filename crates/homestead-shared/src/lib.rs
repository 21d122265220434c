//! # homestead-shared
//!
//! Vocabulary shared by the inquiry store and the HTTP server: typed ids,
//! the sender/role variants used by unread accounting, and thread status.

pub mod constants;
pub mod error;
pub mod types;

pub use error::ParseError;
pub use types::{normalize_email, MessageId, Role, Sender, ThreadId, ThreadStatus};
