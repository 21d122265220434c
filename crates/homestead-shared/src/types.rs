use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ParseError;

// Inquiry thread identity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ThreadId(pub Uuid);

impl ThreadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, ParseError> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ParseError::InvalidId(s.to_string()))
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One side of a thread. Unread counters and read markers exist per role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Owner,
}

impl Role {
    pub fn counterpart(self) -> Self {
        match self {
            Role::Buyer => Role::Owner,
            Role::Owner => Role::Buyer,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Owner => "owner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Role::Buyer),
            "owner" => Ok(Role::Owner),
            other => Err(ParseError::UnknownRole(other.to_string())),
        }
    }
}

/// Author of a message.
///
/// `Admin` is a mediator posting on the owner's side of the thread: it
/// raises the buyer's unread counter and leaves the owner's untouched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Buyer,
    Owner,
    Admin,
}

impl Sender {
    pub const ALL: [Sender; 3] = [Sender::Buyer, Sender::Owner, Sender::Admin];

    /// The side of the thread this sender writes on.
    pub fn side(self) -> Role {
        match self {
            Sender::Buyer => Role::Buyer,
            Sender::Owner | Sender::Admin => Role::Owner,
        }
    }

    /// The role whose unread counter a message from this sender raises.
    pub fn notifies(self) -> Role {
        self.side().counterpart()
    }

    /// Every sender whose messages count towards `role`'s unread counter.
    pub fn notifying(role: Role) -> impl Iterator<Item = Sender> {
        Self::ALL.into_iter().filter(move |s| s.notifies() == role)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sender::Buyer => "buyer",
            Sender::Owner => "owner",
            Sender::Admin => "admin",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buyer" => Ok(Sender::Buyer),
            "owner" => Ok(Sender::Owner),
            "admin" => Ok(Sender::Admin),
            other => Err(ParseError::UnknownSender(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    #[default]
    Open,
    Archived,
}

impl ThreadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreadStatus::Open => "open",
            ThreadStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreadStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ThreadStatus::Open),
            "archived" => Ok(ThreadStatus::Archived),
            other => Err(ParseError::UnknownStatus(other.to_string())),
        }
    }
}

/// Canonical form of a buyer e-mail, used as part of the thread key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
