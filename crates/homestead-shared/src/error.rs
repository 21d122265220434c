use thiserror::Error;

/// A wire string that does not name a known variant or identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown role: {0:?} (expected buyer or owner)")]
    UnknownRole(String),

    #[error("unknown sender: {0:?} (expected buyer, owner or admin)")]
    UnknownSender(String),

    #[error("unknown status: {0:?} (expected open or archived)")]
    UnknownStatus(String),

    #[error("invalid id: {0:?}")]
    InvalidId(String),
}
