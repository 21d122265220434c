//! v001 -- Initial schema creation.
//!
//! Creates the two inquiry tables: `inquiries` (one row per thread, holding
//! the mutable read/unread state) and `inquiry_messages` (the append-only
//! ledger).

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Inquiry threads
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS inquiries (
    id                 TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    property_id        TEXT NOT NULL,
    owner_id           TEXT NOT NULL,
    buyer_id           TEXT,                        -- absent for anonymous buyers
    buyer_name         TEXT NOT NULL,
    buyer_email        TEXT NOT NULL,               -- lowercased
    status             TEXT NOT NULL DEFAULT 'open'
                       CHECK (status IN ('open', 'archived')),
    created_at         TEXT NOT NULL,               -- RFC-3339, microseconds, UTC
    last_activity_at   TEXT NOT NULL,
    buyer_unread_count INTEGER NOT NULL DEFAULT 0 CHECK (buyer_unread_count >= 0),
    owner_unread_count INTEGER NOT NULL DEFAULT 0 CHECK (owner_unread_count >= 0),
    buyer_last_read_at TEXT,
    owner_last_read_at TEXT,

    UNIQUE (property_id, owner_id, buyer_email)
);

CREATE INDEX IF NOT EXISTS idx_inquiries_owner ON inquiries(owner_id);
CREATE INDEX IF NOT EXISTS idx_inquiries_buyer_email ON inquiries(buyer_email);
CREATE INDEX IF NOT EXISTS idx_inquiries_activity ON inquiries(last_activity_at DESC);

-- ----------------------------------------------------------------
-- Inquiry messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS inquiry_messages (
    id          TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    inquiry_id  TEXT NOT NULL,               -- FK -> inquiries(id)
    sender      TEXT NOT NULL CHECK (sender IN ('buyer', 'owner', 'admin')),
    text        TEXT NOT NULL DEFAULT '',
    attachments TEXT NOT NULL DEFAULT '[]',  -- JSON array of URLs
    created_at  TEXT NOT NULL,

    FOREIGN KEY (inquiry_id) REFERENCES inquiries(id)
);

CREATE INDEX IF NOT EXISTS idx_inquiry_messages_thread_ts
    ON inquiry_messages(inquiry_id, created_at ASC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
