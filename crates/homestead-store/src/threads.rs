//! Thread identity resolution, lookup, listing and archival.

use rusqlite::{params, params_from_iter, OptionalExtension};

use homestead_shared::{normalize_email, ThreadId, ThreadStatus};

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{
    decode_ts, encode_ts, now, InsertOutcome, NewThread, Thread, ThreadFilter, ThreadScope,
};

const THREAD_COLUMNS: &str = "id, property_id, owner_id, buyer_id, buyer_name, buyer_email,
     status, created_at, last_activity_at, buyer_unread_count, owner_unread_count,
     buyer_last_read_at, owner_last_read_at";

impl Database {
    // ------------------------------------------------------------------
    // Resolve
    // ------------------------------------------------------------------

    /// Return the thread for `(property, owner, buyer e-mail)`, creating it
    /// when absent.
    ///
    /// An existing thread is returned unchanged, even if the buyer's name or
    /// account id differ from the ones it was created with. If another
    /// writer creates the same key between the lookup and the insert, the
    /// winner's thread is returned.
    pub fn find_or_create_thread(&self, new: &NewThread) -> Result<Thread> {
        let new = validate_new_thread(new)?;

        if let Some(existing) =
            self.find_thread_by_key(&new.property_id, &new.owner_id, &new.buyer_email)?
        {
            return Ok(existing);
        }

        match self.insert_thread_if_absent(&new)? {
            InsertOutcome::Inserted(thread) => {
                tracing::info!(
                    thread_id = %thread.id,
                    property_id = %thread.property_id,
                    owner_id = %thread.owner_id,
                    "created inquiry thread"
                );
                Ok(thread)
            }
            InsertOutcome::Conflict => {
                tracing::debug!(
                    property_id = %new.property_id,
                    owner_id = %new.owner_id,
                    "lost thread creation race, re-reading winner"
                );
                self.find_thread_by_key(&new.property_id, &new.owner_id, &new.buyer_email)?
                    .ok_or(StoreError::NotFound)
            }
        }
    }

    /// Insert a fresh open thread unless the natural key is already taken.
    ///
    /// The caller is expected to have normalised the e-mail; this is the raw
    /// compare-and-swap on the unique key.
    pub fn insert_thread_if_absent(&self, new: &NewThread) -> Result<InsertOutcome> {
        let created_at = now();
        let thread = Thread {
            id: ThreadId::new(),
            property_id: new.property_id.clone(),
            owner_id: new.owner_id.clone(),
            buyer_id: new.buyer_id.clone(),
            buyer_name: new.buyer_name.clone(),
            buyer_email: new.buyer_email.clone(),
            status: ThreadStatus::Open,
            created_at,
            last_activity_at: created_at,
            buyer_unread_count: 0,
            owner_unread_count: 0,
            buyer_last_read_at: None,
            owner_last_read_at: None,
        };

        let ts = encode_ts(&created_at);
        let affected = self.conn().execute(
            "INSERT INTO inquiries
                 (id, property_id, owner_id, buyer_id, buyer_name, buyer_email,
                  status, created_at, last_activity_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'open', ?7, ?7)
             ON CONFLICT (property_id, owner_id, buyer_email) DO NOTHING",
            params![
                thread.id.to_string(),
                thread.property_id,
                thread.owner_id,
                thread.buyer_id,
                thread.buyer_name,
                thread.buyer_email,
                ts,
            ],
        )?;

        if affected == 0 {
            Ok(InsertOutcome::Conflict)
        } else {
            Ok(InsertOutcome::Inserted(thread))
        }
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn find_thread_by_key(
        &self,
        property_id: &str,
        owner_id: &str,
        buyer_email: &str,
    ) -> Result<Option<Thread>> {
        let sql = format!(
            "SELECT {THREAD_COLUMNS} FROM inquiries
             WHERE property_id = ?1 AND owner_id = ?2 AND buyer_email = ?3"
        );
        let thread = self
            .conn()
            .query_row(
                &sql,
                params![property_id, owner_id, normalize_email(buyer_email)],
                row_to_thread,
            )
            .optional()?;
        Ok(thread)
    }

    /// Fetch a single thread by id.
    pub fn get_thread(&self, id: ThreadId) -> Result<Thread> {
        let sql = format!("SELECT {THREAD_COLUMNS} FROM inquiries WHERE id = ?1");
        self.conn()
            .query_row(&sql, params![id.to_string()], row_to_thread)
            .map_err(not_found)
    }

    pub(crate) fn ensure_thread_exists(&self, id: ThreadId) -> Result<()> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS (SELECT 1 FROM inquiries WHERE id = ?1)",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    /// List threads, most recently active first.
    pub fn list_threads(&self, filter: &ThreadFilter) -> Result<Vec<Thread>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<String> = Vec::new();

        match &filter.scope {
            ThreadScope::Owner(owner_id) => {
                clauses.push("owner_id = ?");
                args.push(owner_id.trim().to_string());
            }
            ThreadScope::Buyer(email) => {
                clauses.push("buyer_email = ?");
                args.push(normalize_email(email));
            }
            ThreadScope::All => {}
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            args.push(status.as_str().to_string());
        }

        let mut sql = format!("SELECT {THREAD_COLUMNS} FROM inquiries");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(
            " ORDER BY COALESCE(last_activity_at, created_at) DESC, created_at DESC, id ASC",
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), row_to_thread)?;

        let mut threads = Vec::new();
        for row in rows {
            threads.push(row?);
        }
        Ok(threads)
    }

    pub fn list_threads_for_owner(&self, owner_id: &str) -> Result<Vec<Thread>> {
        self.list_threads(&ThreadFilter::new(ThreadScope::Owner(owner_id.to_string())))
    }

    pub fn list_threads_for_buyer(&self, buyer_email: &str) -> Result<Vec<Thread>> {
        self.list_threads(&ThreadFilter::new(ThreadScope::Buyer(
            buyer_email.to_string(),
        )))
    }

    /// Every thread in the system. Access control is the caller's concern.
    pub fn list_all_threads(&self) -> Result<Vec<Thread>> {
        self.list_threads(&ThreadFilter::new(ThreadScope::All))
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Move a thread out of the visible inbox. History stays readable by id.
    pub fn archive_thread(&self, id: ThreadId) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE inquiries SET status = 'archived' WHERE id = ?1",
            params![id.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        tracing::info!(thread_id = %id, "archived inquiry thread");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_new_thread(new: &NewThread) -> Result<NewThread> {
    let required = [
        ("propertyId", &new.property_id),
        ("ownerId", &new.owner_id),
        ("buyerName", &new.buyer_name),
        ("buyerEmail", &new.buyer_email),
    ];
    let missing: Vec<&str> = required
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(StoreError::Validation(format!(
            "missing fields: {}",
            missing.join(", ")
        )));
    }

    Ok(NewThread {
        property_id: new.property_id.trim().to_string(),
        owner_id: new.owner_id.trim().to_string(),
        buyer_email: normalize_email(&new.buyer_email),
        buyer_name: new.buyer_name.trim().to_string(),
        buyer_id: new
            .buyer_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string),
    })
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

pub(crate) fn ts_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<chrono::DateTime<chrono::Utc>> {
    let s: String = row.get(idx)?;
    decode_ts(&s).map_err(|e| conversion_err(idx, e))
}

fn opt_ts_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<chrono::DateTime<chrono::Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| decode_ts(&s).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

pub(crate) fn id_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<uuid::Uuid> {
    let s: String = row.get(idx)?;
    uuid::Uuid::parse_str(&s).map_err(|e| conversion_err(idx, e))
}

pub(crate) fn parsed_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse::<T>().map_err(|e| conversion_err(idx, e))
}

/// Map a `rusqlite::Row` to a [`Thread`].
fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<Thread> {
    Ok(Thread {
        id: ThreadId(id_column(row, 0)?),
        property_id: row.get(1)?,
        owner_id: row.get(2)?,
        buyer_id: row.get(3)?,
        buyer_name: row.get(4)?,
        buyer_email: row.get(5)?,
        status: parsed_column(row, 6)?,
        created_at: ts_column(row, 7)?,
        last_activity_at: ts_column(row, 8)?,
        buyer_unread_count: row.get(9)?,
        owner_unread_count: row.get(10)?,
        buyer_last_read_at: opt_ts_column(row, 11)?,
        owner_last_read_at: opt_ts_column(row, 12)?,
    })
}
