use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};

use super::mappings::RowEntry;
use crate::state::{now_millis, MessageDeliveryState, MessageDirection, RawRecord};

pub(crate) const STORE_DB_FILE: &str = "chat_store.sqlite3";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
    PRAGMA journal_mode=WAL;

    CREATE TABLE IF NOT EXISTS messages (
        thread_id TEXT NOT NULL,
        unique_id TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        author TEXT NOT NULL,
        body TEXT NOT NULL,
        has_attachments INTEGER NOT NULL,
        direction TEXT NOT NULL,
        delivery TEXT NOT NULL,
        was_read INTEGER NOT NULL,
        seq INTEGER NOT NULL,
        version INTEGER NOT NULL,
        PRIMARY KEY (thread_id, unique_id)
    );
    CREATE INDEX IF NOT EXISTS idx_messages_thread_order
        ON messages(thread_id, timestamp, has_attachments DESC, seq);

    CREATE TABLE IF NOT EXISTS commits (
        commit_id INTEGER PRIMARY KEY AUTOINCREMENT,
        thread_id TEXT NOT NULL,
        unique_id TEXT NOT NULL,
        op TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS drafts (
        thread_id TEXT PRIMARY KEY,
        text TEXT NOT NULL
    );
"#;

// Column order shared by every record query.
const RECORD_COLUMNS: &str = "unique_id, thread_id, timestamp, author, body, has_attachments, \
     direction, delivery, was_read";

// Thread view order. Same-timestamp rows keep the attachment-bearing half of a
// split media message on top.
const THREAD_ORDER: &str = "ORDER BY timestamp ASC, has_attachments DESC, seq ASC";

pub(crate) fn open_store_db(data_dir: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(Path::new(data_dir).join(STORE_DB_FILE))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

/// Read-only connection for the long-lived thread view.
pub(crate) fn open_reader(data_dir: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(
        Path::new(data_dir).join(STORE_DB_FILE),
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Independent read-write connection (drafts).
pub(crate) fn open_editor(data_dir: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(Path::new(data_dir).join(STORE_DB_FILE))?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    let direction: String = row.get(6)?;
    let delivery: String = row.get(7)?;
    Ok(RawRecord {
        unique_id: row.get(0)?,
        thread_id: row.get(1)?,
        timestamp: row.get(2)?,
        author: row.get(3)?,
        body: row.get(4)?,
        has_attachments: row.get(5)?,
        direction: MessageDirection::parse(&direction).unwrap_or(MessageDirection::Incoming),
        delivery: MessageDeliveryState::parse(&delivery).unwrap_or(MessageDeliveryState::Sent),
        was_read: row.get(8)?,
    })
}

fn append_commit(conn: &Connection, thread_id: &str, unique_id: &str, op: &str) -> rusqlite::Result<u64> {
    conn.execute(
        "INSERT INTO commits (thread_id, unique_id, op, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![thread_id, unique_id, op, now_millis()],
    )?;
    Ok(conn.last_insert_rowid() as u64)
}

/// Insert or replace one record. Returns the commit id of the write.
pub(crate) fn upsert_record(conn: &mut Connection, record: &RawRecord) -> rusqlite::Result<u64> {
    let tx = conn.transaction()?;
    let exists = tx
        .query_row(
            "SELECT 1 FROM messages WHERE thread_id = ?1 AND unique_id = ?2",
            params![record.thread_id, record.unique_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    let op = if exists { "update" } else { "insert" };
    let commit_id = append_commit(&tx, &record.thread_id, &record.unique_id, op)?;
    tx.execute(
        r#"
        INSERT INTO messages (
            thread_id, unique_id, timestamp, author, body, has_attachments,
            direction, delivery, was_read, seq, version
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
        ON CONFLICT(thread_id, unique_id) DO UPDATE SET
            timestamp = excluded.timestamp,
            author = excluded.author,
            body = excluded.body,
            has_attachments = excluded.has_attachments,
            direction = excluded.direction,
            delivery = excluded.delivery,
            was_read = excluded.was_read,
            version = excluded.version
        "#,
        params![
            record.thread_id,
            record.unique_id,
            record.timestamp,
            record.author,
            record.body,
            record.has_attachments,
            record.direction.as_str(),
            record.delivery.as_str(),
            record.was_read,
            commit_id as i64,
        ],
    )?;
    tx.commit()?;
    Ok(commit_id)
}

/// Returns `None` when the record doesn't exist or already has that state.
pub(crate) fn set_delivery_state(
    conn: &mut Connection,
    thread_id: &str,
    unique_id: &str,
    delivery: MessageDeliveryState,
) -> rusqlite::Result<Option<u64>> {
    let tx = conn.transaction()?;
    let current: Option<String> = tx
        .query_row(
            "SELECT delivery FROM messages WHERE thread_id = ?1 AND unique_id = ?2",
            params![thread_id, unique_id],
            |row| row.get(0),
        )
        .optional()?;
    match current {
        None => return Ok(None),
        Some(s) if s == delivery.as_str() => return Ok(None),
        Some(_) => {}
    }
    let commit_id = append_commit(&tx, thread_id, unique_id, "update")?;
    tx.execute(
        "UPDATE messages SET delivery = ?3, version = ?4 WHERE thread_id = ?1 AND unique_id = ?2",
        params![thread_id, unique_id, delivery.as_str(), commit_id as i64],
    )?;
    tx.commit()?;
    Ok(Some(commit_id))
}

/// Returns `None` when the record doesn't exist or was already read.
pub(crate) fn mark_read(
    conn: &mut Connection,
    thread_id: &str,
    unique_id: &str,
) -> rusqlite::Result<Option<u64>> {
    let tx = conn.transaction()?;
    let was_read: Option<bool> = tx
        .query_row(
            "SELECT was_read FROM messages WHERE thread_id = ?1 AND unique_id = ?2",
            params![thread_id, unique_id],
            |row| row.get(0),
        )
        .optional()?;
    if was_read != Some(false) {
        return Ok(None);
    }
    let commit_id = append_commit(&tx, thread_id, unique_id, "update")?;
    tx.execute(
        "UPDATE messages SET was_read = 1, version = ?3 WHERE thread_id = ?1 AND unique_id = ?2",
        params![thread_id, unique_id, commit_id as i64],
    )?;
    tx.commit()?;
    Ok(Some(commit_id))
}

pub(crate) fn latest_commit(conn: &Connection) -> rusqlite::Result<u64> {
    conn.query_row("SELECT IFNULL(MAX(commit_id), 0) FROM commits", [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|v| v as u64)
}

/// Ordered (identity, version) list for one thread.
pub(crate) fn thread_rows(conn: &Connection, thread_id: &str) -> rusqlite::Result<Vec<RowEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT unique_id, version FROM messages WHERE thread_id = ?1 {THREAD_ORDER}"
    ))?;
    let rows = stmt.query_map([thread_id], |row| {
        Ok(RowEntry {
            unique_id: row.get(0)?,
            version: row.get::<_, i64>(1)? as u64,
        })
    })?;
    rows.collect()
}

pub(crate) fn thread_records(conn: &Connection, thread_id: &str) -> rusqlite::Result<Vec<RawRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RECORD_COLUMNS} FROM messages WHERE thread_id = ?1 {THREAD_ORDER}"
    ))?;
    let rows = stmt.query_map([thread_id], record_from_row)?;
    rows.collect()
}

pub(crate) fn get_record(
    conn: &Connection,
    thread_id: &str,
    unique_id: &str,
) -> rusqlite::Result<Option<RawRecord>> {
    conn.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM messages WHERE thread_id = ?1 AND unique_id = ?2"),
        params![thread_id, unique_id],
        record_from_row,
    )
    .optional()
}

pub(crate) fn get_draft(conn: &Connection, thread_id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT text FROM drafts WHERE thread_id = ?1",
        [thread_id],
        |row| row.get(0),
    )
    .optional()
}

/// An empty draft clears the row.
pub(crate) fn set_draft(conn: &Connection, thread_id: &str, text: &str) -> rusqlite::Result<()> {
    if text.is_empty() {
        conn.execute("DELETE FROM drafts WHERE thread_id = ?1", [thread_id])?;
    } else {
        conn.execute(
            "INSERT INTO drafts (thread_id, text) VALUES (?1, ?2)
             ON CONFLICT(thread_id) DO UPDATE SET text = excluded.text",
            params![thread_id, text],
        )?;
    }
    Ok(())
}
