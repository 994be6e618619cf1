//! SQLite-backed row source
//!
//! Emulates the telephony provider's sms, mms and threads tables so the
//! command-line driver has persistent data to work against.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::{ALL_THREADS, RowSource};
use crate::models::{
    ConversationRow, MessageId, MessageKind, MessageRow, MmsPart, NewMessage, ReadStatus,
    UNKNOWN_COUNT,
};

/// Database migrations
///
/// The user_version pragma tracks which migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            CREATE TABLE recipients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                address TEXT NOT NULL UNIQUE
            );

            -- Denormalized thread state, refreshed after every write
            CREATE TABLE threads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient_id INTEGER NOT NULL UNIQUE REFERENCES recipients(id),
                date INTEGER NOT NULL DEFAULT 0,
                snippet TEXT,
                read INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX idx_threads_date ON threads(date DESC);

            CREATE TABLE sms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id INTEGER NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                address TEXT NOT NULL,
                date INTEGER NOT NULL,
                body TEXT,
                type INTEGER NOT NULL,
                read INTEGER NOT NULL DEFAULT 0,
                subject TEXT
            );

            CREATE INDEX idx_sms_thread ON sms(thread_id, date DESC);
            CREATE INDEX idx_sms_unread ON sms(read, type);

            CREATE TABLE mms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id INTEGER NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                address TEXT NOT NULL,
                date INTEGER NOT NULL,
                msg_box INTEGER NOT NULL,
                read INTEGER NOT NULL DEFAULT 0,
                sub TEXT,
                part_text TEXT,
                part_picture TEXT,
                content_uri TEXT
            );

            CREATE INDEX idx_mms_thread ON mms(thread_id, date DESC);
            CREATE INDEX idx_mms_unread ON mms(read, msg_box);
            "#,
        ),
    ])
}

const SMS_COLUMNS: &str = "id, thread_id, date, address, body, type, read, subject";
const MMS_COLUMNS: &str =
    "id, thread_id, date, address, msg_box, read, sub, part_text, part_picture, content_uri";

fn sms_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        date: row.get(2)?,
        address: row.get(3)?,
        // The sms table always has a body column; NULL reads as empty text
        body: Some(row.get::<_, Option<String>>(4)?.unwrap_or_default()),
        kind: MessageKind::from_code(row.get(5)?),
        read: ReadStatus::from_flag(row.get(6)?),
        subject: row.get(7)?,
        mms: None,
    })
}

fn mms_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        date: row.get(2)?,
        address: row.get(3)?,
        body: None,
        kind: MessageKind::from_code(row.get(4)?),
        read: ReadStatus::from_flag(row.get(5)?),
        subject: row.get(6)?,
        mms: Some(MmsPart {
            text: row.get(7)?,
            picture: row.get(8)?,
            content_uri: row.get(9)?,
        }),
    })
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        thread_id: row.get(0)?,
        date: row.get(1)?,
        body: row.get(2)?,
        read: ReadStatus::from_flag(row.get(3)?),
        message_count: UNKNOWN_COUNT,
        recipient_id: row.get(4)?,
    })
}

fn sort_newest_first(rows: &mut [MessageRow]) {
    rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
}

/// SQLite implementation of RowSource
pub struct SqliteRowSource {
    conn: Mutex<Connection>,
}

impl SqliteRowSource {
    /// Open (or create) a database at `db_path`
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        Self::from_connection(conn, true)
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn, false)
    }

    fn from_connection(mut conn: Connection, wal: bool) -> Result<Self> {
        // WAL lets readers proceed while the receiver inserts new rows.
        // foreign_keys is required for ON DELETE CASCADE.
        if wal {
            conn.execute_batch(
                r#"
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                "#,
            )?;
        }
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Recompute the denormalized date/snippet/read columns of a thread,
    /// deleting the thread when it has no messages left
    fn refresh_thread(conn: &Connection, thread_id: i64) -> Result<()> {
        let newest: Option<(i64, Option<String>)> = conn
            .query_row(
                "SELECT date, text FROM (
                    SELECT date, id, body AS text FROM sms WHERE thread_id = ?1
                    UNION ALL
                    SELECT date, id, part_text AS text FROM mms WHERE thread_id = ?1
                 ) ORDER BY date DESC, id DESC LIMIT 1",
                [thread_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((date, snippet)) = newest else {
            conn.execute("DELETE FROM threads WHERE id = ?", [thread_id])?;
            return Ok(());
        };

        let unread: i64 = conn.query_row(
            "SELECT (SELECT COUNT(*) FROM sms WHERE thread_id = ?1 AND read = 0 AND type = 1)
                  + (SELECT COUNT(*) FROM mms WHERE thread_id = ?1 AND read = 0 AND msg_box = 1)",
            [thread_id],
            |row| row.get(0),
        )?;

        conn.execute(
            "UPDATE threads SET date = ?, snippet = ?, read = ? WHERE id = ?",
            params![date, snippet, if unread > 0 { 0 } else { 1 }, thread_id],
        )?;
        Ok(())
    }

    fn thread_for_address(conn: &Connection, address: &str) -> Result<i64> {
        conn.execute(
            "INSERT OR IGNORE INTO recipients (address) VALUES (?)",
            [address],
        )?;
        let recipient_id: i64 = conn.query_row(
            "SELECT id FROM recipients WHERE address = ?",
            [address],
            |row| row.get(0),
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO threads (recipient_id) VALUES (?)",
            [recipient_id],
        )?;
        let thread_id = conn.query_row(
            "SELECT id FROM threads WHERE recipient_id = ?",
            [recipient_id],
            |row| row.get(0),
        )?;
        Ok(thread_id)
    }

    fn query_messages(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
        map: fn(&Row<'_>) -> rusqlite::Result<MessageRow>,
    ) -> Result<Vec<MessageRow>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, map)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl RowSource for SqliteRowSource {
    fn get_conversation(&self, thread_id: i64) -> Result<Option<ConversationRow>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT id, date, snippet, read, recipient_id FROM threads WHERE id = ?",
                [thread_id],
                conversation_from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn list_conversations(&self, limit: usize, offset: usize) -> Result<Vec<ConversationRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, date, snippet, read, recipient_id FROM threads
             ORDER BY date DESC, id DESC
             LIMIT ? OFFSET ?",
        )?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], conversation_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_message(&self, id: MessageId) -> Result<Option<MessageRow>> {
        let conn = self.conn();
        let row = if id.is_mms() {
            conn.query_row(
                &format!("SELECT {MMS_COLUMNS} FROM mms WHERE id = ?"),
                [id.row_id()],
                mms_from_row,
            )
        } else {
            conn.query_row(
                &format!("SELECT {SMS_COLUMNS} FROM sms WHERE id = ?"),
                [id.row_id()],
                sms_from_row,
            )
        }
        .optional()?;
        Ok(row)
    }

    fn list_messages(&self, thread_id: i64) -> Result<Vec<MessageRow>> {
        let conn = self.conn();
        let mut rows = Self::query_messages(
            &conn,
            &format!("SELECT {SMS_COLUMNS} FROM sms WHERE thread_id = ?"),
            [thread_id],
            sms_from_row,
        )?;
        rows.extend(Self::query_messages(
            &conn,
            &format!("SELECT {MMS_COLUMNS} FROM mms WHERE thread_id = ?"),
            [thread_id],
            mms_from_row,
        )?);
        sort_newest_first(&mut rows);
        Ok(rows)
    }

    fn list_unread_sms(&self) -> Result<Vec<MessageRow>> {
        let conn = self.conn();
        Self::query_messages(
            &conn,
            &format!(
                "SELECT {SMS_COLUMNS} FROM sms WHERE read = 0 AND type = 1
                 ORDER BY date DESC, id DESC"
            ),
            params![],
            sms_from_row,
        )
    }

    fn list_unread_mms(&self) -> Result<Vec<MessageRow>> {
        let conn = self.conn();
        Self::query_messages(
            &conn,
            &format!(
                "SELECT {MMS_COLUMNS} FROM mms WHERE read = 0 AND msg_box = 1
                 ORDER BY date DESC, id DESC"
            ),
            params![],
            mms_from_row,
        )
    }

    fn count_messages(&self, thread_id: i64) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT (SELECT COUNT(*) FROM sms WHERE thread_id = ?1)
                  + (SELECT COUNT(*) FROM mms WHERE thread_id = ?1)",
            [thread_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn last_body(&self, thread_id: i64) -> Result<Option<String>> {
        let conn = self.conn();
        let body: Option<Option<String>> = conn
            .query_row(
                "SELECT text FROM (
                    SELECT date, id, body AS text FROM sms WHERE thread_id = ?1
                    UNION ALL
                    SELECT date, id, part_text AS text FROM mms WHERE thread_id = ?1
                 ) WHERE text IS NOT NULL ORDER BY date DESC, id DESC LIMIT 1",
                [thread_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body.flatten())
    }

    fn recipient_address(&self, recipient_id: i64) -> Result<Option<String>> {
        let conn = self.conn();
        let address = conn
            .query_row(
                "SELECT address FROM recipients WHERE id = ?",
                [recipient_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(address)
    }

    fn insert_message(&self, message: NewMessage) -> Result<MessageId> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let thread_id = Self::thread_for_address(&tx, &message.address)?;

        let id = match &message.mms {
            Some(part) => {
                tx.execute(
                    "INSERT INTO mms (thread_id, address, date, msg_box, read,
                                      part_text, part_picture, content_uri)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        thread_id,
                        message.address,
                        message.date,
                        message.kind.code(),
                        message.read.as_flag(),
                        part.text,
                        part.picture,
                        part.content_uri,
                    ],
                )?;
                MessageId::mms(tx.last_insert_rowid())
            }
            None => {
                tx.execute(
                    "INSERT INTO sms (thread_id, address, date, body, type, read)
                     VALUES (?, ?, ?, ?, ?, ?)",
                    params![
                        thread_id,
                        message.address,
                        message.date,
                        message.body,
                        message.kind.code(),
                        message.read.as_flag(),
                    ],
                )?;
                MessageId::sms(tx.last_insert_rowid())
            }
        };

        Self::refresh_thread(&tx, thread_id)?;
        tx.commit()?;
        Ok(id)
    }

    fn mark_read(&self, thread_id: i64) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let changed = if thread_id == ALL_THREADS {
            tx.execute("UPDATE sms SET read = 1 WHERE read = 0", [])?
                + tx.execute("UPDATE mms SET read = 1 WHERE read = 0", [])?
        } else {
            tx.execute(
                "UPDATE sms SET read = 1 WHERE read = 0 AND thread_id = ?",
                [thread_id],
            )? + tx.execute(
                "UPDATE mms SET read = 1 WHERE read = 0 AND thread_id = ?",
                [thread_id],
            )?
        };

        if thread_id == ALL_THREADS {
            tx.execute("UPDATE threads SET read = 1", [])?;
        } else {
            Self::refresh_thread(&tx, thread_id)?;
        }

        tx.commit()?;
        Ok(changed)
    }

    fn delete_thread(&self, thread_id: i64) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM sms WHERE thread_id = ?", [thread_id])?
            + tx.execute("DELETE FROM mms WHERE thread_id = ?", [thread_id])?;
        tx.execute("DELETE FROM threads WHERE id = ?", [thread_id])?;
        tx.commit()?;
        Ok(removed)
    }

    fn delete_all(&self) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let removed =
            tx.execute("DELETE FROM sms", [])? + tx.execute("DELETE FROM mms", [])?;
        tx.execute("DELETE FROM threads", [])?;
        tx.commit()?;
        Ok(removed)
    }

    fn delete_message(&self, id: MessageId) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let table = if id.is_mms() { "mms" } else { "sms" };

        let thread_id: Option<i64> = tx
            .query_row(
                &format!("SELECT thread_id FROM {table} WHERE id = ?"),
                [id.row_id()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(thread_id) = thread_id else {
            return Ok(false);
        };

        tx.execute(&format!("DELETE FROM {table} WHERE id = ?"), [id.row_id()])?;
        Self::refresh_thread(&tx, thread_id)?;
        tx.commit()?;
        Ok(true)
    }
}
