//! Message extraction from the macOS Messages database (`chat.db`).
//!
//! The database is opened read-only. Messages are joined with their handle
//! (the other party's phone number or email) and, when present, the chat they
//! belong to.

use crate::error::{ImsgError, Result, ResultExt};
use crate::model::{MessageTime, RawMessage, present};
use chrono::{DateTime, Local, TimeZone, Utc};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tracing::{debug, info};

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z.
pub const APPLE_EPOCH_OFFSET: i64 = 978_307_200;

/// Raw `message.date` values above this are nanoseconds (macOS 10.13+);
/// older databases store seconds.
const NANOSECOND_THRESHOLD: i64 = 100_000_000_000;

/// `chat.style` for group conversations (45 is one-to-one).
const GROUP_CHAT_STYLE: i64 = 43;

const MESSAGE_QUERY: &str = r"
    SELECT
        m.date,
        m.text,
        m.is_from_me,
        h.id,
        h.ROWID,
        c.chat_identifier,
        c.display_name,
        c.style
    FROM message m
    LEFT JOIN handle h ON m.handle_id = h.ROWID
    LEFT JOIN chat_message_join cmj ON m.ROWID = cmj.message_id
    LEFT JOIN chat c ON cmj.chat_id = c.ROWID
    ORDER BY m.date ASC, m.ROWID ASC
";

/// Convert a `message.date` value to Unix seconds.
#[must_use]
pub const fn apple_time_to_unix(raw: i64) -> i64 {
    let seconds = if raw.abs() > NANOSECOND_THRESHOLD {
        raw / 1_000_000_000
    } else {
        raw
    };
    seconds + APPLE_EPOCH_OFFSET
}

/// Whether a chat row describes a group conversation.
fn is_group_chat(style: Option<i64>, chat_identifier: Option<&str>) -> bool {
    match style {
        Some(style) => style == GROUP_CHAT_STYLE,
        None => chat_identifier.is_some_and(|id| id.trim_start().starts_with("chat")),
    }
}

struct ExtractRow {
    date: i64,
    text: Option<String>,
    is_from_me: bool,
    handle: Option<String>,
    handle_rowid: Option<i64>,
    chat_identifier: Option<String>,
    chat_display_name: Option<String>,
    chat_style: Option<i64>,
}

impl ExtractRow {
    fn into_message<Tz: TimeZone>(self, tz: &Tz) -> Result<RawMessage> {
        let unix = apple_time_to_unix(self.date);
        let utc = DateTime::<Utc>::from_timestamp(unix, 0).ok_or_else(|| {
            ImsgError::invalid_field("chat.db", "message.date", self.date.to_string(), "message")
        })?;
        let local = utc.with_timezone(tz).naive_local();

        let handle = present(self.handle.as_deref()).map(String::from);
        let chat_identifier = present(self.chat_identifier.as_deref()).map(String::from);
        let group = is_group_chat(self.chat_style, chat_identifier.as_deref());

        let (chat_identifier, chat_display_name, contact_identifier) = if group {
            (
                chat_identifier,
                present(self.chat_display_name.as_deref()).map(String::from),
                handle.clone(),
            )
        } else {
            (None, None, handle.clone().or(chat_identifier))
        };

        Ok(RawMessage {
            timestamp: MessageTime::new(utc, local),
            sender_identifier: handle.unwrap_or_default(),
            sender_id: self.handle_rowid.map(|id| id.to_string()),
            text: self.text.unwrap_or_default(),
            chat_identifier,
            chat_display_name,
            contact_identifier,
            is_from_me: self.is_from_me,
        })
    }
}

/// Read-only handle on a Messages database.
pub struct MessageStore {
    conn: Connection,
}

impl MessageStore {
    /// Open the database read-only.
    ///
    /// # Errors
    ///
    /// Returns [`ImsgError::DatabaseNotFound`] if the file does not exist, or a
    /// database error if it cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ImsgError::database_not_found(path));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        info!("Opened message database at {}", path.display());
        Ok(Self { conn })
    }

    /// Wrap an existing connection.
    #[must_use]
    pub const fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Number of rows in the `message` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn message_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM message", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// All messages in date order, with local times in the system time zone.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a date is out of range.
    pub fn messages(&self) -> Result<Vec<RawMessage>> {
        self.messages_in(&Local)
    }

    /// All messages in date order, with local times in `tz`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a date is out of range.
    pub fn messages_in<Tz: TimeZone>(&self, tz: &Tz) -> Result<Vec<RawMessage>> {
        let mut stmt = self
            .conn
            .prepare(MESSAGE_QUERY)
            .context("Not a Messages database (message query failed)")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ExtractRow {
                    date: row.get::<_, Option<i64>>(0)?.unwrap_or_default(),
                    text: row.get(1)?,
                    is_from_me: row.get::<_, Option<i64>>(2)?.unwrap_or_default() != 0,
                    handle: row.get(3)?,
                    handle_rowid: row.get(4)?,
                    chat_identifier: row.get(5)?,
                    chat_display_name: row.get(6)?,
                    chat_style: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let messages = rows
            .into_iter()
            .map(|row| row.into_message(tz))
            .collect::<Result<Vec<_>>>()?;

        let groups = messages.iter().filter(|m| m.is_group_chat()).count();
        debug!(groups, direct = messages.len() - groups, "Classified messages");
        info!("Extracted {} messages", messages.len());
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    const NS: i64 = 1_000_000_000;

    fn store() -> MessageStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r"
            CREATE TABLE handle (ROWID INTEGER PRIMARY KEY, id TEXT);
            CREATE TABLE chat (ROWID INTEGER PRIMARY KEY, chat_identifier TEXT, display_name TEXT, style INTEGER);
            CREATE TABLE message (ROWID INTEGER PRIMARY KEY, date INTEGER, handle_id INTEGER, text TEXT, is_from_me INTEGER);
            CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER);

            INSERT INTO handle VALUES (1, '+15551234567');
            INSERT INTO handle VALUES (2, 'friend@example.com');
            INSERT INTO chat VALUES (1, '+15551234567', '', 45);
            INSERT INTO chat VALUES (2, 'chat123456', 'Family', 43);
            INSERT INTO chat VALUES (3, 'chat999', NULL, NULL);
            ",
        )
        .unwrap();

        let insert = |rowid: i64, date: i64, handle: i64, text: Option<&str>, me: i64, chat: i64| {
            conn.execute(
                "INSERT INTO message VALUES (?1, ?2, ?3, ?4, ?5)",
                params![rowid, date, handle, text, me],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO chat_message_join VALUES (?1, ?2)",
                params![chat, rowid],
            )
            .unwrap();
        };
        // 2024-05-01T12:00:00Z is 736_257_600 seconds after the Apple epoch.
        insert(1, 736_257_600 * NS, 1, Some("hello"), 0, 1);
        insert(2, 736_257_660 * NS, 1, Some("hi back"), 1, 1);
        insert(3, 736_257_720 * NS, 2, Some("group hello"), 0, 2);
        insert(4, 736_257_780 * NS, 0, None, 1, 2);
        insert(5, 736_257_840 * NS, 2, Some("unknown style"), 0, 3);

        MessageStore::from_connection(conn)
    }

    #[test]
    fn converts_apple_epoch() {
        assert_eq!(apple_time_to_unix(0), APPLE_EPOCH_OFFSET);
        assert_eq!(apple_time_to_unix(736_257_600 * NS), 1_714_564_800);
        assert_eq!(apple_time_to_unix(736_257_600), 1_714_564_800);
    }

    #[test]
    fn extracts_in_date_order() {
        let messages = store().messages_in(&Utc).unwrap();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].timestamp.unix_seconds(), 1_714_564_800);
        assert_eq!(
            messages[0].timestamp.local.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-05-01 12:00:00"
        );
        assert!(
            messages
                .windows(2)
                .all(|w| w[0].timestamp.utc <= w[1].timestamp.utc)
        );
    }

    #[test]
    fn direct_messages_carry_counterpart_and_no_chat_fields() {
        let messages = store().messages_in(&Utc).unwrap();
        let sent = &messages[1];
        assert!(sent.is_from_me);
        assert!(!sent.is_group_chat());
        assert_eq!(sent.chat_identifier, None);
        assert_eq!(sent.contact_identifier.as_deref(), Some("+15551234567"));
        assert_eq!(sent.sender_id.as_deref(), Some("1"));
    }

    #[test]
    fn group_messages_keep_chat_fields() {
        let messages = store().messages_in(&Utc).unwrap();
        let group = &messages[2];
        assert!(group.is_group_chat());
        assert_eq!(group.chat_display_name.as_deref(), Some("Family"));
        assert_eq!(group.sender_identifier, "friend@example.com");

        // Owner-sent group messages have no handle but are kept.
        let own = &messages[3];
        assert!(own.is_from_me);
        assert!(own.is_group_chat());
        assert_eq!(own.sender_identifier, "");
        assert_eq!(own.text, "");
        assert_eq!(own.sender_id, None);
    }

    #[test]
    fn unknown_style_falls_back_to_identifier_prefix() {
        let messages = store().messages_in(&Utc).unwrap();
        assert!(messages[4].is_group_chat());
        assert_eq!(messages[4].chat_identifier.as_deref(), Some("chat999"));
        assert_eq!(messages[4].chat_display_name, None);
    }

    #[test]
    fn chat_names_are_not_trimmed() {
        let store = store();
        store
            .conn
            .execute_batch(
                r"
                INSERT INTO chat VALUES (4, 'chat777', '  Book Club ', 43);
                INSERT INTO message VALUES (6, 736257900000000000, 2, 'padded', 0);
                INSERT INTO chat_message_join VALUES (4, 6);
                ",
            )
            .unwrap();
        let messages = store.messages_in(&Utc).unwrap();
        assert_eq!(messages[5].chat_display_name.as_deref(), Some("  Book Club "));
    }

    #[test]
    fn foreign_database_is_reported_with_context() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY);")
            .unwrap();
        let err = MessageStore::from_connection(conn).messages_in(&Utc).unwrap_err();
        assert!(matches!(err, ImsgError::WithContext { .. }));
        assert!(err.to_string().starts_with("Not a Messages database"));
    }

    #[test]
    fn counts_messages() {
        assert_eq!(store().message_count().unwrap(), 5);
    }

    #[test]
    fn missing_database_is_reported() {
        let result = MessageStore::open("/definitely/not/here/chat.db");
        assert!(matches!(result, Err(ImsgError::DatabaseNotFound { .. })));
    }
}
