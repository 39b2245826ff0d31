//! CSV tables exchanged between pipeline stages.
//!
//! All tables are UTF-8, fully quoted, with a mandatory header row. Column
//! names are matched exactly (case-sensitive). Required columns that are
//! missing from the header are reported as [`ImsgError::MalformedSource`].

use crate::error::{ImsgError, Result};
use crate::model::{
    ContactRow, LabeledMessage, MessageTime, RawMessage, Resolution, non_blank, present,
};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info};

pub const COL_TIMESTAMP: &str = "Timestamp";
pub const COL_READABLE_TIME: &str = "Readable Time";
pub const COL_SENDER: &str = "Sender";
pub const COL_SENDER_ID: &str = "Sender ID";
pub const COL_MESSAGE: &str = "Message";
pub const COL_CHAT_IDENTIFIER: &str = "Chat Identifier";
pub const COL_GROUP_CHAT_NAME: &str = "Group Chat Name";
pub const COL_SENT_BY_ME: &str = "Sent by Me";
pub const COL_CONTACT_IDENTIFIER: &str = "Contact Identifier";
pub const COL_GROUP_CHAT: &str = "Group Chat";
pub const COL_TO: &str = "To";

pub const COL_FULL_NAME: &str = "Full Name";
pub const COL_PHONE_NUMBER: &str = "Phone Number";

/// Format of the `Readable Time` column.
pub const READABLE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Header of the message table written by `imsg extract`.
pub const MESSAGE_HEADER: [&str; 10] = [
    COL_TIMESTAMP,
    COL_READABLE_TIME,
    COL_SENDER,
    COL_SENDER_ID,
    COL_MESSAGE,
    COL_CHAT_IDENTIFIER,
    COL_GROUP_CHAT_NAME,
    COL_SENT_BY_ME,
    COL_CONTACT_IDENTIFIER,
    COL_GROUP_CHAT,
];

/// Header of the labeled table: the message header plus `To`.
pub const LABELED_HEADER: [&str; 11] = [
    COL_TIMESTAMP,
    COL_READABLE_TIME,
    COL_SENDER,
    COL_SENDER_ID,
    COL_MESSAGE,
    COL_CHAT_IDENTIFIER,
    COL_GROUP_CHAT_NAME,
    COL_SENT_BY_ME,
    COL_CONTACT_IDENTIFIER,
    COL_GROUP_CHAT,
    COL_TO,
];

const MESSAGE_REQUIRED: [&str; 6] = [
    COL_TIMESTAMP,
    COL_SENDER,
    COL_MESSAGE,
    COL_CHAT_IDENTIFIER,
    COL_GROUP_CHAT_NAME,
    COL_SENT_BY_ME,
];

const LABELED_REQUIRED: [&str; 6] = [
    COL_TIMESTAMP,
    COL_SENDER,
    COL_CHAT_IDENTIFIER,
    COL_GROUP_CHAT_NAME,
    COL_SENT_BY_ME,
    COL_TO,
];

/// Column positions resolved from a header row.
struct Columns<'h> {
    header: &'h StringRecord,
    origin: &'h str,
}

impl<'h> Columns<'h> {
    fn new(header: &'h StringRecord, origin: &'h str, required: &[&str]) -> Result<Self> {
        let columns = Self { header, origin };
        for name in required {
            if columns.index(name).is_none() {
                return Err(ImsgError::malformed(origin, *name, "header"));
            }
        }
        Ok(columns)
    }

    fn index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    fn get<'r>(&self, record: &'r StringRecord, name: &str) -> Option<&'r str> {
        self.index(name).and_then(|i| record.get(i))
    }

    /// Required column value; short rows are malformed.
    fn require<'r>(&self, record: &'r StringRecord, name: &str, row: u64) -> Result<&'r str> {
        self.get(record, name)
            .ok_or_else(|| ImsgError::malformed(self.origin, name, format!("record {row}")))
    }

    /// Cell value exactly as written; blank cells count as absent.
    fn optional(&self, record: &StringRecord, name: &str) -> Option<String> {
        present(self.get(record, name)).map(String::from)
    }
}

fn open_file(path: &Path) -> Result<File> {
    if !path.exists() {
        return Err(ImsgError::source_not_found(path));
    }
    File::open(path).map_err(|e| ImsgError::path_error("open", path, e))
}

fn create_file(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ImsgError::path_error("create directory", parent, e))?;
    }
    let file = File::create(path).map_err(|e| ImsgError::path_error("create", path, e))?;
    Ok(BufWriter::new(file))
}

fn csv_writer<W: Write>(inner: W) -> csv::Writer<W> {
    WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(inner)
}

fn origin_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |n| n.to_string_lossy().into_owned(),
    )
}

fn parse_flag(value: &str, origin: &str, field: &str, row: u64) -> Result<bool> {
    match value.trim() {
        "1" => Ok(true),
        "0" | "" => Ok(false),
        v if v.eq_ignore_ascii_case("true") => Ok(true),
        v if v.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(ImsgError::invalid_field(
            origin,
            field,
            other,
            format!("record {row}"),
        )),
    }
}

const fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Parse a `Timestamp` cell (Unix seconds or ISO-8601) with an optional
/// `Readable Time` cell that overrides the derived local time.
fn parse_time(
    timestamp: &str,
    readable: Option<&str>,
    origin: &str,
    row: u64,
) -> Result<MessageTime> {
    let invalid = || ImsgError::invalid_field(origin, COL_TIMESTAMP, timestamp, format!("record {row}"));
    let trimmed = timestamp.trim();

    let (utc, derived_local) = if let Ok(seconds) = trimmed.parse::<i64>() {
        let utc = DateTime::<Utc>::from_timestamp(seconds, 0).ok_or_else(invalid)?;
        (utc, utc.with_timezone(&Local).naive_local())
    } else if let Ok(seconds) = trimmed.parse::<f64>() {
        if !seconds.is_finite() {
            return Err(invalid());
        }
        #[allow(clippy::cast_possible_truncation)]
        let utc = DateTime::<Utc>::from_timestamp(seconds.floor() as i64, 0).ok_or_else(invalid)?;
        (utc, utc.with_timezone(&Local).naive_local())
    } else if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        (dt.with_timezone(&Utc), dt.naive_local())
    } else if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, READABLE_TIME_FORMAT))
    {
        // No offset: the value is wall-clock time on the exporting device.
        let utc = Local
            .from_local_datetime(&naive)
            .earliest()
            .map_or_else(|| naive.and_utc(), |dt| dt.with_timezone(&Utc));
        (utc, naive)
    } else {
        return Err(invalid());
    };

    let local = match non_blank(readable) {
        Some(text) => NaiveDateTime::parse_from_str(text, READABLE_TIME_FORMAT).map_err(|_| {
            ImsgError::invalid_field(origin, COL_READABLE_TIME, text, format!("record {row}"))
        })?,
        None => derived_local,
    };

    Ok(MessageTime::new(utc, local))
}

/// Read a message table from any reader.
///
/// # Errors
///
/// Returns [`ImsgError::MalformedSource`] when a required column is missing,
/// [`ImsgError::InvalidField`] for unparsable timestamps or flags, and
/// [`ImsgError::CsvError`] for malformed CSV or invalid UTF-8.
pub fn read_messages_from<R: Read>(reader: R, origin: &str) -> Result<Vec<RawMessage>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let header = rdr.headers()?.clone();
    let cols = Columns::new(&header, origin, &MESSAGE_REQUIRED)?;

    let mut messages = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record?;
        let row = idx as u64 + 1;

        let timestamp = parse_time(
            cols.require(&record, COL_TIMESTAMP, row)?,
            cols.get(&record, COL_READABLE_TIME),
            origin,
            row,
        )?;
        let is_from_me = parse_flag(
            cols.require(&record, COL_SENT_BY_ME, row)?,
            origin,
            COL_SENT_BY_ME,
            row,
        )?;

        messages.push(RawMessage {
            timestamp,
            sender_identifier: cols.require(&record, COL_SENDER, row)?.to_string(),
            sender_id: cols.optional(&record, COL_SENDER_ID),
            text: cols.require(&record, COL_MESSAGE, row)?.to_string(),
            chat_identifier: cols.optional(&record, COL_CHAT_IDENTIFIER),
            chat_display_name: cols.optional(&record, COL_GROUP_CHAT_NAME),
            contact_identifier: cols.optional(&record, COL_CONTACT_IDENTIFIER),
            is_from_me,
        });
    }

    debug!("Read {} messages from {origin}", messages.len());
    Ok(messages)
}

/// Read a message table from a file.
///
/// # Errors
///
/// See [`read_messages_from`]; also fails if the file cannot be opened.
pub fn read_messages(path: impl AsRef<Path>) -> Result<Vec<RawMessage>> {
    let path = path.as_ref();
    let messages = read_messages_from(open_file(path)?, &origin_name(path))?;
    info!("Read {} messages from {}", messages.len(), path.display());
    Ok(messages)
}

fn message_cells(message: &RawMessage, sender: &str, is_group_chat: bool) -> Vec<String> {
    vec![
        message.timestamp.unix_seconds().to_string(),
        message.timestamp.local.format(READABLE_TIME_FORMAT).to_string(),
        sender.to_string(),
        message.sender_id.clone().unwrap_or_default(),
        message.text.clone(),
        message.chat_identifier.clone().unwrap_or_default(),
        message.chat_display_name.clone().unwrap_or_default(),
        flag(message.is_from_me).to_string(),
        message.contact_identifier.clone().unwrap_or_default(),
        flag(is_group_chat).to_string(),
    ]
}

/// Write a message table to any writer.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_messages_to<W: Write>(writer: W, messages: &[RawMessage]) -> Result<()> {
    let mut wtr = csv_writer(writer);
    wtr.write_record(MESSAGE_HEADER)?;
    for message in messages {
        wtr.write_record(message_cells(
            message,
            &message.sender_identifier,
            message.is_group_chat(),
        ))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write a message table to a file, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_messages(path: impl AsRef<Path>, messages: &[RawMessage]) -> Result<()> {
    let path = path.as_ref();
    write_messages_to(create_file(path)?, messages)?;
    info!("Wrote {} messages to {}", messages.len(), path.display());
    Ok(())
}

/// Write the labeled table to any writer.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_labeled_to<W: Write>(writer: W, messages: &[LabeledMessage]) -> Result<()> {
    let mut wtr = csv_writer(writer);
    wtr.write_record(LABELED_HEADER)?;
    for labeled in messages {
        let mut cells = message_cells(
            &labeled.message,
            labeled.resolved_sender(),
            labeled.is_group_chat,
        );
        cells.push(labeled.to().to_string());
        wtr.write_record(&cells)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the labeled table to a file, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_labeled(path: impl AsRef<Path>, messages: &[LabeledMessage]) -> Result<()> {
    let path = path.as_ref();
    write_labeled_to(create_file(path)?, messages)?;
    info!("Wrote {} labeled messages to {}", messages.len(), path.display());
    Ok(())
}

/// Read a labeled table back for analysis.
///
/// The resolved names were collapsed to strings when the table was written,
/// so every `Sender`/`To` value comes back as [`Resolution::Resolved`].
///
/// # Errors
///
/// Same failure modes as [`read_messages_from`].
pub fn read_labeled_from<R: Read>(reader: R, origin: &str) -> Result<Vec<LabeledMessage>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let header = rdr.headers()?.clone();
    let cols = Columns::new(&header, origin, &LABELED_REQUIRED)?;

    let mut messages = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record?;
        let row = idx as u64 + 1;

        let timestamp = parse_time(
            cols.require(&record, COL_TIMESTAMP, row)?,
            cols.get(&record, COL_READABLE_TIME),
            origin,
            row,
        )?;
        let is_from_me = parse_flag(
            cols.require(&record, COL_SENT_BY_ME, row)?,
            origin,
            COL_SENT_BY_ME,
            row,
        )?;
        let sender = cols.require(&record, COL_SENDER, row)?.to_string();

        let message = RawMessage {
            timestamp,
            sender_identifier: sender.clone(),
            sender_id: cols.optional(&record, COL_SENDER_ID),
            text: cols.get(&record, COL_MESSAGE).unwrap_or_default().to_string(),
            chat_identifier: cols.optional(&record, COL_CHAT_IDENTIFIER),
            chat_display_name: cols.optional(&record, COL_GROUP_CHAT_NAME),
            contact_identifier: cols.optional(&record, COL_CONTACT_IDENTIFIER),
            is_from_me,
        };
        let is_group_chat = message.is_group_chat();
        let counterpart = if is_group_chat {
            None
        } else {
            Some(Resolution::Resolved(
                cols.require(&record, COL_TO, row)?.to_string(),
            ))
        };

        messages.push(LabeledMessage {
            message,
            sender: Resolution::Resolved(sender),
            counterpart,
            is_group_chat,
        });
    }

    Ok(messages)
}

/// Read a labeled table from a file.
///
/// # Errors
///
/// See [`read_labeled_from`].
pub fn read_labeled(path: impl AsRef<Path>) -> Result<Vec<LabeledMessage>> {
    let path = path.as_ref();
    let messages = read_labeled_from(open_file(path)?, &origin_name(path))?;
    info!("Read {} labeled messages from {}", messages.len(), path.display());
    Ok(messages)
}

/// Read contact rows from a flat table with `Full Name` and `Phone Number`.
///
/// # Errors
///
/// Returns [`ImsgError::MalformedSource`] when either column is missing from
/// the header. Empty cells are passed on as absent fields.
pub fn read_contact_rows_from<R: Read>(reader: R, origin: &str) -> Result<Vec<ContactRow>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let header = rdr.headers()?.clone();
    let cols = Columns::new(&header, origin, &[COL_FULL_NAME, COL_PHONE_NUMBER])?;

    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record?;
        rows.push(ContactRow {
            identifier: cols.optional(&record, COL_PHONE_NUMBER),
            full_name: cols.optional(&record, COL_FULL_NAME),
            location: format!("record {}", idx + 1),
        });
    }
    Ok(rows)
}

/// Read contact rows from a file.
///
/// # Errors
///
/// See [`read_contact_rows_from`].
pub fn read_contact_rows(path: impl AsRef<Path>) -> Result<Vec<ContactRow>> {
    let path = path.as_ref();
    read_contact_rows_from(open_file(path)?, &origin_name(path))
}

/// Write serializable rows as a quoted CSV; field names (or serde renames)
/// become the header.
///
/// # Errors
///
/// Returns an error if a row fails to serialize or writing fails.
pub fn write_rows_to<W: Write, S: serde::Serialize>(writer: W, rows: &[S]) -> Result<()> {
    let mut wtr = csv_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write serializable rows to a file, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be created or a row fails to serialize.
pub fn write_rows<S: serde::Serialize>(path: impl AsRef<Path>, rows: &[S]) -> Result<()> {
    let path = path.as_ref();
    write_rows_to(create_file(path)?, rows)?;
    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}
