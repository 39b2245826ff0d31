//! Integration tests for imsg.
//!
//! These tests run the library stages end to end over temporary files:
//! - Extraction from a synthetic Messages database
//! - Contact loading from vCard and CSV
//! - Labeling and the labeled table round trip
//! - Reports over the labeled table

use chrono::Utc;
use imsg::analysis::{self, Report, ReportOptions};
use imsg::extract::MessageStore;
use imsg::pipeline::{self, PipelinePaths};
use imsg::{
    LabelOptions, MalformedPolicy, Resolution, table, vcard, label_messages,
};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const NS: i64 = 1_000_000_000;

/// 2024-05-01T12:00:00Z in Apple epoch seconds.
const MAY_FIRST: i64 = 736_257_600;

/// Create a minimal Messages database with two direct conversations and one
/// group chat.
fn create_chat_db(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("chat.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        r"
        CREATE TABLE handle (ROWID INTEGER PRIMARY KEY, id TEXT);
        CREATE TABLE chat (ROWID INTEGER PRIMARY KEY, chat_identifier TEXT, display_name TEXT, style INTEGER);
        CREATE TABLE message (ROWID INTEGER PRIMARY KEY, date INTEGER, handle_id INTEGER, text TEXT, is_from_me INTEGER);
        CREATE TABLE chat_message_join (chat_id INTEGER, message_id INTEGER);

        INSERT INTO handle VALUES (1, '+15551234567');
        INSERT INTO handle VALUES (2, 'friend@example.com');
        INSERT INTO handle VALUES (3, '+15550000000');
        INSERT INTO chat VALUES (1, '+15551234567', NULL, 45);
        INSERT INTO chat VALUES (2, 'chat42', 'Book Club', 43);
        INSERT INTO chat VALUES (3, '+15550000000', NULL, 45);
        ",
    )
    .unwrap();

    let rows: [(i64, i64, i64, &str, i64, i64); 7] = [
        (1, 0, 1, "hey, are you \"free\"?", 0, 1),
        (2, 60, 1, "yes\nafter work", 1, 1),
        (3, 3_600, 2, "chapter 3 tonight", 0, 2),
        (4, 3_660, 0, "I'm in", 1, 2),
        (5, 3_720, 1, "me too", 0, 2),
        (6, 86_400 * 15, 3, "who is this", 0, 3),
        (7, 86_400 * 15 + 60, 1, "lunch?", 0, 1),
    ];
    for (rowid, offset, handle, text, me, chat) in rows {
        conn.execute(
            "INSERT INTO message VALUES (?1, ?2, ?3, ?4, ?5)",
            params![rowid, (MAY_FIRST + offset) * NS, handle, text, me],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO chat_message_join VALUES (?1, ?2)",
            params![chat, rowid],
        )
        .unwrap();
    }
    path
}

const CONTACTS_VCF: &str = "BEGIN:VCARD\r
VERSION:3.0\r
FN:Carol Jones\r
TEL;type=CELL:(555) 123-4567\r
END:VCARD\r
BEGIN:VCARD\r
VERSION:3.0\r
FN:Frank\r
EMAIL:friend@example.com\r
END:VCARD\r
";

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn run_pipeline(dir: &TempDir) -> PipelinePaths {
    let paths = PipelinePaths {
        chat_db: create_chat_db(dir),
        message_source: dir.path().join("out/messages.csv"),
        contact_source: write(dir, "contacts.vcf", CONTACTS_VCF),
        output: dir.path().join("out/labeled.csv"),
    };
    pipeline::extract_to_table(&paths.chat_db, &paths.message_source).unwrap();
    pipeline::run_label(&paths, MalformedPolicy::Abort, &LabelOptions::default()).unwrap();
    paths
}

#[test]
fn test_extract_writes_message_table() {
    let dir = TempDir::new().unwrap();
    let db = create_chat_db(&dir);
    let output = dir.path().join("messages.csv");

    let summary = pipeline::extract_to_table(&db, &output).unwrap();
    assert_eq!(summary.messages, 7);
    assert_eq!(summary.group_messages, 3);

    let messages = table::read_messages(&output).unwrap();
    assert_eq!(messages.len(), 7);
    assert_eq!(messages[0].text, "hey, are you \"free\"?");
    assert_eq!(messages[1].text, "yes\nafter work");
    assert_eq!(messages[0].timestamp.unix_seconds(), 1_714_564_800);
    assert_eq!(messages[3].chat_display_name.as_deref(), Some("Book Club"));

    let header = std::fs::read_to_string(&output).unwrap();
    assert!(header.starts_with(
        "\"Timestamp\",\"Readable Time\",\"Sender\",\"Sender ID\",\"Message\",\"Chat Identifier\",\"Group Chat Name\",\"Sent by Me\",\"Contact Identifier\",\"Group Chat\""
    ));
}

#[test]
fn test_open_is_read_only() {
    let dir = TempDir::new().unwrap();
    let db = create_chat_db(&dir);
    let before = std::fs::read(&db).unwrap();

    let store = MessageStore::open(&db).unwrap();
    assert_eq!(store.message_count().unwrap(), 7);
    drop(store);

    assert_eq!(std::fs::read(&db).unwrap(), before);
}

#[test]
fn test_full_labeling_pipeline() {
    let dir = TempDir::new().unwrap();
    let paths = run_pipeline(&dir);

    let labeled = table::read_labeled(&paths.output).unwrap();
    assert_eq!(labeled.len(), 7);

    // Direct message from Carol, resolved through normalization.
    assert_eq!(labeled[0].resolved_sender(), "Carol Jones");
    assert_eq!(labeled[0].to(), "Carol Jones");
    // Owner reply keeps the counterpart.
    assert_eq!(labeled[1].resolved_sender(), "Me");
    assert_eq!(labeled[1].to(), "Carol Jones");
    // Group chat: email sender resolved, no recipient.
    assert_eq!(labeled[2].resolved_sender(), "Frank");
    assert!(labeled[2].is_group_chat);
    assert_eq!(labeled[2].to(), "");
    // Unknown number falls back to the raw identifier.
    assert_eq!(labeled[5].resolved_sender(), "+15550000000");
    assert_eq!(labeled[5].to(), "+15550000000");
}

#[test]
fn test_labeling_preserves_order_and_resolutions() {
    let dir = TempDir::new().unwrap();
    let db = create_chat_db(&dir);
    let messages = MessageStore::open(&db).unwrap().messages_in(&Utc).unwrap();

    let contacts = write(&dir, "contacts.vcf", CONTACTS_VCF);
    let directory = pipeline::load_directory(&contacts, MalformedPolicy::Abort).unwrap();
    let labeled = label_messages(&messages, &directory, &LabelOptions::default());

    assert_eq!(labeled.len(), messages.len());
    for (out, raw) in labeled.iter().zip(&messages) {
        assert_eq!(&out.message, raw);
    }
    assert_eq!(
        labeled[5].sender,
        Resolution::Unresolved("+15550000000".to_string())
    );
}

#[test]
fn test_csv_contacts_with_malformed_rows() {
    let dir = TempDir::new().unwrap();
    let contacts = write(
        &dir,
        "contacts.csv",
        "\"First Name\",\"Last Name\",\"Full Name\",\"Phone Number\"\n\
         \"Carol\",\"Jones\",\"Carol Jones\",\"555.123.4567\"\n\
         \"\",\"\",\"\",\"5550000000\"\n",
    );

    let err = pipeline::load_directory(&contacts, MalformedPolicy::Abort).unwrap_err();
    assert!(err.is_malformed());
    assert!(err.to_string().contains("record 2"));

    let directory = pipeline::load_directory(&contacts, MalformedPolicy::Skip).unwrap();
    assert_eq!(directory.stats().skipped, 1);
}

#[test]
fn test_missing_contact_column_is_malformed() {
    let dir = TempDir::new().unwrap();
    let paths = PipelinePaths {
        chat_db: create_chat_db(&dir),
        message_source: dir.path().join("messages.csv"),
        contact_source: write(&dir, "contacts.csv", "Name,Phone Number\nCarol,5551234567\n"),
        output: dir.path().join("labeled.csv"),
    };
    pipeline::extract_to_table(&paths.chat_db, &paths.message_source).unwrap();

    let err = pipeline::run_label(&paths, MalformedPolicy::Skip, &LabelOptions::default())
        .unwrap_err();
    assert!(err.is_malformed());
    assert!(!paths.output.exists());
}

#[test]
fn test_vcard_export_round_trip() {
    let dir = TempDir::new().unwrap();
    let vcf = write(&dir, "contacts.vcf", CONTACTS_VCF);
    let rows = vcard::export_rows(&vcard::parse_file(&vcf).unwrap());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].phone_number, "15551234567");

    let out = dir.path().join("contacts.csv");
    table::write_rows(&out, &rows).unwrap();
    let directory = pipeline::load_directory(&out, MalformedPolicy::Abort).unwrap();
    assert_eq!(directory.get("15551234567"), Some("Carol Jones"));
}

#[test]
fn test_report_over_labeled_table() {
    let dir = TempDir::new().unwrap();
    let paths = run_pipeline(&dir);
    let labeled = table::read_labeled(&paths.output).unwrap();

    let report = Report::compute(&labeled, &ReportOptions::default()).unwrap();
    assert_eq!(report.summary.total, 7);
    assert_eq!(report.summary.sent, 2);
    assert_eq!(report.top_group_chats[0].name, "Book Club");
    assert_eq!(report.top_contacts[0].name, "Carol Jones");
    assert_eq!(report.top_contacts[0].messages, 3);

    let carol = report
        .total_interactions
        .iter()
        .find(|i| i.name == "Carol Jones")
        .unwrap();
    // 3 direct + 1 in Book Club + 1 of mine in Book Club.
    assert_eq!(carol.total, 5);

    let breakdown = analysis::group_chat_breakdown(&labeled, "Book Club").unwrap();
    assert_eq!(breakdown.total, 3);
    assert!(analysis::group_chat_breakdown(&labeled, "Chess").is_err());
}

#[test]
fn test_missing_sources_are_reported() {
    let err = table::read_messages(Path::new("/nonexistent/messages.csv")).unwrap_err();
    assert!(matches!(err, imsg::ImsgError::SourceNotFound { .. }));
    assert!(err.is_recoverable());
}
