//! End-to-end stages wired over files.
//!
//! Each stage reads its inputs from explicit paths and writes one output
//! table, so stages can be rerun independently.

use crate::contacts::{ContactDirectory, MalformedPolicy, load_contacts};
use crate::error::Result;
use crate::extract::MessageStore;
use crate::label::{LabelOptions, LabelStats, label_messages};
use crate::table;
use crate::vcard;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// File locations for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelinePaths {
    /// Messages database read by extraction.
    pub chat_db: PathBuf,
    /// Message table written by extraction and read by labeling.
    pub message_source: PathBuf,
    /// Contact list, `.vcf` or `.csv`.
    pub contact_source: PathBuf,
    /// Labeled message table.
    pub output: PathBuf,
}

/// Kind of contact source, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactFormat {
    Vcard,
    Csv,
}

impl ContactFormat {
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("vcf") || ext.eq_ignore_ascii_case("vcard") => {
                Self::Vcard
            }
            _ => Self::Csv,
        }
    }
}

/// Build the contact directory from a vCard or CSV contact list.
///
/// # Errors
///
/// Returns an error if the source is missing, unreadable, lacks required
/// columns, or contains a malformed row under [`MalformedPolicy::Abort`].
pub fn load_directory(path: &Path, policy: MalformedPolicy) -> Result<ContactDirectory> {
    let origin = path.display().to_string();
    match ContactFormat::from_path(path) {
        ContactFormat::Vcard => {
            let rows = vcard::parse_file(path)?
                .iter()
                .flat_map(vcard::VcardEntry::contact_rows)
                .collect::<Vec<_>>();
            load_contacts(rows, &origin, policy)
        }
        ContactFormat::Csv => load_contacts(table::read_contact_rows(path)?, &origin, policy),
    }
}

/// Outcome of [`extract_to_table`].
#[derive(Debug, Clone, Serialize)]
pub struct ExtractSummary {
    pub messages: usize,
    pub group_messages: usize,
    pub output: PathBuf,
}

/// Extract every message from the database into the message table.
///
/// # Errors
///
/// Returns an error if the database cannot be read or the table written.
pub fn extract_to_table(chat_db: &Path, output: &Path) -> Result<ExtractSummary> {
    let store = MessageStore::open(chat_db)?;
    let messages = store.messages()?;
    table::write_messages(output, &messages)?;
    Ok(ExtractSummary {
        messages: messages.len(),
        group_messages: messages.iter().filter(|m| m.is_group_chat()).count(),
        output: output.to_path_buf(),
    })
}

/// Outcome of [`run_label`].
#[derive(Debug, Clone, Serialize)]
pub struct LabelSummary {
    pub contacts: usize,
    pub contacts_overwritten: usize,
    pub contacts_skipped: usize,
    pub stats: LabelStats,
    pub output: PathBuf,
}

/// Join the message table against the contact list and write the labeled
/// table.
///
/// # Errors
///
/// Returns an error if any input is missing or malformed, or the output
/// cannot be written.
pub fn run_label(
    paths: &PipelinePaths,
    policy: MalformedPolicy,
    options: &LabelOptions,
) -> Result<LabelSummary> {
    let directory = load_directory(&paths.contact_source, policy)?;
    let messages = table::read_messages(&paths.message_source)?;
    let labeled = label_messages(&messages, &directory, options);
    table::write_labeled(&paths.output, &labeled)?;

    let load = directory.stats();
    let summary = LabelSummary {
        contacts: directory.len(),
        contacts_overwritten: load.overwritten,
        contacts_skipped: load.skipped,
        stats: LabelStats::from_labeled(&labeled),
        output: paths.output.clone(),
    };
    info!(
        "Labeled {} messages into {}",
        summary.stats.messages,
        paths.output.display()
    );
    Ok(summary)
}
