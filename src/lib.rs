//! imsg - iMessage history toolkit
//!
//! This library extracts messages from the macOS Messages database, joins
//! them with a contact list, and computes descriptive statistics over the
//! labeled history.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`error`] - Custom error types with rich context
//! - [`model`] - Message and contact records
//! - [`normalize`] - Canonical form of phone numbers and emails
//! - [`contacts`] - Contact directory and identity resolution
//! - [`vcard`] - vCard parsing
//! - [`table`] - CSV tables exchanged between stages
//! - [`extract`] - Reading `chat.db`
//! - [`label`] - Joining messages against the contact directory
//! - [`analysis`] - Aggregations and text charts
//! - [`pipeline`] - File-to-file stages

pub mod analysis;
pub mod cli;
pub mod config;
pub mod contacts;
pub mod error;
pub mod extract;
pub mod label;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod table;
pub mod vcard;

pub use cli::*;
pub use contacts::{ContactDirectory, IdentityResolver, MalformedPolicy, load_contacts};
pub use error::{
    ImsgError, Result, ResultExt, find_closest_match, format_did_you_mean, format_error,
    format_unknown_value_error,
};
pub use label::{LabelOptions, LabelStats, label_messages};
pub use model::*;
pub use normalize::normalize;
pub use pipeline::PipelinePaths;

use std::path::PathBuf;

/// Default message table filename
pub const DEFAULT_MESSAGE_TABLE: &str = "messages.csv";

/// Default contact list filename
pub const DEFAULT_CONTACTS_FILE: &str = "contacts.csv";

/// Default labeled table filename
pub const DEFAULT_LABELED_TABLE: &str = "labeled.csv";

/// Standard width for major header dividers in CLI output
pub const HEADER_DIVIDER_WIDTH: usize = 60;

/// Get the default data directory for imsg
#[must_use]
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("imsg")
}

/// Location of the Messages database on macOS
#[must_use]
pub fn default_chat_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Library")
        .join("Messages")
        .join("chat.db")
}

/// Get the default message table path
#[must_use]
pub fn default_message_table_path() -> PathBuf {
    default_data_dir().join(DEFAULT_MESSAGE_TABLE)
}

/// Get the default contact list path
#[must_use]
pub fn default_contacts_path() -> PathBuf {
    default_data_dir().join(DEFAULT_CONTACTS_FILE)
}

/// Get the default labeled table path
#[must_use]
pub fn default_labeled_table_path() -> PathBuf {
    default_data_dir().join(DEFAULT_LABELED_TABLE)
}

/// Format an unsigned integer with thousands separators.
#[must_use]
pub fn format_number_u64(value: u64) -> String {
    let mut out = String::with_capacity(24);

    for (idx, ch) in value.to_string().chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    out.chars().rev().collect()
}

/// Format a usize with thousands separators.
#[must_use]
pub fn format_number_usize(value: usize) -> String {
    format_number_u64(u64::try_from(value).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_adds_separators() {
        assert_eq!(format_number_u64(0), "0");
        assert_eq!(format_number_u64(999), "999");
        assert_eq!(format_number_u64(1000), "1,000");
        assert_eq!(format_number_u64(12_345_678), "12,345,678");
        assert_eq!(format_number_usize(1_000_000), "1,000,000");
    }

    #[test]
    fn default_paths_live_under_data_dir() {
        let data = default_data_dir();
        assert!(default_message_table_path().starts_with(&data));
        assert!(default_labeled_table_path().ends_with(DEFAULT_LABELED_TABLE));
        assert!(default_chat_db_path().ends_with("Library/Messages/chat.db"));
    }
}
