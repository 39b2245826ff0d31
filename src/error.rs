//! Custom error types for imsg.
//!
//! Provides structured error handling with detailed context for better
//! diagnostics and user experience.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for imsg operations.
///
/// Each variant provides specific context about what went wrong,
/// enabling better error messages and programmatic error handling.
#[derive(Error, Debug)]
pub enum ImsgError {
    // =========================================================================
    // Source Errors
    // =========================================================================
    /// A required column or field is missing from a contact or message source.
    #[error("Malformed {origin}: missing required field '{field}' ({location})")]
    MalformedSource {
        origin: String,
        field: String,
        location: String,
    },

    /// A field is present but its value cannot be interpreted.
    #[error("Invalid value '{value}' for '{field}' in {origin} ({location})")]
    InvalidField {
        origin: String,
        field: String,
        value: String,
        location: String,
    },

    /// Input file does not exist.
    #[error("Source not found at '{path}'")]
    SourceNotFound { path: PathBuf },

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Message database missing.
    #[error("Message database not found at '{path}'")]
    DatabaseNotFound { path: PathBuf },

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    // =========================================================================
    // Table Errors
    // =========================================================================
    /// CSV read/write failure, including invalid UTF-8.
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Path-specific IO error with context.
    #[error("Failed to {operation} '{path}': {source}")]
    PathError {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },

    // =========================================================================
    // Analysis Errors
    // =========================================================================
    /// Report target (group chat, person) not present in the data.
    #[error("{item_type} '{id}' not found")]
    NotFound { item_type: &'static str, id: String },

    /// Invalid command-line or configuration argument.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Catch-all for other errors with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type alias for imsg operations.
pub type Result<T> = std::result::Result<T, ImsgError>;

impl ImsgError {
    /// Create a malformed source error.
    pub fn malformed(
        origin: impl Into<String>,
        field: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self::MalformedSource {
            origin: origin.into(),
            field: field.into(),
            location: location.into(),
        }
    }

    /// Create an invalid field error.
    pub fn invalid_field(
        origin: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            origin: origin.into(),
            field: field.into(),
            value: value.into(),
            location: location.into(),
        }
    }

    /// Create a source not found error.
    pub fn source_not_found(path: impl Into<PathBuf>) -> Self {
        Self::SourceNotFound { path: path.into() }
    }

    /// Create a database not found error.
    pub fn database_not_found(path: impl Into<PathBuf>) -> Self {
        Self::DatabaseNotFound { path: path.into() }
    }

    /// Create a not found error.
    pub fn not_found(item_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            item_type,
            id: id.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a path error with context.
    pub fn path_error(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PathError {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Wrap an error with additional context.
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// True for missing-column / missing-field errors.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedSource { .. })
    }

    /// Check if this error is recoverable (user can fix it).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SourceNotFound { .. }
                | Self::DatabaseNotFound { .. }
                | Self::NotFound { .. }
                | Self::InvalidArgument { .. }
                | Self::ConfigError { .. }
        )
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::SourceNotFound { .. } => {
                Some("Check the path, or set it under [paths] in the config file.")
            }
            Self::DatabaseNotFound { .. } => Some(
                "Pass --chat-db, or grant the terminal Full Disk Access to read ~/Library/Messages.",
            ),
            Self::MalformedSource { .. } => {
                Some("Fix the source file, or rerun with --skip-malformed to drop incomplete rows.")
            }
            Self::CsvError(_) => Some("Make sure the file is UTF-8 CSV with a header row."),
            Self::ConfigError { .. } => {
                Some("Fix the file, or replace it with `imsg config --init --force`.")
            }
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with additional context.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped with additional context.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ImsgError::with_context(context, e))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ImsgError::with_context(f(), e))
    }
}

// =============================================================================
// CLI Error Formatting Utilities
// =============================================================================

use colored::Colorize;

/// Format a structured CLI error with explanation and suggestions.
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    use std::fmt::Write;

    let mut output = format!("{} {}", "✗".red().bold(), title.bold());

    if !explanation.is_empty() {
        let _ = write!(output, "\n\n   {explanation}");
    }

    if !suggestions.is_empty() {
        output.push_str("\n\n   ");
        if suggestions.len() == 1 {
            let _ = write!(output, "{} {}", "Hint:".cyan(), suggestions[0]);
        } else {
            let _ = write!(output, "{}:", "Try".cyan());
            for suggestion in suggestions {
                let _ = write!(output, "\n     {} {}", "•".dimmed(), suggestion);
            }
        }
    }

    output
}

/// Calculate the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let a_len = a_chars.len();
    let b_len = b_chars.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;

        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }

        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Find the closest candidate to a (possibly misspelled) chat or contact name.
///
/// Exact matches are not returned; the caller already failed to find one.
/// The allowed distance grows with the input so longer names tolerate more
/// typos.
#[must_use]
pub fn find_closest_match<'a>(
    input: &str,
    candidates: &[&'a str],
    max_distance: Option<usize>,
) -> Option<&'a str> {
    let input_lower = input.to_lowercase();
    let max_dist = max_distance.unwrap_or_else(|| (input_lower.chars().count() / 4).max(2));

    candidates
        .iter()
        .map(|&candidate| {
            let distance = levenshtein_distance(&input_lower, &candidate.to_lowercase());
            (candidate, distance)
        })
        .filter(|(_, distance)| *distance <= max_dist)
        .filter(|(candidate, _)| *candidate != input)
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Format a "did you mean?" suggestion.
#[must_use]
pub fn format_did_you_mean(suggestion: &str) -> String {
    format!("Did you mean '{}'?", suggestion.green())
}

/// Format an error for an unknown value with "did you mean?" support.
pub fn format_unknown_value_error(kind: &str, input: &str, valid_options: &[&str]) -> String {
    let title = format!("Unknown {kind}: '{input}'");

    let mut suggestions = Vec::new();

    if let Some(closest) = find_closest_match(input, valid_options, None) {
        suggestions.push(format_did_you_mean(closest));
    }

    if !valid_options.is_empty() && valid_options.len() <= 8 {
        suggestions.push(format!("Known {kind}s: {}", valid_options.join(", ")));
    }

    let suggestion_refs: Vec<&str> = suggestions.iter().map(String::as_str).collect();
    format_error(&title, "", &suggestion_refs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_display_names_field() {
        let err = ImsgError::malformed("contacts.csv", "Phone Number", "record 3");
        let msg = err.to_string();
        assert!(msg.contains("contacts.csv"));
        assert!(msg.contains("Phone Number"));
        assert!(msg.contains("record 3"));
        assert!(err.is_malformed());
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_error_suggestions() {
        let err = ImsgError::database_not_found("/path/to/chat.db");
        assert!(err.suggestion().is_some());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ImsgError = io_err.into();
        assert!(matches!(err, ImsgError::IoError(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_from_rusqlite_error() {
        fn accepts_imsg_error(_: ImsgError) {}
        let sqlite_err = rusqlite::Error::InvalidQuery;
        accepts_imsg_error(sqlite_err.into());
    }

    #[test]
    fn test_context_wraps_source() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::other("boom"));
        let err = res.context("reading contacts").unwrap_err();
        assert_eq!(err.to_string(), "reading contacts: boom");
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein_distance("hello", "hello"), 0);
        assert_eq!(levenshtein_distance("cat", "cats"), 1);
        assert_eq!(levenshtein_distance("", "abc"), 3);
    }

    #[test]
    fn find_closest_match_chat_names() {
        let candidates = ["XC Juniors", "Family", "Book Club"];
        assert_eq!(
            find_closest_match("xc junior", &candidates, None),
            Some("XC Juniors")
        );
        assert_eq!(find_closest_match("Famly", &candidates, None), Some("Family"));
        assert_eq!(find_closest_match("Totally Different", &candidates, None), None);
    }

    #[test]
    fn format_unknown_value_with_suggestion() {
        let output = format_unknown_value_error("group chat", "Famly", &["Family", "Work"]);
        assert!(output.contains("Unknown group chat"));
        assert!(output.contains("Famly"));
        assert!(output.contains("Family"));
    }
}
