//! Contact directory: normalized identifier -> display name.
//!
//! The directory is built once from a sequence of [`ContactRow`]s and is
//! read-only afterwards. Lookups go through the [`IdentityResolver`] trait so the
//! labeling stage never depends on how the directory is stored.

use crate::error::{ImsgError, Result};
use crate::model::{ContactRecord, ContactRow, Resolution, non_blank};
use crate::normalize::normalize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// What to do with a contact row that lacks an identifier or a name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Stop loading and return the error.
    #[default]
    Abort,
    /// Drop the row and keep going.
    Skip,
}

impl std::str::FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" | "error" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            _ => Err(format!("Invalid malformed-row policy: {s}")),
        }
    }
}

/// Resolves raw identifiers to display names.
pub trait IdentityResolver {
    /// Look up an identifier as it appears in the message store.
    ///
    /// Returns [`Resolution::Unresolved`] carrying `identifier` unchanged when
    /// there is no match.
    fn resolve(&self, identifier: &str) -> Resolution;
}

/// Counters collected while building a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    /// Rows read from the source.
    pub rows: usize,
    /// Rows where a later entry replaced an earlier one with the same key.
    pub overwritten: usize,
    /// Rows dropped under [`MalformedPolicy::Skip`].
    pub skipped: usize,
}

/// Read-only mapping of normalized identifiers to display names.
#[derive(Debug, Clone, Default)]
pub struct ContactDirectory {
    entries: HashMap<String, String>,
    stats: LoadStats,
}

impl ContactDirectory {
    /// Number of distinct normalized identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub const fn stats(&self) -> LoadStats {
        self.stats
    }

    /// Display name stored under an already-normalized key.
    #[must_use]
    pub fn get(&self, normalized_identifier: &str) -> Option<&str> {
        self.entries.get(normalized_identifier).map(String::as_str)
    }

    /// Entries sorted by key, for export and inspection.
    #[must_use]
    pub fn records(&self) -> Vec<ContactRecord> {
        let mut records: Vec<ContactRecord> = self
            .entries
            .iter()
            .map(|(key, name)| ContactRecord {
                normalized_identifier: key.clone(),
                display_name: name.clone(),
            })
            .collect();
        records.sort_by(|a, b| a.normalized_identifier.cmp(&b.normalized_identifier));
        records
    }
}

impl IdentityResolver for ContactDirectory {
    fn resolve(&self, identifier: &str) -> Resolution {
        let key = normalize(identifier);
        match self.entries.get(&key) {
            Some(name) => Resolution::Resolved(name.clone()),
            None => {
                debug!(identifier, key = %key, "No contact for identifier");
                Resolution::Unresolved(identifier.to_string())
            }
        }
    }
}

/// Build a directory from contact rows.
///
/// Identifiers are normalized before insertion and the last row wins when two
/// rows share a normalized identifier. Sort or deduplicate the rows first if a
/// different policy is needed.
///
/// # Errors
///
/// Returns [`ImsgError::MalformedSource`] for a row without identifier or name
/// when `policy` is [`MalformedPolicy::Abort`].
pub fn load_contacts<I>(rows: I, origin: &str, policy: MalformedPolicy) -> Result<ContactDirectory>
where
    I: IntoIterator<Item = ContactRow>,
{
    let mut directory = ContactDirectory::default();

    for row in rows {
        directory.stats.rows += 1;

        let identifier = non_blank(row.identifier.as_deref());
        let name = non_blank(row.full_name.as_deref());
        let (identifier, name) = match (identifier, name) {
            (Some(identifier), Some(name)) => (identifier, name),
            (None, _) | (_, None) => {
                let field = if identifier.is_none() {
                    "identifier"
                } else {
                    "name"
                };
                let err = ImsgError::malformed(origin, field, row.location.clone());
                match policy {
                    MalformedPolicy::Abort => return Err(err),
                    MalformedPolicy::Skip => {
                        warn!("Skipping contact row: {err}");
                        directory.stats.skipped += 1;
                        continue;
                    }
                }
            }
        };

        let key = normalize(identifier);
        if let Some(previous) = directory.entries.insert(key.clone(), name.to_string()) {
            directory.stats.overwritten += 1;
            if previous != name {
                debug!(key = %key, previous = %previous, name, "Contact identifier reassigned");
            }
        }
    }

    info!(
        "Loaded {} contact identifiers from {} rows ({} overwritten, {} skipped)",
        directory.len(),
        directory.stats.rows,
        directory.stats.overwritten,
        directory.stats.skipped
    );
    Ok(directory)
}
