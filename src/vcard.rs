//! vCard parser for contact exports.
//!
//! Handles the subset of vCard 2.1 / 3.0 / 4.0 that address-book exports use
//! for names and contact points:
//!
//! - line folding (continuation lines start with a space or tab)
//! - property groups (`item1.TEL;type=CELL:...`)
//! - parameters, which are ignored
//! - value escapes (`\,` `\;` `\n` `\\`)
//! - `tel:` URIs in vCard 4.0
//!
//! Only `FN`, `TEL` and `EMAIL` are extracted.

use crate::error::{ImsgError, Result, ResultExt};
use crate::model::ContactRow;
use crate::normalize::normalize;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};
use unicode_normalization::UnicodeNormalization;

/// `[group.]NAME[;params]:value`
static PROPERTY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9-]+\.)?([A-Za-z0-9-]+)(;[^:]*)?:(.*)$")
        .expect("valid vCard property regex")
});

/// One parsed vCard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VcardEntry {
    /// `FN` value, trimmed and NFC-normalized.
    pub formatted_name: Option<String>,
    pub telephones: Vec<String>,
    pub emails: Vec<String>,
    /// 1-based position of the card in the file.
    pub index: usize,
}

impl VcardEntry {
    /// First whitespace-separated token of the formatted name.
    #[must_use]
    pub fn first_name(&self) -> &str {
        self.formatted_name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
            .unwrap_or_default()
    }

    /// Last token of the formatted name, empty for single-word names.
    #[must_use]
    pub fn last_name(&self) -> &str {
        let Some(name) = self.formatted_name.as_deref() else {
            return "";
        };
        let parts: Vec<&str> = name.split_whitespace().collect();
        if parts.len() > 1 {
            parts[parts.len() - 1]
        } else {
            ""
        }
    }

    /// Contact rows for the directory loader: one per telephone and email.
    ///
    /// A card with contact points but no name yields rows without a name so
    /// the loader's malformed-row policy applies to it.
    #[must_use]
    pub fn contact_rows(&self) -> Vec<ContactRow> {
        self.telephones
            .iter()
            .chain(&self.emails)
            .map(|identifier| ContactRow {
                identifier: Some(identifier.clone()),
                full_name: self.formatted_name.clone(),
                location: format!("card {}", self.index),
            })
            .collect()
    }
}

/// Row of the flat contact table written by `imsg contacts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactExportRow {
    #[serde(rename = "First Name")]
    pub first_name: String,
    #[serde(rename = "Last Name")]
    pub last_name: String,
    #[serde(rename = "Full Name")]
    pub full_name: String,
    #[serde(rename = "Phone Number")]
    pub phone_number: String,
}

/// Flatten cards into contact table rows: one per telephone number, with the
/// number already normalized. Cards without a name are left out.
#[must_use]
pub fn export_rows(entries: &[VcardEntry]) -> Vec<ContactExportRow> {
    entries
        .iter()
        .filter_map(|entry| entry.formatted_name.as_ref().map(|name| (entry, name)))
        .flat_map(|(entry, name)| {
            entry.telephones.iter().map(move |tel| ContactExportRow {
                first_name: entry.first_name().to_string(),
                last_name: entry.last_name().to_string(),
                full_name: name.clone(),
                phone_number: normalize(tel),
            })
        })
        .collect()
}

/// Parse a `.vcf` file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid UTF-8.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<VcardEntry>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ImsgError::source_not_found(path));
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read vCard file '{}'", path.display()))?;
    let entries = parse_str(&content);
    info!("Parsed {} vCards from {}", entries.len(), path.display());
    Ok(entries)
}

/// Parse vCard text. Lines outside `BEGIN:VCARD` / `END:VCARD` are ignored.
#[must_use]
pub fn parse_str(content: &str) -> Vec<VcardEntry> {
    let mut entries = Vec::new();
    let mut current: Option<VcardEntry> = None;

    for line in unfold(content) {
        let Some(caps) = PROPERTY_LINE.captures(&line) else {
            continue;
        };
        let name = caps[1].to_ascii_uppercase();
        let value = caps.get(3).map_or("", |m| m.as_str());

        match name.as_str() {
            "BEGIN" if value.trim().eq_ignore_ascii_case("VCARD") => {
                current = Some(VcardEntry {
                    index: entries.len() + 1,
                    ..VcardEntry::default()
                });
            }
            "END" if value.trim().eq_ignore_ascii_case("VCARD") => {
                if let Some(entry) = current.take() {
                    entries.push(entry);
                }
            }
            "FN" => {
                if let Some(entry) = current.as_mut() {
                    let full_name: String = unescape(value).trim().nfc().collect();
                    entry.formatted_name = (!full_name.is_empty()).then_some(full_name);
                }
            }
            "TEL" => {
                if let Some(entry) = current.as_mut() {
                    let tel = unescape(value);
                    let tel = tel.trim();
                    let tel = tel
                        .strip_prefix("tel:")
                        .or_else(|| tel.strip_prefix("TEL:"))
                        .unwrap_or(tel);
                    if !tel.is_empty() {
                        entry.telephones.push(tel.to_string());
                    }
                }
            }
            "EMAIL" => {
                if let Some(entry) = current.as_mut() {
                    let email = unescape(value).trim().to_string();
                    if !email.is_empty() {
                        entry.emails.push(email);
                    }
                }
            }
            _ => {}
        }
    }

    if current.is_some() {
        debug!("Ignoring unterminated vCard at end of input");
    }

    entries
}

/// Join folded lines.
fn unfold(content: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in content.lines() {
        if let Some(rest) = raw.strip_prefix(|c: char| c == ' ' || c == '\t') {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        lines.push(raw.to_string());
    }
    lines
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "BEGIN:VCARD\r\n\
VERSION:3.0\r\n\
N:Lovelace;Ada;;;\r\n\
FN:Ada Lovelace\r\n\
item1.TEL;type=CELL;type=pref:+1 (555) 123-4567\r\n\
TEL;TYPE=HOME:555-987-\r\n 6543\r\n\
EMAIL;type=INTERNET:ada@example.com\r\n\
END:VCARD\r\n\
BEGIN:VCARD\r\n\
VERSION:3.0\r\n\
ORG:Acme\\, Inc.\r\n\
TEL:5550001111\r\n\
END:VCARD\r\n\
BEGIN:VCARD\r\n\
VERSION:4.0\r\n\
FN:Cher\r\n\
TEL;VALUE=uri:tel:+44-20-7946-0958\r\n\
END:VCARD\r\n";

    #[test]
    fn parses_names_and_contact_points() {
        let entries = parse_str(SAMPLE);
        assert_eq!(entries.len(), 3);

        let ada = &entries[0];
        assert_eq!(ada.formatted_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(ada.telephones, vec!["+1 (555) 123-4567", "555-987-6543"]);
        assert_eq!(ada.emails, vec!["ada@example.com"]);
        assert_eq!(ada.index, 1);

        assert_eq!(entries[1].formatted_name, None);
        assert_eq!(entries[2].telephones, vec!["+44-20-7946-0958"]);
    }

    #[test]
    fn first_and_last_name_split() {
        let entries = parse_str(SAMPLE);
        assert_eq!(entries[0].first_name(), "Ada");
        assert_eq!(entries[0].last_name(), "Lovelace");
        assert_eq!(entries[2].first_name(), "Cher");
        assert_eq!(entries[2].last_name(), "");
    }

    #[test]
    fn export_rows_skip_unnamed_and_normalize() {
        let rows = export_rows(&parse_str(SAMPLE));
        let numbers: Vec<&str> = rows.iter().map(|r| r.phone_number.as_str()).collect();
        assert_eq!(numbers, vec!["15551234567", "15559876543", "442079460958"]);
        assert!(rows.iter().all(|r| !r.full_name.is_empty()));
    }

    #[test]
    fn contact_rows_carry_missing_names() {
        let entries = parse_str(SAMPLE);
        let rows = entries[1].contact_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].full_name, None);
        assert_eq!(rows[0].location, "card 2");
        assert_eq!(entries[0].contact_rows().len(), 3);
    }

    #[test]
    fn unescapes_values() {
        assert_eq!(unescape(r"Smith\, John\nJr"), "Smith, John\nJr");
        assert_eq!(unescape(r"back\\slash"), r"back\slash");
    }

    #[test]
    fn names_are_nfc_normalized() {
        let decomposed = "BEGIN:VCARD\nFN:Jose\u{301}\nTEL:5551112222\nEND:VCARD\n";
        let entries = parse_str(decomposed);
        assert_eq!(entries[0].formatted_name.as_deref(), Some("José"));
    }

    #[test]
    fn blank_name_treated_as_absent() {
        let entries = parse_str("BEGIN:VCARD\nFN:   \nTEL:5551112222\nEND:VCARD\n");
        assert_eq!(entries[0].formatted_name, None);
    }

    #[test]
    fn unreadable_file_names_the_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("latin1.vcf");
        std::fs::write(&path, b"BEGIN:VCARD\r\nFN:Ren\xe9\r\nEND:VCARD\r\n").unwrap();

        let err = parse_file(&path).unwrap_err();
        assert!(matches!(err, ImsgError::WithContext { .. }));
        assert!(err.to_string().contains("latin1.vcf"));

        let missing = parse_file(dir.path().join("missing.vcf")).unwrap_err();
        assert!(matches!(missing, ImsgError::SourceNotFound { .. }));
    }
}
