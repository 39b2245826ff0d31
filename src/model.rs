//! Data models for message and contact records.
//!
//! These structures represent rows of the message table after extraction and
//! the result of joining them against the contact directory.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display value used when a record carries no identifier at all.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Default label for messages sent by the account owner.
pub const DEFAULT_OWNER_LABEL: &str = "Me";

/// When a message was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageTime {
    /// Absolute instant.
    pub utc: DateTime<Utc>,
    /// Wall-clock time on the device that exported the history.
    pub local: NaiveDateTime,
}

impl MessageTime {
    #[must_use]
    pub const fn new(utc: DateTime<Utc>, local: NaiveDateTime) -> Self {
        Self { utc, local }
    }

    #[must_use]
    pub fn unix_seconds(&self) -> i64 {
        self.utc.timestamp()
    }
}

/// A message as read from the message store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub timestamp: MessageTime,
    /// Phone number or email of the handle attached to the message.
    pub sender_identifier: String,
    /// Row id of that handle in the message store, when known.
    pub sender_id: Option<String>,
    pub text: String,
    /// Chat identifier, only set for group conversations.
    pub chat_identifier: Option<String>,
    pub chat_display_name: Option<String>,
    /// Other party of a direct conversation.
    pub contact_identifier: Option<String>,
    pub is_from_me: bool,
}

impl RawMessage {
    /// Whether the record belongs to a group conversation.
    #[must_use]
    pub fn is_group_chat(&self) -> bool {
        present(self.chat_identifier.as_deref()).is_some()
            || present(self.chat_display_name.as_deref()).is_some()
    }

    /// Identifier of the other party in a direct conversation.
    #[must_use]
    pub fn counterpart_identifier(&self) -> &str {
        present(self.contact_identifier.as_deref()).unwrap_or(&self.sender_identifier)
    }
}

/// Outcome of looking an identifier up in the contact directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Resolution {
    /// Matched a contact; holds the display name.
    Resolved(String),
    /// No match; holds the identifier exactly as it appeared in the source.
    Unresolved(String),
}

impl Resolution {
    #[must_use]
    pub fn display(&self) -> &str {
        match self {
            Self::Resolved(name) => name,
            Self::Unresolved(original) => original,
        }
    }

    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display())
    }
}

/// A message joined against the contact directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledMessage {
    pub message: RawMessage,
    pub sender: Resolution,
    /// Counterpart of a direct message; `None` for group messages.
    pub counterpart: Option<Resolution>,
    pub is_group_chat: bool,
}

impl LabeledMessage {
    #[must_use]
    pub fn resolved_sender(&self) -> &str {
        self.sender.display()
    }

    /// Counterpart display string, empty for group messages.
    #[must_use]
    pub fn to(&self) -> &str {
        self.counterpart.as_ref().map_or("", Resolution::display)
    }

    /// Name used to group messages of one group chat: the display name when
    /// the chat has one, otherwise its identifier.
    #[must_use]
    pub fn group_key(&self) -> Option<&str> {
        if !self.is_group_chat {
            return None;
        }
        present(self.message.chat_display_name.as_deref())
            .or_else(|| present(self.message.chat_identifier.as_deref()))
    }

    #[must_use]
    pub const fn is_from_me(&self) -> bool {
        self.message.is_from_me
    }
}

/// A contact row before normalization.
///
/// Fields are optional because sources may omit them; the directory loader
/// decides what an absent field means.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRow {
    pub identifier: Option<String>,
    pub full_name: Option<String>,
    /// Where the row came from, used in error messages (e.g. `record 4`).
    pub location: String,
}

impl ContactRow {
    pub fn new(identifier: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            full_name: Some(full_name.into()),
            location: String::new(),
        }
    }
}

/// A normalized directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub normalized_identifier: String,
    pub display_name: String,
}

/// Trim and drop empty strings.
#[must_use]
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Drop blank strings but keep the rest exactly as given.
#[must_use]
pub fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
