//! Labeling stage: join messages against the contact directory.
//!
//! Each message gets a resolved sender and, for direct conversations, a
//! resolved counterpart (`To`). Output preserves input order and count.

use crate::contacts::IdentityResolver;
use crate::model::{
    DEFAULT_OWNER_LABEL, LabeledMessage, RawMessage, Resolution, UNKNOWN_IDENTITY,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Options for [`label_messages`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelOptions {
    /// Sender label for messages sent by the account owner.
    pub owner_label: String,
}

impl Default for LabelOptions {
    fn default() -> Self {
        Self {
            owner_label: DEFAULT_OWNER_LABEL.to_string(),
        }
    }
}

/// Counters from one labeling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelStats {
    pub messages: usize,
    pub group_messages: usize,
    pub from_me: usize,
    /// Messages whose sender was found in the directory (owner excluded).
    pub senders_resolved: usize,
    pub senders_unresolved: usize,
    /// Direct messages whose counterpart was found in the directory.
    pub counterparts_resolved: usize,
    pub counterparts_unresolved: usize,
}

impl LabelStats {
    /// Collect counters from labeled output.
    #[must_use]
    pub fn from_labeled(messages: &[LabeledMessage]) -> Self {
        let mut stats = Self {
            messages: messages.len(),
            ..Self::default()
        };
        for labeled in messages {
            if labeled.is_group_chat {
                stats.group_messages += 1;
            }
            if labeled.is_from_me() {
                stats.from_me += 1;
            } else if labeled.sender.is_resolved() {
                stats.senders_resolved += 1;
            } else {
                stats.senders_unresolved += 1;
            }
            match &labeled.counterpart {
                Some(Resolution::Resolved(_)) => stats.counterparts_resolved += 1,
                Some(Resolution::Unresolved(_)) => stats.counterparts_unresolved += 1,
                None => {}
            }
        }
        stats
    }
}

/// Blank identifiers become `Unknown`; anything else reaches the resolver
/// untouched so an unmatched identifier comes back verbatim.
fn resolve_identifier<R: IdentityResolver + ?Sized>(resolver: &R, identifier: &str) -> Resolution {
    if identifier.trim().is_empty() {
        Resolution::Unresolved(UNKNOWN_IDENTITY.to_string())
    } else {
        resolver.resolve(identifier)
    }
}

/// Label a single message.
pub fn label_message<R: IdentityResolver + ?Sized>(
    message: &RawMessage,
    resolver: &R,
    options: &LabelOptions,
) -> LabeledMessage {
    let is_group_chat = message.is_group_chat();

    let sender = if message.is_from_me {
        Resolution::Resolved(options.owner_label.clone())
    } else {
        resolve_identifier(resolver, &message.sender_identifier)
    };

    let counterpart = if is_group_chat {
        None
    } else {
        Some(resolve_identifier(resolver, message.counterpart_identifier()))
    };

    LabeledMessage {
        message: message.clone(),
        sender,
        counterpart,
        is_group_chat,
    }
}

/// Label every message, preserving order.
pub fn label_messages<R: IdentityResolver + ?Sized>(
    messages: &[RawMessage],
    resolver: &R,
    options: &LabelOptions,
) -> Vec<LabeledMessage> {
    let labeled: Vec<LabeledMessage> = messages
        .iter()
        .map(|message| label_message(message, resolver, options))
        .collect();

    let stats = LabelStats::from_labeled(&labeled);
    info!(
        messages = stats.messages,
        group = stats.group_messages,
        from_me = stats.from_me,
        senders_resolved = stats.senders_resolved,
        senders_unresolved = stats.senders_unresolved,
        "Labeled messages"
    );
    labeled
}
