//! Descriptive statistics over a labeled message history.
//!
//! Everything here takes `&[LabeledMessage]` plus plain parameters and returns
//! serializable results, so a report can be printed as text charts or handed
//! to an external plotting tool as JSON/CSV.

use crate::error::{ImsgError, Result};
use crate::model::LabeledMessage;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use itertools::Itertools;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Minutes in a day; upper bound for time-of-day segments.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Width of the bar in text charts.
const BAR_WIDTH: usize = 40;

/// Headline counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total: u64,
    pub sent: u64,
    pub received: u64,
    pub direct: u64,
    pub group: u64,
    /// Distinct direct-message counterparts.
    pub contacts: usize,
    pub group_chats: usize,
    pub first_message: Option<NaiveDateTime>,
    pub last_message: Option<NaiveDateTime>,
}

/// Sent/received counts in one calendar bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityBucket {
    pub start: NaiveDate,
    pub sent: u64,
    pub received: u64,
    pub total: u64,
}

/// Message volume over the whole history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifetimeActivity {
    pub bucket_days: u32,
    pub buckets: Vec<ActivityBucket>,
    /// Mean sent messages per bucket.
    pub average_sent: f64,
}

/// Sent/received counts in one slice of the day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSegment {
    pub start: NaiveTime,
    pub sent: u64,
    pub received: u64,
    pub total: u64,
}

/// Message volume by local time of day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeOfDay {
    pub segment_minutes: u32,
    pub segments: Vec<TimeSegment>,
}

/// A named entity with a message count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub messages: u64,
}

/// Share of a group chat's messages sent by the owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participation {
    pub name: String,
    pub sent: u64,
    pub total: u64,
    pub rate: f64,
}

/// All messages exchanged with one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interactions {
    pub name: String,
    /// Direct messages in both directions.
    pub direct: u64,
    /// Group messages the contact sent.
    pub group_from_contact: u64,
    /// Owner messages in group chats the contact posted in.
    pub group_from_me: u64,
    pub total: u64,
}

/// One sender's share of a group chat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SenderShare {
    pub sender: String,
    pub messages: u64,
    pub percentage: f64,
}

/// Per-sender distribution within one group chat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupBreakdown {
    pub chat: String,
    pub total: u64,
    pub senders: Vec<SenderShare>,
}

/// Direct and total interactions with one person in one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonBucket {
    pub start: NaiveDate,
    pub direct: u64,
    pub total: u64,
}

/// Interactions with one person over time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonActivity {
    pub person: String,
    pub bucket_days: u32,
    pub buckets: Vec<PersonBucket>,
}

/// Parameters for [`Report::compute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub bucket_days: u32,
    pub segment_minutes: u32,
    pub top_n: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            bucket_days: 10,
            segment_minutes: 20,
            top_n: 30,
        }
    }
}

/// Every whole-history analysis in one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub summary: Summary,
    pub lifetime_activity: LifetimeActivity,
    pub time_of_day: TimeOfDay,
    pub top_group_chats: Vec<NamedCount>,
    pub group_participation: Vec<Participation>,
    pub top_contacts: Vec<NamedCount>,
    pub total_interactions: Vec<Interactions>,
}

impl Report {
    /// Run every whole-history analysis.
    ///
    /// # Errors
    ///
    /// Returns [`ImsgError::InvalidArgument`] for a zero bucket size or an
    /// out-of-range segment length.
    pub fn compute(messages: &[LabeledMessage], options: &ReportOptions) -> Result<Self> {
        Ok(Self {
            summary: summary(messages),
            lifetime_activity: lifetime_activity(messages, options.bucket_days)?,
            time_of_day: time_of_day(messages, options.segment_minutes)?,
            top_group_chats: top_group_chats(messages, options.top_n),
            group_participation: group_participation(messages, options.top_n),
            top_contacts: top_contacts(messages, options.top_n),
            total_interactions: total_interactions(messages, options.top_n),
        })
    }
}

// =============================================================================
// Analyses
// =============================================================================

/// Headline counts for the whole history.
#[must_use]
pub fn summary(messages: &[LabeledMessage]) -> Summary {
    let mut summary = Summary::default();
    let mut contacts = HashSet::new();
    let mut chats = HashSet::new();

    for m in messages {
        summary.total += 1;
        if m.is_from_me() {
            summary.sent += 1;
        } else {
            summary.received += 1;
        }
        if m.is_group_chat {
            summary.group += 1;
            if let Some(key) = m.group_key() {
                chats.insert(key);
            }
        } else {
            summary.direct += 1;
            contacts.insert(m.to());
        }
    }

    summary.contacts = contacts.len();
    summary.group_chats = chats.len();
    summary.first_message = messages.iter().map(|m| m.message.timestamp.local).min();
    summary.last_message = messages.iter().map(|m| m.message.timestamp.local).max();
    summary
}

fn check_bucket_days(bucket_days: u32) -> Result<()> {
    if bucket_days == 0 {
        return Err(ImsgError::invalid_argument("bucket size must be at least one day"));
    }
    Ok(())
}

/// Calendar buckets of `bucket_days` days starting at midnight of the earliest
/// message, covering every message.
struct Buckets {
    anchor: NaiveDate,
    days: u32,
    count: usize,
}

impl Buckets {
    fn spanning(messages: &[LabeledMessage], days: u32) -> Option<Self> {
        let (first, last) = messages
            .iter()
            .map(|m| m.message.timestamp.local.date())
            .minmax()
            .into_option()?;
        let mut buckets = Self {
            anchor: first,
            days,
            count: 0,
        };
        buckets.count = buckets.index(last) + 1;
        Some(buckets)
    }

    fn index(&self, date: NaiveDate) -> usize {
        let offset = (date - self.anchor).num_days().max(0);
        usize::try_from(offset / i64::from(self.days)).unwrap_or(0)
    }

    fn start(&self, index: usize) -> NaiveDate {
        let offset = i64::try_from(index).unwrap_or(i64::MAX) * i64::from(self.days);
        self.anchor + Duration::days(offset)
    }
}

/// Sent/received/total per `bucket_days`-day bucket, zero-filled.
///
/// # Errors
///
/// Returns [`ImsgError::InvalidArgument`] if `bucket_days` is zero.
#[allow(clippy::cast_precision_loss)]
pub fn lifetime_activity(messages: &[LabeledMessage], bucket_days: u32) -> Result<LifetimeActivity> {
    check_bucket_days(bucket_days)?;
    let Some(layout) = Buckets::spanning(messages, bucket_days) else {
        return Ok(LifetimeActivity {
            bucket_days,
            buckets: Vec::new(),
            average_sent: 0.0,
        });
    };

    let mut buckets: Vec<ActivityBucket> = (0..layout.count)
        .map(|i| ActivityBucket {
            start: layout.start(i),
            sent: 0,
            received: 0,
            total: 0,
        })
        .collect();

    for m in messages {
        let bucket = &mut buckets[layout.index(m.message.timestamp.local.date())];
        if m.is_from_me() {
            bucket.sent += 1;
        } else {
            bucket.received += 1;
        }
        bucket.total += 1;
    }

    let sent: u64 = buckets.iter().map(|b| b.sent).sum();
    let average_sent = sent as f64 / buckets.len() as f64;

    Ok(LifetimeActivity {
        bucket_days,
        buckets,
        average_sent,
    })
}

/// Sent/received per `segment_minutes`-minute slice of the local day,
/// zero-filled. Times are floored to the segment start.
///
/// # Errors
///
/// Returns [`ImsgError::InvalidArgument`] unless `1 <= segment_minutes <= 1440`.
pub fn time_of_day(messages: &[LabeledMessage], segment_minutes: u32) -> Result<TimeOfDay> {
    if segment_minutes == 0 || segment_minutes > MINUTES_PER_DAY {
        return Err(ImsgError::invalid_argument(format!(
            "segment length must be between 1 and {MINUTES_PER_DAY} minutes, got {segment_minutes}"
        )));
    }

    let count = MINUTES_PER_DAY.div_ceil(segment_minutes);
    let mut segments: Vec<TimeSegment> = (0..count)
        .map(|i| TimeSegment {
            start: NaiveTime::from_num_seconds_from_midnight_opt(i * segment_minutes * 60, 0)
                .unwrap_or(NaiveTime::MIN),
            sent: 0,
            received: 0,
            total: 0,
        })
        .collect();

    for m in messages {
        let local = m.message.timestamp.local;
        let minute = local.hour() * 60 + local.minute();
        let segment = &mut segments[(minute / segment_minutes) as usize];
        if m.is_from_me() {
            segment.sent += 1;
        } else {
            segment.received += 1;
        }
        segment.total += 1;
    }

    Ok(TimeOfDay {
        segment_minutes,
        segments,
    })
}

/// Sort by count descending, then name, and keep `n`.
fn top_counts(counts: HashMap<&str, u64>, n: usize) -> Vec<NamedCount> {
    counts
        .into_iter()
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)))
        .take(n)
        .map(|(name, messages)| NamedCount {
            name: name.to_string(),
            messages,
        })
        .collect()
}

/// Group chats by message count.
#[must_use]
pub fn top_group_chats(messages: &[LabeledMessage], n: usize) -> Vec<NamedCount> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for key in messages.iter().filter_map(LabeledMessage::group_key) {
        *counts.entry(key).or_default() += 1;
    }
    top_counts(counts, n)
}

/// Names of every group chat, sorted.
#[must_use]
pub fn group_chat_names(messages: &[LabeledMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(LabeledMessage::group_key)
        .unique()
        .sorted()
        .map(String::from)
        .collect()
}

/// Owner participation rate in the `n` busiest group chats, highest first.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn group_participation(messages: &[LabeledMessage], n: usize) -> Vec<Participation> {
    let mut sent: HashMap<&str, u64> = HashMap::new();
    for m in messages.iter().filter(|m| m.is_from_me()) {
        if let Some(key) = m.group_key() {
            *sent.entry(key).or_default() += 1;
        }
    }

    top_group_chats(messages, n)
        .into_iter()
        .map(|chat| {
            let mine = sent.get(chat.name.as_str()).copied().unwrap_or(0);
            Participation {
                rate: if chat.messages > 0 {
                    mine as f64 / chat.messages as f64
                } else {
                    0.0
                },
                sent: mine,
                total: chat.messages,
                name: chat.name,
            }
        })
        .sorted_by(|a, b| b.rate.total_cmp(&a.rate).then_with(|| a.name.cmp(&b.name)))
        .collect()
}

fn direct_counts(messages: &[LabeledMessage]) -> HashMap<&str, u64> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for m in messages.iter().filter(|m| !m.is_group_chat) {
        *counts.entry(m.to()).or_default() += 1;
    }
    counts
}

/// Contacts by number of direct messages (both directions).
#[must_use]
pub fn top_contacts(messages: &[LabeledMessage], n: usize) -> Vec<NamedCount> {
    top_counts(direct_counts(messages), n)
}

/// Group chats each non-owner sender has posted in.
fn chats_by_sender(messages: &[LabeledMessage]) -> HashMap<&str, HashSet<&str>> {
    let mut chats: HashMap<&str, HashSet<&str>> = HashMap::new();
    for m in messages.iter().filter(|m| !m.is_from_me()) {
        if let Some(key) = m.group_key() {
            chats.entry(m.resolved_sender()).or_default().insert(key);
        }
    }
    chats
}

/// Per direct-message contact: direct messages, plus their group messages,
/// plus owner messages in group chats they posted in. Highest first.
#[must_use]
pub fn total_interactions(messages: &[LabeledMessage], n: usize) -> Vec<Interactions> {
    let direct = direct_counts(messages);
    let chats = chats_by_sender(messages);

    let mut group_from_contact: HashMap<&str, u64> = HashMap::new();
    let mut my_group_messages: HashMap<&str, u64> = HashMap::new();
    for m in messages {
        let Some(key) = m.group_key() else { continue };
        if m.is_from_me() {
            *my_group_messages.entry(key).or_default() += 1;
        } else {
            *group_from_contact.entry(m.resolved_sender()).or_default() += 1;
        }
    }

    direct
        .into_iter()
        .map(|(name, direct)| {
            let from_contact = group_from_contact.get(name).copied().unwrap_or(0);
            let from_me = chats.get(name).map_or(0, |shared| {
                shared
                    .iter()
                    .map(|chat| my_group_messages.get(chat).copied().unwrap_or(0))
                    .sum()
            });
            Interactions {
                name: name.to_string(),
                direct,
                group_from_contact: from_contact,
                group_from_me: from_me,
                total: direct + from_contact + from_me,
            }
        })
        .sorted_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)))
        .take(n)
        .collect()
}

/// Message share of each sender in one group chat, largest first.
///
/// # Errors
///
/// Returns [`ImsgError::NotFound`] if no group message belongs to `chat`.
#[allow(clippy::cast_precision_loss)]
pub fn group_chat_breakdown(messages: &[LabeledMessage], chat: &str) -> Result<GroupBreakdown> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for m in messages.iter().filter(|m| m.group_key() == Some(chat)) {
        *counts.entry(m.resolved_sender()).or_default() += 1;
    }
    if counts.is_empty() {
        return Err(ImsgError::not_found("Group chat", chat));
    }

    let total: u64 = counts.values().sum();
    let senders = top_counts(counts, usize::MAX)
        .into_iter()
        .map(|c| SenderShare {
            percentage: c.messages as f64 * 100.0 / total as f64,
            sender: c.name,
            messages: c.messages,
        })
        .collect();

    Ok(GroupBreakdown {
        chat: chat.to_string(),
        total,
        senders,
    })
}

/// Every name that appears as a sender or direct-message counterpart, sorted.
#[must_use]
pub fn person_names(messages: &[LabeledMessage]) -> Vec<String> {
    messages
        .iter()
        .filter(|m| !m.is_from_me())
        .map(LabeledMessage::resolved_sender)
        .chain(messages.iter().filter(|m| !m.is_group_chat).map(LabeledMessage::to))
        .filter(|name| !name.is_empty())
        .unique()
        .sorted()
        .map(String::from)
        .collect()
}

/// Direct messages and total interactions with `person` per bucket. Buckets
/// are anchored at the earliest message of the whole history so several
/// people can be compared on one axis.
///
/// # Errors
///
/// Returns [`ImsgError::InvalidArgument`] for a zero bucket size and
/// [`ImsgError::NotFound`] if `person` never appears.
pub fn person_activity(
    messages: &[LabeledMessage],
    person: &str,
    bucket_days: u32,
) -> Result<PersonActivity> {
    check_bucket_days(bucket_days)?;

    let shared: HashSet<&str> = messages
        .iter()
        .filter(|m| !m.is_from_me() && m.resolved_sender() == person)
        .filter_map(LabeledMessage::group_key)
        .collect();

    let is_direct = |m: &LabeledMessage| !m.is_group_chat && m.to() == person;
    let is_group = |m: &LabeledMessage| {
        m.group_key().is_some_and(|key| {
            (!m.is_from_me() && m.resolved_sender() == person)
                || (m.is_from_me() && shared.contains(key))
        })
    };

    if !messages.iter().any(|m| is_direct(m) || is_group(m)) {
        return Err(ImsgError::not_found("Person", person));
    }

    let layout = Buckets::spanning(messages, bucket_days)
        .ok_or_else(|| ImsgError::not_found("Person", person))?;
    let mut buckets: Vec<PersonBucket> = (0..layout.count)
        .map(|i| PersonBucket {
            start: layout.start(i),
            direct: 0,
            total: 0,
        })
        .collect();

    for m in messages {
        let direct = is_direct(m);
        if !direct && !is_group(m) {
            continue;
        }
        let bucket = &mut buckets[layout.index(m.message.timestamp.local.date())];
        if direct {
            bucket.direct += 1;
        }
        bucket.total += 1;
    }

    Ok(PersonActivity {
        person: person.to_string(),
        bucket_days,
        buckets,
    })
}

// =============================================================================
// Text rendering
// =============================================================================

/// Sparkline over message counts, one block per bucket.
///
/// When there are more buckets than `width`, neighbours are merged by their
/// peak so a single busy day stays visible. Empty buckets render as `▁`; any
/// bucket with messages is at least `▂`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn sparkline(counts: &[u64], width: usize) -> String {
    const BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    if counts.is_empty() || width == 0 {
        return String::new();
    }

    let merge = counts.len().div_ceil(width);
    let peaks: Vec<u64> = counts
        .chunks(merge)
        .map(|chunk| chunk.iter().copied().max().unwrap_or(0))
        .collect();
    let max = peaks.iter().copied().max().unwrap_or(0);

    peaks
        .iter()
        .map(|&count| {
            if count == 0 {
                BLOCKS[0]
            } else {
                let level = 1 + ((count as f64 / max as f64) * 6.0).round() as usize;
                BLOCKS[level.min(7)]
            }
        })
        .collect()
}

/// Horizontal bar chart, one `label  bar  value` line per row.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn bar_chart(rows: &[(String, f64)], value_fmt: impl Fn(f64) -> String) -> String {
    let max = rows.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
    let label_width = rows
        .iter()
        .map(|(label, _)| label.chars().count())
        .max()
        .unwrap_or(0)
        .min(32);
    let bar_width = BAR_WIDTH;

    rows.iter()
        .map(|(label, value)| {
            let bar_len = if max > 0.0 {
                ((value / max) * BAR_WIDTH as f64).round() as usize
            } else {
                0
            };
            format!(
                "{:<label_width$}  {:<bar_width$}  {}",
                truncate_label(label, label_width),
                "█".repeat(bar_len),
                value_fmt(*value)
            )
        })
        .join("\n")
}

fn truncate_label(label: &str, max_chars: usize) -> String {
    if label.chars().count() <= max_chars {
        return label.to_string();
    }
    let kept: String = label.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{kept}…")
}

#[allow(clippy::cast_precision_loss)]
fn count_rows(counts: &[NamedCount]) -> Vec<(String, f64)> {
    counts
        .iter()
        .map(|c| (c.name.clone(), c.messages as f64))
        .collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole(value: f64) -> String {
    crate::format_number_u64(value as u64)
}

/// Render named counts as a bar chart.
#[must_use]
pub fn format_counts(counts: &[NamedCount]) -> String {
    bar_chart(&count_rows(counts), whole)
}

/// Render participation rates as a bar chart.
#[must_use]
pub fn format_participation(rows: &[Participation]) -> String {
    let rows: Vec<(String, f64)> = rows.iter().map(|p| (p.name.clone(), p.rate)).collect();
    bar_chart(&rows, |rate| format!("{:.1}%", rate * 100.0))
}

/// Render total interactions as a bar chart.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_interactions(rows: &[Interactions]) -> String {
    let rows: Vec<(String, f64)> = rows.iter().map(|i| (i.name.clone(), i.total as f64)).collect();
    bar_chart(&rows, whole)
}

/// Render a group chat breakdown as a bar chart with shares.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_breakdown(breakdown: &GroupBreakdown) -> String {
    let shares: HashMap<&str, f64> = breakdown
        .senders
        .iter()
        .map(|s| (s.sender.as_str(), s.percentage))
        .collect();
    let rows: Vec<(String, f64)> = breakdown
        .senders
        .iter()
        .map(|s| (s.sender.clone(), s.messages as f64))
        .collect();
    let chart = bar_chart(&rows, whole);
    chart
        .lines()
        .zip(&rows)
        .map(|(line, (sender, _))| {
            format!("{line} ({:.1}%)", shares.get(sender.as_str()).copied().unwrap_or(0.0))
        })
        .join("\n")
}

/// Render lifetime activity as sparklines plus the busiest buckets.
#[must_use]
pub fn format_lifetime(activity: &LifetimeActivity, width: usize) -> String {
    let sent: Vec<u64> = activity.buckets.iter().map(|b| b.sent).collect();
    let received: Vec<u64> = activity.buckets.iter().map(|b| b.received).collect();
    let total: Vec<u64> = activity.buckets.iter().map(|b| b.total).collect();

    let range = match (activity.buckets.first(), activity.buckets.last()) {
        (Some(first), Some(last)) => format!("{} .. {}", first.start, last.start),
        _ => "no messages".to_string(),
    };

    [
        format!("{}-day buckets: {range}", activity.bucket_days),
        format!("Sent      {}", sparkline(&sent, width)),
        format!("Received  {}", sparkline(&received, width)),
        format!("Total     {}", sparkline(&total, width)),
        format!("Average sent per bucket: {:.2}", activity.average_sent),
    ]
    .join("\n")
}

/// Render time-of-day activity as a bar chart of totals.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_time_of_day(time_of_day: &TimeOfDay) -> String {
    let rows: Vec<(String, f64)> = time_of_day
        .segments
        .iter()
        .map(|s| (s.start.format("%H:%M").to_string(), s.total as f64))
        .collect();
    bar_chart(&rows, whole)
}

/// Render person activity as two sparklines.
#[must_use]
pub fn format_person_activity(activity: &PersonActivity, width: usize) -> String {
    let direct: Vec<u64> = activity.buckets.iter().map(|b| b.direct).collect();
    let total: Vec<u64> = activity.buckets.iter().map(|b| b.total).collect();
    [
        format!("{} ({}-day buckets)", activity.person, activity.bucket_days),
        format!("Direct  {}", sparkline(&direct, width)),
        format!("Total   {}", sparkline(&total, width)),
        format!(
            "Direct messages: {}  Total interactions: {}",
            crate::format_number_u64(direct.iter().sum()),
            crate::format_number_u64(total.iter().sum())
        ),
    ]
    .join("\n")
}
