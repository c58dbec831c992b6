use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Timestamp = i64;
pub type TaskId = i64;
pub type NotificationId = u64;

/// Longest task text accepted from an imported document, in characters.
pub const MAX_IMPORTED_TEXT_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Sort rank: high sorts first.
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    pub completed: bool,
    pub created_at: Timestamp,
    pub priority: Priority,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    #[default]
    All,
    Active,
    Completed,
}

impl Filter {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(Self::All),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    pub fn matches(self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::Active => !task.completed,
            Self::Completed => task.completed,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    #[default]
    CreatedDesc,
    CreatedAsc,
    AlphaAsc,
    AlphaDesc,
    Priority,
    IncompleteFirst,
}

impl SortKey {
    /// Unknown keys fall back to newest-first.
    pub fn parse_lossy(value: &str) -> Self {
        match value {
            "created-asc" => Self::CreatedAsc,
            "alpha-asc" => Self::AlphaAsc,
            "alpha-desc" => Self::AlphaDesc,
            "priority" => Self::Priority,
            "incomplete-first" => Self::IncompleteFirst,
            _ => Self::CreatedDesc,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Notification {
    pub id: NotificationId,
    pub message: String,
    pub kind: NotificationKind,
    pub ttl_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    #[serde(default = "default_undo_window_ms")]
    pub undo_window_ms: u64,
    #[serde(default = "default_notification_ttl_ms")]
    pub notification_ttl_ms: u64,
    #[serde(default = "default_warning_ttl_ms")]
    pub warning_ttl_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            undo_window_ms: default_undo_window_ms(),
            notification_ttl_ms: default_notification_ttl_ms(),
            warning_ttl_ms: default_warning_ttl_ms(),
        }
    }
}

impl Settings {
    pub fn ttl_for(&self, kind: NotificationKind) -> u64 {
        match kind {
            NotificationKind::Warning => self.warning_ttl_ms,
            NotificationKind::Success | NotificationKind::Info => self.notification_ttl_ms,
        }
    }
}

fn default_undo_window_ms() -> u64 {
    5_000
}

fn default_notification_ttl_ms() -> u64 {
    3_000
}

fn default_warning_ttl_ms() -> u64 {
    // Delete notices stay up for as long as the undo window.
    5_000
}

/// Why a raw record could not become a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationIssue {
    NotAnObject,
    BlankText,
}

/// Coerces one loosely-typed record into a valid task.
///
/// Shared by store hydration and import so both produce identical records:
/// unknown priorities become `medium`, `completed` follows JSON truthiness,
/// a missing `createdAt` becomes `now` and a missing `id` becomes `fallback_id`.
/// A bare string is accepted as the text of a legacy record.
pub fn normalize_task(
    raw: &Value,
    fallback_id: TaskId,
    now: Timestamp,
) -> Result<Task, NormalizationIssue> {
    let record = match raw {
        Value::Object(record) => record,
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(NormalizationIssue::BlankText);
            }
            return Ok(Task {
                id: fallback_id,
                text: text.to_string(),
                completed: false,
                created_at: now,
                priority: Priority::Medium,
            });
        }
        _ => return Err(NormalizationIssue::NotAnObject),
    };

    let text = match record.get("text") {
        Some(Value::String(text)) => text.trim().to_string(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => String::new(),
    };
    if text.is_empty() {
        return Err(NormalizationIssue::BlankText);
    }

    Ok(Task {
        id: record.get("id").and_then(as_integer).unwrap_or(fallback_id),
        text,
        completed: record.get("completed").is_some_and(truthy),
        created_at: record.get("createdAt").and_then(as_integer).unwrap_or(now),
        priority: record
            .get("priority")
            .and_then(Value::as_str)
            .and_then(Priority::parse)
            .unwrap_or_default(),
    })
}

/// Truncates to at most `max_chars` characters without splitting a code point.
pub fn clamp_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// Reassigns duplicated ids (later records lose) and returns the next free id,
/// which is never lower than `next_id`.
///
/// A duplicate that cannot be renumbered because the id space is exhausted is
/// dropped instead of sharing an id.
pub fn ensure_unique_ids(tasks: &mut Vec<Task>, next_id: TaskId) -> TaskId {
    let mut next = tasks
        .iter()
        .map(|task| task.id.saturating_add(1))
        .max()
        .unwrap_or(0)
        .max(next_id);
    let mut seen = HashSet::with_capacity(tasks.len());
    tasks.retain_mut(|task| {
        if seen.insert(task.id) {
            return true;
        }
        match next.checked_add(1) {
            Some(following) => {
                task.id = next;
                seen.insert(next);
                next = following;
                true
            }
            None => {
                log::warn!("dropping task with duplicate id={}: id space exhausted", task.id);
                false
            }
        }
    });
    next
}

/// Integer view of a numeric field. `i64::MAX` and anything beyond it is
/// treated as missing so the id counter always has room to advance.
pub fn as_integer(value: &Value) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    value
        .as_i64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && *f > -LIMIT && *f < LIMIT)
                .map(|f| f as i64)
        })
        .filter(|n| *n < i64::MAX)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
