use chrono::{Local, TimeZone};
use serde_json::Value;

use crate::models::{
    as_integer, clamp_text, ensure_unique_ids, normalize_task, Task, TaskId, Timestamp,
    MAX_IMPORTED_TEXT_CHARS,
};

#[derive(Debug)]
pub enum ImportError {
    Json(serde_json::Error),
    NotAnArray,
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Json(err) => write!(f, "json error: {err}"),
            ImportError::NotAnArray => write!(f, "top-level value is not a list"),
        }
    }
}

impl std::error::Error for ImportError {}

impl From<serde_json::Error> for ImportError {
    fn from(value: serde_json::Error) -> Self {
        ImportError::Json(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedTasks {
    pub tasks: Vec<Task>,
    pub next_id: TaskId,
    /// Elements that could not be turned into tasks.
    pub skipped: usize,
}

/// Pretty-printed canonical records, in collection order.
pub fn export_json(tasks: &[Task]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(tasks)
}

pub fn export_file_name(now: Timestamp) -> String {
    let stamp = Local
        .timestamp_millis_opt(now)
        .single()
        .map(|dt| dt.format("%Y%m%d-%H%M%S").to_string())
        .unwrap_or_else(|| now.to_string());
    format!("todo-list-{stamp}.json")
}

/// Validates and normalizes an import document.
///
/// Ids missing from an element continue from `next_id`, text is clamped to
/// [`MAX_IMPORTED_TEXT_CHARS`], and the returned counter sits past every id used.
pub fn parse_import(
    raw: &str,
    next_id: TaskId,
    now: Timestamp,
) -> Result<ImportedTasks, ImportError> {
    let records = match serde_json::from_str::<Value>(raw)? {
        Value::Array(records) => records,
        _ => return Err(ImportError::NotAnArray),
    };

    let mut counter = next_id;
    let mut tasks = Vec::with_capacity(records.len());
    for record in &records {
        match normalize_task(record, counter, now) {
            Ok(mut task) => {
                if !has_numeric_id(record) {
                    counter += 1;
                }
                task.text = clamp_text(&task.text, MAX_IMPORTED_TEXT_CHARS);
                tasks.push(task);
            }
            Err(issue) => log::debug!("skipping import element: {issue:?}"),
        }
    }

    let skipped = records.len() - tasks.len();
    let next_id = ensure_unique_ids(&mut tasks, counter);
    Ok(ImportedTasks {
        tasks,
        next_id,
        skipped,
    })
}

fn has_numeric_id(record: &Value) -> bool {
    record.get("id").and_then(as_integer).is_some()
}
