use std::cmp::Ordering;

use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::models::{Filter, SortKey, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Counts {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
}

impl Counts {
    pub fn of(tasks: &[Task]) -> Self {
        let completed = tasks.iter().filter(|task| task.completed).count();
        Self {
            total: tasks.len(),
            active: tasks.len() - completed,
            completed,
        }
    }

    pub fn has_completed(&self) -> bool {
        self.completed > 0
    }
}

/// The visible subset of `tasks`: completion filter, then search, then a stable sort.
///
/// The input keeps its order; callers get a fresh vector on every call.
pub fn project(tasks: &[Task], filter: Filter, search: &str, sort_by: SortKey) -> Vec<Task> {
    let needle = search.trim().to_lowercase();
    let mut visible: Vec<Task> = tasks
        .iter()
        .filter(|task| filter.matches(task))
        .filter(|task| needle.is_empty() || task.text.to_lowercase().contains(&needle))
        .cloned()
        .collect();
    visible.sort_by(|a, b| compare(sort_by, a, b));
    visible
}

fn compare(sort_by: SortKey, a: &Task, b: &Task) -> Ordering {
    match sort_by {
        SortKey::CreatedDesc => b.created_at.cmp(&a.created_at),
        SortKey::CreatedAsc => a.created_at.cmp(&b.created_at),
        SortKey::AlphaAsc => compare_text(&a.text, &b.text),
        SortKey::AlphaDesc => compare_text(&b.text, &a.text),
        SortKey::Priority => a.priority.rank().cmp(&b.priority.rank()),
        SortKey::IncompleteFirst => a.completed.cmp(&b.completed),
    }
}

/// Alphabetical order for task text.
///
/// The primary key ignores case and accents ("éclair" sorts between "apple" and
/// "fig"). Ties fall back to case-insensitive code points, then lowercase before
/// uppercase, so distinct strings never compare equal and reversing the
/// arguments reverses the order.
pub fn compare_text(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        .then_with(|| b.cmp(a))
}

/// Canonical decomposition with combining marks removed, lowercased.
fn collation_key(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}
