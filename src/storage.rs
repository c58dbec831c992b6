use std::sync::Arc;

use serde_json::Value;

use crate::models::{ensure_unique_ids, normalize_task, Filter, Task, TaskId, Theme, Timestamp};
use crate::store::{KeyValueStore, StorageError};

pub const TASKS_KEY: &str = "tasks";
pub const FILTER_KEY: &str = "filter";
pub const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadedTasks {
    pub tasks: Vec<Task>,
    pub next_id: TaskId,
}

/// Codec between the task collection/preferences and the string store.
#[derive(Clone)]
pub struct Storage {
    store: Arc<dyn KeyValueStore>,
}

impl Storage {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Never fails: anything unreadable is treated as "no prior state".
    pub fn load_tasks(&self, now: Timestamp) -> LoadedTasks {
        let raw = match self.store.get(TASKS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return LoadedTasks::default(),
            Err(err) => {
                log::warn!("tasks unreadable, starting empty: {err}");
                return LoadedTasks::default();
            }
        };
        let records = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(records)) => records,
            Ok(_) => {
                log::warn!("stored tasks are not a list, starting empty");
                return LoadedTasks::default();
            }
            Err(err) => {
                log::warn!("stored tasks are not valid json, starting empty: {err}");
                return LoadedTasks::default();
            }
        };

        let total = records.len();
        let mut tasks: Vec<Task> = records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| normalize_task(record, index as TaskId, now).ok())
            .collect();
        if tasks.len() != total {
            log::warn!(
                "dropped {} unusable stored task record(s)",
                total - tasks.len()
            );
        }
        let next_id = ensure_unique_ids(&mut tasks, 0);
        log::debug!("loaded tasks count={} next_id={next_id}", tasks.len());
        LoadedTasks { tasks, next_id }
    }

    pub fn save_tasks(&self, tasks: &[Task]) -> Result<(), StorageError> {
        let json = serde_json::to_string(tasks)?;
        self.store.set(TASKS_KEY, &json)
    }

    pub fn load_filter(&self) -> Filter {
        self.load_enum(FILTER_KEY, Filter::parse).unwrap_or_default()
    }

    pub fn save_filter(&self, filter: Filter) -> Result<(), StorageError> {
        self.store.set(FILTER_KEY, filter.as_str())
    }

    /// `None` means no explicit choice has been stored.
    pub fn load_theme(&self) -> Option<Theme> {
        self.load_enum(THEME_KEY, Theme::parse)
    }

    pub fn save_theme(&self, theme: Theme) -> Result<(), StorageError> {
        self.store.set(THEME_KEY, theme.as_str())
    }

    pub fn clear_theme(&self) -> Result<(), StorageError> {
        self.store.remove(THEME_KEY)
    }

    fn load_enum<T>(&self, key: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
        match self.store.get(key) {
            Ok(Some(raw)) => {
                let parsed = parse(raw.trim());
                if parsed.is_none() {
                    log::warn!("ignoring invalid stored {key}={raw:?}");
                }
                parsed
            }
            Ok(None) => None,
            Err(err) => {
                log::warn!("{key} unreadable: {err}");
                None
            }
        }
    }
}
