use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;

use crate::events::{EditingPayload, EventSink, NullSink, StatePayload};
use crate::models::{
    Filter, Notification, NotificationId, NotificationKind, Priority, Settings, SortKey, Task,
    TaskId, Theme, Timestamp,
};
use crate::projection::{project, Counts};
use crate::scheduler::{Scheduler, Timers};
use crate::storage::Storage;
use crate::tasks::TaskList;
use crate::transfer::{export_json, parse_import, ImportError};

pub fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis()
}

fn undo_open(list: &TaskList) -> bool {
    list.pending_undo()
        .is_some_and(|entry| entry.expires_at > now_millis())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThemeState {
    /// Explicit user choice; once set, OS changes are ignored.
    pub pinned: Option<Theme>,
    pub system: Option<Theme>,
}

impl ThemeState {
    pub fn resolved(&self) -> Theme {
        self.pinned.or(self.system).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Draft {
    pub text: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub task_id: TaskId,
    pub draft: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragSession {
    pub task_id: TaskId,
}

#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub filter: Filter,
    pub search: String,
    pub sort_by: SortKey,
    pub theme: ThemeState,
    pub draft: Draft,
    pub editing: Option<EditSession>,
    pub dragging: Option<DragSession>,
}

/// Collaborators supplied by the host when the list is mounted.
pub struct MountOptions {
    pub sink: Arc<dyn EventSink>,
    pub scheduler: Scheduler,
    /// OS color-scheme preference sampled at mount time.
    pub system_theme: Option<Theme>,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            sink: Arc::new(NullSink),
            scheduler: Scheduler::current(),
            system_theme: None,
        }
    }
}

/// The mounted to-do list: task collection, view state and pending timers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Shared>,
}

struct Shared {
    data: Mutex<AppData>,
    storage: Storage,
    settings: Settings,
    sink: Arc<dyn EventSink>,
    scheduler: Scheduler,
}

struct ActiveNotification {
    notification: Notification,
    expires_at: Timestamp,
}

struct AppData {
    list: TaskList,
    view: ViewState,
    notifications: Vec<ActiveNotification>,
    next_notification_id: NotificationId,
    timers: Timers,
}

/// Events collected under the lock and published after it is released.
#[derive(Default)]
struct Outbox {
    changed: bool,
    notifications: Vec<Notification>,
    dismissed: Vec<NotificationId>,
}

impl AppState {
    /// Hydrates the list from the store and writes the normalized state back.
    pub fn mount(storage: Storage, settings: Settings, options: MountOptions) -> Self {
        let loaded = storage.load_tasks(now_millis());
        let filter = storage.load_filter();
        let pinned = storage.load_theme();
        log::info!(
            "mounted task list tasks={} filter={} theme_pinned={} timers={}",
            loaded.tasks.len(),
            filter.as_str(),
            pinned.is_some(),
            options.scheduler.is_enabled()
        );
        if !options.scheduler.is_enabled() {
            log::debug!("no async runtime, deadlines are checked lazily");
        }

        let data = AppData {
            list: TaskList::new(loaded.tasks, loaded.next_id),
            view: ViewState {
                filter,
                theme: ThemeState {
                    pinned,
                    system: options.system_theme,
                },
                ..ViewState::default()
            },
            notifications: Vec::new(),
            next_notification_id: 0,
            timers: Timers::default(),
        };
        let state = Self {
            inner: Arc::new(Shared {
                data: Mutex::new(data),
                storage,
                settings,
                sink: options.sink,
                scheduler: options.scheduler,
            }),
        };
        {
            let guard = state.lock();
            state.persist_tasks(&guard);
            state.persist_filter(guard.view.filter);
        }
        state
    }

    /// Unmount: cancels every pending timer.
    pub fn shutdown(&self) {
        let mut guard = self.lock();
        guard.timers.cancel_all();
        log::info!("task list unmounted");
    }

    fn lock(&self) -> MutexGuard<'_, AppData> {
        self.inner.data.lock().expect("state poisoned")
    }

    fn mutate<R>(&self, apply: impl FnOnce(&mut AppData, &mut Outbox) -> R) -> R {
        let mut outbox = Outbox::default();
        let (result, payload) = {
            let mut guard = self.lock();
            self.prune_notifications(&mut guard, &mut outbox);
            Self::prune_expired_undo(&mut guard, &mut outbox);
            let result = apply(&mut guard, &mut outbox);
            let payload = outbox.changed.then(|| self.snapshot_of(&guard));
            (result, payload)
        };
        for notification in &outbox.notifications {
            self.inner.sink.notification(notification);
        }
        for id in &outbox.dismissed {
            self.inner.sink.notification_dismissed(*id);
        }
        if let Some(payload) = payload {
            self.inner.sink.state_updated(&payload);
        }
        result
    }

    fn persist_tasks(&self, data: &AppData) {
        if let Err(err) = self.inner.storage.save_tasks(data.list.tasks()) {
            log::error!("failed to persist tasks: {err}");
        }
    }

    fn persist_filter(&self, filter: Filter) {
        if let Err(err) = self.inner.storage.save_filter(filter) {
            log::error!("failed to persist filter: {err}");
        }
    }

    fn notify(
        &self,
        data: &mut AppData,
        outbox: &mut Outbox,
        kind: NotificationKind,
        message: impl Into<String>,
    ) {
        let id = data.next_notification_id;
        data.next_notification_id += 1;
        let ttl_ms = self.inner.settings.ttl_for(kind);
        let notification = Notification {
            id,
            message: message.into(),
            kind,
            ttl_ms,
        };

        let weak = Arc::downgrade(&self.inner);
        let timer = self
            .inner
            .scheduler
            .after(Duration::from_millis(ttl_ms), move || {
                if let Some(inner) = weak.upgrade() {
                    AppState { inner }.expire_notification(id);
                }
            });
        data.timers.insert_notification(id, timer);
        data.notifications.push(ActiveNotification {
            notification: notification.clone(),
            expires_at: now_millis().saturating_add(ttl_ms as i64),
        });
        outbox.notifications.push(notification);
        outbox.changed = true;
    }

    /// Lazy expiry for when no timer closed the undo window.
    fn prune_expired_undo(data: &mut AppData, outbox: &mut Outbox) {
        let Some(entry) = data.list.pending_undo() else {
            return;
        };
        if entry.expires_at > now_millis() {
            return;
        }
        let generation = entry.generation;
        data.list.expire_undo(generation);
        data.timers.cancel_undo();
        outbox.changed = true;
    }

    fn prune_notifications(&self, data: &mut AppData, outbox: &mut Outbox) {
        let now = now_millis();
        let mut expired = Vec::new();
        data.notifications.retain(|active| {
            let keep = active.expires_at > now;
            if !keep {
                expired.push(active.notification.id);
            }
            keep
        });
        for id in expired {
            data.timers.cancel_notification(id);
            outbox.dismissed.push(id);
            outbox.changed = true;
        }
    }

    fn remove_notification(data: &mut AppData, outbox: &mut Outbox, id: NotificationId) -> bool {
        let before = data.notifications.len();
        data.notifications
            .retain(|active| active.notification.id != id);
        if data.notifications.len() == before {
            return false;
        }
        outbox.dismissed.push(id);
        outbox.changed = true;
        true
    }

    fn expire_notification(&self, id: NotificationId) {
        self.mutate(|data, outbox| {
            data.timers.finish_notification(id);
            Self::remove_notification(data, outbox, id);
        });
    }

    pub fn dismiss_notification(&self, id: NotificationId) -> bool {
        self.mutate(|data, outbox| {
            data.timers.cancel_notification(id);
            Self::remove_notification(data, outbox, id)
        })
    }

    fn expire_undo(&self, generation: u64) {
        self.mutate(|data, outbox| {
            data.timers.finish_undo(generation);
            if data.list.expire_undo(generation) {
                log::debug!("undo window closed generation={generation}");
                outbox.changed = true;
            }
        });
    }

    fn snapshot_of(&self, data: &AppData) -> StatePayload {
        let view = &data.view;
        StatePayload {
            tasks: project(data.list.tasks(), view.filter, &view.search, view.sort_by),
            counts: Counts::of(data.list.tasks()),
            filter: view.filter,
            search: view.search.clone(),
            sort_by: view.sort_by,
            theme: view.theme.resolved(),
            theme_pinned: view.theme.pinned.is_some(),
            draft_text: view.draft.text.clone(),
            draft_priority: view.draft.priority,
            editing: view.editing.as_ref().map(|session| EditingPayload {
                task_id: session.task_id,
                draft: session.draft.clone(),
            }),
            dragging: view.dragging.map(|session| session.task_id),
            can_reorder: view.filter == Filter::All,
            undo_available: undo_open(&data.list),
            notifications: data
                .notifications
                .iter()
                .map(|active| active.notification.clone())
                .collect(),
        }
    }

    pub fn snapshot(&self) -> StatePayload {
        let guard = self.lock();
        self.snapshot_of(&guard)
    }

    /// The full collection in baseline order.
    pub fn tasks(&self) -> Vec<Task> {
        self.lock().list.tasks().to_vec()
    }

    pub fn visible_tasks(&self) -> Vec<Task> {
        let guard = self.lock();
        let view = &guard.view;
        project(guard.list.tasks(), view.filter, &view.search, view.sort_by)
    }

    pub fn view(&self) -> ViewState {
        self.lock().view.clone()
    }

    pub fn has_pending_undo(&self) -> bool {
        undo_open(&self.lock().list)
    }

    pub fn set_filter(&self, filter: Filter) {
        self.mutate(|data, outbox| {
            data.view.filter = filter;
            if filter != Filter::All {
                data.view.dragging = None;
            }
            self.persist_filter(filter);
            outbox.changed = true;
        });
    }

    pub fn set_search(&self, search: &str) {
        self.mutate(|data, outbox| {
            data.view.search = search.to_string();
            outbox.changed = true;
        });
    }

    pub fn set_sort(&self, sort_by: SortKey) {
        self.mutate(|data, outbox| {
            data.view.sort_by = sort_by;
            outbox.changed = true;
        });
    }

    pub fn theme(&self) -> Theme {
        self.lock().view.theme.resolved()
    }

    /// Pins an explicit theme choice and stops following the OS.
    pub fn set_theme(&self, theme: Theme) {
        self.mutate(|data, outbox| {
            data.view.theme.pinned = Some(theme);
            if let Err(err) = self.inner.storage.save_theme(theme) {
                log::error!("failed to persist theme: {err}");
            }
            outbox.changed = true;
        });
    }

    pub fn toggle_theme(&self) -> Theme {
        let next = self.theme().toggled();
        self.set_theme(next);
        next
    }

    pub fn system_theme_changed(&self, theme: Theme) {
        self.mutate(|data, outbox| {
            let before = data.view.theme.resolved();
            data.view.theme.system = Some(theme);
            outbox.changed = before != data.view.theme.resolved();
        });
    }

    /// Drops the explicit choice so the OS preference applies again.
    pub fn follow_system_theme(&self) {
        self.mutate(|data, outbox| {
            data.view.theme.pinned = None;
            if let Err(err) = self.inner.storage.clear_theme() {
                log::error!("failed to clear theme: {err}");
            }
            outbox.changed = true;
        });
    }

    pub fn set_draft_text(&self, text: &str) {
        self.mutate(|data, outbox| {
            data.view.draft.text = text.to_string();
            outbox.changed = true;
        });
    }

    pub fn set_draft_priority(&self, priority: Priority) {
        self.mutate(|data, outbox| {
            data.view.draft.priority = priority;
            outbox.changed = true;
        });
    }

    /// Adds the draft as a task; the text is cleared, the chosen priority stays.
    pub fn submit_draft(&self) -> Option<Task> {
        self.mutate(|data, outbox| {
            let Draft { text, priority } = data.view.draft.clone();
            let task = self.add_locked(data, outbox, &text, priority)?;
            data.view.draft.text.clear();
            Some(task)
        })
    }

    pub fn add_task(&self, text: &str, priority: Priority) -> Option<Task> {
        self.mutate(|data, outbox| self.add_locked(data, outbox, text, priority))
    }

    fn add_locked(
        &self,
        data: &mut AppData,
        outbox: &mut Outbox,
        text: &str,
        priority: Priority,
    ) -> Option<Task> {
        let task = data.list.add(text, priority, now_millis())?;
        log::debug!("task added id={}", task.id);
        self.persist_tasks(data);
        self.notify(data, outbox, NotificationKind::Success, "Task added.");
        Some(task)
    }

    pub fn toggle_task(&self, id: TaskId) -> Option<Task> {
        self.mutate(|data, outbox| {
            let task = data.list.toggle(id)?;
            self.persist_tasks(data);
            let message = if task.completed {
                "Task marked as completed."
            } else {
                "Task marked as active."
            };
            self.notify(data, outbox, NotificationKind::Success, message);
            Some(task)
        })
    }

    pub fn toggle_all(&self) -> Option<bool> {
        self.mutate(|data, outbox| {
            let completed = data.list.toggle_all()?;
            self.persist_tasks(data);
            let message = if completed {
                "All tasks marked as completed."
            } else {
                "All tasks marked as active."
            };
            self.notify(data, outbox, NotificationKind::Success, message);
            Some(completed)
        })
    }

    /// Returns how many tasks were removed; there is no undo for this.
    pub fn clear_completed(&self) -> usize {
        self.mutate(|data, outbox| {
            let removed = data.list.clear_completed();
            if removed == 0 {
                return 0;
            }
            Self::drop_stale_sessions(data);
            self.persist_tasks(data);
            let plural = if removed == 1 { "" } else { "s" };
            self.notify(
                data,
                outbox,
                NotificationKind::Success,
                format!("Cleared {removed} completed task{plural}."),
            );
            removed
        })
    }

    fn drop_stale_sessions(data: &mut AppData) {
        let list = &data.list;
        let view = &mut data.view;
        if view
            .editing
            .as_ref()
            .is_some_and(|session| list.get(session.task_id).is_none())
        {
            view.editing = None;
        }
        if view
            .dragging
            .is_some_and(|session| list.get(session.task_id).is_none())
        {
            view.dragging = None;
        }
    }

    /// Opens the single edit slot on `id`, replacing any other session.
    pub fn start_edit(&self, id: TaskId) -> bool {
        self.mutate(|data, outbox| {
            let Some(task) = data.list.get(id) else {
                return false;
            };
            data.view.editing = Some(EditSession {
                task_id: id,
                draft: task.text.clone(),
            });
            outbox.changed = true;
            true
        })
    }

    pub fn update_edit_draft(&self, text: &str) {
        self.mutate(|data, outbox| {
            if let Some(session) = data.view.editing.as_mut() {
                session.draft = text.to_string();
                outbox.changed = true;
            }
        });
    }

    pub fn cancel_edit(&self) {
        self.mutate(|data, outbox| {
            outbox.changed = data.view.editing.take().is_some();
        });
    }

    /// Commits the draft; a blank draft behaves like cancel.
    pub fn save_edit(&self) -> Option<Task> {
        self.mutate(|data, outbox| {
            let session = data.view.editing.take()?;
            outbox.changed = true;
            let unchanged = data
                .list
                .get(session.task_id)
                .is_some_and(|task| task.text == session.draft.trim());
            if unchanged {
                return None;
            }
            let task = data.list.update_text(session.task_id, &session.draft)?;
            self.persist_tasks(data);
            self.notify(data, outbox, NotificationKind::Success, "Task updated.");
            Some(task)
        })
    }

    /// Removes the task into the undo slot and restarts the expiry timer.
    pub fn delete_task(&self, id: TaskId) -> Option<Task> {
        self.mutate(|data, outbox| {
            let window = self.inner.settings.undo_window_ms;
            let expires_at = now_millis().saturating_add(window as i64);
            let entry = data.list.delete(id, expires_at)?;
            let (task, generation) = (entry.task.clone(), entry.generation);
            log::debug!("task deleted id={id} generation={generation}");

            if data.view.editing.as_ref().is_some_and(|s| s.task_id == id) {
                data.view.editing = None;
            }
            if data.view.dragging.is_some_and(|s| s.task_id == id) {
                data.view.dragging = None;
            }
            self.persist_tasks(data);

            // The previous timer is cancelled inside `replace_undo` before the new one is stored.
            let weak = Arc::downgrade(&self.inner);
            let timer = self
                .inner
                .scheduler
                .after(Duration::from_millis(window), move || {
                    if let Some(inner) = weak.upgrade() {
                        AppState { inner }.expire_undo(generation);
                    }
                });
            data.timers.replace_undo(generation, timer);

            self.notify(data, outbox, NotificationKind::Warning, "Task deleted.");
            Some(task)
        })
    }

    pub fn undo_delete(&self) -> Option<Task> {
        self.mutate(|data, outbox| {
            if data.list.pending_undo().is_none() {
                return None;
            }
            data.timers.cancel_undo();
            outbox.changed = true;
            let task = data.list.undo_delete(now_millis())?;
            log::debug!("task restored id={}", task.id);
            self.persist_tasks(data);
            self.notify(data, outbox, NotificationKind::Info, "Task restored.");
            Some(task)
        })
    }

    /// Moves `dragged` onto `target`'s position; only allowed while showing all tasks.
    pub fn reorder(&self, dragged: TaskId, target: TaskId) -> bool {
        self.mutate(|data, outbox| self.reorder_locked(data, outbox, dragged, target))
    }

    fn reorder_locked(
        &self,
        data: &mut AppData,
        outbox: &mut Outbox,
        dragged: TaskId,
        target: TaskId,
    ) -> bool {
        if data.view.filter != Filter::All {
            return false;
        }
        if !data.list.move_task(dragged, target) {
            return false;
        }
        self.persist_tasks(data);
        outbox.changed = true;
        true
    }

    pub fn start_drag(&self, id: TaskId) -> bool {
        self.mutate(|data, outbox| {
            if data.view.filter != Filter::All || data.list.get(id).is_none() {
                return false;
            }
            data.view.dragging = Some(DragSession { task_id: id });
            outbox.changed = true;
            true
        })
    }

    /// Ends the drag session by dropping onto `target`.
    pub fn drop_on(&self, target: TaskId) -> bool {
        self.mutate(|data, outbox| {
            let Some(session) = data.view.dragging.take() else {
                return false;
            };
            outbox.changed = true;
            self.reorder_locked(data, outbox, session.task_id, target)
        })
    }

    pub fn end_drag(&self) {
        self.mutate(|data, outbox| {
            outbox.changed = data.view.dragging.take().is_some();
        });
    }

    /// Replaces the whole collection with a validated import document.
    pub fn import_json(&self, raw: &str) -> Result<usize, ImportError> {
        self.mutate(|data, outbox| {
            let imported = match parse_import(raw, data.list.next_id(), now_millis()) {
                Ok(imported) => imported,
                Err(err) => {
                    log::warn!("import rejected: {err}");
                    self.notify(
                        data,
                        outbox,
                        NotificationKind::Warning,
                        "Import failed: not a valid task list.",
                    );
                    return Err(err);
                }
            };
            let count = imported.tasks.len();
            log::info!(
                "imported tasks count={count} skipped={} next_id={}",
                imported.skipped,
                imported.next_id
            );
            data.timers.cancel_undo();
            data.list.replace_all(imported.tasks, imported.next_id);
            data.view.editing = None;
            data.view.dragging = None;
            self.persist_tasks(data);
            let plural = if count == 1 { "" } else { "s" };
            self.notify(
                data,
                outbox,
                NotificationKind::Success,
                format!("Imported {count} task{plural}."),
            );
            Ok(count)
        })
    }

    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        export_json(self.lock().list.tasks())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, MemoryStore, StorageError};
    use crate::storage::{FILTER_KEY, TASKS_KEY, THEME_KEY};

    #[derive(Default)]
    struct RecordingSink {
        states: Mutex<Vec<StatePayload>>,
        notifications: Mutex<Vec<Notification>>,
        dismissed: Mutex<Vec<NotificationId>>,
    }

    impl EventSink for RecordingSink {
        fn state_updated(&self, payload: &StatePayload) {
            self.states.lock().unwrap().push(payload.clone());
        }

        fn notification(&self, notification: &Notification) {
            self.notifications.lock().unwrap().push(notification.clone());
        }

        fn notification_dismissed(&self, id: NotificationId) {
            self.dismissed.lock().unwrap().push(id);
        }
    }

    impl RecordingSink {
        fn kinds(&self) -> Vec<NotificationKind> {
            self.notifications
                .lock()
                .unwrap()
                .iter()
                .map(|n| n.kind)
                .collect()
        }

        fn last_message(&self) -> Option<String> {
            self.notifications
                .lock()
                .unwrap()
                .last()
                .map(|n| n.message.clone())
        }
    }

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Io(std::io::Error::other("offline")))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("offline")))
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("offline")))
        }
    }

    struct Fixture {
        state: AppState,
        store: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
    }

    fn mount_with(store: Arc<MemoryStore>, scheduler: Scheduler, system: Option<Theme>) -> Fixture {
        let sink = Arc::new(RecordingSink::default());
        let state = AppState::mount(
            Storage::new(store.clone()),
            Settings::default(),
            MountOptions {
                sink: sink.clone(),
                scheduler,
                system_theme: system,
            },
        );
        Fixture { state, store, sink }
    }

    fn fixture() -> Fixture {
        mount_with(Arc::new(MemoryStore::new()), Scheduler::disabled(), None)
    }

    fn texts(tasks: &[Task]) -> Vec<String> {
        tasks.iter().map(|t| t.text.clone()).collect()
    }

    #[test]
    fn end_to_end_filtering_after_add_and_toggle() {
        let f = fixture();
        let first = f.state.add_task("Write report", Priority::High).unwrap();
        f.state.add_task("Buy milk", Priority::Low).unwrap();
        f.state.toggle_task(first.id).unwrap();

        f.state.set_filter(Filter::Active);
        assert_eq!(texts(&f.state.visible_tasks()), vec!["Buy milk"]);
        f.state.set_filter(Filter::Completed);
        assert_eq!(texts(&f.state.visible_tasks()), vec!["Write report"]);

        let snapshot = f.state.snapshot();
        assert_eq!(snapshot.counts.active, 1);
        assert_eq!(snapshot.counts.completed, 1);
        assert!(!snapshot.can_reorder);
    }

    #[test]
    fn mutations_write_through_to_the_store() {
        let f = fixture();
        f.state.add_task("Persist me", Priority::Medium).unwrap();
        let raw = f.store.get(TASKS_KEY).unwrap().unwrap();
        assert!(raw.contains("Persist me"));

        f.state.set_filter(Filter::Active);
        assert_eq!(f.store.get(FILTER_KEY).unwrap().as_deref(), Some("active"));

        // A fresh mount on the same store sees the same state.
        let again = mount_with(f.store.clone(), Scheduler::disabled(), None);
        assert_eq!(texts(&again.state.tasks()), vec!["Persist me"]);
        assert_eq!(again.state.view().filter, Filter::Active);
        let next = again.state.add_task("Next", Priority::Medium).unwrap();
        assert_eq!(next.id, 1);
    }

    #[test]
    fn blank_add_is_a_silent_noop() {
        let f = fixture();
        assert!(f.state.add_task("   ", Priority::High).is_none());
        assert!(f.state.tasks().is_empty());
        assert!(f.sink.notifications.lock().unwrap().is_empty());
        assert!(f.sink.states.lock().unwrap().is_empty());
    }

    #[test]
    fn submit_draft_clears_text_and_keeps_priority() {
        let f = fixture();
        f.state.set_draft_text("  Call Bob ");
        f.state.set_draft_priority(Priority::High);
        let task = f.state.submit_draft().unwrap();
        assert_eq!(task.text, "Call Bob");
        assert_eq!(task.priority, Priority::High);
        let view = f.state.view();
        assert!(view.draft.text.is_empty());
        assert_eq!(view.draft.priority, Priority::High);

        f.state.set_draft_text("  ");
        assert!(f.state.submit_draft().is_none());
        assert_eq!(f.state.view().draft.text, "  ");
    }

    #[test]
    fn toggle_notifies_with_new_state() {
        let f = fixture();
        let task = f.state.add_task("a", Priority::Medium).unwrap();
        f.state.toggle_task(task.id);
        assert_eq!(f.sink.last_message().as_deref(), Some("Task marked as completed."));
        f.state.toggle_task(task.id);
        assert_eq!(f.sink.last_message().as_deref(), Some("Task marked as active."));
        assert!(f.state.toggle_task(99).is_none());
        assert_eq!(f.sink.notifications.lock().unwrap().len(), 3);
    }

    #[test]
    fn delete_then_undo_restores_collection_and_notifies() {
        let f = fixture();
        for text in ["a", "b", "c"] {
            f.state.add_task(text, Priority::Medium);
        }
        let before = f.state.tasks();
        f.state.delete_task(before[1].id).unwrap();
        assert_eq!(texts(&f.state.tasks()), vec!["a", "c"]);
        assert!(f.state.snapshot().undo_available);
        assert_eq!(f.sink.last_message().as_deref(), Some("Task deleted."));

        let restored = f.state.undo_delete().unwrap();
        assert_eq!(restored.text, "b");
        assert_eq!(f.state.tasks(), before);
        assert!(!f.state.has_pending_undo());
        assert_eq!(
            f.sink.kinds()[3..],
            [NotificationKind::Warning, NotificationKind::Info]
        );
        assert!(f.state.undo_delete().is_none());
    }

    #[test]
    fn closed_undo_window_is_not_advertised_without_timers() {
        let sink = Arc::new(RecordingSink::default());
        let state = AppState::mount(
            Storage::new(Arc::new(MemoryStore::new())),
            Settings {
                undo_window_ms: 0,
                ..Settings::default()
            },
            MountOptions {
                sink: sink.clone(),
                scheduler: Scheduler::disabled(),
                system_theme: None,
            },
        );
        let task = state.add_task("gone", Priority::Medium).unwrap();
        state.delete_task(task.id).unwrap();

        let last = sink.states.lock().unwrap().last().cloned().unwrap();
        assert!(!last.undo_available);
        assert!(!state.snapshot().undo_available);
        assert!(!state.has_pending_undo());
        assert!(state.undo_delete().is_none());
        assert!(state.tasks().is_empty());
    }

    #[test]
    fn imported_top_of_range_id_never_collides_with_new_tasks() {
        let f = fixture();
        f.state
            .import_json(r#"[{"id":9223372036854775807,"text":"big"}]"#)
            .unwrap();
        let added = f.state.add_task("next", Priority::Medium).unwrap();
        let ids: Vec<_> = f.state.tasks().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(added.id, 1);
    }

    #[test]
    fn second_delete_owns_the_undo_slot() {
        let f = fixture();
        let a = f.state.add_task("a", Priority::Medium).unwrap();
        let b = f.state.add_task("b", Priority::Medium).unwrap();
        f.state.delete_task(a.id);
        f.state.delete_task(b.id);
        assert_eq!(f.state.undo_delete().unwrap().id, b.id);
        assert_eq!(texts(&f.state.tasks()), vec!["b"]);
    }

    #[test]
    fn edit_session_saves_cancels_and_ignores_blank_drafts() {
        let f = fixture();
        let task = f.state.add_task("Draft", Priority::Low).unwrap();
        assert!(!f.state.start_edit(42));

        assert!(f.state.start_edit(task.id));
        assert_eq!(f.state.view().editing.unwrap().draft, "Draft");
        f.state.update_edit_draft("Final");
        let saved = f.state.save_edit().unwrap();
        assert_eq!(saved.text, "Final");
        assert_eq!(saved.priority, Priority::Low);
        assert!(f.state.view().editing.is_none());

        f.state.start_edit(task.id);
        f.state.update_edit_draft("   ");
        assert!(f.state.save_edit().is_none());
        assert!(f.state.view().editing.is_none());
        assert_eq!(f.state.tasks()[0].text, "Final");

        f.state.start_edit(task.id);
        f.state.update_edit_draft("Discarded");
        f.state.cancel_edit();
        assert_eq!(f.state.tasks()[0].text, "Final");
        assert!(f.state.save_edit().is_none());
    }

    #[test]
    fn deleting_the_edited_task_ends_the_session() {
        let f = fixture();
        let a = f.state.add_task("a", Priority::Medium).unwrap();
        let b = f.state.add_task("b", Priority::Medium).unwrap();
        f.state.start_edit(a.id);
        f.state.delete_task(b.id);
        assert!(f.state.view().editing.is_some());
        f.state.delete_task(a.id);
        assert!(f.state.view().editing.is_none());
    }

    #[test]
    fn clear_completed_and_toggle_all() {
        let f = fixture();
        assert_eq!(f.state.clear_completed(), 0);
        assert!(f.state.toggle_all().is_none());

        for text in ["a", "b", "c"] {
            f.state.add_task(text, Priority::Medium);
        }
        assert_eq!(f.state.toggle_all(), Some(true));
        assert_eq!(f.state.toggle_all(), Some(false));
        f.state.toggle_task(0);
        f.state.toggle_task(2);
        assert_eq!(f.state.clear_completed(), 2);
        assert_eq!(f.sink.last_message().as_deref(), Some("Cleared 2 completed tasks."));
        assert_eq!(texts(&f.state.tasks()), vec!["b"]);
        assert_eq!(f.state.clear_completed(), 0);
    }

    #[test]
    fn reorder_is_only_allowed_with_all_filter() {
        let f = fixture();
        for text in ["a", "b", "c"] {
            f.state.add_task(text, Priority::Medium);
        }
        f.state.set_filter(Filter::Active);
        assert!(!f.state.reorder(0, 2));
        assert!(!f.state.start_drag(0));
        assert_eq!(texts(&f.state.tasks()), vec!["a", "b", "c"]);

        f.state.set_filter(Filter::All);
        assert!(f.state.reorder(0, 2));
        assert_eq!(texts(&f.state.tasks()), vec!["b", "c", "a"]);
        assert!(!f.state.reorder(1, 1));
        assert!(!f.state.reorder(1, 99));
    }

    #[test]
    fn drag_session_reorders_on_drop() {
        let f = fixture();
        for text in ["a", "b", "c"] {
            f.state.add_task(text, Priority::Medium);
        }
        assert!(!f.state.drop_on(0));
        assert!(f.state.start_drag(2));
        assert_eq!(f.state.snapshot().dragging, Some(2));
        assert!(f.state.drop_on(0));
        assert_eq!(texts(&f.state.tasks()), vec!["c", "a", "b"]);
        assert!(f.state.view().dragging.is_none());

        f.state.start_drag(1);
        f.state.set_filter(Filter::Completed);
        assert!(f.state.view().dragging.is_none());
        f.state.set_filter(Filter::All);
        f.state.start_drag(1);
        f.state.end_drag();
        assert!(f.state.view().dragging.is_none());
    }

    #[test]
    fn search_and_sort_shape_the_visible_list_only() {
        let f = fixture();
        f.state.add_task("banana", Priority::Low);
        f.state.add_task("Apple pie", Priority::High);
        f.state.add_task("cherry", Priority::Medium);
        f.state.set_sort(SortKey::AlphaAsc);
        assert_eq!(
            texts(&f.state.visible_tasks()),
            vec!["Apple pie", "banana", "cherry"]
        );
        f.state.set_sort(SortKey::Priority);
        f.state.set_search("A");
        assert_eq!(texts(&f.state.visible_tasks()), vec!["Apple pie", "banana"]);
        assert_eq!(texts(&f.state.tasks()), vec!["banana", "Apple pie", "cherry"]);
    }

    #[test]
    fn theme_follows_system_until_pinned() {
        let f = mount_with(
            Arc::new(MemoryStore::new()),
            Scheduler::disabled(),
            Some(Theme::Dark),
        );
        assert_eq!(f.state.theme(), Theme::Dark);
        f.state.system_theme_changed(Theme::Light);
        assert_eq!(f.state.theme(), Theme::Light);
        assert!(f.store.get(THEME_KEY).unwrap().is_none());

        assert_eq!(f.state.toggle_theme(), Theme::Dark);
        assert_eq!(f.store.get(THEME_KEY).unwrap().as_deref(), Some("dark"));
        f.state.system_theme_changed(Theme::Light);
        assert_eq!(f.state.theme(), Theme::Dark);

        f.state.follow_system_theme();
        assert_eq!(f.state.theme(), Theme::Light);
        assert!(f.store.get(THEME_KEY).unwrap().is_none());
    }

    #[test]
    fn stored_theme_wins_over_system_and_defaults_to_light() {
        let store = Arc::new(MemoryStore::new());
        store.set(THEME_KEY, "dark").unwrap();
        let f = mount_with(store, Scheduler::disabled(), Some(Theme::Light));
        assert_eq!(f.state.theme(), Theme::Dark);
        assert!(f.state.snapshot().theme_pinned);

        assert_eq!(fixture().state.theme(), Theme::Light);
    }

    #[test]
    fn import_replaces_collection_and_resets_sessions() {
        let f = fixture();
        let a = f.state.add_task("a", Priority::Medium).unwrap();
        let b = f.state.add_task("b", Priority::Medium).unwrap();
        f.state.delete_task(a.id);
        f.state.start_edit(b.id);

        let count = f.state.import_json(r#"[{"text":"x"},{"text":"y","id":0}]"#).unwrap();
        assert_eq!(count, 2);
        let tasks = f.state.tasks();
        assert_eq!(texts(&tasks), vec!["x", "y"]);
        assert_eq!(tasks[0].id, 2);
        assert_eq!(tasks[1].id, 0);
        assert!(!tasks[0].completed);
        assert_eq!(tasks[0].priority, Priority::Medium);
        assert!((now_millis() - tasks[0].created_at).abs() < 60_000);
        assert!(!f.state.has_pending_undo());
        assert!(f.state.view().editing.is_none());
        assert_eq!(f.sink.last_message().as_deref(), Some("Imported 2 tasks."));

        let next = f.state.add_task("z", Priority::Medium).unwrap();
        assert_eq!(next.id, 3);
    }

    #[test]
    fn rejected_import_leaves_collection_and_warns() {
        let f = fixture();
        f.state.add_task("keep", Priority::Medium);
        let before = f.state.tasks();
        assert!(matches!(
            f.state.import_json(r#"{"a":1}"#),
            Err(ImportError::NotAnArray)
        ));
        assert!(f.state.import_json("not json").is_err());
        assert_eq!(f.state.tasks(), before);
        assert_eq!(f.sink.kinds().last(), Some(&NotificationKind::Warning));
    }

    #[test]
    fn export_emits_full_canonical_records() {
        let f = fixture();
        f.state.add_task("Ship it", Priority::High);
        let json = f.state.export_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let record = &value[0];
        assert_eq!(record["id"], 0);
        assert_eq!(record["text"], "Ship it");
        assert_eq!(record["completed"], false);
        assert_eq!(record["priority"], "high");
        assert!(record["createdAt"].is_i64());
    }

    #[test]
    fn store_failures_do_not_affect_the_session() {
        let sink = Arc::new(RecordingSink::default());
        let state = AppState::mount(
            Storage::new(Arc::new(FailingStore)),
            Settings::default(),
            MountOptions {
                sink: sink.clone(),
                scheduler: Scheduler::disabled(),
                system_theme: None,
            },
        );
        assert!(state.tasks().is_empty());
        let task = state.add_task("still works", Priority::Medium).unwrap();
        state.set_theme(Theme::Dark);
        assert_eq!(state.tasks(), vec![task]);
        assert_eq!(state.theme(), Theme::Dark);
    }

    #[test]
    fn mount_normalizes_and_rewrites_legacy_state() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(TASKS_KEY, r#"[{"text":"legacy","completed":true},"plain"]"#)
            .unwrap();
        store.set(FILTER_KEY, "bogus").unwrap();
        let f = mount_with(store, Scheduler::disabled(), None);
        let tasks = f.state.tasks();
        assert_eq!(texts(&tasks), vec!["legacy", "plain"]);
        assert_eq!(tasks[1].id, 1);
        let raw = f.store.get(TASKS_KEY).unwrap().unwrap();
        assert!(raw.contains("\"priority\":\"medium\""));
        assert_eq!(f.store.get(FILTER_KEY).unwrap().as_deref(), Some("all"));
    }

    #[test]
    fn notifications_can_be_dismissed_explicitly() {
        let f = fixture();
        f.state.add_task("a", Priority::Medium);
        let id = f.state.snapshot().notifications[0].id;
        assert!(f.state.dismiss_notification(id));
        assert!(!f.state.dismiss_notification(id));
        assert!(f.state.snapshot().notifications.is_empty());
        assert_eq!(*f.sink.dismissed.lock().unwrap(), vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn undo_buffer_expires_after_the_window() {
        let f = mount_with(Arc::new(MemoryStore::new()), Scheduler::current(), None);
        let task = f.state.add_task("a", Priority::Medium).unwrap();
        f.state.delete_task(task.id);

        tokio::time::sleep(Duration::from_millis(4_999)).await;
        assert!(f.state.has_pending_undo());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(!f.state.has_pending_undo());
        assert!(f.state.undo_delete().is_none());
        assert!(f.state.tasks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn new_delete_restarts_the_undo_window() {
        let f = mount_with(Arc::new(MemoryStore::new()), Scheduler::current(), None);
        let a = f.state.add_task("a", Priority::Medium).unwrap();
        let b = f.state.add_task("b", Priority::Medium).unwrap();
        f.state.delete_task(a.id);
        tokio::time::sleep(Duration::from_millis(3_000)).await;
        f.state.delete_task(b.id);

        // The first timer would have fired here had it not been cancelled.
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(f.state.has_pending_undo());
        assert_eq!(f.state.undo_delete().unwrap().id, b.id);
    }

    #[tokio::test(start_paused = true)]
    async fn notifications_auto_dismiss_after_their_ttl() {
        let f = mount_with(Arc::new(MemoryStore::new()), Scheduler::current(), None);
        let task = f.state.add_task("a", Priority::Medium).unwrap();
        f.state.delete_task(task.id);
        assert_eq!(f.state.snapshot().notifications.len(), 2);

        tokio::time::sleep(Duration::from_millis(3_001)).await;
        let remaining = f.state.snapshot().notifications;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].kind, NotificationKind::Warning);

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert!(f.state.snapshot().notifications.is_empty());
        assert_eq!(f.sink.dismissed.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_timers() {
        let f = mount_with(Arc::new(MemoryStore::new()), Scheduler::current(), None);
        let task = f.state.add_task("a", Priority::Medium).unwrap();
        f.state.delete_task(task.id);
        f.state.shutdown();

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        assert!(f.state.has_pending_undo());
        assert_eq!(f.state.snapshot().notifications.len(), 2);
        assert!(f.sink.dismissed.lock().unwrap().is_empty());
    }
}
