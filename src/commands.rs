use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::events::StatePayload;
use crate::models::{Filter, NotificationId, Priority, SortKey, Task, TaskId, Theme};
use crate::state::AppState;
use crate::store::{write_atomic, StorageError};
use crate::transfer::export_file_name;

#[cfg(all(feature = "app", not(test)))]
use crate::events::{
    EventSink, EVENT_NOTIFICATION, EVENT_NOTIFICATION_DISMISSED, EVENT_STATE_UPDATED,
};
#[cfg(all(feature = "app", not(test)))]
use crate::models::Notification;
#[cfg(all(feature = "app", not(test)))]
use tauri::{AppHandle, Emitter, Manager, Runtime, State};

pub const EXPORTS_DIR: &str = "exports";

#[derive(Debug, serde::Serialize)]
pub struct CommandResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

trait CommandCtx {
    fn app_data_dir(&self) -> Result<PathBuf, StorageError>;
}

fn ok<T>(data: T) -> CommandResult<T> {
    CommandResult {
        ok: true,
        data: Some(data),
        error: None,
    }
}

fn err<T>(message: &str) -> CommandResult<T> {
    CommandResult {
        ok: false,
        data: None,
        error: Some(message.to_string()),
    }
}

#[cfg(all(feature = "app", not(test)))]
struct TauriCommandCtx<'a, R: Runtime> {
    app: &'a AppHandle<R>,
}

#[cfg(all(feature = "app", not(test)))]
impl<R: Runtime> CommandCtx for TauriCommandCtx<'_, R> {
    fn app_data_dir(&self) -> Result<PathBuf, StorageError> {
        self.app
            .path()
            .app_data_dir()
            .map_err(|err| StorageError::Io(std::io::Error::other(err.to_string())))
    }
}

/// Forwards engine events to every webview.
#[cfg(all(feature = "app", not(test)))]
pub struct TauriEventSink<R: Runtime> {
    app: AppHandle<R>,
}

#[cfg(all(feature = "app", not(test)))]
impl<R: Runtime> TauriEventSink<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

#[cfg(all(feature = "app", not(test)))]
impl<R: Runtime> EventSink for TauriEventSink<R> {
    fn state_updated(&self, payload: &StatePayload) {
        if let Err(err) = self.app.emit(EVENT_STATE_UPDATED, payload) {
            log::warn!("failed to emit {EVENT_STATE_UPDATED}: {err}");
        }
    }

    fn notification(&self, notification: &Notification) {
        if let Err(err) = self.app.emit(EVENT_NOTIFICATION, notification) {
            log::warn!("failed to emit {EVENT_NOTIFICATION}: {err}");
        }
    }

    fn notification_dismissed(&self, id: NotificationId) {
        if let Err(err) = self.app.emit(EVENT_NOTIFICATION_DISMISSED, id) {
            log::warn!("failed to emit {EVENT_NOTIFICATION_DISMISSED}: {err}");
        }
    }
}

fn parse_priority(value: Option<&str>) -> Result<Priority, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(Priority::default()),
        Some(value) => Priority::parse(value).ok_or_else(|| format!("invalid priority: {value}")),
    }
}

fn load_state_impl(state: &AppState) -> CommandResult<StatePayload> {
    ok(state.snapshot())
}

fn set_filter_impl(state: &AppState, filter: &str) -> CommandResult<Filter> {
    match Filter::parse(filter.trim()) {
        Some(filter) => {
            state.set_filter(filter);
            ok(filter)
        }
        None => err(&format!("invalid filter: {filter}")),
    }
}

fn set_sort_impl(state: &AppState, sort_by: &str) -> CommandResult<SortKey> {
    let sort_by = SortKey::parse_lossy(sort_by.trim());
    state.set_sort(sort_by);
    ok(sort_by)
}

fn set_theme_impl(state: &AppState, theme: &str) -> CommandResult<Theme> {
    match Theme::parse(theme.trim()) {
        Some(theme) => {
            state.set_theme(theme);
            ok(theme)
        }
        None => err(&format!("invalid theme: {theme}")),
    }
}

fn set_draft_priority_impl(state: &AppState, priority: &str) -> CommandResult<Priority> {
    match parse_priority(Some(priority)) {
        Ok(priority) => {
            state.set_draft_priority(priority);
            ok(priority)
        }
        Err(message) => err(&message),
    }
}

fn add_task_impl(state: &AppState, text: &str, priority: Option<&str>) -> CommandResult<Task> {
    let priority = match parse_priority(priority) {
        Ok(priority) => priority,
        Err(message) => return err(&message),
    };
    match state.add_task(text, priority) {
        Some(task) => ok(task),
        None => err("task text is empty"),
    }
}

fn submit_draft_impl(state: &AppState) -> CommandResult<Task> {
    match state.submit_draft() {
        Some(task) => ok(task),
        None => err("task text is empty"),
    }
}

fn toggle_task_impl(state: &AppState, task_id: TaskId) -> CommandResult<Task> {
    match state.toggle_task(task_id) {
        Some(task) => ok(task),
        None => err("task not found"),
    }
}

fn toggle_all_impl(state: &AppState) -> CommandResult<bool> {
    match state.toggle_all() {
        Some(completed) => ok(completed),
        None => err("no tasks"),
    }
}

fn start_edit_impl(state: &AppState, task_id: TaskId) -> CommandResult<bool> {
    if state.start_edit(task_id) {
        ok(true)
    } else {
        err("task not found")
    }
}

fn delete_task_impl(state: &AppState, task_id: TaskId) -> CommandResult<Task> {
    match state.delete_task(task_id) {
        Some(task) => ok(task),
        None => err("task not found"),
    }
}

fn undo_delete_impl(state: &AppState) -> CommandResult<Task> {
    match state.undo_delete() {
        Some(task) => ok(task),
        None => err("nothing to undo"),
    }
}

fn reorder_impl(state: &AppState, dragged_id: TaskId, target_id: TaskId) -> CommandResult<bool> {
    if state.view().filter != Filter::All {
        return err("reordering is only available while showing all tasks");
    }
    ok(state.reorder(dragged_id, target_id))
}

fn start_drag_impl(state: &AppState, task_id: TaskId) -> CommandResult<bool> {
    if state.view().filter != Filter::All {
        return err("reordering is only available while showing all tasks");
    }
    if state.start_drag(task_id) {
        ok(true)
    } else {
        err("task not found")
    }
}

fn import_tasks_impl(state: &AppState, json: &str) -> CommandResult<usize> {
    match state.import_json(json) {
        Ok(count) => ok(count),
        Err(error) => err(&format!("invalid import: {error}")),
    }
}

async fn import_tasks_from_path_impl(state: &AppState, path: &Path) -> CommandResult<usize> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(error) => {
            log::warn!("import read failed path={} err={error}", path.display());
            return err(&format!("read error: {error}"));
        }
    };
    log::info!("importing tasks from path={}", path.display());
    import_tasks_impl(state, &raw)
}

fn export_tasks_impl(state: &AppState) -> CommandResult<String> {
    match state.export_json() {
        Ok(json) => ok(json),
        Err(error) => err(&format!("export error: {error}")),
    }
}

/// Writes the export next to the app data unless the caller picked a directory.
fn export_tasks_to_dir_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    dir: Option<PathBuf>,
) -> CommandResult<String> {
    let dir = match dir {
        Some(dir) => dir,
        None => match ctx.app_data_dir() {
            Ok(root) => root.join(EXPORTS_DIR),
            Err(error) => return err(&format!("storage error: {error}")),
        },
    };
    let json = match state.export_json() {
        Ok(json) => json,
        Err(error) => return err(&format!("export error: {error}")),
    };
    if let Err(error) = std::fs::create_dir_all(&dir) {
        return err(&format!("storage error: {error}"));
    }
    let path = dir.join(export_file_name(Utc::now().timestamp_millis()));
    if let Err(error) = write_atomic(&path, json.as_bytes()) {
        log::error!("export failed path={} err={error}", path.display());
        return err(&format!("storage error: {error}"));
    }
    log::info!("exported tasks path={}", path.display());
    ok(path.to_string_lossy().into_owned())
}

fn dismiss_notification_impl(state: &AppState, id: NotificationId) -> CommandResult<bool> {
    ok(state.dismiss_notification(id))
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn load_state(state: State<AppState>) -> CommandResult<StatePayload> {
    load_state_impl(state.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn set_filter(state: State<AppState>, filter: String) -> CommandResult<Filter> {
    set_filter_impl(state.inner(), &filter)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn set_search(state: State<AppState>, search: String) -> CommandResult<bool> {
    state.set_search(&search);
    ok(true)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn set_sort(state: State<AppState>, sort_by: String) -> CommandResult<SortKey> {
    set_sort_impl(state.inner(), &sort_by)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn set_theme(state: State<AppState>, theme: String) -> CommandResult<Theme> {
    set_theme_impl(state.inner(), &theme)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn toggle_theme(state: State<AppState>) -> CommandResult<Theme> {
    ok(state.toggle_theme())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn follow_system_theme(state: State<AppState>) -> CommandResult<Theme> {
    state.follow_system_theme();
    ok(state.theme())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn set_draft_text(state: State<AppState>, text: String) -> CommandResult<bool> {
    state.set_draft_text(&text);
    ok(true)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn set_draft_priority(state: State<AppState>, priority: String) -> CommandResult<Priority> {
    set_draft_priority_impl(state.inner(), &priority)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn submit_draft(state: State<AppState>) -> CommandResult<Task> {
    submit_draft_impl(state.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn add_task(
    state: State<AppState>,
    text: String,
    priority: Option<String>,
) -> CommandResult<Task> {
    add_task_impl(state.inner(), &text, priority.as_deref())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn toggle_task(state: State<AppState>, task_id: TaskId) -> CommandResult<Task> {
    toggle_task_impl(state.inner(), task_id)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn toggle_all(state: State<AppState>) -> CommandResult<bool> {
    toggle_all_impl(state.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn clear_completed(state: State<AppState>) -> CommandResult<usize> {
    ok(state.clear_completed())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn start_edit(state: State<AppState>, task_id: TaskId) -> CommandResult<bool> {
    start_edit_impl(state.inner(), task_id)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn update_edit_draft(state: State<AppState>, text: String) -> CommandResult<bool> {
    state.update_edit_draft(&text);
    ok(true)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn cancel_edit(state: State<AppState>) -> CommandResult<bool> {
    state.cancel_edit();
    ok(true)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn save_edit(state: State<AppState>) -> CommandResult<Option<Task>> {
    ok(state.save_edit())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn delete_task(state: State<AppState>, task_id: TaskId) -> CommandResult<Task> {
    delete_task_impl(state.inner(), task_id)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn undo_delete(state: State<AppState>) -> CommandResult<Task> {
    undo_delete_impl(state.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn reorder_task(
    state: State<AppState>,
    dragged_id: TaskId,
    target_id: TaskId,
) -> CommandResult<bool> {
    reorder_impl(state.inner(), dragged_id, target_id)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn start_drag(state: State<AppState>, task_id: TaskId) -> CommandResult<bool> {
    start_drag_impl(state.inner(), task_id)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn drop_on(state: State<AppState>, target_id: TaskId) -> CommandResult<bool> {
    ok(state.drop_on(target_id))
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn end_drag(state: State<AppState>) -> CommandResult<bool> {
    state.end_drag();
    ok(true)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn import_tasks(state: State<AppState>, json: String) -> CommandResult<usize> {
    import_tasks_impl(state.inner(), &json)
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub async fn import_tasks_from_path(app: AppHandle, path: String) -> CommandResult<usize> {
    let state = app.state::<AppState>();
    import_tasks_from_path_impl(state.inner(), Path::new(&path)).await
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn export_tasks(state: State<AppState>) -> CommandResult<String> {
    export_tasks_impl(state.inner())
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn export_tasks_to_dir(
    app: AppHandle,
    state: State<AppState>,
    dir: Option<String>,
) -> CommandResult<String> {
    let ctx = TauriCommandCtx { app: &app };
    export_tasks_to_dir_impl(&ctx, state.inner(), dir.map(PathBuf::from))
}

#[cfg(all(feature = "app", not(test)))]
#[tauri::command]
pub fn dismiss_notification(state: State<AppState>, id: NotificationId) -> CommandResult<bool> {
    dismiss_notification_impl(state.inner(), id)
}
