use crate::models::{
    Filter, Notification, NotificationId, Priority, SortKey, Task, TaskId, Theme,
};
use crate::projection::Counts;

pub const EVENT_STATE_UPDATED: &str = "state_updated";
pub const EVENT_NOTIFICATION: &str = "notification";
pub const EVENT_NOTIFICATION_DISMISSED: &str = "notification_dismissed";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EditingPayload {
    pub task_id: TaskId,
    pub draft: String,
}

/// Everything the view needs to render one frame.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StatePayload {
    pub tasks: Vec<Task>,
    pub counts: Counts,
    pub filter: Filter,
    pub search: String,
    pub sort_by: SortKey,
    pub theme: Theme,
    pub theme_pinned: bool,
    pub draft_text: String,
    pub draft_priority: Priority,
    pub editing: Option<EditingPayload>,
    pub dragging: Option<TaskId>,
    pub can_reorder: bool,
    pub undo_available: bool,
    pub notifications: Vec<Notification>,
}

/// Receives what the engine publishes for the presentation layer.
pub trait EventSink: Send + Sync {
    fn state_updated(&self, payload: &StatePayload);
    fn notification(&self, notification: &Notification);
    fn notification_dismissed(&self, id: NotificationId);
}

/// Drops every event; used when nothing is listening.
pub struct NullSink;

impl EventSink for NullSink {
    fn state_updated(&self, _payload: &StatePayload) {}
    fn notification(&self, _notification: &Notification) {}
    fn notification_dismissed(&self, _id: NotificationId) {}
}
