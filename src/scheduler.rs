use std::collections::HashMap;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::models::NotificationId;

/// Spawns delayed callbacks on a tokio runtime, when one is available.
///
/// Without a runtime nothing is scheduled and deadlines are only enforced
/// lazily by the callers.
#[derive(Clone, Default)]
pub struct Scheduler {
    handle: Option<Handle>,
}

impl Scheduler {
    pub fn current() -> Self {
        Self {
            handle: Handle::try_current().ok(),
        }
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }

    pub fn after<F>(&self, delay: Duration, callback: F) -> Option<TimerHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = self.handle.as_ref()?;
        let join = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        Some(TimerHandle(join))
    }
}

pub struct TimerHandle(JoinHandle<()>);

impl TimerHandle {
    pub fn cancel(self) {
        self.0.abort();
    }
}

/// Every pending timer owned by one mounted list.
#[derive(Default)]
pub struct Timers {
    undo: Option<(u64, TimerHandle)>,
    notifications: HashMap<NotificationId, TimerHandle>,
}

impl Timers {
    /// Cancels the current undo timer before installing the next one.
    pub fn replace_undo(&mut self, generation: u64, timer: Option<TimerHandle>) {
        self.cancel_undo();
        self.undo = timer.map(|timer| (generation, timer));
    }

    pub fn cancel_undo(&mut self) {
        if let Some((_, timer)) = self.undo.take() {
            timer.cancel();
        }
    }

    /// Forgets the undo timer after it fired, unless a newer one replaced it.
    pub fn finish_undo(&mut self, generation: u64) {
        if matches!(self.undo, Some((current, _)) if current == generation) {
            self.undo = None;
        }
    }

    #[cfg(test)]
    pub fn has_undo(&self) -> bool {
        self.undo.is_some()
    }

    pub fn insert_notification(&mut self, id: NotificationId, timer: Option<TimerHandle>) {
        if let Some(timer) = timer {
            if let Some(previous) = self.notifications.insert(id, timer) {
                previous.cancel();
            }
        }
    }

    pub fn cancel_notification(&mut self, id: NotificationId) {
        if let Some(timer) = self.notifications.remove(&id) {
            timer.cancel();
        }
    }

    pub fn finish_notification(&mut self, id: NotificationId) {
        self.notifications.remove(&id);
    }

    #[cfg(test)]
    pub fn pending_notifications(&self) -> usize {
        self.notifications.len()
    }

    pub fn cancel_all(&mut self) {
        self.cancel_undo();
        for (_, timer) in self.notifications.drain() {
            timer.cancel();
        }
    }
}
