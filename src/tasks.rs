use crate::models::{Priority, Task, TaskId, Timestamp};

/// The most recently deleted task, restorable until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoEntry {
    pub task: Task,
    pub index: usize,
    pub expires_at: Timestamp,
    /// Distinguishes successive deletes so a stale expiry timer cannot drop a newer entry.
    pub generation: u64,
}

/// The task collection in its baseline order, the id counter, and the undo slot.
#[derive(Debug, Clone, Default)]
pub struct TaskList {
    tasks: Vec<Task>,
    next_id: TaskId,
    undo: Option<UndoEntry>,
    undo_generation: u64,
}

impl TaskList {
    pub fn new(tasks: Vec<Task>, next_id: TaskId) -> Self {
        let floor = tasks
            .iter()
            .map(|task| task.id.saturating_add(1))
            .max()
            .unwrap_or(0);
        Self {
            tasks,
            next_id: next_id.max(floor),
            undo: None,
            undo_generation: 0,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn next_id(&self) -> TaskId {
        self.next_id
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    pub fn pending_undo(&self) -> Option<&UndoEntry> {
        self.undo.as_ref()
    }

    /// Blank text, or an exhausted id counter, leaves the list untouched.
    pub fn add(&mut self, text: &str, priority: Priority, now: Timestamp) -> Option<Task> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let Some(following) = self.next_id.checked_add(1) else {
            log::warn!("task id space exhausted, ignoring add");
            return None;
        };
        let task = Task {
            id: self.next_id,
            text: text.to_string(),
            completed: false,
            created_at: now,
            priority,
        };
        self.next_id = following;
        self.tasks.push(task.clone());
        Some(task)
    }

    pub fn toggle(&mut self, id: TaskId) -> Option<Task> {
        let task = self.tasks.iter_mut().find(|task| task.id == id)?;
        task.completed = !task.completed;
        Some(task.clone())
    }

    /// Replaces only the text; a blank replacement leaves the task untouched.
    pub fn update_text(&mut self, id: TaskId, text: &str) -> Option<Task> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let task = self.tasks.iter_mut().find(|task| task.id == id)?;
        task.text = text.to_string();
        Some(task.clone())
    }

    /// Removes the task and parks it in the undo slot, displacing any earlier entry.
    pub fn delete(&mut self, id: TaskId, expires_at: Timestamp) -> Option<&UndoEntry> {
        let index = self.position(id)?;
        let task = self.tasks.remove(index);
        self.undo_generation += 1;
        self.undo = Some(UndoEntry {
            task,
            index,
            expires_at,
            generation: self.undo_generation,
        });
        self.undo.as_ref()
    }

    /// Reinserts the parked task at its old index, or at the end if the list has shrunk.
    pub fn undo_delete(&mut self, now: Timestamp) -> Option<Task> {
        let entry = self.undo.take()?;
        if now >= entry.expires_at {
            log::debug!("undo window elapsed for task id={}", entry.task.id);
            return None;
        }
        let index = entry.index.min(self.tasks.len());
        self.tasks.insert(index, entry.task.clone());
        Some(entry.task)
    }

    /// Drops the undo entry if it is still the one `generation` refers to.
    pub fn expire_undo(&mut self, generation: u64) -> bool {
        match &self.undo {
            Some(entry) if entry.generation == generation => {
                self.undo = None;
                true
            }
            _ => false,
        }
    }

    pub fn discard_undo(&mut self) {
        self.undo = None;
    }

    /// Returns how many tasks were removed.
    pub fn clear_completed(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|task| !task.completed);
        before - self.tasks.len()
    }

    /// Completes everything unless everything is already complete, in which
    /// case everything is reopened. Returns the new state, `None` when empty.
    pub fn toggle_all(&mut self) -> Option<bool> {
        if self.tasks.is_empty() {
            return None;
        }
        let target = !self.tasks.iter().all(|task| task.completed);
        for task in &mut self.tasks {
            task.completed = target;
        }
        Some(target)
    }

    /// Moves `dragged` to the index currently held by `target`.
    pub fn move_task(&mut self, dragged: TaskId, target: TaskId) -> bool {
        if dragged == target {
            return false;
        }
        let (from, to) = match (self.position(dragged), self.position(target)) {
            (Some(from), Some(to)) => (from, to),
            _ => return false,
        };
        let task = self.tasks.remove(from);
        self.tasks.insert(to, task);
        true
    }

    /// Swaps in an imported collection; the counter never moves backwards.
    pub fn replace_all(&mut self, tasks: Vec<Task>, next_id: TaskId) {
        let generation = self.undo_generation;
        *self = Self::new(tasks, next_id.max(self.next_id));
        self.undo_generation = generation;
    }
}
