//! Headless view-model for the todo list screen.
//!
//! Holds only transient UI state and turns gestures into [`MethodCall`]s;
//! everything else is derived from the subscription feed.

use uuid::Uuid;

use crate::store::TaskFilter;
use crate::tasks::{MethodCall, Task, TaskEvent};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoList {
    pub text: String,
    pub hide_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRow {
    pub id: Uuid,
    pub label: String,
    pub checked: bool,
    pub is_private: bool,
    pub show_private_button: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListModel {
    pub title: String,
    pub show_form: bool,
    pub hide_completed: bool,
    pub rows: Vec<TaskRow>,
}

impl TodoList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Clears the input. Blank input submits nothing.
    pub fn submit(&mut self) -> Option<MethodCall> {
        let text = std::mem::take(&mut self.text);
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(MethodCall::Insert { text: text.to_string() })
    }

    pub fn toggle_checked(&self, task: &Task) -> MethodCall {
        MethodCall::SetChecked { task_id: task.id, is_checked: !task.is_checked }
    }

    pub fn delete(&self, task: &Task) -> MethodCall {
        MethodCall::Remove { task_id: task.id }
    }

    pub fn toggle_private(&self, task: &Task) -> MethodCall {
        MethodCall::SetPrivate { task_id: task.id, is_private: !task.is_private }
    }

    pub fn toggle_hide_completed(&mut self) {
        self.hide_completed = !self.hide_completed;
    }

    /// The query this screen should be subscribed to.
    pub fn filter(&self, viewer: Option<Uuid>) -> TaskFilter {
        TaskFilter::visible_to(viewer).hide_completed(self.hide_completed)
    }

    pub fn render(&self, tasks: &[Task], incomplete_count: u64, viewer: Option<Uuid>) -> ListModel {
        let rows = tasks
            .iter()
            .map(|task| TaskRow {
                id: task.id,
                label: format!("{}: {}", task.username, task.text),
                checked: task.is_checked,
                is_private: task.is_private,
                show_private_button: viewer == Some(task.owner),
            })
            .collect();

        ListModel {
            title: format!("Todo List ({incomplete_count})"),
            show_form: viewer.is_some(),
            hide_completed: self.hide_completed,
            rows,
        }
    }
}

/// Client-side copy of a subscription, newest task first.
#[derive(Debug, Clone, Default)]
pub struct TaskCache {
    tasks: Vec<Task>,
}

impl TaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn incomplete_count(&self) -> u64 {
        self.tasks.iter().filter(|t| !t.is_checked).count() as u64
    }

    pub fn apply(&mut self, event: TaskEvent) {
        match event {
            TaskEvent::Added { task } | TaskEvent::Changed { task } => {
                self.tasks.retain(|t| t.id != task.id);
                // Insert ahead of anything not newer, keeping createdAt descending.
                let at = self.tasks.partition_point(|t| t.created_at > task.created_at);
                self.tasks.insert(at, task);
            }
            TaskEvent::Removed { id } => self.tasks.retain(|t| t.id != id),
        }
    }
}
