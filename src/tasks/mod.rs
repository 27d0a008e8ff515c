pub mod methods;
pub mod publication;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::store::{NewTask, SortOrder, StoreError, TaskFilter, TaskPatch, TaskStore};

pub use methods::{Caller, MethodCall, MethodError, MethodOutcome, TaskMethods};
pub use publication::{Publication, Subscription, TaskEvent};

/// Slow subscribers that fall this far behind get resynced from the store.
pub const CHANGE_FEED_CAPACITY: usize = 256;

// MODELS

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub owner: Uuid,
    /// Owner's display name as it was when the task was inserted.
    pub username: String,
    #[serde(alias = "checked")]
    pub is_checked: bool,
    pub is_private: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskChange {
    Inserted(Task),
    Updated(Task),
    Removed(Uuid),
}

// COLLECTION

/// The task collection: a [`TaskStore`] plus a change feed that every
/// successful mutation is published on.
#[derive(Clone)]
pub struct Tasks {
    store: Arc<dyn TaskStore>,
    changes: broadcast::Sender<TaskChange>,
}

impl Tasks {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self::with_capacity(store, CHANGE_FEED_CAPACITY)
    }

    /// `capacity` is how many changes a subscriber may trail by before it lags.
    pub fn with_capacity(store: Arc<dyn TaskStore>, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity);
        Self { store, changes }
    }

    pub fn watch(&self) -> broadcast::Receiver<TaskChange> {
        self.changes.subscribe()
    }

    pub async fn find(&self, filter: TaskFilter, sort: SortOrder) -> Result<Vec<Task>, StoreError> {
        self.store.find(filter, sort).await
    }

    pub async fn find_one(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        self.store.find_one(id).await
    }

    pub async fn count(&self, filter: TaskFilter) -> Result<u64, StoreError> {
        self.store.count(filter).await
    }

    pub async fn insert(&self, task: NewTask) -> Result<Task, StoreError> {
        let task = self.store.insert(task).await?;
        self.publish(TaskChange::Inserted(task.clone()));
        Ok(task)
    }

    pub async fn update(&self, id: Uuid, guard: TaskFilter, patch: TaskPatch) -> Result<Option<Task>, StoreError> {
        let task = self.store.update(id, guard, patch).await?;
        if let Some(task) = &task {
            self.publish(TaskChange::Updated(task.clone()));
        }
        Ok(task)
    }

    pub async fn remove(&self, id: Uuid) -> Result<bool, StoreError> {
        let removed = self.store.remove(id).await?;
        if removed {
            self.publish(TaskChange::Removed(id));
        }
        Ok(removed)
    }

    fn publish(&self, change: TaskChange) {
        // An error only means nobody is subscribed right now.
        let _ = self.changes.send(change);
    }
}
