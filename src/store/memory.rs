use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    NewTask, NewUser, SortOrder, StoreError, TaskFilter, TaskPatch, TaskStore, User, UserStore,
};
use crate::tasks::Task;

/// In-process backend. Tasks are kept in insertion order so that equal
/// timestamps still sort deterministically.
#[derive(Default)]
pub struct MemoryStore {
    tasks: RwLock<Vec<Task>>,
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn find(&self, filter: TaskFilter, sort: SortOrder) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        let mut found: Vec<Task> = match sort {
            // Walk newest-first so the stable sort breaks ties toward later inserts.
            SortOrder::CreatedAtDesc => tasks.iter().rev().filter(|t| filter.matches(t)).cloned().collect(),
            SortOrder::CreatedAtAsc => tasks.iter().filter(|t| filter.matches(t)).cloned().collect(),
        };
        match sort {
            SortOrder::CreatedAtDesc => found.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SortOrder::CreatedAtAsc => found.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        }
        Ok(found)
    }

    async fn find_one(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.read().await.iter().find(|t| t.id == id).cloned())
    }

    async fn count(&self, filter: TaskFilter) -> Result<u64, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks.iter().filter(|t| filter.matches(t)).count() as u64)
    }

    async fn insert(&self, task: NewTask) -> Result<Task, StoreError> {
        let task = Task {
            id: Uuid::new_v4(),
            text: task.text,
            created_at: Utc::now(),
            owner: task.owner,
            username: task.username,
            is_checked: false,
            is_private: false,
        };
        self.tasks.write().await.push(task.clone());
        Ok(task)
    }

    async fn update(&self, id: Uuid, guard: TaskFilter, patch: TaskPatch) -> Result<Option<Task>, StoreError> {
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.iter_mut().find(|t| t.id == id && guard.matches(t)) else {
            return Ok(None);
        };
        if let Some(checked) = patch.is_checked {
            task.is_checked = checked;
        }
        if let Some(private) = patch.is_private {
            task.is_private = private;
        }
        Ok(Some(task.clone()))
    }

    async fn remove(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        Ok(tasks.len() != before)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == user.username) {
            return Err(StoreError::UsernameTaken(user.username));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: user.username,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task(owner: Uuid, text: &str) -> NewTask {
        NewTask { text: text.to_string(), owner, username: "alice".to_string() }
    }

    #[tokio::test]
    async fn find_orders_by_created_at_descending() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        for text in ["first", "second", "third"] {
            store.insert(new_task(owner, text)).await.unwrap();
        }

        let tasks = store.find(TaskFilter::all(), SortOrder::CreatedAtDesc).await.unwrap();
        assert_eq!(tasks.len(), 3);
        assert!(tasks.windows(2).all(|w| w[0].created_at >= w[1].created_at));
        assert_eq!(tasks[0].text, "third");

        let oldest_first = store.find(TaskFilter::all(), SortOrder::CreatedAtAsc).await.unwrap();
        assert_eq!(oldest_first[0].text, "first");
    }

    #[tokio::test]
    async fn update_touches_only_supplied_fields() {
        let store = MemoryStore::new();
        let task = store.insert(new_task(Uuid::new_v4(), "walk dog")).await.unwrap();

        let updated = store.update(task.id, TaskFilter::all(), TaskPatch::private(true)).await.unwrap().unwrap();
        assert!(updated.is_private);
        assert!(!updated.is_checked);
        assert_eq!(updated.created_at, task.created_at);
        assert_eq!(updated.owner, task.owner);

        assert!(store.update(Uuid::new_v4(), TaskFilter::all(), TaskPatch::checked(true)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn guarded_update_skips_tasks_outside_the_guard() {
        let store = MemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let task = store.insert(new_task(alice, "secret")).await.unwrap();
        store.update(task.id, TaskFilter::all(), TaskPatch::private(true)).await.unwrap();

        let missed = store
            .update(task.id, TaskFilter::visible_to(Some(bob)), TaskPatch::checked(true))
            .await
            .unwrap();
        assert!(missed.is_none());
        assert!(!store.find_one(task.id).await.unwrap().unwrap().is_checked);

        let hit = store
            .update(task.id, TaskFilter::visible_to(Some(alice)), TaskPatch::checked(true))
            .await
            .unwrap();
        assert!(hit.unwrap().is_checked);
    }

    #[tokio::test]
    async fn remove_reports_whether_anything_was_deleted() {
        let store = MemoryStore::new();
        let task = store.insert(new_task(Uuid::new_v4(), "x")).await.unwrap();

        assert!(store.remove(task.id).await.unwrap());
        assert!(!store.remove(task.id).await.unwrap());
        assert!(store.find_one(task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn count_applies_the_filter() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let done = store.insert(new_task(owner, "done")).await.unwrap();
        store.insert(new_task(owner, "open")).await.unwrap();
        store.update(done.id, TaskFilter::all(), TaskPatch::checked(true)).await.unwrap();

        assert_eq!(store.count(TaskFilter::all()).await.unwrap(), 2);
        assert_eq!(store.count(TaskFilter::all().hide_completed(true)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn usernames_are_unique() {
        let store = MemoryStore::new();
        let user = NewUser { username: "meteorite".to_string(), password_hash: "h".to_string() };
        let created = store.create_user(user.clone()).await.unwrap();

        let err = store.create_user(user).await.unwrap_err();
        assert!(matches!(err, StoreError::UsernameTaken(name) if name == "meteorite"));

        let found = store.find_user_by_username("meteorite").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(store.find_user(created.id).await.unwrap().is_some());
    }
}
