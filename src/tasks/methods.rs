use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{Task, Tasks};
use crate::store::{NewTask, StoreError, TaskFilter, TaskPatch, UserStore};

/// Identity of whoever issued a method call; `None` when not signed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Caller(pub Option<Uuid>);

impl Caller {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn user(id: Uuid) -> Self {
        Self(Some(id))
    }

    pub fn id(&self) -> Option<Uuid> {
        self.0
    }

    fn owns(&self, task: &Task) -> bool {
        self.0 == Some(task.owner)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MethodError {
    #[error("Not authorized.")]
    NotAuthorized,
    #[error("task {0} not found")]
    TaskNotFound(Uuid),
    #[error("task text must not be empty")]
    EmptyText,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A remote method invocation as it arrives over the wire, e.g.
/// `{"method": "tasks.setChecked", "params": {"taskId": "...", "isChecked": true}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum MethodCall {
    #[serde(rename = "tasks.insert")]
    Insert { text: String },
    #[serde(rename = "tasks.remove")]
    Remove {
        #[serde(rename = "taskId")]
        task_id: Uuid,
    },
    #[serde(rename = "tasks.setChecked")]
    SetChecked {
        #[serde(rename = "taskId")]
        task_id: Uuid,
        #[serde(rename = "isChecked")]
        is_checked: bool,
    },
    #[serde(rename = "tasks.setPrivate")]
    SetPrivate {
        #[serde(rename = "taskId")]
        task_id: Uuid,
        #[serde(rename = "isPrivate")]
        is_private: bool,
    },
}

impl MethodCall {
    pub fn name(&self) -> &'static str {
        match self {
            MethodCall::Insert { .. } => "tasks.insert",
            MethodCall::Remove { .. } => "tasks.remove",
            MethodCall::SetChecked { .. } => "tasks.setChecked",
            MethodCall::SetPrivate { .. } => "tasks.setPrivate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodOutcome {
    Inserted(Uuid),
    Done,
}

/// The only way tasks get mutated. Every operation checks the caller
/// before touching the store and leaves it untouched on failure.
#[derive(Clone)]
pub struct TaskMethods {
    tasks: Tasks,
    users: Arc<dyn UserStore>,
}

impl TaskMethods {
    pub fn new(tasks: Tasks, users: Arc<dyn UserStore>) -> Self {
        Self { tasks, users }
    }

    pub fn tasks(&self) -> &Tasks {
        &self.tasks
    }

    pub async fn call(&self, caller: Caller, call: MethodCall) -> Result<MethodOutcome, MethodError> {
        let method = call.name();
        info!(method, caller = ?caller.id(), "method call");

        let result = match call {
            MethodCall::Insert { text } => self.insert(caller, &text).await.map(MethodOutcome::Inserted),
            MethodCall::Remove { task_id } => self.remove(caller, task_id).await.map(|_| MethodOutcome::Done),
            MethodCall::SetChecked { task_id, is_checked } => self
                .set_checked(caller, task_id, is_checked)
                .await
                .map(|_| MethodOutcome::Done),
            MethodCall::SetPrivate { task_id, is_private } => self
                .set_private(caller, task_id, is_private)
                .await
                .map(|_| MethodOutcome::Done),
        };

        match &result {
            Err(MethodError::NotAuthorized) => warn!(method, caller = ?caller.id(), "method rejected"),
            Err(MethodError::Store(e)) => error!(method, error = %e, "method failed in store"),
            _ => {}
        }
        result
    }

    pub async fn insert(&self, caller: Caller, text: &str) -> Result<Uuid, MethodError> {
        let owner = caller.id().ok_or(MethodError::NotAuthorized)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(MethodError::EmptyText);
        }
        let user = self.users.find_user(owner).await?.ok_or(MethodError::NotAuthorized)?;

        let task = self
            .tasks
            .insert(NewTask { text: text.to_string(), owner, username: user.username })
            .await?;
        Ok(task.id)
    }

    pub async fn remove(&self, caller: Caller, task_id: Uuid) -> Result<(), MethodError> {
        let task = self.existing(task_id).await?;
        if !caller.owns(&task) {
            return Err(MethodError::NotAuthorized);
        }
        if !self.tasks.remove(task_id).await? {
            return Err(MethodError::TaskNotFound(task_id));
        }
        Ok(())
    }

    /// Public tasks can be checked off by anyone; private ones only by their owner.
    pub async fn set_checked(&self, caller: Caller, task_id: Uuid, is_checked: bool) -> Result<(), MethodError> {
        let task = self.existing(task_id).await?;
        if task.is_private && !caller.owns(&task) {
            return Err(MethodError::NotAuthorized);
        }
        // Re-checked by the store in the same step as the write, in case the
        // owner made the task private in the meantime.
        let guard = TaskFilter::visible_to(caller.id());
        self.patch(task_id, guard, TaskPatch::checked(is_checked)).await
    }

    pub async fn set_private(&self, caller: Caller, task_id: Uuid, is_private: bool) -> Result<(), MethodError> {
        let task = self.existing(task_id).await?;
        if !caller.owns(&task) {
            return Err(MethodError::NotAuthorized);
        }
        // Ownership never changes, so no guard is needed.
        self.patch(task_id, TaskFilter::all(), TaskPatch::private(is_private)).await
    }

    async fn existing(&self, task_id: Uuid) -> Result<Task, MethodError> {
        self.tasks.find_one(task_id).await?.ok_or(MethodError::TaskNotFound(task_id))
    }

    async fn patch(&self, task_id: Uuid, guard: TaskFilter, patch: TaskPatch) -> Result<(), MethodError> {
        if self.tasks.update(task_id, guard, patch).await?.is_some() {
            return Ok(());
        }
        // Either the task vanished or it no longer passes the guard.
        match self.tasks.find_one(task_id).await? {
            Some(_) => Err(MethodError::NotAuthorized),
            None => Err(MethodError::TaskNotFound(task_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewTask, NewUser, SortOrder, TaskStore};
    use async_trait::async_trait;

    struct Fixture {
        methods: TaskMethods,
        alice: Uuid,
        bob: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let alice = store
            .create_user(NewUser { username: "alice".to_string(), password_hash: "x".to_string() })
            .await
            .unwrap()
            .id;
        let bob = store
            .create_user(NewUser { username: "bob".to_string(), password_hash: "x".to_string() })
            .await
            .unwrap()
            .id;
        let methods = TaskMethods::new(Tasks::new(store.clone()), store);
        Fixture { methods, alice, bob }
    }

    async fn all_tasks(methods: &TaskMethods) -> Vec<Task> {
        methods.tasks().find(TaskFilter::all(), SortOrder::CreatedAtDesc).await.unwrap()
    }

    #[tokio::test]
    async fn insert_requires_a_signed_in_caller() {
        let f = fixture().await;

        let err = f.methods.insert(Caller::anonymous(), "Test Task").await.unwrap_err();
        assert!(matches!(err, MethodError::NotAuthorized));
        assert!(all_tasks(&f.methods).await.is_empty());
    }

    #[tokio::test]
    async fn insert_rejects_unknown_users_and_blank_text() {
        let f = fixture().await;

        let err = f.methods.insert(Caller::user(Uuid::new_v4()), "ghost").await.unwrap_err();
        assert!(matches!(err, MethodError::NotAuthorized));

        let err = f.methods.insert(Caller::user(f.alice), "   ").await.unwrap_err();
        assert!(matches!(err, MethodError::EmptyText));
        assert!(all_tasks(&f.methods).await.is_empty());
    }

    #[tokio::test]
    async fn only_the_owner_can_remove() {
        let f = fixture().await;
        let id = f.methods.insert(Caller::user(f.alice), "Test Task").await.unwrap();

        let tasks = all_tasks(&f.methods).await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].owner, f.alice);
        assert_eq!(tasks[0].username, "alice");
        assert!(!tasks[0].is_checked);
        assert!(!tasks[0].is_private);

        for caller in [Caller::user(f.bob), Caller::anonymous()] {
            let err = f.methods.remove(caller, id).await.unwrap_err();
            assert!(matches!(err, MethodError::NotAuthorized));
            assert_eq!(all_tasks(&f.methods).await, tasks);
        }

        f.methods.remove(Caller::user(f.alice), id).await.unwrap();
        assert!(all_tasks(&f.methods).await.is_empty());
    }

    #[tokio::test]
    async fn set_checked_is_idempotent() {
        let f = fixture().await;
        let id = f.methods.insert(Caller::user(f.alice), "Test Task").await.unwrap();

        f.methods.set_checked(Caller::user(f.alice), id, true).await.unwrap();
        let once = all_tasks(&f.methods).await;
        f.methods.set_checked(Caller::user(f.alice), id, true).await.unwrap();
        assert_eq!(all_tasks(&f.methods).await, once);
        assert!(once[0].is_checked);
    }

    #[tokio::test]
    async fn anyone_may_check_a_public_task() {
        let f = fixture().await;
        let id = f.methods.insert(Caller::user(f.alice), "Test Task").await.unwrap();

        f.methods.set_checked(Caller::user(f.bob), id, true).await.unwrap();
        f.methods.set_checked(Caller::anonymous(), id, false).await.unwrap();
        assert!(!all_tasks(&f.methods).await[0].is_checked);
    }

    #[tokio::test]
    async fn private_tasks_can_only_be_checked_by_the_owner() {
        let f = fixture().await;
        let id = f.methods.insert(Caller::user(f.alice), "Test Task").await.unwrap();
        f.methods.set_private(Caller::user(f.alice), id, true).await.unwrap();

        let err = f.methods.set_checked(Caller::user(f.bob), id, true).await.unwrap_err();
        assert!(matches!(err, MethodError::NotAuthorized));
        assert!(!all_tasks(&f.methods).await[0].is_checked);

        f.methods.set_checked(Caller::user(f.alice), id, true).await.unwrap();
        assert!(all_tasks(&f.methods).await[0].is_checked);
    }

    /// Hands out the task as it was, then lets the owner make it private
    /// before the caller gets to write.
    struct PrivatizedAfterRead {
        inner: Arc<MemoryStore>,
    }

    #[async_trait]
    impl TaskStore for PrivatizedAfterRead {
        async fn find(&self, filter: TaskFilter, sort: SortOrder) -> Result<Vec<Task>, StoreError> {
            self.inner.find(filter, sort).await
        }

        async fn find_one(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
            let seen = self.inner.find_one(id).await?;
            self.inner.update(id, TaskFilter::all(), TaskPatch::private(true)).await?;
            Ok(seen)
        }

        async fn count(&self, filter: TaskFilter) -> Result<u64, StoreError> {
            self.inner.count(filter).await
        }

        async fn insert(&self, task: NewTask) -> Result<Task, StoreError> {
            self.inner.insert(task).await
        }

        async fn update(&self, id: Uuid, guard: TaskFilter, patch: TaskPatch) -> Result<Option<Task>, StoreError> {
            self.inner.update(id, guard, patch).await
        }

        async fn remove(&self, id: Uuid) -> Result<bool, StoreError> {
            self.inner.remove(id).await
        }
    }

    #[tokio::test]
    async fn check_does_not_land_on_a_task_made_private_mid_call() {
        let inner = Arc::new(MemoryStore::new());
        let alice = inner
            .create_user(NewUser { username: "alice".to_string(), password_hash: "x".to_string() })
            .await
            .unwrap()
            .id;
        let bob = Uuid::new_v4();
        let task = inner
            .insert(NewTask { text: "Test Task".to_string(), owner: alice, username: "alice".to_string() })
            .await
            .unwrap();
        let store = Arc::new(PrivatizedAfterRead { inner: inner.clone() });
        let methods = TaskMethods::new(Tasks::new(store), inner.clone());

        let err = methods.set_checked(Caller::user(bob), task.id, true).await.unwrap_err();
        assert!(matches!(err, MethodError::NotAuthorized));

        let stored = inner.find_one(task.id).await.unwrap().unwrap();
        assert!(stored.is_private);
        assert!(!stored.is_checked);
    }

    #[tokio::test]
    async fn only_the_owner_can_change_privacy() {
        let f = fixture().await;
        let id = f.methods.insert(Caller::user(f.alice), "Test Task").await.unwrap();

        for caller in [Caller::user(f.bob), Caller::anonymous()] {
            let err = f.methods.set_private(caller, id, true).await.unwrap_err();
            assert!(matches!(err, MethodError::NotAuthorized));
        }
        assert!(!all_tasks(&f.methods).await[0].is_private);

        f.methods.set_private(Caller::user(f.alice), id, true).await.unwrap();
        assert!(all_tasks(&f.methods).await[0].is_private);
    }

    #[tokio::test]
    async fn missing_tasks_are_reported() {
        let f = fixture().await;
        let ghost = Uuid::new_v4();

        let err = f.methods.remove(Caller::user(f.alice), ghost).await.unwrap_err();
        assert!(matches!(err, MethodError::TaskNotFound(id) if id == ghost));
        let err = f.methods.set_checked(Caller::user(f.alice), ghost, true).await.unwrap_err();
        assert!(matches!(err, MethodError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn call_dispatches_wire_methods() {
        let f = fixture().await;
        let alice = Caller::user(f.alice);

        let call: MethodCall =
            serde_json::from_str(r#"{"method":"tasks.insert","params":{"text":"Write docs"}}"#).unwrap();
        let MethodOutcome::Inserted(id) = f.methods.call(alice, call).await.unwrap() else {
            panic!("insert should report the new id");
        };

        let call: MethodCall = serde_json::from_value(serde_json::json!({
            "method": "tasks.setChecked",
            "params": {"taskId": id, "isChecked": true},
        }))
        .unwrap();
        assert_eq!(call.name(), "tasks.setChecked");
        assert_eq!(f.methods.call(alice, call).await.unwrap(), MethodOutcome::Done);
        assert!(all_tasks(&f.methods).await[0].is_checked);

        let outcome = f.methods.call(alice, MethodCall::Remove { task_id: id }).await.unwrap();
        assert_eq!(outcome, MethodOutcome::Done);
        assert!(all_tasks(&f.methods).await.is_empty());
    }

    #[test]
    fn wire_params_are_type_checked() {
        let bad_flag = r#"{"method":"tasks.setPrivate","params":{"taskId":"00000000-0000-0000-0000-000000000000","isPrivate":"yes"}}"#;
        assert!(serde_json::from_str::<MethodCall>(bad_flag).is_err());

        let unknown = r#"{"method":"tasks.drop","params":{}}"#;
        assert!(serde_json::from_str::<MethodCall>(unknown).is_err());
    }
}
