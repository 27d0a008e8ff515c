pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tasks::Task;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("username `{0}` is already taken")]
    UsernameTaken(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

// MODELS

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
}

/// Fields supplied by the caller when a task is inserted. The store fills in
/// the id, the creation time and both flags.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub text: String,
    pub owner: Uuid,
    pub username: String,
}

/// Partial update. `None` leaves the column alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub is_checked: Option<bool>,
    pub is_private: Option<bool>,
}

impl TaskPatch {
    pub fn checked(value: bool) -> Self {
        Self { is_checked: Some(value), ..Self::default() }
    }

    pub fn private(value: bool) -> Self {
        Self { is_private: Some(value), ..Self::default() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    All,
    /// Tasks that are not private, plus private tasks owned by the viewer.
    PublicOr(Option<Uuid>),
}

/// Predicate half of a `find`. Every backend must agree with [`TaskFilter::matches`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub visibility: Visibility,
    pub hide_completed: bool,
}

impl TaskFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn visible_to(viewer: Option<Uuid>) -> Self {
        Self { visibility: Visibility::PublicOr(viewer), hide_completed: false }
    }

    pub fn hide_completed(mut self, hide: bool) -> Self {
        self.hide_completed = hide;
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        let visible = match self.visibility {
            Visibility::All => true,
            Visibility::PublicOr(viewer) => !task.is_private || viewer == Some(task.owner),
        };
        visible && !(self.hide_completed && task.is_checked)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    CreatedAtDesc,
    CreatedAtAsc,
}

#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    async fn find(&self, filter: TaskFilter, sort: SortOrder) -> Result<Vec<Task>, StoreError>;
    async fn find_one(&self, id: Uuid) -> Result<Option<Task>, StoreError>;
    async fn count(&self, filter: TaskFilter) -> Result<u64, StoreError>;
    async fn insert(&self, task: NewTask) -> Result<Task, StoreError>;
    /// Applies `patch` only if the task exists and still matches `guard`,
    /// checked in the same step as the write.
    async fn update(&self, id: Uuid, guard: TaskFilter, patch: TaskPatch) -> Result<Option<Task>, StoreError>;
    async fn remove(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
}
