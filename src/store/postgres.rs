use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    NewTask, NewUser, SortOrder, StoreError, TaskFilter, TaskPatch, TaskStore, User, UserStore,
    Visibility,
};
use crate::tasks::Task;

const TASK_COLUMNS: &str = "id, text, created_at, owner, username, is_checked, is_private";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and bring the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

fn push_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &TaskFilter) {
    query.push(" WHERE TRUE");
    match filter.visibility {
        Visibility::All => {}
        Visibility::PublicOr(Some(viewer)) => {
            query.push(" AND (NOT is_private OR owner = ");
            query.push_bind(viewer);
            query.push(")");
        }
        Visibility::PublicOr(None) => {
            query.push(" AND NOT is_private");
        }
    }
    if filter.hide_completed {
        query.push(" AND NOT is_checked");
    }
}

fn order_by(sort: SortOrder) -> &'static str {
    match sort {
        SortOrder::CreatedAtDesc => " ORDER BY created_at DESC",
        SortOrder::CreatedAtAsc => " ORDER BY created_at ASC",
    }
}

fn find_query(filter: &TaskFilter, sort: SortOrder) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks"));
    push_filter(&mut query, filter);
    query.push(order_by(sort));
    query
}

/// The guard goes into the same statement so the check and the write cannot be split.
fn update_query(id: Uuid, guard: &TaskFilter, patch: TaskPatch) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new("UPDATE tasks SET is_checked = COALESCE(");
    query.push_bind(patch.is_checked);
    query.push(", is_checked), is_private = COALESCE(");
    query.push_bind(patch.is_private);
    query.push(", is_private)");
    push_filter(&mut query, guard);
    query.push(" AND id = ");
    query.push_bind(id);
    query.push(format!(" RETURNING {TASK_COLUMNS}"));
    query
}

#[async_trait]
impl TaskStore for PgStore {
    async fn find(&self, filter: TaskFilter, sort: SortOrder) -> Result<Vec<Task>, StoreError> {
        let tasks = find_query(&filter, sort)
            .build_query_as::<Task>()
            .fetch_all(&self.pool)
            .await?;
        Ok(tasks)
    }

    async fn find_one(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    async fn count(&self, filter: TaskFilter) -> Result<u64, StoreError> {
        let mut query = QueryBuilder::new("SELECT COUNT(*) FROM tasks");
        push_filter(&mut query, &filter);
        let count: i64 = query.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn insert(&self, task: NewTask) -> Result<Task, StoreError> {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            INSERT INTO tasks (id, text, owner, username)
            VALUES ($1, $2, $3, $4)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&task.text)
        .bind(task.owner)
        .bind(&task.username)
        .fetch_one(&self.pool)
        .await?;
        Ok(task)
    }

    async fn update(&self, id: Uuid, guard: TaskFilter, patch: TaskPatch) -> Result<Option<Task>, StoreError> {
        let task = update_query(id, &guard, patch)
            .build_query_as::<Task>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    async fn remove(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await;

        match created {
            Ok(created) => Ok(created),
            Err(e) => {
                if let Some(db_error) = e.as_database_error() {
                    if db_error.code() == Some(std::borrow::Cow::Borrowed("23505")) {
                        return Err(StoreError::UsernameTaken(user.username));
                    }
                }
                Err(e.into())
            }
        }
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}
