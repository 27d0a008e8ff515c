use std::sync::Arc;

use crate::auth::Tokens;
use crate::store::{MemoryStore, TaskStore, UserStore};
use crate::tasks::{TaskMethods, Tasks};

#[derive(Clone)]
pub struct AppState {
    pub methods: TaskMethods,
    pub users: Arc<dyn UserStore>,
    pub tokens: Tokens,
}

impl AppState {
    pub fn new(tasks: Arc<dyn TaskStore>, users: Arc<dyn UserStore>, tokens: Tokens) -> Self {
        let methods = TaskMethods::new(Tasks::new(tasks), users.clone());
        Self { methods, users, tokens }
    }

    pub fn in_memory(tokens: Tokens) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(store.clone(), store, tokens)
    }

    pub fn tasks(&self) -> &Tasks {
        self.methods.tasks()
    }
}
