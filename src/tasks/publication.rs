use futures::stream::{self, Stream};
use std::collections::{HashSet, VecDeque};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Task, TaskChange, Tasks};
use crate::store::{SortOrder, StoreError, TaskFilter};

/// What a subscriber sees: documents entering, changing within, or leaving its view.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Added { task: Task },
    Changed { task: Task },
    Removed { id: Uuid },
}

impl TaskEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Added { .. } => "added",
            TaskEvent::Changed { .. } => "changed",
            TaskEvent::Removed { .. } => "removed",
        }
    }
}

/// Per-subscriber view state. Tracks which task ids the subscriber currently
/// has so that store changes can be turned into added/changed/removed events.
#[derive(Debug)]
pub struct Publication {
    filter: TaskFilter,
    visible: HashSet<Uuid>,
}

impl Publication {
    pub fn new(filter: TaskFilter) -> Self {
        Self { filter, visible: HashSet::new() }
    }

    pub fn filter(&self) -> TaskFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: TaskFilter) {
        self.filter = filter;
    }

    pub fn is_visible(&self, id: &Uuid) -> bool {
        self.visible.contains(id)
    }

    pub fn apply(&mut self, change: &TaskChange) -> Option<TaskEvent> {
        match change {
            TaskChange::Inserted(task) | TaskChange::Updated(task) => {
                let was_visible = self.visible.contains(&task.id);
                let now_visible = self.filter.matches(task);
                match (was_visible, now_visible) {
                    (false, true) => {
                        self.visible.insert(task.id);
                        Some(TaskEvent::Added { task: task.clone() })
                    }
                    (true, true) => Some(TaskEvent::Changed { task: task.clone() }),
                    (true, false) => {
                        self.visible.remove(&task.id);
                        Some(TaskEvent::Removed { id: task.id })
                    }
                    (false, false) => None,
                }
            }
            TaskChange::Removed(id) => self.visible.remove(id).then_some(TaskEvent::Removed { id: *id }),
        }
    }

    /// Diff a fresh query result against what the subscriber already has.
    /// `snapshot` must already be filtered and ordered.
    pub fn resync(&mut self, snapshot: Vec<Task>) -> Vec<TaskEvent> {
        let fresh: HashSet<Uuid> = snapshot.iter().map(|t| t.id).collect();
        let mut events: Vec<TaskEvent> = self
            .visible
            .difference(&fresh)
            .map(|id| TaskEvent::Removed { id: *id })
            .collect();

        for task in snapshot {
            if self.visible.contains(&task.id) {
                events.push(TaskEvent::Changed { task });
            } else {
                events.push(TaskEvent::Added { task });
            }
        }
        self.visible = fresh;
        events
    }
}

/// A live, filtered view of the task collection.
pub struct Subscription {
    tasks: Tasks,
    receiver: broadcast::Receiver<TaskChange>,
    publication: Publication,
    pending: VecDeque<TaskEvent>,
}

impl Subscription {
    /// Attach to the change feed first, then read the initial snapshot, so no
    /// change made in between is lost.
    pub async fn open(tasks: Tasks, filter: TaskFilter) -> Result<Self, StoreError> {
        let receiver = tasks.watch();
        let mut subscription = Self {
            tasks,
            receiver,
            publication: Publication::new(filter),
            pending: VecDeque::new(),
        };
        subscription.reload().await?;
        Ok(subscription)
    }

    pub fn filter(&self) -> TaskFilter {
        self.publication.filter()
    }

    /// Switch to a different filter (e.g. the viewer signed in, or toggled
    /// "hide completed"). Queues the events that bring the view up to date.
    pub async fn refilter(&mut self, filter: TaskFilter) -> Result<(), StoreError> {
        self.publication.set_filter(filter);
        self.reload().await
    }

    pub async fn next_event(&mut self) -> Result<Option<TaskEvent>, StoreError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            match self.receiver.recv().await {
                Ok(change) => {
                    if let Some(event) = self.publication.apply(&change) {
                        return Ok(Some(event));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged behind the change feed, resyncing");
                    self.reload().await?;
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<TaskEvent, StoreError>> + Send {
        stream::unfold(self, |mut subscription| async move {
            match subscription.next_event().await {
                Ok(Some(event)) => Some((Ok(event), subscription)),
                Ok(None) => None,
                Err(e) => Some((Err(e), subscription)),
            }
        })
    }

    async fn reload(&mut self) -> Result<(), StoreError> {
        let snapshot = self.tasks.find(self.publication.filter(), SortOrder::CreatedAtDesc).await?;
        debug!(tasks = snapshot.len(), "subscription snapshot");
        self.pending.extend(self.publication.resync(snapshot));
        Ok(())
    }
}
