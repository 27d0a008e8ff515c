use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::{Stream, StreamExt};
use tracing::error;

use crate::state::AppState;
use crate::store::{SortOrder, StoreError, TaskFilter};
use crate::tasks::{Caller, MethodCall, MethodError, MethodOutcome, Subscription, TaskEvent};
use super::{CountResponse, MethodResponse, ViewQuery};

fn store_error(e: StoreError) -> (StatusCode, String) {
    error!(error = %e, "task store failure");
    (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read tasks".to_string())
}

fn method_error(e: MethodError) -> (StatusCode, String) {
    match e {
        MethodError::NotAuthorized => (StatusCode::FORBIDDEN, e.to_string()),
        MethodError::TaskNotFound(_) => (StatusCode::NOT_FOUND, "Task not found".to_string()),
        MethodError::EmptyText => (StatusCode::BAD_REQUEST, e.to_string()),
        MethodError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Method failed".to_string()),
    }
}

/// Run one remote method on behalf of the caller
pub async fn call(
    State(state): State<AppState>,
    caller: Caller,
    Json(call): Json<MethodCall>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let outcome = state.methods.call(caller, call).await.map_err(method_error)?;

    let result = match outcome {
        MethodOutcome::Inserted(id) => Some(id),
        MethodOutcome::Done => None,
    };
    Ok(Json(MethodResponse { result }))
}

/// Current snapshot of the tasks the caller may see, newest first
pub async fn list(
    State(state): State<AppState>,
    caller: Caller,
    Query(view): Query<ViewQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let filter = TaskFilter::visible_to(caller.id()).hide_completed(view.hide_completed);
    let tasks = state
        .tasks()
        .find(filter, SortOrder::CreatedAtDesc)
        .await
        .map_err(store_error)?;

    Ok(Json(tasks))
}

/// Number of unchecked tasks in the caller's view
pub async fn incomplete_count(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let filter = TaskFilter::visible_to(caller.id()).hide_completed(true);
    let count = state.tasks().count(filter).await.map_err(store_error)?;

    Ok(Json(CountResponse { count }))
}

/// Live view of the caller's tasks as server-sent events
pub async fn subscribe(
    State(state): State<AppState>,
    caller: Caller,
    Query(view): Query<ViewQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, (StatusCode, String)> {
    let filter = TaskFilter::visible_to(caller.id()).hide_completed(view.hide_completed);
    let subscription = Subscription::open(state.tasks().clone(), filter)
        .await
        .map_err(store_error)?;

    let events = subscription.into_stream().map(|event| match event {
        Ok(event) => sse_event(&event),
        Err(e) => {
            error!(error = %e, "subscription failed");
            Err(axum::Error::new(e))
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn sse_event(event: &TaskEvent) -> Result<Event, axum::Error> {
    let sse = Event::default().event(event.name());
    match event {
        TaskEvent::Added { task } | TaskEvent::Changed { task } => sse.json_data(task),
        TaskEvent::Removed { id } => sse.json_data(serde_json::json!({ "id": id })),
    }
}
