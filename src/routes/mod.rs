use axum::{
    http::{header::InvalidHeaderValue, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod auth;
mod health;
mod middleware_auth;
mod tasks;

pub use auth::{login, register};
pub use health::health;
pub use middleware_auth::JwtUser;

use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    let task_router = Router::new()
        .route("/", get(tasks::routes::list))
        .route("/incomplete-count", get(tasks::routes::incomplete_count))
        .route("/subscribe", get(tasks::routes::subscribe));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .nest(
            "/api",
            Router::new()
                .route("/me", get(auth::me))
                .route("/methods", post(tasks::routes::call))
                .nest("/tasks", task_router)
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    middleware_auth::identify_caller,
                )),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Allow a browser client served from `origin` to call the API.
pub fn cors(origin: &str) -> Result<CorsLayer, InvalidHeaderValue> {
    Ok(CorsLayer::new()
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([axum::http::header::AUTHORIZATION, axum::http::header::CONTENT_TYPE]))
}

async fn root() -> &'static str {
    "Welcome to the todo list API"
}
