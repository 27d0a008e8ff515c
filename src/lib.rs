pub mod auth;
pub mod config;
pub mod presentation;
pub mod routes;
pub mod state;
pub mod store;
pub mod tasks;
pub mod telemetry;

pub use config::Config;
pub use state::AppState;
