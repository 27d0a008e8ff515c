use std::sync::Arc;

use simple_todos::{auth, config::Config, routes, state::AppState, store::PgStore, telemetry};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    telemetry::init_tracing(config.log_json);

    let tokens = auth::Tokens::new(&config.jwt_secret, config.token_ttl());

    let state = match &config.database_url {
        Some(url) => {
            let store = Arc::new(PgStore::connect(url).await?);
            info!("connected to postgres");
            AppState::new(store.clone(), store, tokens)
        }
        None => {
            warn!("DATABASE_URL not set, tasks and users are kept in memory");
            AppState::in_memory(tokens)
        }
    };

    if let Some(seed) = &config.seed_user {
        auth::ensure_user(state.users.as_ref(), &seed.username, &seed.password).await?;
    }

    let mut app = routes::routes(state);
    if let Some(origin) = &config.cors_origin {
        app = app.layer(routes::cors(origin)?);
    }

    let listener = tokio::net::TcpListener::bind(config.addr()).await?;

    info!(addr = %config.addr(), "server is chilling");

    axum::serve(listener, app).await?;
    Ok(())
}
