//! Example server: opens the store from DATABASE_URL, applies the bundled schema, resolves the
//! entity model (built-in, or JSON from CONFIG_PATH) and serves the entity routes.

use plantdb_sdk::{app, apply_schema, connect, default_config, load_from_path, resolve, AppState, StoreOptions, SCHEMA};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("plantdb_sdk=info".parse()?))
        .init();

    let pool = connect(&StoreOptions::from_env()).await?;
    apply_schema(&pool, SCHEMA).await?;

    let config = match std::env::var("CONFIG_PATH") {
        Ok(path) => load_from_path(&path).await?,
        Err(_) => default_config(),
    };
    let model = resolve(&config)?;
    let state = AppState::new(pool, model);

    let bind = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = TcpListener::bind(&bind).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
