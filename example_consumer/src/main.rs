//! Example consumer: a separate Rust project that serves CRUD routes over routed datasources.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Datasources come from `$DATASOURCE_CONFIG` (default `datasources.json`) or `DATABASE_URL`.

use dynamic_datasource::{autoconfigure, common_routes_with_ready, crud_routes, load_from_env};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dynamic_datasource=info")),
        )
        .init();

    let config = load_from_env().await?;
    let state = autoconfigure(&config).await?.into_state();

    let app = common_routes_with_ready(state.clone()).merge(crud_routes(state));
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
