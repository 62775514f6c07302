use airgraph::{Config, GraphDb, routes};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let graph = GraphDb::open(&config.db_path, config.query_timeout)?;
    let app = routes::router(routes::AppState::new(graph, &config));

    let addr = config.listen_addr()?;
    tracing::info!(%addr, db_path = %config.db_path.display(), "listening");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
