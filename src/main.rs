use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use traderev::{api, config::Config, db::init_db, Repository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .context("initializing database")?;
    let repo = Arc::new(Repository::new(pool));
    repo.ensure_trade_indexes()
        .await
        .context("ensuring trade indexes")?;

    let app = api::create_router(api::AppState { repo, config });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    tracing::info!("traderev listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
