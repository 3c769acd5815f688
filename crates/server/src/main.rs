use server::config::BlueprintConfig;
use server::create_router;
use server::state::AppState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "server=info,orchestrator=info,tower_http=info".into()),
        )
        .init();

    let project_root = std::env::current_dir()?;
    let config = BlueprintConfig::read(&project_root).await;
    let state = AppState::from_config(&config, &project_root).await?;
    state.start_scheduler().await?;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.server.port)).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);
    axum::serve(listener, create_router(state)).await?;

    Ok(())
}
