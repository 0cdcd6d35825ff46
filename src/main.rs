use std::sync::Arc;

use anyhow::Context;
use content_desk::api::{self, AppState};
use content_desk::config::ServerConfig;
use content_desk::generation::WebhookGenerator;
use content_desk::store::LibSqlBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env()?;

    eprintln!("Content desk v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{}", config.listen_addr());
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Webhook: {}", config.generation.webhook_url);
    if config.allow_anonymous {
        eprintln!("   Anonymous conversations: enabled");
    }

    let store = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?,
    );
    let generator =
        WebhookGenerator::shared(&config.generation).context("building webhook client")?;

    let state = AppState::new(store, generator, &config);
    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("binding {}", config.listen_addr()))?;

    api::serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down");
    })
    .await?;

    Ok(())
}
