use anyhow::Result;
use markdown_poster::core::chrome::ChromeLauncher;
use markdown_poster::core::generator::PosterGenerator;
use markdown_poster::core::rasterizer::Rasterizer;
use markdown_poster::core::registry::REGISTRY;
use markdown_poster::settings::get_config;
use markdown_poster::{AppState, init_openapi_route};
use poem::listener::TcpListener;
use tracing::Level;

use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = get_config()?;

    let log_level = Level::DEBUG;
    // Logging to File
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(log_level)
        .init();

    tracing::info!("Initializing Markdown Poster Service...");
    tracing::info!("run with config: {:?}", config);

    let launcher = Arc::new(ChromeLauncher::new(config.chrome_path.clone()));
    let rasterizer = Arc::new(Rasterizer::new(launcher, config.rasterizer_config()));
    let generator = Arc::new(PosterGenerator::new(
        &REGISTRY,
        config.composer_config()?,
        rasterizer.clone(),
        config.output_encoder(),
    ));

    // Generation retries the launch lazily if this fails.
    if let Err(e) = rasterizer.initialize().await {
        tracing::warn!("Rendering engine not ready at startup: {}", e);
    }

    let app_state = Arc::new(AppState::new(generator));
    let app = init_openapi_route(app_state, &config);

    tracing::info!("run server on {}:{}", config.host, config.port);
    poem::Server::new(TcpListener::bind(format!(
        "{}:{}",
        config.host, config.port
    )))
    .run_with_graceful_shutdown(
        app,
        async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        },
        None,
    )
    .await?;

    rasterizer.shutdown().await?;
    tracing::info!("Markdown Poster Service stopped");
    Ok(())
}
