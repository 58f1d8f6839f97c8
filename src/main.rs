use switchyard::{
    config::{AppConfig, Env},
    create_router,
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads the configuration, sets up logging for the environment and serves the
/// application until Ctrl-C.
#[tokio::main]
async fn main() -> std::io::Result<()> {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise our own crate at debug and the HTTP layers at info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "switchyard=debug,tower_http=info".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            // LOCAL: Pretty print output for human readability.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // PROD: JSON lines for log aggregation.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Router and Server Startup
    let app = create_router(&config);
    let listener = TcpListener::bind(config.bind_address).await?;

    tracing::info!("Listening on {}", config.bind_address);
    tracing::info!(
        "API description available at: http://{}/api-docs/openapi.json",
        config.bind_address
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received, draining connections");
}
