use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use dotenv::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use applepay_gateway::{
    amount::NoFormulas, app, config::Config, error::GatewayError, load_tables, AppState,
    DOMAIN_ASSOCIATION_PATH,
};

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    // Load environment variables from .env if available
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "applepay_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let port = config.site.port;
    let processor = config.site.processor;

    let tables = load_tables(&config)?;
    let state = AppState::from_config(config, tables, Arc::new(NoFormulas))?;
    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!("🚀 Server listening on {} ({:?} processor)", addr, processor);
    tracing::info!("   - Domain file:  http://{}{}", addr, DOMAIN_ASSOCIATION_PATH);
    tracing::info!("   - Button view:  http://{}/view/applepay-button", addr);
    tracing::info!("   - Health Check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("SIGTERM received, shutting down gracefully");
}
