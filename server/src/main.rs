use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use alumni_portal_server::config::Config;
use alumni_portal_server::payments::PaystackClient;
use alumni_portal_server::routes::create_routes;
use alumni_portal_server::store::PgStore;
use alumni_portal_server::AppState;

const DEFAULT_LOG_FILTER: &str = "alumni_portal_server=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;

    let store = PgStore::connect(&config.database_url, config.max_db_connections).await?;
    tracing::info!("Successfully connected to database");

    store.migrate().await?;
    tracing::info!("Migrations run successfully");

    let gateway = PaystackClient::new(&config.paystack)?;
    let state = AppState::new(Arc::new(store), Arc::new(gateway), &config);
    let app = create_routes(state, &config);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, production = config.production, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}
