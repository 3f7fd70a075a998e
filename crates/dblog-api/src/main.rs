use std::net::SocketAddr;

use tracing::info;

use dblog_api::{router, telemetry, AppState, ServerConfig};
use dblog_core::{LogConfig, SqlLogger};
use dblog_db::{Database, DriverRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let _log_guard = telemetry::init_tracing();

    let config = ServerConfig::from_env()?;
    let sql_logger = SqlLogger::new(&LogConfig::from_env()?);
    let registry = DriverRegistry::with_defaults(sql_logger);

    info!(
        subsystem = "api",
        driver = %config.driver_name,
        "Connecting to database"
    );
    let db = Database::open(&registry, &config.driver_name, &config.database_url).await?;

    let app = router(AppState::new(db));

    let addr: SocketAddr = config.bind_addr().parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
