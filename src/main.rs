use fleet::config::AppConfig;
use fleet::db::{init_pool, migrate};
use fleet::error::AppError;
use fleet::logging::init_logging;
use fleet::routes::create_router;
use fleet::state::AppState;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = AppConfig::from_env()?;
    let db = init_pool(&config.database_url, config.db_max_connections).await?;

    if let Err(err) = migrate(&db).await {
        error!("migration failed: {err:?}");
        db.close().await;
        return Err(err);
    }

    let state = AppState::new(config.clone(), db.clone());
    let app = create_router(state);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;

    db.close().await;
    Ok(())
}
