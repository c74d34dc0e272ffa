//! Resets the database and loads the demo fleet.

use std::process::ExitCode;

use fleet::clock::{Clock, SystemClock};
use fleet::config::AppConfig;
use fleet::db::{init_pool, migrate};
use fleet::logging::init_logging;
use fleet::services::seed::{self, SeedSummary};
use fleet::{db::DbPool, error::AppError};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_logging();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let db = match init_pool(&config.database_url, 1).await {
        Ok(db) => db,
        Err(err) => {
            error!("could not connect to {}: {err}", config.database_url);
            return ExitCode::FAILURE;
        }
    };

    let outcome = run(&db).await;
    db.close().await;
    info!("database connection closed");

    match outcome {
        Ok(summary) => {
            info!(
                "seeded {} users, {} trucks, {} drivers, {} trips, {} shipments",
                summary.users, summary.trucks, summary.drivers, summary.trips, summary.shipments
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("seeding failed: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(db: &DbPool) -> Result<SeedSummary, AppError> {
    migrate(db).await?;
    seed::reset_and_seed(db, SystemClock.now_utc()).await
}
