//! One-shot backfill of user scopes on deactivation history records
//!
//! Connects to the live database, runs the migration once, and exits. Any
//! failure is caught here, logged, and swallowed; the connection pool is
//! closed on every exit path.

use log::{error, info};
use sqlx::PgPool;

use scope_backfill::{logging, migrate, Error, MigrationConfig, PgHistoryStore};

#[async_std::main]
async fn main() {
    let config = MigrationConfig::default();

    if let Err(e) = logging::init() {
        eprintln!("failed to configure logging: {}", e);
        return;
    }

    let pool = match PgPool::connect(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };

    if let Err(e) = run(&pool, &config).await {
        error!("{}", e);
    }

    pool.close().await;
    info!("db connection closed");
}

async fn run(pool: &PgPool, config: &MigrationConfig) -> Result<(), Error> {
    let store = PgHistoryStore::new(pool.clone()).await?;

    migrate(&store, config).await?;

    Ok(())
}
