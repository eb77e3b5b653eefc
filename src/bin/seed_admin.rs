//! Provisions the administrative account, exiting 0 on success and 1 on failure.
use std::process::ExitCode;

use log::{error, info};
use portal_core::admin::{MongoAdminStore, NewAdmin};
use portal_core::config::{EnvConfig, SeedConfig};
use portal_core::errors::CustomError;
use portal_core::seed::{seed_admin, SeedOutcome};


async fn run() -> Result<SeedOutcome, CustomError> {
    let config = SeedConfig::from_config::<EnvConfig>()?;
    info!("seeding with {:?}", config);

    let store = MongoAdminStore::connect(&config.mongodb_uri, config.database.as_deref()).await?;
    store.ensure_indexes().await?;

    let admin = NewAdmin::new(config.admin_username, config.admin_password, config.admin_email);
    seed_admin(&store, admin, config.bcrypt_cost).await
}


#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    match run().await {
        Ok(SeedOutcome::Created) => {
            info!("admin account created");
            ExitCode::SUCCESS
        },
        Ok(SeedOutcome::AlreadyPresent) => {
            info!("admin account already present");
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!("seeding admin account failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
