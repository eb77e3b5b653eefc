//! Provisions the administrative account if it does not exist yet.
use log::info;

use crate::admin::{AdminStore, NewAdmin};
use crate::errors::{CustomError, CustomErrorStatus};


/// What a seed run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Created,
    AlreadyPresent
}


/// Inserts `admin` unless an account with the same username is already stored.
///
/// # Arguments
/// * `store` - where the account is persisted
/// * `admin` - the account to provision
/// * `cost` - the bcrypt work factor for the password hash
///
/// # Returns
/// * `SeedOutcome::Created` when the account was written
/// * `SeedOutcome::AlreadyPresent` when nothing was written
pub async fn seed_admin(store: &dyn AdminStore, admin: NewAdmin, cost: u32) -> Result<SeedOutcome, CustomError> {
    if store.exists(&admin.username).await? {
        info!("admin account {} already exists, nothing to do", admin.username);
        return Ok(SeedOutcome::AlreadyPresent)
    }

    let account = admin.into_account(cost)?;
    match store.insert(&account).await {
        Ok(()) => {
            info!("admin account {} created", account.username);
            Ok(SeedOutcome::Created)
        },
        // another run inserted it between the lookup and the insert
        Err(error) if error.status == CustomErrorStatus::Conflict => {
            info!("admin account {} was created concurrently", account.username);
            Ok(SeedOutcome::AlreadyPresent)
        },
        Err(error) => Err(error)
    }
}
