//! The administrative account record and the stores that persist it.
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use mongodb::bson::{self, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};

use crate::errors::{CustomError, CustomErrorStatus};
use crate::safe_eject;


/// Collection the administrative accounts live in.
pub const ADMIN_COLLECTION: &str = "admins";

/// Database used when neither the config nor the connection string names one.
pub const DEFAULT_DATABASE: &str = "portal";

const DUPLICATE_KEY_CODE: i32 = 11000;

// bcrypt ignores everything past this many bytes
const MAX_PASSWORD_BYTES: usize = 72;


/// A salted bcrypt hash of a password.
///
/// The only ways to get one are hashing a plain password or reading a stored
/// record back, so an `AdminAccount` can never carry plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {

    /// Hashes a plain password.
    ///
    /// # Arguments
    /// * `plain` - the password to hash
    /// * `cost` - the bcrypt work factor
    ///
    /// # Returns
    /// the salted hash
    pub fn hash(plain: &str, cost: u32) -> Result<PasswordHash, CustomError> {
        let hashed = safe_eject!(bcrypt::hash(plain, cost), CustomErrorStatus::Unknown, "hashing password")?;
        Ok(PasswordHash(hashed))
    }

    /// Checks a plain password against the hash. Malformed hashes never verify.
    pub fn verify(&self, plain: &str) -> bool {
        bcrypt::verify(plain, &self.0).unwrap_or(false)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}


/// The administrative account as it is stored.
///
/// # Fields
/// * `username` - unique identifier of the account
/// * `password` - salted hash of the password
/// * `email` - contact email of the account
/// * `created_at` - when the record was prepared for insert, absent on records written by other tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminAccount {
    pub username: String,
    pub password: PasswordHash,
    pub email: String,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<bson::DateTime>
}

impl AdminAccount {

    /// The creation time as a chrono timestamp, if the record has one.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at.map(|created_at| created_at.to_chrono())
    }
}


/// An administrative account that has not been saved yet.
pub struct NewAdmin {
    pub username: String,
    pub email: String,
    password: String
}

impl NewAdmin {

    pub fn new(username: impl Into<String>, password: impl Into<String>, email: impl Into<String>) -> NewAdmin {
        NewAdmin {
            username: username.into(),
            email: email.into(),
            password: password.into()
        }
    }

    /// Hashes the password and stamps the creation time, producing the record to save.
    ///
    /// # Arguments
    /// * `cost` - the bcrypt work factor
    pub fn into_account(self, cost: u32) -> Result<AdminAccount, CustomError> {
        if self.username.trim().is_empty() {
            return Err(CustomError::new("admin username is empty".to_string(), CustomErrorStatus::BadRequest))
        }
        if self.password.is_empty() {
            return Err(CustomError::new("admin password is empty".to_string(), CustomErrorStatus::BadRequest))
        }
        if self.password.len() > MAX_PASSWORD_BYTES {
            return Err(CustomError::new(
                format!("admin password is longer than {} bytes", MAX_PASSWORD_BYTES),
                CustomErrorStatus::BadRequest
            ))
        }
        if self.email.trim().is_empty() {
            return Err(CustomError::new("admin email is empty".to_string(), CustomErrorStatus::BadRequest))
        }
        Ok(AdminAccount {
            password: PasswordHash::hash(&self.password, cost)?,
            username: self.username,
            email: self.email,
            created_at: Some(bson::DateTime::from_chrono(Utc::now()))
        })
    }
}


/// Persistence for administrative accounts.
#[async_trait]
pub trait AdminStore: Send + Sync {

    /// Looks an account up by its username.
    async fn find_by_username(&self, username: &str) -> Result<Option<AdminAccount>, CustomError>;

    /// Checks whether an account with this username is stored, whatever else the record holds.
    async fn exists(&self, username: &str) -> Result<bool, CustomError>;

    /// Saves a new account. A taken username yields a `Conflict` error.
    async fn insert(&self, account: &AdminAccount) -> Result<(), CustomError>;
}


/// Stores accounts in a MongoDB collection.
pub struct MongoAdminStore {
    collection: Collection<AdminAccount>
}

impl MongoAdminStore {

    /// Connects to the database behind `uri`.
    ///
    /// # Arguments
    /// * `uri` - the connection string
    /// * `database` - database name, overriding the one in the connection string
    pub async fn connect(uri: &str, database: Option<&str>) -> Result<MongoAdminStore, CustomError> {
        let client = safe_eject!(Client::with_uri_str(uri).await, CustomErrorStatus::Database, "connecting to database")?;
        let db = match database {
            Some(name) => client.database(name),
            None => client.default_database().unwrap_or_else(|| client.database(DEFAULT_DATABASE))
        };
        debug!("using database {}", db.name());
        Ok(MongoAdminStore {
            collection: db.collection::<AdminAccount>(ADMIN_COLLECTION)
        })
    }

    /// Creates the unique index on `username` if it is missing.
    pub async fn ensure_indexes(&self) -> Result<(), CustomError> {
        let index = IndexModel::builder()
            .keys(doc! { "username": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        safe_eject!(self.collection.create_index(index).await, CustomErrorStatus::Database, "creating username index")?;
        Ok(())
    }
}

#[async_trait]
impl AdminStore for MongoAdminStore {

    async fn find_by_username(&self, username: &str) -> Result<Option<AdminAccount>, CustomError> {
        safe_eject!(
            self.collection.find_one(doc! { "username": username }).await,
            CustomErrorStatus::Database,
            "looking up admin"
        )
    }

    async fn exists(&self, username: &str) -> Result<bool, CustomError> {
        let count = safe_eject!(
            self.collection.count_documents(doc! { "username": username }).await,
            CustomErrorStatus::Database,
            "counting admins"
        )?;
        Ok(count > 0)
    }

    async fn insert(&self, account: &AdminAccount) -> Result<(), CustomError> {
        match self.collection.insert_one(account).await {
            Ok(_) => Ok(()),
            Err(error) => Err(classify_insert_error(write_error_code(&error), &error.to_string(), &account.username))
        }
    }
}


fn write_error_code(error: &mongodb::error::Error) -> Option<i32> {
    match &*error.kind {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => Some(write_error.code),
        _ => None
    }
}


/// Turns a failed insert into a `Conflict` for duplicate usernames and a `Database` error otherwise.
///
/// # Arguments
/// * `code` - the server's write error code, if the failure was a write error
/// * `detail` - the driver's description of the failure
/// * `username` - the username that was being inserted
fn classify_insert_error(code: Option<i32>, detail: &str, username: &str) -> CustomError {
    match code {
        Some(DUPLICATE_KEY_CODE) => CustomError::new(
            format!("admin {} already exists", username),
            CustomErrorStatus::Conflict
        ),
        _ => CustomError::new(format!("inserting admin: {}", detail), CustomErrorStatus::Database)
    }
}


/// Keeps accounts in process memory. Counts writes so callers can check for them.
#[derive(Default)]
pub struct InMemoryAdminStore {
    accounts: Mutex<HashMap<String, AdminAccount>>,
    writes: AtomicUsize
}

impl InMemoryAdminStore {

    pub fn new() -> InMemoryAdminStore {
        InMemoryAdminStore::default()
    }

    /// Number of successful inserts so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, AdminAccount>>, CustomError> {
        self.accounts.lock().map_err(|_| CustomError::new("admin store poisoned".to_string(), CustomErrorStatus::Unknown))
    }
}

#[async_trait]
impl AdminStore for InMemoryAdminStore {

    async fn find_by_username(&self, username: &str) -> Result<Option<AdminAccount>, CustomError> {
        Ok(self.lock()?.get(username).cloned())
    }

    async fn exists(&self, username: &str) -> Result<bool, CustomError> {
        Ok(self.lock()?.contains_key(username))
    }

    async fn insert(&self, account: &AdminAccount) -> Result<(), CustomError> {
        let mut accounts = self.lock()?;
        if accounts.contains_key(&account.username) {
            return Err(CustomError::new(
                format!("admin {} already exists", account.username),
                CustomErrorStatus::Conflict
            ))
        }
        accounts.insert(account.username.clone(), account.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}


#[cfg(test)]
mod tests {

    use super::*;

    // lowest cost bcrypt accepts, keeps the tests fast
    const TEST_COST: u32 = 4;

    #[test]
    fn test_password_is_hashed() {
        let account = NewAdmin::new("admin", "correct horse", "admin@example.com")
            .into_account(TEST_COST)
            .unwrap();
        assert_ne!(account.password.as_str(), "correct horse");
        assert!(account.password.as_str().starts_with("$2"));
        assert!(account.password.verify("correct horse"));
        assert!(!account.password.verify("battery staple"));
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = PasswordHash::hash("same", TEST_COST).unwrap();
        let second = PasswordHash::hash("same", TEST_COST).unwrap();
        assert_ne!(first, second);
        assert!(first.verify("same") && second.verify("same"));
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let error = NewAdmin::new(" ", "secret", "admin@example.com").into_account(TEST_COST).unwrap_err();
        assert_eq!(error.status, CustomErrorStatus::BadRequest);

        let error = NewAdmin::new("admin", "", "admin@example.com").into_account(TEST_COST).unwrap_err();
        assert_eq!(error.status, CustomErrorStatus::BadRequest);

        let error = NewAdmin::new("admin", "secret", "  ").into_account(TEST_COST).unwrap_err();
        assert_eq!(error.status, CustomErrorStatus::BadRequest);
        assert_eq!(error.message, "admin email is empty");
    }

    #[test]
    fn test_overlong_password_rejected() {
        let at_limit = "a".repeat(MAX_PASSWORD_BYTES);
        assert!(NewAdmin::new("admin", at_limit, "admin@example.com").into_account(TEST_COST).is_ok());

        let too_long = "a".repeat(MAX_PASSWORD_BYTES + 1);
        let error = NewAdmin::new("admin", too_long, "admin@example.com").into_account(TEST_COST).unwrap_err();
        assert_eq!(error.status, CustomErrorStatus::BadRequest);
    }

    #[test]
    fn test_reads_record_without_created_at() {
        let record = doc! {
            "username": "admin",
            "password": "$2b$10$N9qo8uLOickgx2ZMRZoMyeIjZAgcfl7p92ldGxad68LJZdL17lhWy",
            "email": "admin@example.com",
            "__v": 0
        };
        let account: AdminAccount = bson::from_document(record).unwrap();
        assert_eq!(account.username, "admin");
        assert_eq!(account.created_at, None);
        assert_eq!(account.created_at_utc(), None);
    }

    #[test]
    fn test_reads_record_with_bson_date() {
        let now = bson::DateTime::now();
        let record = doc! {
            "username": "admin",
            "password": "$2b$10$N9qo8uLOickgx2ZMRZoMyeIjZAgcfl7p92ldGxad68LJZdL17lhWy",
            "email": "admin@example.com",
            "createdAt": now
        };
        let account: AdminAccount = bson::from_document(record).unwrap();
        assert_eq!(account.created_at, Some(now));
    }

    #[test]
    fn test_created_at_stored_as_bson_date() {
        let account = NewAdmin::new("admin", "secret", "admin@example.com")
            .into_account(TEST_COST)
            .unwrap();
        let record = bson::to_document(&account).unwrap();
        assert!(record.get_datetime("createdAt").is_ok());
        assert!(account.created_at_utc().is_some());
    }

    #[test]
    fn test_duplicate_key_is_conflict() {
        let error = classify_insert_error(Some(11000), "E11000 duplicate key error", "admin");
        assert_eq!(error.status, CustomErrorStatus::Conflict);
        assert_eq!(error.message, "admin admin already exists");

        let error = classify_insert_error(Some(121), "Document failed validation", "admin");
        assert_eq!(error.status, CustomErrorStatus::Database);

        let error = classify_insert_error(None, "connection reset", "admin");
        assert_eq!(error.status, CustomErrorStatus::Database);
        assert_eq!(error.message, "inserting admin: connection reset");
    }

    #[test]
    fn test_serialized_record() {
        let account = NewAdmin::new("admin", "secret", "admin@example.com")
            .into_account(TEST_COST)
            .unwrap();
        let value = serde_json::to_value(&account).unwrap();
        assert_eq!(value["username"], "admin");
        assert_eq!(value["email"], "admin@example.com");
        assert_eq!(value["password"], account.password.as_str());
        assert!(value.get("createdAt").is_some());
    }

    #[actix_web::test]
    async fn test_in_memory_store_conflict() {
        let store = InMemoryAdminStore::new();
        let account = NewAdmin::new("admin", "secret", "admin@example.com")
            .into_account(TEST_COST)
            .unwrap();

        store.insert(&account).await.unwrap();
        let error = store.insert(&account).await.unwrap_err();
        assert_eq!(error.status, CustomErrorStatus::Conflict);
        assert_eq!(store.write_count(), 1);
        assert!(store.exists("admin").await.unwrap());
        assert!(!store.exists("nobody").await.unwrap());

        let found = store.find_by_username("admin").await.unwrap();
        assert_eq!(found, Some(account));
        assert_eq!(store.find_by_username("nobody").await.unwrap(), None);
    }
}
