//! Defines extracting config variables.
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{CustomError, CustomErrorStatus};


/// Defines the trait for getting config variables
pub trait GetConfigVariable {

    /// Gets the config variable
    ///
    /// # Arguments
    /// * `variable` - The name of the config variable to get
    ///
    /// # Returns
    /// * `Result<String, CustomError>` - The result of getting the config variable
    fn get_config_variable(variable: &str) -> Result<String, CustomError>;

    /// Gets an optional config variable, treating an empty value as unset.
    fn get_optional_variable(variable: &str) -> Option<String> {
        match Self::get_config_variable(variable) {
            Ok(value) if !value.trim().is_empty() => Some(value),
            _ => None
        }
    }

    /// Parses a config variable, falling back to `default` when it is not set.
    ///
    /// # Arguments
    /// * `variable` - The name of the config variable to parse
    /// * `default` - The value to use when the variable is absent
    ///
    /// # Returns
    /// * `Result<T, CustomError>` - the parsed value or a config error if it is set but not parsable
    fn parse_config_variable<T: FromStr>(variable: &str, default: T) -> Result<T, CustomError> {
        match Self::get_optional_variable(variable) {
            Some(raw) => raw.trim().parse::<T>().map_err(|_| CustomError::new(
                format!("{} is not a valid value", variable),
                CustomErrorStatus::Config
            )),
            None => Ok(default)
        }
    }
}


/// Defines the struct for getting config variables from the environment
pub struct EnvConfig;

impl GetConfigVariable for EnvConfig {

    fn get_config_variable(variable: &str) -> Result<String, CustomError> {
        match env::var(variable) {
            Ok(val) => Ok(val),
            Err(_) => Err(CustomError::new(format!("{} is not set", variable), CustomErrorStatus::Config))
        }
    }
}


/// Settings for provisioning the administrative account.
///
/// # Fields
/// * `mongodb_uri` - connection string of the document database
/// * `database` - database name overriding the one in the connection string
/// * `admin_username` - username of the account to provision
/// * `admin_password` - plain password, hashed before it is stored
/// * `admin_email` - email of the account to provision
/// * `bcrypt_cost` - work factor of the password hash
#[derive(Clone)]
pub struct SeedConfig {
    pub mongodb_uri: String,
    pub database: Option<String>,
    pub admin_username: String,
    pub admin_password: String,
    pub admin_email: String,
    pub bcrypt_cost: u32
}

impl SeedConfig {

    pub fn from_config<X: GetConfigVariable>() -> Result<SeedConfig, CustomError> {
        Ok(SeedConfig {
            mongodb_uri: X::get_config_variable("MONGODB_URI")?,
            database: X::get_optional_variable("MONGODB_DATABASE"),
            admin_username: X::get_optional_variable("ADMIN_USERNAME").unwrap_or_else(|| "admin".to_string()),
            admin_password: X::get_config_variable("ADMIN_PASSWORD")?,
            admin_email: X::get_config_variable("ADMIN_EMAIL")?,
            bcrypt_cost: X::parse_config_variable("BCRYPT_COST", bcrypt::DEFAULT_COST)?
        })
    }
}

// keeps the password out of logs
impl std::fmt::Debug for SeedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedConfig")
            .field("database", &self.database)
            .field("admin_username", &self.admin_username)
            .field("admin_email", &self.admin_email)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish_non_exhaustive()
    }
}


/// Settings for verifying bearer tokens against a remote key set.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwks_uri: String,
    pub issuer: String,
    pub audience: Option<String>,
    pub jwks_requests_per_minute: usize,
    pub cache_max_entries: usize,
    pub cache_max_age: Duration,
    pub fetch_timeout: Duration,
    pub leeway_secs: u64
}

impl AuthConfig {

    pub fn from_config<X: GetConfigVariable>() -> Result<AuthConfig, CustomError> {
        Ok(AuthConfig {
            jwks_uri: X::get_config_variable("AUTH_JWKS_URI")?,
            issuer: X::get_config_variable("AUTH_ISSUER")?,
            audience: X::get_optional_variable("AUTH_AUDIENCE"),
            jwks_requests_per_minute: X::parse_config_variable("AUTH_JWKS_REQUESTS_PER_MINUTE", 5)?,
            cache_max_entries: X::parse_config_variable("AUTH_JWKS_CACHE_MAX_ENTRIES", 5)?,
            cache_max_age: Duration::from_secs(X::parse_config_variable("AUTH_JWKS_CACHE_MAX_AGE_SECS", 600)?),
            fetch_timeout: Duration::from_secs(X::parse_config_variable("AUTH_JWKS_TIMEOUT_SECS", 10)?),
            leeway_secs: X::parse_config_variable("AUTH_LEEWAY_SECS", 60)?
        })
    }
}


/// Where the HTTP server listens.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16
}

impl ServerConfig {

    pub fn from_config<X: GetConfigVariable>() -> Result<ServerConfig, CustomError> {
        Ok(ServerConfig {
            host: X::get_optional_variable("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: X::parse_config_variable("PORT", 8080)?
        })
    }
}


#[cfg(test)]
mod tests {

    use super::*;

    struct FakeConfig;

    impl GetConfigVariable for FakeConfig {

        fn get_config_variable(variable: &str) -> Result<String, CustomError> {
            match variable {
                "MONGODB_URI" => Ok("mongodb://localhost:27017/portal".to_string()),
                "ADMIN_PASSWORD" => Ok("hunter22".to_string()),
                "ADMIN_EMAIL" => Ok("admin@example.com".to_string()),
                "MONGODB_DATABASE" => Ok("  ".to_string()),
                "AUTH_JWKS_URI" => Ok("https://issuer.example.com/.well-known/jwks.json".to_string()),
                "AUTH_ISSUER" => Ok("https://issuer.example.com/".to_string()),
                "AUTH_JWKS_REQUESTS_PER_MINUTE" => Ok("10".to_string()),
                "PORT" => Ok("9090".to_string()),
                _ => Err(CustomError::new(format!("{} is not set", variable), CustomErrorStatus::Config))
            }
        }
    }

    struct BrokenConfig;

    impl GetConfigVariable for BrokenConfig {

        fn get_config_variable(variable: &str) -> Result<String, CustomError> {
            match variable {
                "PORT" => Ok("eighty".to_string()),
                _ => Err(CustomError::new(format!("{} is not set", variable), CustomErrorStatus::Config))
            }
        }
    }

    #[test]
    fn test_seed_config_defaults() {
        let config = SeedConfig::from_config::<FakeConfig>().unwrap();
        assert_eq!(config.mongodb_uri, "mongodb://localhost:27017/portal");
        assert_eq!(config.database, None);
        assert_eq!(config.admin_username, "admin");
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
    }

    #[test]
    fn test_seed_config_debug_hides_password() {
        let config = SeedConfig::from_config::<FakeConfig>().unwrap();
        assert!(!format!("{:?}", config).contains("hunter22"));
    }

    #[test]
    fn test_seed_config_missing_uri() {
        let error = SeedConfig::from_config::<BrokenConfig>().unwrap_err();
        assert_eq!(error.status, CustomErrorStatus::Config);
        assert_eq!(error.message, "MONGODB_URI is not set");
    }

    #[test]
    fn test_auth_config() {
        let config = AuthConfig::from_config::<FakeConfig>().unwrap();
        assert_eq!(config.issuer, "https://issuer.example.com/");
        assert_eq!(config.audience, None);
        assert_eq!(config.jwks_requests_per_minute, 10);
        assert_eq!(config.cache_max_entries, 5);
        assert_eq!(config.cache_max_age, Duration::from_secs(600));
        assert_eq!(config.leeway_secs, 60);
    }

    #[test]
    fn test_server_config() {
        let config = ServerConfig::from_config::<FakeConfig>().unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9090);

        let error = ServerConfig::from_config::<BrokenConfig>().unwrap_err();
        assert_eq!(error.message, "PORT is not a valid value");
    }
}
