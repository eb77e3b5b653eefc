//! Verifies bearer tokens signed by the identity provider and exposes their claims to views.
use std::sync::Arc;

use actix_web::dev::Payload;
use actix_web::error::ErrorUnauthorized;
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::{Ready, err, ok};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::AuthConfig;
use crate::errors::{AuthError, CustomError};
use crate::jwks::{JwksOptions, JwksProvider, RemoteKeySet};


/// The `aud` claim, which may be a single string or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>)
}


/// The claims of a verified token.
///
/// # Fields
/// * `sub`: the subject the token was issued for
/// * `iss`: who issued the token
/// * `aud`: who the token is meant for
/// * `exp`: expiry as seconds since the epoch
/// * `iat`: issue time as seconds since the epoch
/// * `nbf`: the token is not valid before this time
/// * `extra`: every other claim the token carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>
}


/// Checks tokens against the issuer's key set.
///
/// # Fields
/// * `provider`: where signing keys come from
/// * `issuer`: the `iss` every token must carry
/// * `audience`: the `aud` tokens must carry, not checked when `None`
/// * `algorithms`: header algorithms that are accepted
/// * `leeway`: clock skew allowed on time based claims, in seconds
pub struct JwtVerifier {
    provider: Arc<JwksProvider>,
    issuer: String,
    audience: Option<String>,
    algorithms: Vec<Algorithm>,
    leeway: u64
}

impl JwtVerifier {

    pub fn new(provider: JwksProvider, issuer: impl Into<String>) -> JwtVerifier {
        JwtVerifier {
            provider: Arc::new(provider),
            issuer: issuer.into(),
            audience: None,
            algorithms: vec![Algorithm::RS256],
            leeway: 60
        }
    }

    /// Builds a verifier that fetches keys from the configured endpoint.
    pub fn from_config(config: &AuthConfig) -> Result<JwtVerifier, CustomError> {
        let fetcher = RemoteKeySet::new(config.jwks_uri.clone(), config.fetch_timeout)?;
        let options = JwksOptions {
            requests_per_minute: config.jwks_requests_per_minute,
            cache_max_entries: config.cache_max_entries,
            cache_max_age: config.cache_max_age
        };
        let mut verifier = JwtVerifier::new(JwksProvider::new(Box::new(fetcher), options), config.issuer.clone())
            .with_leeway(config.leeway_secs);
        if let Some(audience) = &config.audience {
            verifier = verifier.with_audience(audience.clone());
        }
        Ok(verifier)
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> JwtVerifier {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> JwtVerifier {
        self.algorithms = algorithms;
        self
    }

    pub fn with_leeway(mut self, leeway: u64) -> JwtVerifier {
        self.leeway = leeway;
        self
    }

    /// Verifies the token and returns its claims.
    ///
    /// # Arguments
    /// * `token` - The raw token without the `Bearer` prefix.
    ///
    /// # Returns
    /// the decoded claims, or why the token was rejected
    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::Malformed)?;
        if !self.algorithms.contains(&header.alg) {
            return Err(AuthError::InvalidAlgorithm)
        }

        let jwk = self.provider.signing_key(header.kid.as_deref()).await?;
        let key = DecodingKey::from_jwk(&jwk)
            .map_err(|error| AuthError::KeyNotFound(format!("unusable signing key: {}", error)))?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.set_issuer(&[self.issuer.as_str()]);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false
        }

        decode::<Claims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(map_jwt_error)
    }
}


fn map_jwt_error(error: jsonwebtoken::errors::Error) -> AuthError {
    match error.kind() {
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::ImmatureSignature => AuthError::NotYetValid,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidAlgorithm => AuthError::InvalidAlgorithm,
        ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => AuthError::InvalidIssuer,
        ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => AuthError::InvalidAudience,
        _ => AuthError::Malformed
    }
}


impl FromRequest for Claims {
    type Error = Error;
    type Future = Ready<Result<Claims, Error>>;

    /// Hands a view the claims the bearer middleware attached to the request.
    ///
    /// # Arguments
    /// * req (&HttpRequest): the request the claims were attached to
    /// * _ (Payload): the payload stream (not used in this function but is needed)
    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.extensions().get::<Claims>() {
            Some(claims) => ok(claims.clone()),
            None => err(ErrorUnauthorized(AuthError::Missing.to_string()))
        }
    }
}
