//! Fetches, caches and rate limits the signing keys published at a JWKS endpoint.
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, PublicKeyUse};
use log::{debug, warn};
use serde_json::Value;

use crate::errors::{AuthError, CustomError, CustomErrorStatus};
use crate::safe_eject;


const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);


/// Defines where a key set comes from.
#[async_trait]
pub trait FetchKeySet: Send + Sync {

    /// Fetches the full key set.
    ///
    /// # Returns
    /// * `Result<JwkSet, AuthError>` - the keys or `AuthError::KeySetUnavailable`
    async fn fetch_key_set(&self) -> Result<JwkSet, AuthError>;
}


/// Fetches the key set over HTTP.
pub struct RemoteKeySet {
    client: reqwest::Client,
    uri: String
}

impl RemoteKeySet {

    /// # Arguments
    /// * `uri` - the JWKS endpoint
    /// * `timeout` - how long a single fetch may take
    pub fn new(uri: impl Into<String>, timeout: Duration) -> Result<RemoteKeySet, CustomError> {
        let client = safe_eject!(
            reqwest::Client::builder().timeout(timeout).build(),
            CustomErrorStatus::Config,
            "building key set client"
        )?;
        Ok(RemoteKeySet {
            client,
            uri: uri.into()
        })
    }
}

#[async_trait]
impl FetchKeySet for RemoteKeySet {

    async fn fetch_key_set(&self) -> Result<JwkSet, AuthError> {
        debug!("fetching key set from {}", self.uri);
        let unavailable = |error: reqwest::Error| AuthError::KeySetUnavailable(error.to_string());

        let response = self.client.get(&self.uri)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?;
        let body: Value = response.json().await.map_err(unavailable)?;
        parse_key_set(&body)
    }
}


/// Serves a fixed key set, for tests and setups without a remote endpoint.
pub struct StaticKeySet(pub JwkSet);

#[async_trait]
impl FetchKeySet for StaticKeySet {

    async fn fetch_key_set(&self) -> Result<JwkSet, AuthError> {
        Ok(self.0.clone())
    }
}


/// Parses a JWKS document key by key, skipping keys that can't be understood.
///
/// # Arguments
/// * `body` - the JSON document served by the endpoint
pub fn parse_key_set(body: &Value) -> Result<JwkSet, AuthError> {
    let raw_keys = body.get("keys")
        .and_then(Value::as_array)
        .ok_or_else(|| AuthError::KeySetUnavailable("response has no keys array".to_string()))?;

    let keys = raw_keys.iter()
        .filter_map(|raw| match serde_json::from_value::<Jwk>(raw.clone()) {
            Ok(jwk) => Some(jwk),
            Err(error) => {
                debug!("skipping key set entry: {}", error);
                None
            }
        })
        .collect();
    Ok(JwkSet { keys })
}


fn is_signing_key(jwk: &Jwk) -> bool {
    let usable_use = matches!(jwk.common.public_key_use, None | Some(PublicKeyUse::Signature));
    let asymmetric = matches!(
        jwk.algorithm,
        AlgorithmParameters::RSA(_) | AlgorithmParameters::EllipticCurve(_) | AlgorithmParameters::OctetKeyPair(_)
    );
    usable_use && asymmetric
}


/// Picks the key a token names out of a key set.
///
/// # Arguments
/// * `set` - the fetched key set
/// * `kid` - the key id from the token header
///
/// # Returns
/// the matching signing key; without a `kid` the set must hold exactly one signing key
pub fn select_signing_key(set: &JwkSet, kid: Option<&str>) -> Result<Jwk, AuthError> {
    let signing_keys: Vec<&Jwk> = set.keys.iter().filter(|jwk| is_signing_key(jwk)).collect();

    match kid {
        Some(kid) => signing_keys.into_iter()
            .find(|jwk| jwk.common.key_id.as_deref() == Some(kid))
            .cloned()
            .ok_or_else(|| AuthError::KeyNotFound(format!("no signing key with kid {}", kid))),
        None => match signing_keys.as_slice() {
            [only] => Ok((*only).clone()),
            [] => Err(AuthError::KeyNotFound("key set has no signing keys".to_string())),
            _ => Err(AuthError::KeyNotFound("token has no kid and the key set has several signing keys".to_string()))
        }
    }
}


/// Tuning for the key provider.
///
/// # Fields
/// * `requests_per_minute` - fetches allowed in any 60 second window
/// * `cache_max_entries` - keys kept at once
/// * `cache_max_age` - how long a key is trusted before it is fetched again
#[derive(Debug, Clone, Copy)]
pub struct JwksOptions {
    pub requests_per_minute: usize,
    pub cache_max_entries: usize,
    pub cache_max_age: Duration
}

impl Default for JwksOptions {

    fn default() -> Self {
        JwksOptions {
            requests_per_minute: 5,
            cache_max_entries: 5,
            cache_max_age: Duration::from_secs(600)
        }
    }
}


struct CachedKey {
    jwk: Jwk,
    fetched_at: Instant,
    last_used: Instant
}


// keyed by the token's kid; tokens without one share the `None` entry
struct KeyCache {
    entries: HashMap<Option<String>, CachedKey>,
    max_entries: usize,
    max_age: Duration
}

impl KeyCache {

    fn new(max_entries: usize, max_age: Duration) -> KeyCache {
        KeyCache {
            entries: HashMap::new(),
            max_entries,
            max_age
        }
    }

    fn get(&mut self, kid: Option<&str>, now: Instant) -> Option<Jwk> {
        let key = kid.map(str::to_string);
        let expired = match self.entries.get_mut(&key) {
            Some(entry) if now.duration_since(entry.fetched_at) < self.max_age => {
                entry.last_used = now;
                return Some(entry.jwk.clone())
            },
            Some(_) => true,
            None => false
        };
        if expired {
            self.entries.remove(&key);
        }
        None
    }

    fn insert(&mut self, kid: Option<&str>, jwk: Jwk, now: Instant) {
        if self.max_entries == 0 {
            return
        }
        let key = kid.map(str::to_string);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            let oldest = self.entries.iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, CachedKey { jwk, fetched_at: now, last_used: now });
    }
}


struct RateLimiter {
    limit: usize,
    window: Duration,
    requests: VecDeque<Instant>
}

impl RateLimiter {

    fn new(limit: usize, window: Duration) -> RateLimiter {
        RateLimiter {
            limit,
            window,
            requests: VecDeque::new()
        }
    }

    fn try_acquire(&mut self, now: Instant) -> bool {
        while let Some(front) = self.requests.front() {
            if now.duration_since(*front) >= self.window {
                self.requests.pop_front();
            } else {
                break
            }
        }
        if self.requests.len() < self.limit {
            self.requests.push_back(now);
            return true
        }
        false
    }
}


/// Hands out signing keys by `kid`, fetching the key set only on cache misses.
pub struct JwksProvider {
    fetcher: Box<dyn FetchKeySet>,
    cache: Mutex<KeyCache>,
    limiter: Mutex<RateLimiter>,
    fetch_lock: tokio::sync::Mutex<()>
}

impl JwksProvider {

    pub fn new(fetcher: Box<dyn FetchKeySet>, options: JwksOptions) -> JwksProvider {
        JwksProvider {
            fetcher,
            cache: Mutex::new(KeyCache::new(options.cache_max_entries, options.cache_max_age)),
            limiter: Mutex::new(RateLimiter::new(options.requests_per_minute, RATE_LIMIT_WINDOW)),
            fetch_lock: tokio::sync::Mutex::new(())
        }
    }

    fn cached(&self, kid: Option<&str>) -> Option<Jwk> {
        self.cache.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kid, Instant::now())
    }

    /// Gets the signing key for a token.
    ///
    /// # Arguments
    /// * `kid` - the key id from the token header, if it has one
    ///
    /// # Returns
    /// * `Result<Jwk, AuthError>` - the key, or why it couldn't be obtained
    pub async fn signing_key(&self, kid: Option<&str>) -> Result<Jwk, AuthError> {
        if let Some(jwk) = self.cached(kid) {
            return Ok(jwk)
        }

        let _fetching = self.fetch_lock.lock().await;
        // a fetch that finished while we waited may have brought the key
        if let Some(jwk) = self.cached(kid) {
            return Ok(jwk)
        }

        let allowed = self.limiter.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire(Instant::now());
        if !allowed {
            warn!("key set fetch rate limit reached, rejecting kid {:?}", kid);
            return Err(AuthError::RateLimited)
        }

        debug!("signing key cache miss for kid {:?}", kid);
        let set = self.fetcher.fetch_key_set().await?;
        let jwk = select_signing_key(&set, kid)?;

        self.cache.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kid, jwk.clone(), Instant::now());
        Ok(jwk)
    }
}
