//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! Lookups are cache-aside: a hit on a fresh set is served from memory, a
//! miss (or a stale hit) refreshes the whole set. Refreshes are single-flight:
//! concurrent callers that observed the same cache generation wait on one
//! outbound fetch and then re-read the cache instead of fetching again.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::Error;
use crate::types::KeyId;

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(600);
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// JWKS response from the endpoint.
#[derive(Debug, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

/// Individual JSON Web Key.
#[derive(Debug, Deserialize)]
pub struct Jwk {
    /// Key type (RSA, EC, OKP)
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    /// Key use (sig, enc)
    #[serde(rename = "use")]
    pub key_use: Option<String>,

    // RSA
    pub n: Option<String>,
    pub e: Option<String>,

    // EC / OKP
    pub crv: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
}

struct CachedKey {
    key: DecodingKey,
}

#[derive(Default)]
struct KeyCache {
    keys: HashMap<KeyId, CachedKey>,
    fetched_at: Option<Instant>,
    last_attempt: Option<Instant>,
    /// Bumped on every fetch attempt, successful or not.
    generation: u64,
}

enum Lookup {
    Fresh(DecodingKey),
    Stale(DecodingKey, u64),
    Missing(u64),
}

/// Remote key set for one issuer, filtered to the allow-listed algorithm.
pub struct KeyRing {
    jwks_uri: Url,
    algorithm: Algorithm,
    http: reqwest::Client,
    timeout: Duration,
    max_age: Duration,
    cooldown: Duration,
    cache: RwLock<KeyCache>,
    refresh_lock: tokio::sync::Mutex<()>,
    fetches: AtomicU64,
}

impl KeyRing {
    /// Creates an empty ring. Nothing is fetched until the first lookup.
    #[must_use]
    pub fn new(jwks_uri: Url, algorithm: Algorithm) -> Self {
        Self {
            jwks_uri,
            algorithm,
            http: reqwest::Client::new(),
            timeout: DEFAULT_TIMEOUT,
            max_age: DEFAULT_MAX_AGE,
            cooldown: DEFAULT_COOLDOWN,
            cache: RwLock::new(KeyCache::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
            fetches: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Deadline for one key set fetch.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long a fetched set is served without re-fetching.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Minimum gap between a fetch attempt and a lookup-triggered re-fetch.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn jwks_uri(&self) -> &Url {
        &self.jwks_uri
    }

    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Number of outbound key set fetches attempted so far.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Get a decoding key by key ID, refreshing the set once on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeySet`] if the key is still unknown after the
    /// refresh, or the fetch error if the set could not be retrieved.
    pub async fn get_key(&self, kid: &KeyId) -> Result<DecodingKey, Error> {
        match self.lookup(|cache| cache.keys.get(kid).map(|c| c.key.clone()))? {
            Lookup::Fresh(key) => Ok(key),
            Lookup::Stale(key, generation) => {
                if let Err(e) = self.refresh_after(generation).await {
                    warn!(kid = %kid, error = %e, "JWKS refresh failed, serving stale key");
                    return Ok(key);
                }
                self.cached(kid)?
                    .ok_or_else(|| Error::KeySet(format!("key '{kid}' was rotated out of JWKS")))
            }
            Lookup::Missing(generation) => {
                debug!(kid = %kid, "Key not found in cache, refreshing JWKS");
                self.refresh_after(generation).await?;
                self.cached(kid)?
                    .ok_or_else(|| Error::KeySet(format!("no key with kid '{kid}' in JWKS")))
            }
        }
    }

    /// Get the decoding key for a token without `kid`.
    ///
    /// Only unambiguous when the set holds exactly one usable key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeySet`] when the set is empty or holds several keys.
    pub async fn get_default_key(&self) -> Result<DecodingKey, Error> {
        let only_key = |cache: &KeyCache| {
            let mut keys = cache.keys.values();
            match (keys.next(), keys.next()) {
                (Some(only), None) => Some(only.key.clone()),
                _ => None,
            }
        };

        match self.lookup(only_key)? {
            Lookup::Fresh(key) => Ok(key),
            Lookup::Stale(key, generation) => {
                if let Err(e) = self.refresh_after(generation).await {
                    warn!(error = %e, "JWKS refresh failed, serving stale key");
                }
                Ok(only_key(&*self.read()?).unwrap_or(key))
            }
            Lookup::Missing(generation) => {
                self.refresh_after(generation).await?;
                only_key(&*self.read()?).ok_or_else(|| {
                    Error::KeySet("token has no kid and JWKS does not hold exactly one key".into())
                })
            }
        }
    }

    /// Force refresh the key set.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the previous set stays in place on failure.
    pub async fn refresh(&self) -> Result<usize, Error> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_store().await
    }

    /// Replace the cached set with `jwks`, keeping only keys usable with the
    /// allow-listed algorithm. Returns the number of keys kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeySet`] when no usable signing key remains.
    pub fn load(&self, jwks: Jwks) -> Result<usize, Error> {
        let mut new_keys = HashMap::new();
        for jwk in jwks.keys {
            // Skip encryption keys
            if jwk.key_use.as_deref() == Some("enc") {
                continue;
            }
            if !self.accepts(&jwk) {
                debug!(kid = ?jwk.kid, kty = %jwk.kty, alg = ?jwk.alg, "Skipping JWK for other algorithm");
                continue;
            }

            match jwk_to_decoding_key(&jwk) {
                Ok(key) => {
                    let kid = KeyId(jwk.kid.clone().unwrap_or_else(|| "default".to_string()));
                    debug!(kid = %kid, kty = %jwk.kty, "Loaded JWK");
                    new_keys.insert(kid, CachedKey { key });
                }
                Err(e) => {
                    warn!(kid = ?jwk.kid, kty = %jwk.kty, error = %e, "Failed to parse JWK, skipping");
                }
            }
        }

        if new_keys.is_empty() {
            return Err(Error::KeySet("no usable signing keys found in JWKS".into()));
        }

        let count = new_keys.len();
        let mut cache = self.write()?;
        cache.keys = new_keys;
        cache.fetched_at = Some(Instant::now());
        Ok(count)
    }

    /// Whether a key could ever verify a token signed with the allow-listed algorithm.
    fn accepts(&self, jwk: &Jwk) -> bool {
        let allowed = format!("{:?}", self.algorithm);
        if jwk.alg.as_deref().is_some_and(|alg| alg != allowed) {
            return false;
        }
        match jwk.kty.as_str() {
            "RSA" => matches!(
                self.algorithm,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            "EC" => matches!(
                (self.algorithm, jwk.crv.as_deref()),
                (Algorithm::ES256, Some("P-256")) | (Algorithm::ES384, Some("P-384"))
            ),
            "OKP" => matches!(
                (self.algorithm, jwk.crv.as_deref()),
                (Algorithm::EdDSA, Some("Ed25519"))
            ),
            _ => false,
        }
    }

    fn lookup(&self, find: impl Fn(&KeyCache) -> Option<DecodingKey>) -> Result<Lookup, Error> {
        let cache = self.read()?;
        let fresh = cache
            .fetched_at
            .is_some_and(|at| at.elapsed() < self.max_age);
        Ok(match (find(&*cache), fresh) {
            (Some(key), true) => Lookup::Fresh(key),
            (Some(key), false) => Lookup::Stale(key, cache.generation),
            (None, _) => Lookup::Missing(cache.generation),
        })
    }

    fn cached(&self, kid: &KeyId) -> Result<Option<DecodingKey>, Error> {
        Ok(self.read()?.keys.get(kid).map(|c| c.key.clone()))
    }

    /// Fetches unless another caller already did since `seen_generation`.
    ///
    /// Also skipped inside the cooldown window after any attempt, so neither
    /// tokens carrying random key ids nor an unreachable endpoint with stale
    /// keys cached can force a fetch per request.
    async fn refresh_after(&self, seen_generation: u64) -> Result<(), Error> {
        let _guard = self.refresh_lock.lock().await;
        {
            let cache = self.read()?;
            if cache.generation != seen_generation {
                return Ok(());
            }
            if cache
                .last_attempt
                .is_some_and(|at| at.elapsed() < self.cooldown)
            {
                debug!("JWKS refresh skipped, within cooldown");
                return Ok(());
            }
        }
        self.fetch_and_store().await.map(|_| ())
    }

    /// Caller must hold `refresh_lock`.
    ///
    /// The generation moves only once the attempt has finished, so callers
    /// queued behind this fetch see the change and skip their own.
    async fn fetch_and_store(&self) -> Result<usize, Error> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let result = match self.fetch().await {
            Ok(jwks) => self.load(jwks),
            Err(e) => Err(e),
        };
        {
            let mut cache = self.write()?;
            cache.generation += 1;
            cache.last_attempt = Some(Instant::now());
        }

        let count = result?;
        info!(url = %self.jwks_uri, key_count = count, "JWKS cache refreshed");
        Ok(count)
    }

    async fn fetch(&self) -> Result<Jwks, Error> {
        const OPERATION: &str = "JWKS fetch";

        debug!(url = %self.jwks_uri, "Fetching JWKS");
        let response = self
            .http
            .get(self.jwks_uri.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::from_transport(OPERATION, e))?;

        if !response.status().is_success() {
            return Err(Error::KeySet(format!(
                "JWKS endpoint returned status {}",
                response.status()
            )));
        }

        response
            .json::<Jwks>()
            .await
            .map_err(|e| Error::KeySet(format!("failed to parse JWKS: {e}")))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, KeyCache>, Error> {
        self.cache
            .read()
            .map_err(|_| Error::KeySet("key cache lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, KeyCache>, Error> {
        self.cache
            .write()
            .map_err(|_| Error::KeySet("key cache lock poisoned".into()))
    }
}

/// Convert a JWK to a DecodingKey.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, Error> {
    let missing = |field: &str| Error::KeySet(format!("{} key missing '{field}'", jwk.kty));
    let invalid = |e: jsonwebtoken::errors::Error| Error::KeySet(format!("invalid {} key: {e}", jwk.kty));

    match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk.n.as_deref().ok_or_else(|| missing("n"))?;
            let e = jwk.e.as_deref().ok_or_else(|| missing("e"))?;
            DecodingKey::from_rsa_components(n, e).map_err(invalid)
        }
        "EC" => {
            let x = jwk.x.as_deref().ok_or_else(|| missing("x"))?;
            let y = jwk.y.as_deref().ok_or_else(|| missing("y"))?;
            DecodingKey::from_ec_components(x, y).map_err(invalid)
        }
        "OKP" => {
            let x = jwk.x.as_deref().ok_or_else(|| missing("x"))?;
            DecodingKey::from_ed_components(x).map_err(invalid)
        }
        kty => Err(Error::KeySet(format!("unsupported key type: {kty}"))),
    }
}
