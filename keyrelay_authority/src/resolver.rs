use std::{sync::Arc, time::Duration};

use keyrelay_jose::{
    clock::{Clock, System},
    jwk::{KeyIdRef, RsaPublicKey},
    Jwks,
};
use reqwest::{
    header::{self, HeaderValue},
    Client, StatusCode, Url,
};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::{FetchLimiter, KeyCache, SharedClock};

/// Reasons a signing key could not be produced
#[derive(Debug, Error)]
pub enum KeyResolutionError {
    /// The key set was not fetched because the fetch limit was reached
    #[error("key set fetch limit reached")]
    RateLimited,

    /// The freshly fetched key set holds no usable key with the requested ID
    #[error("no signing key found with the requested key ID")]
    UnknownKeyId,

    /// The key set endpoint could not be reached
    #[error("unable to reach key set endpoint")]
    Send(#[source] reqwest::Error),

    /// The key set endpoint answered with a non-success status
    #[error("key set endpoint responded with {0}")]
    Status(StatusCode),

    /// The key set endpoint answered with something other than a key set
    #[error("key set endpoint responded with a malformed key set")]
    Malformed(#[source] reqwest::Error),
}

/// Tunables for a [`KeyResolver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Key set fetches admitted per minute, in a burst of at most this many
    pub requests_per_minute: usize,

    /// How long fetched keys are served from the cache
    pub cache_max_age: Duration,

    /// Maximum number of keys kept from a fetched key set
    pub cache_max_entries: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            requests_per_minute: 5,
            cache_max_age: Duration::from_secs(600),
            cache_max_entries: 5,
        }
    }
}

#[derive(Debug)]
struct FetchState {
    limiter: FetchLimiter,
    etag: Option<HeaderValue>,
}

/// Resolves key IDs to RSA public keys from a remote JSON Web Key Set
///
/// Keys are fetched lazily, on the first request for an ID that is not
/// cached. Fetches are serialized: concurrent misses wait for the fetch in
/// flight and then find the key in the cache.
#[derive(Debug)]
pub struct KeyResolver<C = System> {
    jwks_url: Url,
    client: Client,
    cache: KeyCache,
    fetch: Mutex<FetchState>,
    clock: Arc<C>,
}

impl KeyResolver {
    /// A resolver for the key set at `jwks_url` using default options
    #[must_use]
    pub fn new(jwks_url: Url, client: Client) -> Self {
        Self::with_clock(jwks_url, client, ResolverOptions::default(), System)
    }

    /// A resolver for the key set at `jwks_url`
    #[must_use]
    pub fn with_options(jwks_url: Url, client: Client, options: ResolverOptions) -> Self {
        Self::with_clock(jwks_url, client, options, System)
    }
}

impl<C: Clock + Send + Sync + 'static> KeyResolver<C> {
    /// A resolver reading the time from `clock`
    #[must_use]
    pub fn with_clock(jwks_url: Url, client: Client, options: ResolverOptions, clock: C) -> Self {
        let clock = Arc::new(clock);
        let limiter_clock: SharedClock = clock.clone();

        Self {
            jwks_url,
            client,
            cache: KeyCache::new(options.cache_max_age, options.cache_max_entries),
            fetch: Mutex::new(FetchState {
                limiter: FetchLimiter::per_minute(options.requests_per_minute, limiter_clock),
                etag: None,
            }),
            clock,
        }
    }
}

impl<C: Clock> KeyResolver<C> {

    /// The clock used for cache ages and fetch limits
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Resolves `kid` to a public key, fetching the key set if needed
    ///
    /// # Errors
    ///
    /// The fetch limit is exhausted, the key set cannot be fetched, or the
    /// fetched key set does not contain `kid`.
    #[tracing::instrument(skip_all, fields(jwk.kid = %kid))]
    pub async fn resolve(&self, kid: &KeyIdRef) -> Result<Arc<RsaPublicKey>, KeyResolutionError> {
        if let Some(key) = self.cache.get(kid, self.clock.now()) {
            return Ok(key);
        }

        let mut state = self.fetch.lock().await;

        if let Some(key) = self.cache.get(kid, self.clock.now()) {
            tracing::debug!("key populated by concurrent fetch");
            return Ok(key);
        }

        if !state.limiter.try_acquire() {
            tracing::warn!(jwks.url = %self.jwks_url, "JWKS fetch limit reached");
            return Err(KeyResolutionError::RateLimited);
        }

        self.fetch_keys(&mut state).await?;

        self.cache.get(kid, self.clock.now()).ok_or_else(|| {
            tracing::debug!("unable to find matching key");
            KeyResolutionError::UnknownKeyId
        })
    }

    async fn fetch_keys(&self, state: &mut FetchState) -> Result<(), KeyResolutionError> {
        tracing::debug!(jwks.url = %self.jwks_url, "fetching JWKS");

        let mut request = self.client.get(self.jwks_url.clone());
        if let Some(etag) = &state.etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }

        let response = request.send().await.map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(error, "JWKS fetch failed; endpoint unreachable");
            KeyResolutionError::Send(err)
        })?;

        if response.status() == StatusCode::NOT_MODIFIED {
            tracing::debug!("JWKS not modified");
            self.cache.touch(self.clock.now());
            return Ok(());
        } else if let Err(err) = response.error_for_status_ref() {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(
                error,
                http.status_code = response.status().as_u16(),
                "JWKS fetch failed; unexpected response status",
            );
            return Err(KeyResolutionError::Status(response.status()));
        }

        let etag = response.headers().get(header::ETAG).map(ToOwned::to_owned);

        let jwks = response.json::<Jwks>().await.map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(error, "JWKS fetch failed; malformed key set");
            KeyResolutionError::Malformed(err)
        })?;

        let retained = self.cache.replace(&jwks, self.clock.now());
        state.etag = etag;

        tracing::info!(
            jwks.url = %self.jwks_url,
            jwks.keys = jwks.keys().len(),
            jwks.retained = retained,
            "JWKS refreshed"
        );

        Ok(())
    }
}
