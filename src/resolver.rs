//! On-demand discovery of issuer-hosted key sets
//!
//! The resolver answers "give me the key for `(issuer, kid)`". A store
//! hit costs a read lock; a miss fetches the issuer's JWKS document,
//! folds every decodable key into the store, and looks again. Because a
//! miss is also how key rotation is discovered, a token presenting an
//! unknown `kid` transparently triggers the refetch that picks up the
//! issuer's new keys.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;

use crate::{
    error::{self, KeyUnavailable},
    issuer::{Issuer, IssuerRef},
    jwa,
    jwk::{Jwk, KeyIdRef},
    jwks::Jwks,
    store::KeyStore,
};

/// Relative location of the key set document under an issuer URL
const JWKS_PATH: &str = ".well-known/jwks.json";

/// An unresponsive issuer holds up only its own tokens, and not forever
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches, caches, and refreshes issuer key sets
#[derive(Debug)]
pub struct JwksResolver {
    client: reqwest::Client,
    store: KeyStore,
    fetches: Mutex<HashMap<Issuer, Arc<Mutex<()>>>>,
}

impl JwksResolver {
    /// Constructs a resolver with an empty store
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, error::ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(error::ConfigError::HttpClient)?;

        Ok(Self {
            client,
            store: KeyStore::new(),
            fetches: Mutex::new(HashMap::new()),
        })
    }

    /// The underlying key store
    #[must_use]
    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    /// Resolves the verification key for `(issuer, kid)`
    ///
    /// Concurrent misses for the same issuer are collapsed into a single
    /// fetch; resolves for other issuers proceed independently.
    ///
    /// # Errors
    ///
    /// Returns an error if the key set cannot be fetched or decoded, or
    /// if no matching key exists after a refresh.
    pub async fn resolve(
        &self,
        issuer: &IssuerRef,
        kid: Option<&KeyIdRef>,
        alg: jwa::Algorithm,
    ) -> Result<Jwk, KeyUnavailable> {
        if let Some(key) = self.store.get(issuer, kid, alg) {
            return Ok(key);
        }

        let issuer_lock = {
            let mut fetches = self.fetches.lock().await;
            Arc::clone(fetches.entry(issuer.to_owned()).or_default())
        };
        let _fetching = issuer_lock.lock().await;

        // Another request may have refreshed while this one waited.
        if let Some(key) = self.store.get(issuer, kid, alg) {
            return Ok(key);
        }

        self.refresh(issuer).await?;

        self.store.get(issuer, kid, alg).ok_or_else(|| {
            error::key_unavailable(format!(
                "issuer key set has no key matching kid {kid:?} for {alg}"
            ))
        })
    }

    /// Fetches the issuer's key set and folds it into the store
    ///
    /// # Errors
    ///
    /// Returns an error on a non-success response or an undecodable
    /// document.
    pub async fn refresh(&self, issuer: &IssuerRef) -> Result<(), KeyUnavailable> {
        let url = format!("{issuer}{JWKS_PATH}");
        tracing::debug!(%issuer, %url, "refreshing issuer key set");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(error::key_unavailable)?;

        if !response.status().is_success() {
            return Err(error::key_unavailable(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let jwks: Jwks = response.json().await.map_err(error::key_unavailable)?;

        self.store.insert(issuer, jwks.into_keys());
        Ok(())
    }
}
