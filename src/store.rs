//! The process-lifetime store of issuer verification keys
//!
//! Keys are shared across requests; the store is mutated only by the
//! resolver. Entries are insert-only: keys observed once are never
//! evicted, so overlapping key-validity windows during issuer rotation
//! stay verifiable. Reads vastly outnumber writes, so the map sits
//! behind a readers-preferring lock rather than anything fancier.

use std::{collections::HashMap, sync::RwLock};

use crate::{
    issuer::{Issuer, IssuerRef},
    jwa,
    jwk::{Jwk, KeyIdRef},
    jwks::Jwks,
};

/// Thread-safe mapping of `(issuer, key id)` to verification keys
#[derive(Debug, Default)]
pub struct KeyStore {
    keys: RwLock<HashMap<Issuer, Jwks>>,
}

impl KeyStore {
    /// Constructs an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a key for the issuer compatible with the algorithm
    ///
    /// When `kid` is absent the first compatible key for the issuer is
    /// returned.
    #[must_use]
    pub fn get(
        &self,
        issuer: &IssuerRef,
        kid: Option<&KeyIdRef>,
        alg: jwa::Algorithm,
    ) -> Option<Jwk> {
        let guard = self.keys.read().expect("key store lock poisoned");
        guard
            .get(issuer)
            .and_then(|jwks| jwks.get_key_by_opt(kid, alg))
            .cloned()
    }

    /// Inserts a batch of keys fetched for the issuer
    ///
    /// Keys without an ID receive one derived from their RFC 7638
    /// thumbprint. Insertion is idempotent: a key bearing an ID already
    /// present replaces it (last write wins). If two keys in the same
    /// batch derive the same ID, the first wins and the later one is
    /// rejected.
    pub fn insert(&self, issuer: &IssuerRef, incoming: Vec<Jwk>) {
        let mut batch_ids: Vec<crate::jwk::KeyId> = Vec::with_capacity(incoming.len());
        let mut guard = self.keys.write().expect("key store lock poisoned");
        let jwks = guard.entry(issuer.to_owned()).or_default();

        for key in incoming {
            let (key, kid) = match key.key_id() {
                Some(kid) => {
                    let kid = kid.to_owned();
                    (key, kid)
                }
                None => {
                    let derived = key.thumbprint();
                    (key.with_key_id(derived.clone()), derived)
                }
            };

            if batch_ids.contains(&kid) {
                tracing::debug!(%kid, "rejecting key with colliding derived id");
                continue;
            }

            batch_ids.push(kid);
            jwks.add_key(key);
        }
    }

    /// The number of keys currently held for the issuer
    #[must_use]
    pub fn len(&self, issuer: &IssuerRef) -> usize {
        let guard = self.keys.read().expect("key store lock poisoned");
        guard.get(issuer).map_or(0, |jwks| jwks.keys().len())
    }

    /// Whether the store holds no keys for the issuer
    #[must_use]
    pub fn is_empty(&self, issuer: &IssuerRef) -> bool {
        self.len(issuer) == 0
    }
}
