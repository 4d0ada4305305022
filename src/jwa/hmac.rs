//! HMAC JSON Web Algorithm implementations

use std::fmt;

use aliri_base64::{Base64Url, Base64UrlRef};

use crate::error;

/// HMAC shared secret
#[derive(Clone, PartialEq, Eq)]
#[must_use]
pub struct Hmac {
    secret: Base64Url,
}

impl fmt::Debug for Hmac {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Hmac { secret }")
    }
}

impl Hmac {
    /// HMAC using the provided secret
    pub fn new(secret: impl Into<Base64Url>) -> Self {
        let secret = secret.into();
        Self { secret }
    }

    pub(crate) fn secret(&self) -> &Base64UrlRef {
        &self.secret
    }

    pub(crate) fn verify(
        &self,
        alg: SigningAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), error::SignatureMismatch> {
        let key = ring::hmac::Key::new(alg.into_ring_algorithm(), self.secret.as_slice());
        ring::hmac::verify(&key, data, signature).map_err(|_| error::signature_mismatch())
    }
}

/// HMAC signing algorithms
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
#[non_exhaustive]
pub enum SigningAlgorithm {
    /// HMAC using SHA-256
    HS256,
    /// HMAC using SHA-384
    HS384,
    /// HMAC using SHA-512
    HS512,
}

impl SigningAlgorithm {
    fn into_ring_algorithm(self) -> ring::hmac::Algorithm {
        match self {
            SigningAlgorithm::HS256 => ring::hmac::HMAC_SHA256,
            SigningAlgorithm::HS384 => ring::hmac::HMAC_SHA384,
            SigningAlgorithm::HS512 => ring::hmac::HMAC_SHA512,
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
        };

        f.write_str(s)
    }
}
