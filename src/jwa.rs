//! Signing algorithm families accepted by the filter
//!
//! The set mirrors what issuers in the wild actually publish: HMAC with a
//! shared secret, RSA PKCS#1 v1.5, and ECDSA over the three NIST prime
//! curves. `none` is not representable here and is rejected during token
//! decomposition.

use std::{fmt, str::FromStr};

use crate::error;

pub mod ec;
pub mod hmac;
pub mod rsa;

/// A JSON Web Signature algorithm
#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Algorithm {
    /// HMAC symmetric
    Hmac(hmac::SigningAlgorithm),

    /// RSA PKCS#1 v1.5 public/private key pair
    Rsa(rsa::SigningAlgorithm),

    /// Elliptic curve cryptography
    EllipticCurve(ec::SigningAlgorithm),
}

impl Algorithm {
    /// The HS256 signing algorithm
    pub const HS256: Algorithm = Self::Hmac(hmac::SigningAlgorithm::HS256);
    /// The HS384 signing algorithm
    pub const HS384: Algorithm = Self::Hmac(hmac::SigningAlgorithm::HS384);
    /// The HS512 signing algorithm
    pub const HS512: Algorithm = Self::Hmac(hmac::SigningAlgorithm::HS512);

    /// The RS256 signing algorithm
    pub const RS256: Algorithm = Self::Rsa(rsa::SigningAlgorithm::RS256);
    /// The RS384 signing algorithm
    pub const RS384: Algorithm = Self::Rsa(rsa::SigningAlgorithm::RS384);
    /// The RS512 signing algorithm
    pub const RS512: Algorithm = Self::Rsa(rsa::SigningAlgorithm::RS512);

    /// The ES256 signing algorithm
    pub const ES256: Algorithm = Self::EllipticCurve(ec::SigningAlgorithm::ES256);
    /// The ES384 signing algorithm
    pub const ES384: Algorithm = Self::EllipticCurve(ec::SigningAlgorithm::ES384);
    /// The ES512 signing algorithm
    pub const ES512: Algorithm = Self::EllipticCurve(ec::SigningAlgorithm::ES512);
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Hmac(a) => fmt::Display::fmt(a, f),
            Self::Rsa(a) => fmt::Display::fmt(a, f),
            Self::EllipticCurve(a) => fmt::Display::fmt(a, f),
        }
    }
}

impl FromStr for Algorithm {
    type Err = error::UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let alg = match s {
            "HS256" => Self::HS256,
            "HS384" => Self::HS384,
            "HS512" => Self::HS512,
            "RS256" => Self::RS256,
            "RS384" => Self::RS384,
            "RS512" => Self::RS512,
            "ES256" => Self::ES256,
            "ES384" => Self::ES384,
            "ES512" => Self::ES512,
            other => return Err(error::unknown_algorithm(other.to_owned())),
        };

        Ok(alg)
    }
}

impl From<hmac::SigningAlgorithm> for Algorithm {
    fn from(alg: hmac::SigningAlgorithm) -> Self {
        Self::Hmac(alg)
    }
}

impl From<rsa::SigningAlgorithm> for Algorithm {
    fn from(alg: rsa::SigningAlgorithm) -> Self {
        Self::Rsa(alg)
    }
}

impl From<ec::SigningAlgorithm> for Algorithm {
    fn from(alg: ec::SigningAlgorithm) -> Self {
        Self::EllipticCurve(alg)
    }
}
