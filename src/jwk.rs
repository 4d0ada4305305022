//! JSON Web Keys (RFC 7517) as used by the filter
//!
//! Keys arrive from two places: an issuer-hosted JWKS document, or the
//! operator's static `secret` (an HMAC shared secret or a PEM-encoded
//! public key). Both are normalized into [`Jwk`] so the verifier has a
//! single dispatch point.

use std::fmt;

use aliri_base64::Base64Url;
use aliri_braid::braid;
use serde::Deserialize;

use crate::{
    error,
    jwa::{self, ec, hmac::Hmac, rsa},
};

/// An identifier for a JWK
#[braid(serde, ref_doc = "A borrowed reference to a JWK identifier ([`KeyId`])")]
pub struct KeyId;

/// Declared key usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Usage {
    Signing,
    Other,
}

impl Usage {
    fn from_name(name: &str) -> Self {
        if name == "sig" {
            Self::Signing
        } else {
            Self::Other
        }
    }
}

/// An identified JSON Web Key
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "JwkDto")]
#[must_use]
pub struct Jwk {
    key_id: Option<KeyId>,
    usage: Option<Usage>,
    algorithm: Option<jwa::Algorithm>,
    key: Key,
}

impl fmt::Debug for Jwk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Jwk")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl Jwk {
    /// The key ID
    #[must_use]
    pub fn key_id(&self) -> Option<&KeyIdRef> {
        self.key_id.as_deref()
    }

    /// The algorithm tag declared by the key, if it was recognized
    #[must_use]
    pub fn algorithm(&self) -> Option<jwa::Algorithm> {
        self.algorithm
    }

    /// Sets the key ID
    pub fn with_key_id(self, kid: KeyId) -> Self {
        Self {
            key_id: Some(kid),
            ..self
        }
    }

    /// Sets the algorithm tag
    pub fn with_algorithm(self, alg: jwa::Algorithm) -> Self {
        Self {
            algorithm: Some(alg),
            ..self
        }
    }

    /// Parses static key material as configured by the operator
    ///
    /// A value that begins with a PEM preamble is decoded as an RSA or EC
    /// public key; anything else is taken verbatim as an HMAC shared
    /// secret.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKey`][crate::error::ConfigError::InvalidKey]
    /// when the value looks like PEM but cannot be decoded.
    pub fn from_secret(secret: &str) -> Result<Self, error::ConfigError> {
        if !secret.trim_start().starts_with("-----BEGIN") {
            return Ok(Self::from(Hmac::new(secret.as_bytes())));
        }

        if let Ok(key) = rsa::PublicKey::from_pem(secret) {
            return Ok(Self::from(key));
        }

        ec::PublicKey::from_pem(secret)
            .map(Self::from)
            .map_err(|_| error::ConfigError::InvalidKey)
    }

    /// Whether the key can plausibly verify signatures under the algorithm
    ///
    /// The key family must match and any declared algorithm tag must agree.
    #[must_use]
    pub fn is_compatible(&self, alg: jwa::Algorithm) -> bool {
        if !self.key.is_family(alg) {
            return false;
        }

        match self.algorithm {
            Some(key_alg) => key_alg == alg,
            None => true,
        }
    }

    /// Verifies `signature` over `data` under the given algorithm
    ///
    /// # Errors
    ///
    /// Returns an error if the key is incompatible with the algorithm, the
    /// key's declared usage forbids signing, or the signature does not
    /// match.
    pub fn verify(
        &self,
        alg: jwa::Algorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), error::JwkVerifyError> {
        if let Some(usage) = self.usage {
            if usage != Usage::Signing {
                return Err(error::key_usage_mismatch().into());
            }
        }

        if !self.is_compatible(alg) {
            return Err(error::incompatible_algorithm(alg).into());
        }

        match (&self.key, alg) {
            (Key::Hmac(key), jwa::Algorithm::Hmac(alg)) => {
                key.verify(alg, data, signature)?;
            }
            (Key::Rsa(key), jwa::Algorithm::Rsa(alg)) => {
                key.verify(alg, data, signature)?;
            }
            (Key::EllipticCurve(key), jwa::Algorithm::EllipticCurve(alg)) => {
                let hint = match self.algorithm {
                    Some(jwa::Algorithm::EllipticCurve(a)) => Some(a),
                    _ => Some(alg),
                };
                let curve = key
                    .effective_curve(hint)
                    .ok_or_else(error::signature_mismatch)?;
                key.verify(alg, curve, data, signature)?;
            }
            _ => return Err(error::incompatible_algorithm(alg).into()),
        }

        Ok(())
    }

    /// Derives a key ID from the key material per RFC 7638
    ///
    /// The thumbprint is the base64url SHA-256 digest of the canonical
    /// JSON containing only the key type's required members, in
    /// lexicographic order.
    pub fn thumbprint(&self) -> KeyId {
        let canonical = match &self.key {
            Key::Rsa(key) => format!(
                r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#,
                key.exponent(),
                key.modulus()
            ),
            Key::EllipticCurve(key) => {
                let crv = key
                    .effective_curve(None)
                    .map_or("P-256", ec::Curve::name);
                format!(
                    r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
                    crv,
                    key.x(),
                    key.y()
                )
            }
            Key::Hmac(key) => format!(r#"{{"k":"{}","kty":"oct"}}"#, key.secret()),
        };

        let digest = ring::digest::digest(&ring::digest::SHA256, canonical.as_bytes());
        KeyId::new(Base64Url::from_raw(digest.as_ref().to_vec()).to_string())
    }
}

impl From<Hmac> for Jwk {
    fn from(key: Hmac) -> Self {
        Self {
            key_id: None,
            usage: None,
            algorithm: None,
            key: Key::Hmac(key),
        }
    }
}

impl From<rsa::PublicKey> for Jwk {
    fn from(key: rsa::PublicKey) -> Self {
        Self {
            key_id: None,
            usage: None,
            algorithm: None,
            key: Key::Rsa(key),
        }
    }
}

impl From<ec::PublicKey> for Jwk {
    fn from(key: ec::PublicKey) -> Self {
        Self {
            key_id: None,
            usage: None,
            algorithm: None,
            key: Key::EllipticCurve(key),
        }
    }
}

/// Key material by JWK key type
#[derive(Clone, PartialEq, Eq)]
enum Key {
    Rsa(rsa::PublicKey),
    EllipticCurve(ec::PublicKey),
    Hmac(Hmac),
}

impl Key {
    fn is_family(&self, alg: jwa::Algorithm) -> bool {
        matches!(
            (self, alg),
            (Self::Hmac(_), jwa::Algorithm::Hmac(_))
                | (Self::Rsa(_), jwa::Algorithm::Rsa(_))
                | (Self::EllipticCurve(_), jwa::Algorithm::EllipticCurve(_))
        )
    }
}

/// The loosely-typed wire shape of a JWK entry
///
/// Issuers publish entries with members this filter does not understand;
/// decoding is deliberately tolerant so that a single odd member does not
/// discard an otherwise usable key. Unknown `alg` and `crv` values are
/// recorded as absent and resolved at verification time.
#[derive(Debug, Deserialize)]
struct JwkDto {
    #[serde(default)]
    kid: Option<String>,

    #[serde(rename = "use", default)]
    usage: Option<String>,

    #[serde(default)]
    alg: Option<String>,

    kty: String,

    #[serde(default)]
    n: Option<Base64Url>,
    #[serde(default)]
    e: Option<Base64Url>,

    #[serde(default)]
    crv: Option<String>,
    #[serde(default)]
    x: Option<Base64Url>,
    #[serde(default)]
    y: Option<Base64Url>,

    #[serde(default)]
    k: Option<Base64Url>,
}

impl TryFrom<JwkDto> for Jwk {
    type Error = error::KeyRejected;

    fn try_from(dto: JwkDto) -> Result<Self, Self::Error> {
        let key = match dto.kty.as_str() {
            "RSA" => {
                let n = dto.n.ok_or_else(|| error::key_rejected("RSA key missing 'n'"))?;
                let e = dto.e.ok_or_else(|| error::key_rejected("RSA key missing 'e'"))?;
                Key::Rsa(rsa::PublicKey::from_components(n, e))
            }
            "EC" => {
                let x = dto.x.ok_or_else(|| error::key_rejected("EC key missing 'x'"))?;
                let y = dto.y.ok_or_else(|| error::key_rejected("EC key missing 'y'"))?;
                let curve = dto.crv.as_deref().and_then(ec::Curve::from_name);
                Key::EllipticCurve(ec::PublicKey::from_public_point(curve, x, y))
            }
            "oct" => {
                let k = dto.k.ok_or_else(|| error::key_rejected("oct key missing 'k'"))?;
                Key::Hmac(Hmac::new(k.into_inner()))
            }
            other => return Err(error::key_rejected(format!("unsupported kty '{other}'"))),
        };

        let key_id = dto.kid.filter(|kid| !kid.is_empty()).map(KeyId::new);
        let algorithm = dto.alg.and_then(|alg| alg.parse().ok());
        let usage = dto.usage.as_deref().map(Usage::from_name);

        Ok(Self {
            key_id,
            usage,
            algorithm,
            key,
        })
    }
}
