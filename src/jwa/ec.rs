//! ECDSA JSON Web Algorithm implementations
//!
//! Verification is implemented over OpenSSL rather than `ring` because
//! `ring` does not support the P-521 curve required for ES512.

use std::fmt;

use aliri_base64::{Base64Url, Base64UrlRef};
use lazy_static::lazy_static;
use openssl::{
    bn::BigNum,
    ec::{EcGroup, EcGroupRef, EcKey},
    ecdsa::EcdsaSig,
    hash::{hash, MessageDigest},
    nid::Nid,
    pkey::Public,
};

use crate::error;

lazy_static! {
    static ref P256: EcGroup = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    static ref P384: EcGroup = EcGroup::from_curve_name(Nid::SECP384R1).unwrap();
    static ref P521: EcGroup = EcGroup::from_curve_name(Nid::SECP521R1).unwrap();
}

/// A named ECC curve
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Curve {
    /// The P-256 curve (prime256v1/secp256r1)
    P256,

    /// The P-384 curve (secp384r1)
    P384,

    /// The P-521 curve (secp521r1)
    P521,
}

impl Curve {
    pub(crate) fn to_group(self) -> &'static EcGroupRef {
        match self {
            Curve::P256 => &P256,
            Curve::P384 => &P384,
            Curve::P521 => &P521,
        }
    }

    pub(crate) fn from_group(group: &EcGroupRef) -> Option<Self> {
        let nid = group.curve_name()?;
        if nid == Nid::X9_62_PRIME256V1 {
            Some(Curve::P256)
        } else if nid == Nid::SECP384R1 {
            Some(Curve::P384)
        } else if nid == Nid::SECP521R1 {
            Some(Curve::P521)
        } else {
            None
        }
    }

    /// The RFC 7518 name of the curve
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "P-256" => Some(Self::P256),
            "P-384" => Some(Self::P384),
            "P-521" => Some(Self::P521),
            _ => None,
        }
    }

    /// Size in bytes of one affine coordinate on this curve
    #[must_use]
    pub fn coordinate_size(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    pub(crate) fn from_coordinate_size(len: usize) -> Option<Self> {
        match len {
            32 => Some(Self::P256),
            48 => Some(Self::P384),
            66 => Some(Self::P521),
            _ => None,
        }
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Elliptic curve public key parameters
///
/// The curve is optional: key sets in the wild sometimes carry an
/// unrecognized `crv` member, and the original verifier still accepts the
/// key by inferring the curve from the key's algorithm hint or the
/// coordinate width.
#[derive(Debug, Clone, Eq, PartialEq)]
#[must_use]
pub struct PublicKey {
    curve: Option<Curve>,
    x: Base64Url,
    y: Base64Url,
}

impl PublicKey {
    /// Constructs a public key from its affine coordinates
    pub fn from_public_point(
        curve: Option<Curve>,
        x: impl Into<Base64Url>,
        y: impl Into<Base64Url>,
    ) -> Self {
        Self {
            curve,
            x: x.into(),
            y: y.into(),
        }
    }

    /// Imports an EC public key from an SPKI PEM file
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM file is not a valid EC public key on a
    /// supported curve.
    pub fn from_pem(pem: &str) -> Result<Self, error::KeyRejected> {
        let pkey =
            openssl::pkey::PKey::public_key_from_pem(pem.as_bytes()).map_err(error::key_rejected)?;
        let key = pkey.ec_key().map_err(error::key_rejected)?;
        Self::from_openssl_eckey(&key)
    }

    pub(crate) fn from_openssl_eckey(
        key: &openssl::ec::EcKeyRef<Public>,
    ) -> Result<Self, error::KeyRejected> {
        let curve = Curve::from_group(key.group())
            .ok_or_else(|| error::key_rejected("unsupported EC curve"))?;

        let mut ctx = openssl::bn::BigNumContext::new().map_err(error::key_rejected)?;
        let mut x = BigNum::new().map_err(error::key_rejected)?;
        let mut y = BigNum::new().map_err(error::key_rejected)?;
        key.public_key()
            .affine_coordinates_gfp(key.group(), &mut x, &mut y, &mut ctx)
            .map_err(error::key_rejected)?;

        let width = i32::try_from(curve.coordinate_size())
            .map_err(error::key_rejected)?;

        Ok(Self {
            curve: Some(curve),
            x: Base64Url::from_raw(x.to_vec_padded(width).map_err(error::key_rejected)?),
            y: Base64Url::from_raw(y.to_vec_padded(width).map_err(error::key_rejected)?),
        })
    }

    /// The curve declared by the key, if it was recognized
    #[must_use]
    pub fn curve(&self) -> Option<Curve> {
        self.curve
    }

    /// The x affine coordinate
    pub fn x(&self) -> &Base64UrlRef {
        &self.x
    }

    /// The y affine coordinate
    pub fn y(&self) -> &Base64UrlRef {
        &self.y
    }

    /// The curve to verify against, falling back to the hint implied by an
    /// algorithm tag and then to the coordinate width
    pub(crate) fn effective_curve(&self, hint: Option<SigningAlgorithm>) -> Option<Curve> {
        self.curve
            .or_else(|| hint.map(SigningAlgorithm::curve))
            .or_else(|| Curve::from_coordinate_size(self.x.as_slice().len()))
    }

    pub(crate) fn verify(
        &self,
        alg: SigningAlgorithm,
        curve: Curve,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), error::SignatureMismatch> {
        if signature.len() != curve.coordinate_size() * 2 {
            return Err(error::signature_mismatch());
        }

        self.verify_impl(alg, curve, data, signature)
    }

    fn verify_impl(
        &self,
        alg: SigningAlgorithm,
        curve: Curve,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), error::SignatureMismatch> {
        let x = BigNum::from_slice(self.x.as_slice()).map_err(|_| error::signature_mismatch())?;
        let y = BigNum::from_slice(self.y.as_slice()).map_err(|_| error::signature_mismatch())?;
        let key = EcKey::from_public_key_affine_coordinates(curve.to_group(), &x, &y)
            .map_err(|_| error::signature_mismatch())?;

        let (r, s) = signature.split_at(curve.coordinate_size());
        let r = BigNum::from_slice(r).map_err(|_| error::signature_mismatch())?;
        let s = BigNum::from_slice(s).map_err(|_| error::signature_mismatch())?;
        let sig =
            EcdsaSig::from_private_components(r, s).map_err(|_| error::signature_mismatch())?;

        let digest =
            hash(alg.message_digest(), data).map_err(|_| error::signature_mismatch())?;

        match sig.verify(&digest, &key) {
            Ok(true) => Ok(()),
            _ => Err(error::signature_mismatch()),
        }
    }
}

/// Elliptic curve signing algorithms
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub enum SigningAlgorithm {
    /// ECDSA using the P-256 curve and SHA-256
    ES256,
    /// ECDSA using the P-384 curve and SHA-384
    ES384,
    /// ECDSA using the P-521 curve and SHA-512
    ES512,
}

impl SigningAlgorithm {
    /// The curve conventionally paired with this algorithm
    #[must_use]
    pub fn curve(self) -> Curve {
        match self {
            Self::ES256 => Curve::P256,
            Self::ES384 => Curve::P384,
            Self::ES512 => Curve::P521,
        }
    }

    pub(crate) fn message_digest(self) -> MessageDigest {
        match self {
            Self::ES256 => MessageDigest::sha256(),
            Self::ES384 => MessageDigest::sha384(),
            Self::ES512 => MessageDigest::sha512(),
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::ES512 => "ES512",
        };

        f.write_str(s)
    }
}
