//! RSA JSON Web Algorithm implementations

use std::fmt;

use aliri_base64::{Base64Url, Base64UrlRef};
use openssl::rsa::Rsa;

use crate::error;

/// RSA public key components
#[derive(Debug, Clone, Eq, PartialEq)]
#[must_use]
pub struct PublicKey {
    modulus: Base64Url,
    exponent: Base64Url,
}

impl PublicKey {
    /// Constructs a public key from the modulus and exponent
    pub fn from_components(
        modulus: impl Into<Base64Url>,
        exponent: impl Into<Base64Url>,
    ) -> Self {
        Self {
            modulus: modulus.into(),
            exponent: exponent.into(),
        }
    }

    /// Imports an RSA public key from a PEM file
    ///
    /// Accepts both PKCS#1 (`RSA PUBLIC KEY`) and SPKI (`PUBLIC KEY`)
    /// encodings.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM file is not a valid RSA public key.
    pub fn from_pem(pem: &str) -> Result<Self, error::KeyRejected> {
        let rsa = if pem.contains("RSA PUBLIC KEY") {
            Rsa::public_key_from_pem_pkcs1(pem.as_bytes()).map_err(error::key_rejected)?
        } else {
            Rsa::public_key_from_pem(pem.as_bytes()).map_err(error::key_rejected)?
        };

        Ok(Self {
            modulus: Base64Url::from_raw(rsa.n().to_vec()),
            exponent: Base64Url::from_raw(rsa.e().to_vec()),
        })
    }

    /// The public key's modulus
    pub fn modulus(&self) -> &Base64UrlRef {
        &self.modulus
    }

    /// The public key's exponent
    pub fn exponent(&self) -> &Base64UrlRef {
        &self.exponent
    }

    pub(crate) fn verify(
        &self,
        alg: SigningAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), error::SignatureMismatch> {
        let pk = ring::signature::RsaPublicKeyComponents {
            n: self.modulus.as_slice(),
            e: self.exponent.as_slice(),
        };

        pk.verify(alg.into_verification_params(), data, signature)
            .map_err(|_| error::signature_mismatch())
    }
}

/// RSA signing algorithms
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub enum SigningAlgorithm {
    /// RSA PKCS#1 v1.5 using SHA-256
    RS256,
    /// RSA PKCS#1 v1.5 using SHA-384
    RS384,
    /// RSA PKCS#1 v1.5 using SHA-512
    RS512,
}

impl SigningAlgorithm {
    fn into_verification_params(self) -> &'static ring::signature::RsaParameters {
        match self {
            Self::RS256 => &ring::signature::RSA_PKCS1_2048_8192_SHA256,
            Self::RS384 => &ring::signature::RSA_PKCS1_2048_8192_SHA384,
            Self::RS512 => &ring::signature::RSA_PKCS1_2048_8192_SHA512,
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
        };

        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use openssl::{hash::MessageDigest, pkey::PKey, sign::Signer};

    use super::*;

    fn sign(
        key: &openssl::rsa::Rsa<openssl::pkey::Private>,
        digest: MessageDigest,
        data: &[u8],
    ) -> Vec<u8> {
        let pkey = PKey::from_rsa(key.clone()).unwrap();
        let mut signer = Signer::new(digest, &pkey).unwrap();
        signer.update(data).unwrap();
        signer.sign_to_vec().unwrap()
    }

    #[test]
    fn verifies_openssl_signatures_across_digests() {
        let key = Rsa::generate(2048).unwrap();
        let public = PublicKey::from_components(key.n().to_vec(), key.e().to_vec());

        let cases = [
            (SigningAlgorithm::RS256, MessageDigest::sha256()),
            (SigningAlgorithm::RS384, MessageDigest::sha384()),
            (SigningAlgorithm::RS512, MessageDigest::sha512()),
        ];

        for (alg, digest) in cases {
            let signature = sign(&key, digest, b"header.payload");
            public.verify(alg, b"header.payload", &signature).unwrap();
        }
    }

    #[test]
    fn rejects_signature_from_other_key() {
        let key = Rsa::generate(2048).unwrap();
        let other = Rsa::generate(2048).unwrap();
        let public = PublicKey::from_components(key.n().to_vec(), key.e().to_vec());

        let signature = sign(&other, MessageDigest::sha256(), b"header.payload");
        assert!(public
            .verify(SigningAlgorithm::RS256, b"header.payload", &signature)
            .is_err());
    }

    #[test]
    fn round_trips_pkcs1_pem() {
        let key = Rsa::generate(2048).unwrap();
        let pem = String::from_utf8(key.public_key_to_pem_pkcs1().unwrap()).unwrap();
        let public = PublicKey::from_pem(&pem).unwrap();

        let signature = sign(&key, MessageDigest::sha512(), b"data");
        public.verify(SigningAlgorithm::RS512, b"data", &signature).unwrap();
    }

    #[test]
    fn round_trips_spki_pem() {
        let key = Rsa::generate(2048).unwrap();
        let pem = String::from_utf8(key.public_key_to_pem().unwrap()).unwrap();
        let public = PublicKey::from_pem(&pem).unwrap();

        let signature = sign(&key, MessageDigest::sha256(), b"data");
        public.verify(SigningAlgorithm::RS256, b"data", &signature).unwrap();
    }

    #[test]
    fn rejects_garbage_pem() {
        assert!(PublicKey::from_pem("-----BEGIN RSA PUBLIC KEY").is_err());
    }
}
