//! Sets of JSON Web Keys as published by an issuer

use serde::Deserialize;

use crate::{
    jwa,
    jwk::{self, Jwk},
};

/// A JSON Web Key Set (JWKS)
///
/// Decoding is lenient: entries that cannot be understood as verification
/// keys are skipped (with a debug log) rather than failing the whole set,
/// because a single exotic entry must not take down every issuer key.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Jwks {
    #[serde(deserialize_with = "deserialize_keys")]
    keys: Vec<Jwk>,
}

impl Jwks {
    /// Adds a key to the set, replacing any existing key with the same ID
    pub fn add_key(&mut self, key: Jwk) {
        let existing = self
            .keys
            .iter_mut()
            .find(|k| k.key_id().is_some() && k.key_id() == key.key_id());

        match existing {
            Some(slot) => *slot = key,
            None => self.keys.push(key),
        }
    }

    /// A view of the keys in this set
    #[must_use]
    pub fn keys(&self) -> &[Jwk] {
        &self.keys
    }

    /// Consumes the set, returning its keys
    #[must_use]
    pub fn into_keys(self) -> Vec<Jwk> {
        self.keys
    }

    /// Whether the set holds a key with the given ID
    #[must_use]
    pub fn contains(&self, kid: &jwk::KeyIdRef) -> bool {
        self.keys.iter().any(|k| k.key_id() == Some(kid))
    }

    /// Gets the best key for the key ID (if provided) and algorithm
    ///
    /// When the token carries no `kid`, the first key compatible with the
    /// requested algorithm is used.
    #[must_use]
    pub fn get_key_by_opt(
        &self,
        kid: Option<&jwk::KeyIdRef>,
        alg: jwa::Algorithm,
    ) -> Option<&Jwk> {
        match kid {
            Some(kid) => self
                .keys
                .iter()
                .find(|k| k.key_id() == Some(kid) && k.is_compatible(alg)),
            None => self.keys.iter().find(|k| k.is_compatible(alg)),
        }
    }
}

fn deserialize_keys<'de, D>(deserializer: D) -> Result<Vec<Jwk>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct MaybeJwksVisitor;

    impl<'de> serde::de::Visitor<'de> for MaybeJwksVisitor {
        type Value = Vec<Jwk>;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a list of JWK objects")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::SeqAccess<'de>,
        {
            let mut values = Vec::with_capacity(seq.size_hint().unwrap_or_default());
            let mut index = 0_usize;

            while let Some(value) = seq.next_element()? {
                match value {
                    MaybeJwk::Jwk(jwk) => values.push(jwk),
                    MaybeJwk::Unknown(key) => {
                        tracing::debug!(
                            jwks.idx = index,
                            jwk.kid = ?key.kid,
                            "jwk.kty" = ?key.kty,
                            jwk.alg = ?key.alg,
                            "ignoring undecodable JWK"
                        );
                    }
                }
                index += 1;
            }

            Ok(values)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MaybeJwk {
        Jwk(Jwk),
        Unknown(JwkLike),
    }

    #[derive(Deserialize)]
    struct JwkLike {
        #[serde(default)]
        kid: Option<String>,
        #[serde(default)]
        kty: Option<String>,
        #[serde(default)]
        alg: Option<String>,
    }

    deserializer.deserialize_seq(MaybeJwksVisitor)
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;
    use crate::jwa::Algorithm;
    use crate::jwk::KeyIdRef;

    const MIXED_JWKS: &str = r#"{
        "keys": [
            {
                "kty": "EC",
                "crv": "P-256",
                "x": "usWxHK2PmfnHKwXPS54m0kTcGJ90UiglWiGahtagnv8",
                "y": "IBOL-C3BttVivg-lSreASjpkttcsz-1rb7btKLv8EX4",
                "alg": "ES256",
                "kid": "ec-key"
            },
            {
                "kid": "mystery",
                "kty": "OKP",
                "crv": "Ed25519",
                "x": "AA"
            },
            {
                "kty": "oct",
                "k": "dGVzdA",
                "kid": "hmac-key"
            }
        ]
    }"#;

    #[test]
    fn skips_undecodable_entries() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(MIXED_JWKS)?;
        assert_eq!(jwks.keys().len(), 2);
        Ok(())
    }

    #[test]
    fn entry_with_bad_component_encoding_is_skipped() -> Result<()> {
        let doctored = MIXED_JWKS.replace("usWxHK2PmfnHKwXPS54m0kTcGJ90UiglWiGahtagnv8", "!!!");
        let jwks: Jwks = serde_json::from_str(&doctored)?;
        assert!(jwks.get_key_by_opt(Some(KeyIdRef::from_str("ec-key")), Algorithm::ES256).is_none());
        Ok(())
    }

    #[test]
    fn lookup_by_kid_requires_compatibility() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(MIXED_JWKS)?;
        assert!(jwks
            .get_key_by_opt(Some(KeyIdRef::from_str("ec-key")), Algorithm::ES256)
            .is_some());
        assert!(jwks
            .get_key_by_opt(Some(KeyIdRef::from_str("ec-key")), Algorithm::RS256)
            .is_none());
        Ok(())
    }

    #[test]
    fn missing_kid_falls_back_to_first_compatible_key() -> Result<()> {
        let jwks: Jwks = serde_json::from_str(MIXED_JWKS)?;
        let key = jwks.get_key_by_opt(None, Algorithm::HS256).unwrap();
        assert_eq!(key.key_id().unwrap().as_str(), "hmac-key");
        Ok(())
    }

    #[test]
    fn add_key_replaces_same_kid() -> Result<()> {
        let mut jwks: Jwks = serde_json::from_str(MIXED_JWKS)?;
        let replacement: Jwk =
            serde_json::from_str(r#"{"kty":"oct","k":"b3RoZXI","kid":"hmac-key"}"#)?;
        jwks.add_key(replacement);
        assert_eq!(jwks.keys().len(), 2);
        Ok(())
    }
}
