//! JSON Web Tokens (RFC 7519) as seen by the filter
//!
//! A token is decomposed into its three dot-separated base64url sections
//! before any verification happens. Both the header and the payload are
//! decoded up front: the header selects the verification key, and the
//! payload's `iss` claim is needed to locate the issuer's key set before
//! the signature can be checked.

use std::fmt;

use aliri_base64::{Base64Url, Base64UrlRef};
use aliri_braid::braid;
use aliri_clock::{Clock, DurationSecs, System, UnixTime};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    error::{self, AuthError},
    jwa,
    jwk::{self, Jwk, KeyId},
};

/// A JSON Web Token
///
/// This type provides custom implementations of [`Display`][JwtRef#impl-Display] and
/// [`Debug`][JwtRef#impl-Debug] to prevent unintentional disclosures of sensitive values.
/// See the documentation on those trait implementations on the [`JwtRef`] type for more
/// information.
#[braid(
    serde,
    debug = "owned",
    display = "owned",
    ord = "omit",
    ref_doc = "\
    A borrowed reference to a JSON Web Token ([`Jwt`])\n\
    \n\
    This type provides custom implementations of [`Display`][Self#impl-Display] and \
    [`Debug`][Self#impl-Debug] to prevent unintentional disclosures of sensitive values. \
    See the documentation on those trait implementations for more information.
    "
)]
#[must_use]
pub struct Jwt;

/// By default, this type hides its contents to keep credentials out of
/// logs. The signature is only revealed when the alternate debug format
/// (`{:#?}`) is specified.
impl fmt::Debug for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            write!(f, "{:#}", self)
        } else {
            f.write_str(concat!("***", "JWT", "***"))
        }
    }
}

/// By default, this type hides its contents to keep credentials out of
/// logs. The full token is only revealed when the alternate format
/// (`{:#}`) is specified.
impl fmt::Display for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            f.write_str(&self.0)
        } else {
            f.write_str(concat!("***", "JWT", "***"))
        }
    }
}

macro_rules! expect_two {
    ($iter:expr) => {{
        let mut i = $iter;
        match (i.next(), i.next(), i.next()) {
            (Some(first), Some(second), None) => Some((first, second)),
            _ => None,
        }
    }};
}

#[derive(Debug, Deserialize)]
struct HeaderDto {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

/// A decomposed JWT
///
/// Holds the decoded header and payload alongside the signing input and
/// signature, ready for key selection and verification.
///
/// The header and payload have **not** been authenticated when this type
/// is constructed; nothing read from them may be trusted until
/// [`verify_signature`][Self::verify_signature] succeeds against a key
/// that is itself trusted.
#[derive(Debug)]
#[must_use]
pub struct Decomposed<'a> {
    alg: jwa::Algorithm,
    kid: Option<KeyId>,
    claims: Map<String, Value>,
    message: &'a str,
    signature: Base64Url,
}

impl JwtRef {
    /// Decomposes the JWT into its parts, preparing it for verification
    ///
    /// # Errors
    ///
    /// Returns an error if the JWT is malformed or names an unsupported
    /// signing algorithm (including `none`).
    pub fn decompose(&self) -> Result<Decomposed, AuthError> {
        let (s_str, message) =
            expect_two!(self.as_str().rsplitn(2, '.')).ok_or_else(error::malformed_jwt)?;
        let (p_str, h_str) =
            expect_two!(message.rsplitn(2, '.')).ok_or_else(error::malformed_jwt)?;

        let h_raw = Base64Url::from_encoded(h_str).map_err(error::malformed_jwt_header)?;
        let signature = Base64Url::from_encoded(s_str).map_err(error::malformed_jwt_signature)?;
        let p_raw = Base64Url::from_encoded(p_str).map_err(error::malformed_jwt_payload)?;

        let header: HeaderDto =
            serde_json::from_slice(h_raw.as_slice()).map_err(error::malformed_jwt_header)?;
        let claims: Map<String, Value> =
            serde_json::from_slice(p_raw.as_slice()).map_err(error::malformed_jwt_payload)?;

        let alg = header.alg.parse::<jwa::Algorithm>()?;
        let kid = header.kid.filter(|kid| !kid.is_empty()).map(KeyId::new);

        Ok(Decomposed {
            alg,
            kid,
            claims,
            message,
            signature,
        })
    }
}

impl<'a> Decomposed<'a> {
    /// The signing algorithm named by the token header
    #[must_use]
    pub fn alg(&self) -> jwa::Algorithm {
        self.alg
    }

    /// The key ID named by the token header, if any
    #[must_use]
    pub fn kid(&self) -> Option<&jwk::KeyIdRef> {
        self.kid.as_deref()
    }

    /// The unverified claims of the token
    #[must_use]
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// The unverified `iss` claim of the token, if present
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.claims.get("iss").and_then(Value::as_str)
    }

    /// The raw signature of the JWT
    pub fn signature(&self) -> &Base64UrlRef {
        &self.signature
    }

    /// Verifies the token signature against the given key
    ///
    /// # Errors
    ///
    /// Returns an error if the key rejects the signature or is not usable
    /// with the token's algorithm.
    pub fn verify_signature(&self, key: &Jwk) -> Result<(), error::JwkVerifyError> {
        key.verify(self.alg, self.message.as_bytes(), self.signature.as_slice())
    }
}

/// Validation of the standard temporal claims
///
/// `exp`, `nbf`, and `iat` are all optional; absence is acceptable. The
/// freshness window tolerates clock skew between the issuer and this
/// host by accepting an `iat` slightly in the future.
#[derive(Debug)]
pub struct TimingValidator {
    freshness: DurationSecs,
    clock: Box<dyn Clock + Send + Sync>,
}

impl TimingValidator {
    /// Constructs a validator with the given freshness window, using the
    /// system clock
    pub fn new(freshness: DurationSecs) -> Self {
        Self::with_clock(freshness, System)
    }

    /// Constructs a validator against a caller-supplied clock
    pub fn with_clock(freshness: DurationSecs, clock: impl Clock + Send + Sync + 'static) -> Self {
        Self {
            freshness,
            clock: Box::new(clock),
        }
    }

    /// Enforces `exp`, `nbf`, and `iat` against the current time
    ///
    /// # Errors
    ///
    /// Returns an error naming the violated claim.
    pub fn validate(&self, claims: &Map<String, Value>) -> Result<(), AuthError> {
        let now = self.clock.now();

        if let Some(exp) = numeric_date(claims, "exp") {
            if now.0 >= exp.0 {
                return Err(AuthError::TokenExpired);
            }
        }

        if let Some(nbf) = numeric_date(claims, "nbf") {
            if nbf.0 > now.0 {
                return Err(AuthError::TokenNotYetValid);
            }
        }

        if let Some(iat) = numeric_date(claims, "iat") {
            if iat.0 > now.0.saturating_add(self.freshness.0) {
                return Err(AuthError::TokenIssuedInFuture);
            }
        }

        Ok(())
    }
}

/// Reads a NumericDate claim, accepting integer and fractional encodings
fn numeric_date(claims: &Map<String, Value>, name: &str) -> Option<UnixTime> {
    let value = claims.get(name)?;
    value
        .as_u64()
        .or_else(|| value.as_f64().map(|f| f as u64))
        .map(UnixTime)
}

#[cfg(test)]
mod tests {
    use aliri_clock::TestClock;
    use serde_json::json;

    use super::*;

    // Inspect at jwt.io with shared secret `test`
    const TOKEN: &str = concat!(
        "eyJhbGciOiJIUzI1NiIsImtpZCI6InRlc3Qga2V5In0.",
        "eyJzdWIiOiJBbGlyaSIsImF1ZCI6Im15X2FwaSIsImlzcyI6ImF1dGhvcml0eSJ9.",
        "yKDd4Ba3fdedqRKHrSUUMuF01-ctdXzEKM9oyWjSx9A"
    );

    #[test]
    fn decomposes_and_verifies_known_token() {
        let token = JwtRef::from_str(TOKEN);
        let decomposed = token.decompose().unwrap();

        assert_eq!(decomposed.alg(), jwa::Algorithm::HS256);
        assert_eq!(decomposed.kid().unwrap().as_str(), "test key");
        assert_eq!(decomposed.issuer(), Some("authority"));
        assert_eq!(
            decomposed.claims().get("aud").and_then(Value::as_str),
            Some("my_api")
        );

        let key = Jwk::from_secret("test").unwrap();
        decomposed.verify_signature(&key).unwrap();
    }

    #[test]
    fn rejects_signature_under_wrong_secret() {
        let token = JwtRef::from_str(TOKEN);
        let decomposed = token.decompose().unwrap();
        let key = Jwk::from_secret("other").unwrap();
        assert!(decomposed.verify_signature(&key).is_err());
    }

    #[test]
    fn rejects_two_part_token() {
        let token = JwtRef::from_str("eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJ0ZXN0In0");
        assert!(matches!(
            token.decompose(),
            Err(AuthError::MalformedToken(_))
        ));
    }

    #[test]
    fn rejects_garbage_segments() {
        let token = JwtRef::from_str("not!base64.also not.nope");
        assert!(token.decompose().is_err());
    }

    #[test]
    fn rejects_alg_none() {
        // {"alg":"none"} . {"aud":"test"} . empty signature
        let token = JwtRef::from_str("eyJhbGciOiJub25lIn0.eyJhdWQiOiJ0ZXN0In0.");
        assert!(matches!(
            token.decompose(),
            Err(AuthError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn empty_kid_reads_as_absent() {
        // header {"alg":"HS256","kid":""}
        let token = JwtRef::from_str(concat!(
            "eyJhbGciOiJIUzI1NiIsImtpZCI6IiJ9.",
            "eyJhdWQiOiJ0ZXN0In0.",
            "AA"
        ));
        let decomposed = token.decompose().unwrap();
        assert!(decomposed.kid().is_none());
    }

    fn claims(value: serde_json::Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn expired_token_is_rejected() {
        let validator = TimingValidator::with_clock(DurationSecs(60), TestClock::new(UnixTime(1_000)));
        let err = validator
            .validate(&claims(json!({"exp": 999})))
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let validator = TimingValidator::with_clock(DurationSecs(60), TestClock::new(UnixTime(1_000)));
        assert!(validator.validate(&claims(json!({"exp": 1000}))).is_err());
        assert!(validator.validate(&claims(json!({"exp": 1001}))).is_ok());
    }

    #[test]
    fn future_nbf_is_rejected() {
        let validator = TimingValidator::with_clock(DurationSecs(60), TestClock::new(UnixTime(1_000)));
        let err = validator
            .validate(&claims(json!({"nbf": 1_001})))
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenNotYetValid));
    }

    #[test]
    fn iat_within_freshness_window_is_accepted() {
        let validator = TimingValidator::with_clock(DurationSecs(60), TestClock::new(UnixTime(1_000)));
        assert!(validator.validate(&claims(json!({"iat": 1_059}))).is_ok());
    }

    #[test]
    fn iat_beyond_freshness_window_is_rejected() {
        let validator = TimingValidator::with_clock(DurationSecs(60), TestClock::new(UnixTime(1_000)));
        let err = validator
            .validate(&claims(json!({"iat": 1_061})))
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenIssuedInFuture));
    }

    #[test]
    fn absent_temporal_claims_are_acceptable() {
        let validator = TimingValidator::with_clock(DurationSecs(60), TestClock::new(UnixTime(1_000)));
        assert!(validator.validate(&claims(json!({"aud": "test"}))).is_ok());
    }

    #[test]
    fn fractional_numeric_dates_are_accepted() {
        let validator = TimingValidator::with_clock(DurationSecs(60), TestClock::new(UnixTime(1_000)));
        assert!(validator.validate(&claims(json!({"exp": 1_500.5}))).is_ok());
        assert!(validator.validate(&claims(json!({"exp": 900.5}))).is_err());
    }

    #[test]
    fn token_debug_redacts_value() {
        let token = Jwt::new(TOKEN.to_string());
        assert_eq!(format!("{:?}", token), "***JWT***");
        assert_eq!(format!("{}", token), "***JWT***");
        assert_eq!(format!("{:#}", token), TOKEN);
    }
}
