//! Common errors

#![allow(missing_copy_implementations)]

use std::error::Error as StdError;

use http::StatusCode;
use thiserror::Error;

/// The key cannot be used with the requested algorithm
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("key incompatible with algorithm '{alg}'")]
pub struct IncompatibleAlgorithm {
    alg: crate::jwa::Algorithm,
}

#[inline]
pub(crate) fn incompatible_algorithm(alg: crate::jwa::Algorithm) -> IncompatibleAlgorithm {
    IncompatibleAlgorithm { alg }
}

/// The provided name could not be matched with supported algorithms
#[derive(Debug, Error)]
#[error("'{alg}' does not match supported algorithms")]
pub struct UnknownAlgorithm {
    alg: String,
}

#[inline]
pub(crate) fn unknown_algorithm(alg: String) -> UnknownAlgorithm {
    UnknownAlgorithm { alg }
}

/// The key has a declared usage that disallows signature verification
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("key cannot be used in this way")]
pub struct KeyUsageMismatch {
    _p: (),
}

pub(crate) const fn key_usage_mismatch() -> KeyUsageMismatch {
    KeyUsageMismatch { _p: () }
}

/// The JWT is malformed and cannot be split into header, payload, and signature sections
#[derive(Clone, Copy, Debug, Error)]
#[error("malformed JWT")]
pub struct MalformedJwt {
    _p: (),
}

pub(crate) const fn malformed_jwt() -> MalformedJwt {
    MalformedJwt { _p: () }
}

/// The JWT header section is malformed
#[derive(Debug, Error)]
#[error("malformed JWT header")]
pub struct MalformedJwtHeader {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn malformed_jwt_header(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> MalformedJwtHeader {
    MalformedJwtHeader {
        source: source.into(),
    }
}

/// The JWT payload section is malformed
#[derive(Debug, Error)]
#[error("malformed JWT payload")]
pub struct MalformedJwtPayload {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn malformed_jwt_payload(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> MalformedJwtPayload {
    MalformedJwtPayload {
        source: source.into(),
    }
}

/// The JWT signature section is malformed
#[derive(Debug, Error)]
#[error("malformed JWT signature")]
pub struct MalformedJwtSignature {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn malformed_jwt_signature(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> MalformedJwtSignature {
    MalformedJwtSignature {
        source: source.into(),
    }
}

/// The signature did not match
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("signature mismatch")]
pub struct SignatureMismatch {
    _p: (),
}

pub(crate) const fn signature_mismatch() -> SignatureMismatch {
    SignatureMismatch { _p: () }
}

/// The key was rejected
#[derive(Debug, Error)]
#[error("key rejected")]
pub struct KeyRejected {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn key_rejected(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> KeyRejected {
    KeyRejected {
        source: source.into(),
    }
}

/// No key able to verify the token could be obtained from the issuer
#[derive(Debug, Error)]
#[error("no key available to verify the token")]
pub struct KeyUnavailable {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn key_unavailable(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> KeyUnavailable {
    KeyUnavailable {
        source: source.into(),
    }
}

/// An error occurring while verifying a signature with a key
#[derive(Debug, Error)]
pub enum JwkVerifyError {
    /// The token algorithm cannot be used with this key
    #[error(transparent)]
    IncompatibleAlgorithm(#[from] IncompatibleAlgorithm),

    /// The key cannot be used for signature verification
    #[error(transparent)]
    KeyUsageMismatch(#[from] KeyUsageMismatch),

    /// Signature is invalid
    #[error(transparent)]
    SignatureMismatch(#[from] SignatureMismatch),
}

impl JwkVerifyError {
    /// Whether the error is due to an incompatible algorithm
    #[must_use]
    pub fn is_incompatible_alg(&self) -> bool {
        matches!(self, Self::IncompatibleAlgorithm(_))
    }

    /// Whether the error is due to a signature mismatch
    #[must_use]
    pub fn is_signature_mismatch(&self) -> bool {
        matches!(self, Self::SignatureMismatch(_))
    }
}

/// An error constructing the filter from its configuration
///
/// Construction fails fast; none of these conditions are recoverable at
/// request time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The static secret looked like PEM but could not be decoded
    #[error("invalid key: Key must be a PEM encoded PKCS1 or PKCS8 key")]
    InvalidKey,

    /// More than one token extraction source was configured
    #[error("at most one of cookieName, headerName, and parameterName may be set")]
    MultipleTokenSources,

    /// A redirect or requirement template failed to parse
    #[error(transparent)]
    InvalidTemplate(#[from] crate::template::TemplateParseError),

    /// An outbound header name in `headerMap` is not a valid HTTP header name
    #[error("invalid header name in headerMap: '{0}'")]
    InvalidHeaderName(String),

    /// The HTTP client for JWKS fetches could not be constructed
    #[error("unable to construct JWKS HTTP client")]
    HttpClient(#[source] reqwest::Error),
}

/// The reason a request was denied
///
/// Every per-request failure is funneled into one of these kinds at the
/// filter entry point and converted into a response; no error escapes the
/// middleware.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No token was found in the configured extraction source
    #[error("no token found in request")]
    TokenMissing,

    /// The token could not be decomposed
    #[error(transparent)]
    MalformedToken(#[from] MalformedJwt),

    /// The token header could not be decoded
    #[error(transparent)]
    MalformedTokenHeader(#[from] MalformedJwtHeader),

    /// The token payload could not be decoded
    #[error(transparent)]
    MalformedTokenPayload(#[from] MalformedJwtPayload),

    /// The token signature could not be decoded
    #[error(transparent)]
    MalformedTokenSignature(#[from] MalformedJwtSignature),

    /// The token names an algorithm that is not supported (including `none`)
    #[error(transparent)]
    UnknownAlgorithm(#[from] UnknownAlgorithm),

    /// The token was rejected by the verification key
    #[error("token rejected by key")]
    JwkVerify(#[from] JwkVerifyError),

    /// The token is expired according to the `exp` claim
    #[error("token expired")]
    TokenExpired,

    /// The token is not yet valid according to the `nbf` claim
    #[error("token not yet valid")]
    TokenNotYetValid,

    /// The `iat` claim lies further in the future than the freshness window
    #[error("token issued too far in the future")]
    TokenIssuedInFuture,

    /// The `iss` claim is missing or not in the issuer registry
    #[error("issuer not trusted")]
    IssuerUnknown,

    /// No verification key could be obtained for the token
    #[error(transparent)]
    KeyUnavailable(#[from] KeyUnavailable),

    /// The token claims do not satisfy the requirement policy
    #[error("claims rejected by policy")]
    ClaimsRejected,
}

impl AuthError {
    /// The response status for this denial when no redirect is configured
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ClaimsRejected => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}
