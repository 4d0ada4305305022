//! # tollgate
//!
//! A JWT gatekeeping middleware for HTTP services. Requests carrying a
//! valid, unexpired token that was signed by a trusted issuer and that
//! satisfies a declarative claim-requirement policy are forwarded to the
//! wrapped service, optionally with derived headers; everything else is
//! answered with a status code or a redirect.
//!
//! Issuer public keys are discovered through each issuer's
//! `.well-known/jwks.json` document and cached for the life of the
//! filter. A token presenting an unknown key ID transparently triggers a
//! refetch, so issuer key rotation is observable without a restart.
//!
//! ```no_run
//! use tollgate::{Config, JwtGate};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config: Config = serde_json::from_value(serde_json::json!({
//!     "issuers": ["https://issuer.example.com"],
//!     "require": { "aud": "my-api" },
//!     "bearerPrefix": true,
//! }))?;
//!
//! let gate = JwtGate::new(config)?;
//! let layer = gate.layer::<String>();
//! // hand `layer` to any tower-compatible server
//! # let _ = layer;
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod claims;
pub mod config;
pub mod error;
pub mod extract;
pub mod headers;
pub mod issuer;
pub mod jwa;
pub mod jwk;
pub mod jwks;
pub mod jwt;
pub mod template;

mod filter;
mod resolver;
mod store;


#[doc(inline)]
pub use config::Config;
#[doc(inline)]
pub use error::{AuthError, ConfigError};
#[doc(inline)]
pub use filter::{GateAuthorizer, JwtGate};
#[doc(inline)]
pub use jwk::Jwk;
#[doc(inline)]
pub use jwks::Jwks;
#[doc(inline)]
pub use jwt::{Jwt, JwtRef};
#[doc(inline)]
pub use resolver::JwksResolver;
#[doc(inline)]
pub use store::KeyStore;
