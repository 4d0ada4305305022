//! The decoded configuration shape consumed by the filter
//!
//! The outer host owns the configuration file format; this crate only
//! sees the decoded structure. The shape deserializes directly from the
//! conventional camelCase document, with every field optional.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::claims::Requirement;

/// Seconds of grace for an `iat` claim in the future
pub const DEFAULT_FRESHNESS: u64 = 60;

/// Filter configuration, immutable after construction
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Acceptable issuer URLs; a `*` port segment matches any port.
    /// Empty means any issuer is accepted.
    #[serde(default)]
    pub issuers: IssuerUrls,

    /// Static key material: an HMAC shared secret, or a PEM-encoded RSA
    /// or EC public key. When compatible with a token's algorithm it is
    /// used directly, without any JWKS fetch.
    #[serde(default)]
    pub secret: String,

    /// The claim requirement tree
    #[serde(default)]
    pub require: BTreeMap<String, Requirement>,

    /// Forward requests that carry no token at all
    #[serde(default)]
    pub optional: bool,

    /// Extract the token from a named cookie
    #[serde(default)]
    pub cookie_name: Option<String>,

    /// Extract the token from a named header (default `Authorization`)
    #[serde(default)]
    pub header_name: Option<String>,

    /// Extract the token from a named query parameter
    #[serde(default)]
    pub parameter_name: Option<String>,

    /// Strip a leading `Bearer ` from the header value
    #[serde(default)]
    pub bearer_prefix: bool,

    /// Keep the credential on the forwarded request
    #[serde(default = "default_true")]
    pub forward_token: bool,

    /// Outbound header name to claim name
    #[serde(default)]
    pub header_map: BTreeMap<String, String>,

    /// Redirect template for unauthorized failures
    #[serde(default)]
    pub redirect_unauthorized: Option<String>,

    /// Redirect template for forbidden failures
    #[serde(default)]
    pub redirect_forbidden: Option<String>,

    /// Seconds of grace for an `iat` claim in the future
    #[serde(default = "default_freshness")]
    pub freshness: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            issuers: IssuerUrls::default(),
            secret: String::new(),
            require: BTreeMap::new(),
            optional: false,
            cookie_name: None,
            header_name: None,
            parameter_name: None,
            bearer_prefix: false,
            forward_token: true,
            header_map: BTreeMap::new(),
            redirect_unauthorized: None,
            redirect_forbidden: None,
            freshness: DEFAULT_FRESHNESS,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_freshness() -> u64 {
    DEFAULT_FRESHNESS
}

/// Issuer URLs, decodable from either a single string or a sequence
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(from = "OneOrMany<String>")]
pub struct IssuerUrls(pub Vec<String>);

impl From<OneOrMany<String>> for IssuerUrls {
    fn from(vals: OneOrMany<String>) -> Self {
        match vals {
            OneOrMany::One(x) => Self(vec![x]),
            OneOrMany::Many(v) => Self(v),
        }
    }
}

impl From<Vec<String>> for IssuerUrls {
    fn from(vals: Vec<String>) -> Self {
        Self(vals)
    }
}

/// A type representing one or more items, primarily for deserialization
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// A single item
    One(T),

    /// Zero or more items, deserialized from a sequence
    Many(Vec<T>),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config: Config = serde_json::from_value(json!({})).unwrap();
        assert!(config.issuers.0.is_empty());
        assert!(config.secret.is_empty());
        assert!(config.require.is_empty());
        assert!(!config.optional);
        assert!(!config.bearer_prefix);
        assert!(config.forward_token);
        assert_eq!(config.freshness, DEFAULT_FRESHNESS);
    }

    #[test]
    fn issuers_accept_scalar_or_list() {
        let config: Config =
            serde_json::from_value(json!({"issuers": "https://example.com"})).unwrap();
        assert_eq!(config.issuers.0, vec!["https://example.com"]);

        let config: Config =
            serde_json::from_value(json!({"issuers": ["https://a.example", "https://b.example"]}))
                .unwrap();
        assert_eq!(config.issuers.0.len(), 2);
    }

    #[test]
    fn camel_case_field_names() {
        let config: Config = serde_json::from_value(json!({
            "parameterName": "token",
            "forwardToken": false,
            "bearerPrefix": true,
            "redirectUnauthorized": "https://example.com/login?return_to={{.URL}}",
            "headerMap": {"X-Id": "user"}
        }))
        .unwrap();

        assert_eq!(config.parameter_name.as_deref(), Some("token"));
        assert!(!config.forward_token);
        assert!(config.bearer_prefix);
        assert!(config.redirect_unauthorized.is_some());
        assert_eq!(config.header_map.get("X-Id").map(String::as_str), Some("user"));
    }

    #[test]
    fn requirement_tree_decodes_scalars_lists_and_objects() {
        let config: Config = serde_json::from_value(json!({
            "require": {
                "aud": "test",
                "roles": ["user", "admin"],
                "authority": {"*.example.com": "user"}
            }
        }))
        .unwrap();

        assert_eq!(config.require.len(), 3);
    }

    #[test]
    fn boolean_fields_do_not_coerce_from_strings() {
        assert!(serde_json::from_value::<Config>(json!({"optional": "invalid"})).is_err());
    }
}
