//! Injection of claim values into forwarded request headers

use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Copies selected claim values onto the forwarded request
///
/// Scalar claims are injected in their string form; composite claims are
/// serialized as compact JSON. An injected header replaces any value the
/// client sent under the same name, so downstream services can trust it.
#[derive(Debug, Clone, Default)]
pub struct ClaimHeaderMapper {
    entries: Vec<(HeaderName, String)>,
}

impl ClaimHeaderMapper {
    /// Builds a mapper from `(outbound header, claim name)` pairs
    ///
    /// # Errors
    ///
    /// Returns an error if an outbound header name is not a valid HTTP
    /// header name.
    pub fn new<'a, I>(map: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let entries = map
            .into_iter()
            .map(|(header, claim)| {
                let name = HeaderName::try_from(header)
                    .map_err(|_| ConfigError::InvalidHeaderName(header.to_owned()))?;
                Ok((name, claim.to_owned()))
            })
            .collect::<Result<_, ConfigError>>()?;

        Ok(Self { entries })
    }

    /// Whether any mappings are configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies the mappings to the outbound header map
    pub fn apply(&self, claims: &Map<String, Value>, headers: &mut HeaderMap) {
        for (name, claim) in &self.entries {
            let Some(value) = claims.get(claim).and_then(render_claim) else {
                continue;
            };

            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    headers.insert(name.clone(), value);
                }
                Err(_) => {
                    tracing::debug!(header = %name, claim = %claim, "claim value is not a legal header value");
                }
            }
        }
    }
}

fn render_claim(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        composite => serde_json::to_string(composite).ok(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn claims(value: serde_json::Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn mapper(pairs: &[(&str, &str)]) -> ClaimHeaderMapper {
        ClaimHeaderMapper::new(pairs.iter().copied()).unwrap()
    }

    #[test]
    fn injects_string_claim() {
        let mut headers = HeaderMap::new();
        mapper(&[("X-Id", "user")]).apply(&claims(json!({"user": "1234"})), &mut headers);
        assert_eq!(headers.get("X-Id").unwrap(), "1234");
    }

    #[test]
    fn injects_scalars_in_display_form() {
        let mut headers = HeaderMap::new();
        mapper(&[("X-Level", "level"), ("X-Admin", "admin")])
            .apply(&claims(json!({"level": 3, "admin": true})), &mut headers);
        assert_eq!(headers.get("X-Level").unwrap(), "3");
        assert_eq!(headers.get("X-Admin").unwrap(), "true");
    }

    #[test]
    fn injects_composites_as_json() {
        let mut headers = HeaderMap::new();
        mapper(&[("X-Roles", "roles")])
            .apply(&claims(json!({"roles": ["user", "admin"]})), &mut headers);
        assert_eq!(headers.get("X-Roles").unwrap(), r#"["user","admin"]"#);
    }

    #[test]
    fn replaces_inbound_value() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Id", HeaderValue::from_static("spoofed"));
        mapper(&[("X-Id", "user")]).apply(&claims(json!({"user": "1234"})), &mut headers);
        assert_eq!(headers.get("X-Id").unwrap(), "1234");
    }

    #[test]
    fn skips_missing_and_null_claims() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Id", HeaderValue::from_static("existing"));
        mapper(&[("X-Id", "user"), ("X-Other", "missing")])
            .apply(&claims(json!({"user": null})), &mut headers);
        assert_eq!(headers.get("X-Id").unwrap(), "existing");
        assert!(headers.get("X-Other").is_none());
    }

    #[test]
    fn rejects_invalid_header_name() {
        assert!(ClaimHeaderMapper::new([("not a header", "user")]).is_err());
    }
}
