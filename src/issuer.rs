//! The registry of acceptable token issuers
//!
//! Issuer URLs are canonicalized at construction and compared literally
//! at request time. No DNS resolution and no default-port elision take
//! place; the single concession is a `*` in the port segment, which
//! matches any numeric port so that issuers on ephemeral ports (local
//! development, test harnesses) can be registered once.

use aliri_braid::braid;

/// The issuer of a JWT, canonicalized to end with `/`
#[braid(serde, ref_doc = "A borrowed reference to an [`Issuer`]")]
pub struct Issuer;

/// Canonicalizes an issuer URL
///
/// Trailing whitespace is trimmed and a trailing `/` is appended iff
/// absent. Case is preserved. The operation is idempotent.
pub fn canonicalize(raw: &str) -> Issuer {
    let trimmed = raw.trim_end();
    if trimmed.ends_with('/') {
        Issuer::new(trimmed.to_string())
    } else {
        Issuer::new(format!("{trimmed}/"))
    }
}

/// The ordered set of acceptable issuers
#[derive(Debug, Clone, Default)]
pub struct IssuerRegistry {
    patterns: Vec<Issuer>,
}

impl IssuerRegistry {
    /// Builds a registry from configured issuer URLs, canonicalizing each
    pub fn new<I, S>(issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: issuers
                .into_iter()
                .map(|raw| canonicalize(raw.as_ref()))
                .collect(),
        }
    }

    /// Whether any issuers are registered
    ///
    /// An empty registry accepts every issuer; deployments pinned to a
    /// static secret often leave the list empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether the (canonicalized) issuer is acceptable
    #[must_use]
    pub fn accepts(&self, issuer: &IssuerRef) -> bool {
        if self.patterns.is_empty() {
            return true;
        }

        self.patterns
            .iter()
            .any(|pattern| pattern.as_str() == issuer.as_str() || port_wildcard_matches(pattern.as_str(), issuer.as_str()))
    }
}

/// Matches an issuer against a pattern holding `*` in its port segment
fn port_wildcard_matches(pattern: &str, issuer: &str) -> bool {
    let Some(idx) = pattern.find(":*") else {
        return false;
    };

    let prefix = &pattern[..=idx];
    let suffix = &pattern[idx + 2..];

    let Some(tail) = issuer.strip_prefix(prefix) else {
        return false;
    };
    let Some(port) = tail.strip_suffix(suffix) else {
        return false;
    };

    !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())
}
