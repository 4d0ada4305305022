//! Locating the raw token on an inbound request
//!
//! Exactly one extraction source is active per filter: a named cookie, a
//! named header, or a named query parameter. When no source is
//! configured, the `Authorization` header is used. The extractor also
//! knows how to remove the credential from the request so that
//! `forwardToken: false` does not leak it upstream.

use http::{
    header::{HeaderName, HeaderValue, COOKIE},
    uri::{PathAndQuery, Uri},
    Request,
};

use crate::jwt::Jwt;

const BEARER_PREFIX: &str = "Bearer ";

/// Where the token is extracted from
#[derive(Debug, Clone)]
enum Source {
    Cookie(String),
    Header(HeaderName),
    Query(String),
}

/// Extracts the raw token from its configured source
#[derive(Debug, Clone)]
pub struct TokenExtractor {
    source: Source,
    bearer_prefix: bool,
}

impl TokenExtractor {
    /// Extracts from a named cookie
    #[must_use]
    pub fn cookie(name: impl Into<String>) -> Self {
        Self {
            source: Source::Cookie(name.into()),
            bearer_prefix: false,
        }
    }

    /// Extracts from a named header
    pub fn header(name: HeaderName) -> Self {
        Self {
            source: Source::Header(name),
            bearer_prefix: false,
        }
    }

    /// Extracts from a named query parameter
    #[must_use]
    pub fn query(name: impl Into<String>) -> Self {
        Self {
            source: Source::Query(name.into()),
            bearer_prefix: false,
        }
    }

    /// Strips a leading `Bearer ` (case-sensitive) from header values
    #[must_use]
    pub fn with_bearer_prefix(self, bearer_prefix: bool) -> Self {
        Self {
            bearer_prefix,
            ..self
        }
    }

    /// Locates the token on the request
    ///
    /// Empty values count as absent.
    #[must_use]
    pub fn extract<B>(&self, req: &Request<B>) -> Option<Jwt> {
        let raw = match &self.source {
            Source::Cookie(name) => cookie_value(req, name),
            Source::Header(name) => {
                let value = req.headers().get(name)?.to_str().ok()?;
                let value = if self.bearer_prefix {
                    value.strip_prefix(BEARER_PREFIX).unwrap_or(value)
                } else {
                    value
                };
                Some(value.to_owned())
            }
            Source::Query(name) => query_value(req.uri(), name),
        }?;

        if raw.is_empty() {
            None
        } else {
            Some(Jwt::new(raw))
        }
    }

    /// Removes the credential from the request, leaving unrelated
    /// cookies, headers, and query parameters in place
    pub fn strip<B>(&self, req: &mut Request<B>) {
        match &self.source {
            Source::Cookie(name) => strip_cookie(req, name),
            Source::Header(name) => {
                req.headers_mut().remove(name);
            }
            Source::Query(name) => strip_query_param(req, name),
        }
    }
}

fn cookie_value<B>(req: &Request<B>, name: &str) -> Option<String> {
    for header in req.headers().get_all(COOKIE) {
        let Ok(header) = header.to_str() else {
            continue;
        };
        for pair in header.split(';') {
            if let Some((cookie_name, value)) = pair.trim().split_once('=') {
                if cookie_name == name {
                    return Some(value.to_owned());
                }
            }
        }
    }

    None
}

fn strip_cookie<B>(req: &mut Request<B>, name: &str) {
    let retained: Vec<HeaderValue> = req
        .headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| {
            let header = header.to_str().ok()?;
            let rest = header
                .split(';')
                .map(str::trim)
                .filter(|pair| {
                    pair.split_once('=')
                        .map_or(true, |(cookie_name, _)| cookie_name != name)
                })
                .collect::<Vec<_>>()
                .join("; ");

            if rest.is_empty() {
                None
            } else {
                HeaderValue::from_str(&rest).ok()
            }
        })
        .collect();

    req.headers_mut().remove(COOKIE);
    for value in retained {
        req.headers_mut().append(COOKIE, value);
    }
}

fn query_value(uri: &Uri, name: &str) -> Option<String> {
    uri.query()?
        .split('&')
        .find_map(|pair| match pair.split_once('=') {
            Some((param, value)) if param == name => Some(value.to_owned()),
            _ => None,
        })
}

fn strip_query_param<B>(req: &mut Request<B>, name: &str) {
    let Some(query) = req.uri().query() else {
        return;
    };

    let retained = query
        .split('&')
        .filter(|pair| {
            pair.split_once('=')
                .map_or(true, |(param, _)| param != name)
        })
        .collect::<Vec<_>>()
        .join("&");

    let path = req.uri().path();
    let path_and_query = if retained.is_empty() {
        path.to_owned()
    } else {
        format!("{path}?{retained}")
    };

    let Ok(path_and_query) = PathAndQuery::try_from(path_and_query) else {
        return;
    };

    let mut parts = req.uri().clone().into_parts();
    parts.path_and_query = Some(path_and_query);
    if let Ok(uri) = Uri::from_parts(parts) {
        *req.uri_mut() = uri;
    }
}
