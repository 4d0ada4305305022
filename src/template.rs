//! Request-interpolated templates
//!
//! Redirect URLs and claim requirements may reference fields of the
//! inbound request through a `{{.Field}}` expression. The surface is a
//! minimal name resolution over a fixed set of fields; it is not a
//! general-purpose template engine. Templates are parsed once at
//! configuration time and executed per request.

use std::fmt;

use http::{header, Request};
use thiserror::Error;

/// The template could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed template expression in '{template}'")]
pub struct TemplateParseError {
    template: String,
}

/// The template referenced a field the request context does not provide
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown template field '{field}'")]
pub struct UnknownTemplateField {
    field: String,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A parsed `{{.Field}}` template
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parses a template, accepting any well-formed field reference
    ///
    /// Field names are only resolved at render time, mirroring the
    /// behavior of the configuration surface this replaces: a typo in a
    /// field name surfaces on the first request that exercises it.
    ///
    /// # Errors
    ///
    /// Returns an error if an expression is unterminated or is not a
    /// single `.Field` reference.
    pub fn parse(source: &str) -> Result<Self, TemplateParseError> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if !rest[..start].is_empty() {
                segments.push(Segment::Literal(rest[..start].to_owned()));
            }

            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| TemplateParseError {
                template: source.to_owned(),
            })?;

            let expr = after[..end].trim();
            let field = expr
                .strip_prefix('.')
                .filter(|f| !f.is_empty() && f.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
                .ok_or_else(|| TemplateParseError {
                    template: source.to_owned(),
                })?;

            segments.push(Segment::Field(field.to_owned()));
            rest = &after[end + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_owned()));
        }

        Ok(Self {
            source: source.to_owned(),
            segments,
        })
    }

    /// Whether the text contains a template expression at all
    #[must_use]
    pub fn is_templated(text: &str) -> bool {
        text.contains("{{")
    }

    /// The original template text
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Interpolates the request context into the template
    ///
    /// # Errors
    ///
    /// Returns an error naming the first field the context cannot
    /// resolve.
    pub fn render(&self, ctx: &RequestContext) -> Result<String, UnknownTemplateField> {
        let mut out = String::with_capacity(self.source.len());

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => out.push_str(ctx.field(name).ok_or_else(|| {
                    UnknownTemplateField {
                        field: name.clone(),
                    }
                })?),
            }
        }

        Ok(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// The fixed set of request fields available to templates
///
/// Captured once per request before the pipeline runs, so failure
/// responses can interpolate the inbound URL even after the request has
/// been consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    url: String,
    host: String,
    path: String,
    query: String,
}

impl RequestContext {
    /// Captures the context from an inbound request
    ///
    /// The URL is reconstructed from the request URI when it is in
    /// absolute form. Reverse proxies commonly forward origin-form URIs,
    /// so the scheme falls back to `X-Forwarded-Proto` (then `http`) and
    /// the authority to `X-Forwarded-Host` (then the `Host` header).
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let uri = req.uri();

        let header_str = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };

        let scheme = uri
            .scheme_str()
            .map(str::to_owned)
            .or_else(|| header_str("x-forwarded-proto"))
            .unwrap_or_else(|| "http".to_owned());

        let host = uri
            .authority()
            .map(|a| a.to_string())
            .or_else(|| header_str("x-forwarded-host"))
            .or_else(|| {
                req.headers()
                    .get(header::HOST)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned)
            })
            .unwrap_or_default();

        let path = uri.path().to_owned();
        let query = uri.query().unwrap_or("").to_owned();

        let url = if query.is_empty() {
            format!("{scheme}://{host}{path}")
        } else {
            format!("{scheme}://{host}{path}?{query}")
        };

        Self {
            url,
            host,
            path,
            query,
        }
    }

    fn field(&self, name: &str) -> Option<&str> {
        match name {
            "URL" => Some(&self.url),
            "Host" => Some(&self.host),
            "Path" => Some(&self.path),
            "Query" => Some(&self.query),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RequestContext {
        RequestContext::from_request(
            &Request::builder()
                .uri("https://app.example.com/home?id=1")
                .body(())
                .unwrap(),
        )
    }

    #[test]
    fn renders_all_fields() {
        let ctx = ctx();
        let template =
            Template::parse("url={{.URL}} host={{.Host}} path={{.Path}} query={{.Query}}").unwrap();
        assert_eq!(
            template.render(&ctx).unwrap(),
            "url=https://app.example.com/home?id=1 host=app.example.com path=/home query=id=1"
        );
    }

    #[test]
    fn renders_redirect_shape() {
        let template =
            Template::parse("https://example.com/login?return_to={{.URL}}").unwrap();
        assert_eq!(
            template.render(&ctx()).unwrap(),
            "https://example.com/login?return_to=https://app.example.com/home?id=1"
        );
    }

    #[test]
    fn plain_text_passes_through() {
        let template = Template::parse("no fields here").unwrap();
        assert_eq!(template.render(&ctx()).unwrap(), "no fields here");
    }

    #[test]
    fn unknown_field_fails_at_render_not_parse() {
        let template = Template::parse("{{.Unknown}}").unwrap();
        let err = template.render(&ctx()).unwrap_err();
        assert_eq!(err.to_string(), "unknown template field 'Unknown'");
    }

    #[test]
    fn unterminated_expression_fails_to_parse() {
        assert!(Template::parse("{{.URL").is_err());
    }

    #[test]
    fn non_field_expression_fails_to_parse() {
        assert!(Template::parse("{{URL}}").is_err());
        assert!(Template::parse("{{.}}").is_err());
        assert!(Template::parse("{{.two words}}").is_err());
    }

    #[test]
    fn origin_form_uri_falls_back_to_forwarded_headers() {
        let req = Request::builder()
            .uri("/home?id=1")
            .header("x-forwarded-proto", "https")
            .header("x-forwarded-host", "app.example.com")
            .body(())
            .unwrap();
        let ctx = RequestContext::from_request(&req);
        assert_eq!(
            Template::parse("{{.URL}}").unwrap().render(&ctx).unwrap(),
            "https://app.example.com/home?id=1"
        );
    }

    #[test]
    fn origin_form_uri_falls_back_to_host_header() {
        let req = Request::builder()
            .uri("/home")
            .header(header::HOST, "app.example.com")
            .body(())
            .unwrap();
        let ctx = RequestContext::from_request(&req);
        assert_eq!(
            Template::parse("{{.URL}}").unwrap().render(&ctx).unwrap(),
            "http://app.example.com/home"
        );
    }
}
