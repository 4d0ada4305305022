//! The claim-requirement policy and its pattern language
//!
//! A policy is a tree of requirements keyed by claim name. Each leaf is a
//! scalar, a list of scalars, or a nested mapping whose keys are wildcard
//! patterns. Token claims are arbitrary JSON, so evaluation is a double
//! dispatch over (requirement shape, claim shape):
//!
//! * scalar vs string: strict-typed equality, or a wildcard match with
//!   the pattern on either side;
//! * scalar vs list: any element matches;
//! * scalar vs object: any object *key* matches the scalar, values
//!   ignored;
//! * list vs anything: any element matches by the scalar rule;
//! * object vs object: every requirement entry must find a matching
//!   claim key whose value satisfies the sub-requirement;
//! * anything else: no match. Numeric and boolean values never coerce
//!   to or from strings.
//!
//! String requirements may carry `{{.Field}}` template expressions which
//! are interpolated against the request before matching. A template that
//! cannot be rendered fails the requirement closed.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Number, Value};

use crate::template::{RequestContext, Template, TemplateParseError};

/// A single requirement node as decoded from configuration
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Requirement {
    /// A nested mapping of wildcard patterns to sub-requirements
    Object(BTreeMap<String, Requirement>),

    /// Any one of the listed scalars must match
    List(Vec<ScalarValue>),

    /// A single scalar to match
    Scalar(ScalarValue),
}

/// A scalar requirement value
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// A boolean
    Bool(bool),

    /// An integer or float
    Number(Number),

    /// A string, possibly holding a wildcard pattern or template
    String(String),
}

/// A compiled requirement tree, ready for per-request evaluation
///
/// Compilation pre-parses template expressions and pre-compiles
/// requirement-side wildcard patterns; claim-side patterns can only be
/// compiled when a token arrives.
#[derive(Debug, Default)]
pub struct ClaimsPolicy {
    root: BTreeMap<String, CompiledRequirement>,
}

#[derive(Debug)]
enum CompiledRequirement {
    Scalar(CompiledScalar),
    List(Vec<CompiledScalar>),
    Object(BTreeMap<String, CompiledRequirement>),
}

#[derive(Debug)]
enum CompiledScalar {
    Bool(bool),
    Number(Number),
    String(CompiledString),
    Template(Template),
}

#[derive(Debug)]
struct CompiledString {
    value: String,
    pattern: Option<Regex>,
}

impl CompiledString {
    fn new(value: String) -> Self {
        let pattern = wildcard_regex(&value);
        Self { value, pattern }
    }

    /// Whether this requirement string accepts the given claim string
    ///
    /// Either side may hold the wildcard.
    fn accepts(&self, claim: &str) -> bool {
        if self.value == claim {
            return true;
        }

        if let Some(pattern) = &self.pattern {
            if pattern.is_match(claim) {
                return true;
            }
        }

        if let Some(claim_pattern) = wildcard_regex(claim) {
            if claim_pattern.is_match(&self.value) {
                return true;
            }
        }

        false
    }
}

impl ClaimsPolicy {
    /// Compiles a requirement tree
    ///
    /// # Errors
    ///
    /// Returns an error if any embedded template expression is malformed;
    /// such errors belong at construction, not on the request path.
    pub fn compile(tree: &BTreeMap<String, Requirement>) -> Result<Self, TemplateParseError> {
        let mut root = BTreeMap::new();
        for (claim, requirement) in tree {
            root.insert(claim.clone(), compile_requirement(requirement)?);
        }
        Ok(Self { root })
    }

    /// Whether the policy has no requirements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Evaluates the token claims against the policy
    ///
    /// Every requirement must be satisfied by the claim recorded under
    /// its name; a missing claim is a mismatch.
    #[must_use]
    pub fn evaluate(&self, claims: &Map<String, Value>, ctx: &RequestContext) -> bool {
        self.root.iter().all(|(name, requirement)| {
            claims
                .get(name)
                .map_or(false, |claim| requirement_matches(requirement, claim, ctx))
        })
    }
}

fn compile_requirement(
    requirement: &Requirement,
) -> Result<CompiledRequirement, TemplateParseError> {
    let compiled = match requirement {
        Requirement::Scalar(scalar) => CompiledRequirement::Scalar(compile_scalar(scalar)?),
        Requirement::List(scalars) => CompiledRequirement::List(
            scalars
                .iter()
                .map(compile_scalar)
                .collect::<Result<_, _>>()?,
        ),
        Requirement::Object(map) => {
            let mut compiled_map = BTreeMap::new();
            for (pattern, sub) in map {
                compiled_map.insert(pattern.clone(), compile_requirement(sub)?);
            }
            CompiledRequirement::Object(compiled_map)
        }
    };

    Ok(compiled)
}

fn compile_scalar(scalar: &ScalarValue) -> Result<CompiledScalar, TemplateParseError> {
    let compiled = match scalar {
        ScalarValue::Bool(b) => CompiledScalar::Bool(*b),
        ScalarValue::Number(n) => CompiledScalar::Number(n.clone()),
        ScalarValue::String(s) if Template::is_templated(s) => {
            CompiledScalar::Template(Template::parse(s)?)
        }
        ScalarValue::String(s) => CompiledScalar::String(CompiledString::new(s.clone())),
    };

    Ok(compiled)
}

fn requirement_matches(
    requirement: &CompiledRequirement,
    claim: &Value,
    ctx: &RequestContext,
) -> bool {
    match requirement {
        CompiledRequirement::Scalar(scalar) => scalar_matches(scalar, claim, ctx),
        CompiledRequirement::List(scalars) => {
            scalars.iter().any(|s| scalar_matches(s, claim, ctx))
        }
        CompiledRequirement::Object(map) => {
            let Value::Object(claim_map) = claim else {
                return false;
            };

            map.iter().all(|(pattern, sub)| {
                claim_map.iter().any(|(claim_key, claim_value)| {
                    keys_match(pattern, claim_key) && requirement_matches(sub, claim_value, ctx)
                })
            })
        }
    }
}

fn scalar_matches(scalar: &CompiledScalar, claim: &Value, ctx: &RequestContext) -> bool {
    // Lists and objects distribute over the scalar rule regardless of the
    // requirement's type.
    match claim {
        Value::Array(items) => return items.iter().any(|item| scalar_matches(scalar, item, ctx)),
        Value::Object(map) => {
            return match resolve_string(scalar, ctx) {
                Some(required) => map.keys().any(|key| required.accepts(key)),
                None => false,
            }
        }
        _ => {}
    }

    match scalar {
        CompiledScalar::Bool(required) => claim.as_bool() == Some(*required),
        CompiledScalar::Number(required) => matches!(claim, Value::Number(n) if n == required),
        CompiledScalar::String(required) => {
            matches!(claim, Value::String(s) if required.accepts(s))
        }
        CompiledScalar::Template(template) => match (template.render(ctx), claim) {
            (Ok(rendered), Value::String(s)) => CompiledString::new(rendered).accepts(s),
            (Err(err), _) => {
                tracing::debug!(error = %err, template = %template, "requirement template failed; failing closed");
                false
            }
            _ => false,
        },
    }
}

/// Resolves a requirement scalar to a string form for key matching
fn resolve_string(scalar: &CompiledScalar, ctx: &RequestContext) -> Option<CompiledString> {
    match scalar {
        CompiledScalar::String(required) => Some(CompiledString {
            value: required.value.clone(),
            pattern: wildcard_regex(&required.value),
        }),
        CompiledScalar::Template(template) => match template.render(ctx) {
            Ok(rendered) => Some(CompiledString::new(rendered)),
            Err(err) => {
                tracing::debug!(error = %err, template = %template, "requirement template failed; failing closed");
                None
            }
        },
        _ => None,
    }
}

fn keys_match(requirement_key: &str, claim_key: &str) -> bool {
    if requirement_key == claim_key {
        return true;
    }

    if let Some(pattern) = wildcard_regex(claim_key) {
        if pattern.is_match(requirement_key) {
            return true;
        }
    }

    if let Some(pattern) = wildcard_regex(requirement_key) {
        if pattern.is_match(claim_key) {
            return true;
        }
    }

    false
}

/// Compiles a dotted-name wildcard pattern into an anchored regex
///
/// `*` matches zero or more label characters (anything but a dot). A
/// leading `*.` or trailing `.*` also accepts the bare remainder, so
/// `*.example.com` accepts `example.com` as well as `test.example.com`.
///
/// Returns `None` when the string holds no wildcard at all.
fn wildcard_regex(pattern: &str) -> Option<Regex> {
    if !pattern.contains('*') {
        return None;
    }

    let mut escaped = regex::escape(pattern);

    if let Some(rest) = escaped.strip_prefix(r"\*\.") {
        escaped = format!(r"(?:[^.]*\.)?{rest}");
    }

    if let Some(rest) = escaped.strip_suffix(r"\.\*") {
        escaped = format!(r"{rest}(?:\.[^.]*)?");
    }

    let escaped = escaped.replace(r"\*", "[^.]*");

    Regex::new(&format!("^{escaped}$")).ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn policy(require: serde_json::Value) -> ClaimsPolicy {
        let tree: BTreeMap<String, Requirement> = serde_json::from_value(require).unwrap();
        ClaimsPolicy::compile(&tree).unwrap()
    }

    fn claims(value: serde_json::Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::from_request(
            &http::Request::builder()
                .uri("https://app.example.com/home?id=1")
                .body(())
                .unwrap(),
        )
    }

    fn check(require: serde_json::Value, claim_set: serde_json::Value) -> bool {
        policy(require).evaluate(&claims(claim_set), &ctx())
    }

    #[test]
    fn exact_scalar_match() {
        assert!(check(json!({"aud": "test"}), json!({"aud": "test"})));
    }

    #[test]
    fn scalar_mismatch() {
        assert!(!check(json!({"aud": "test"}), json!({"aud": "other"})));
    }

    #[test]
    fn missing_claim_is_a_mismatch() {
        assert!(!check(json!({"aud": "test"}), json!({})));
    }

    #[test]
    fn numbers_do_not_coerce_to_strings() {
        assert!(!check(json!({"aud": 123}), json!({"aud": "test"})));
        assert!(!check(json!({"aud": 123}), json!({"aud": "123"})));
        assert!(!check(json!({"aud": "123"}), json!({"aud": 123})));
    }

    #[test]
    fn numbers_match_numbers() {
        assert!(check(json!({"level": 3}), json!({"level": 3})));
        assert!(!check(json!({"level": 3}), json!({"level": 4})));
    }

    #[test]
    fn booleans_match_booleans() {
        assert!(check(json!({"admin": true}), json!({"admin": true})));
        assert!(!check(json!({"admin": true}), json!({"admin": "true"})));
    }

    #[test]
    fn wildcard_claim_accepts_requirement() {
        assert!(check(
            json!({"authority": "test.example.com"}),
            json!({"authority": "*.example.com"})
        ));
    }

    #[test]
    fn wildcard_claim_accepts_bare_suffix() {
        assert!(check(
            json!({"authority": "example.com"}),
            json!({"authority": "*.example.com"})
        ));
    }

    #[test]
    fn wildcard_claim_rejects_other_domain() {
        assert!(!check(
            json!({"authority": "test.company.com"}),
            json!({"authority": "*.example.com"})
        ));
    }

    #[test]
    fn wildcard_requirement_accepts_claim() {
        assert!(check(
            json!({"authority": "*.example.com"}),
            json!({"authority": "test.example.com"})
        ));
    }

    #[test]
    fn wildcard_is_label_scoped() {
        assert!(!check(
            json!({"authority": "a.b.example.com"}),
            json!({"authority": "*.example.com"})
        ));
    }

    #[test]
    fn trailing_wildcard_accepts_bare_prefix() {
        assert!(check(
            json!({"authority": "example"}),
            json!({"authority": "example.*"})
        ));
        assert!(check(
            json!({"authority": "example.com"}),
            json!({"authority": "example.*"})
        ));
    }

    #[test]
    fn list_claim_matches_any_element() {
        assert!(check(
            json!({"authority": "test.example.com"}),
            json!({"authority": ["*.example.com", "other.example.com"]})
        ));
        assert!(!check(
            json!({"authority": "test.example.com"}),
            json!({"authority": ["*.company.com", "other.example.com"]})
        ));
    }

    #[test]
    fn list_requirement_matches_any_element() {
        assert!(check(
            json!({"authority": ["test.example.com", "other.other.com"]}),
            json!({"authority": ["*.example.com", "other.example.com"]})
        ));
    }

    #[test]
    fn scalar_against_object_matches_keys_only() {
        assert!(check(
            json!({"authority": "test.example.com"}),
            json!({"authority": {"*.example.com": ["user", "admin"]}})
        ));
        assert!(!check(
            json!({"authority": "test.example.com"}),
            json!({"authority": {"*.company.com": ["user", "admin"]}})
        ));
    }

    #[test]
    fn nested_object_single_values() {
        assert!(check(
            json!({"authority": {"test.example.com": "user"}}),
            json!({"authority": {"*.example.com": "user"}})
        ));
    }

    #[test]
    fn nested_object_list_values() {
        assert!(check(
            json!({"authority": {"test.example.com": "user"}}),
            json!({"authority": {"*.example.com": ["user", "admin"]}})
        ));
        assert!(check(
            json!({"authority": {"test.example.com": ["user", "admin"]}}),
            json!({"authority": {"*.example.com": "user"}})
        ));
    }

    #[test]
    fn nested_object_value_mismatch() {
        assert!(!check(
            json!({"authority": {"test.example.com": "admin"}}),
            json!({"authority": {"*.example.com": ["user", "guest"]}})
        ));
    }

    #[test]
    fn object_requirement_needs_object_claim() {
        assert!(!check(
            json!({"authority": {"test.example.com": "user"}}),
            json!({"authority": "test.example.com"})
        ));
    }

    #[test]
    fn every_requirement_entry_must_match() {
        assert!(check(
            json!({"aud": "test", "sub": "user"}),
            json!({"aud": "test", "sub": "user"})
        ));
        assert!(!check(
            json!({"aud": "test", "sub": "user"}),
            json!({"aud": "test", "sub": "other"})
        ));
    }

    #[test]
    fn template_requirement_matches_host() {
        assert!(check(
            json!({"authority": "{{.Host}}"}),
            json!({"authority": "app.example.com"})
        ));
    }

    #[test]
    fn template_requirement_matches_wildcard_claim() {
        assert!(check(
            json!({"authority": "{{.Host}}"}),
            json!({"authority": "*.example.com"})
        ));
    }

    #[test]
    fn unknown_template_field_fails_closed() {
        assert!(!check(
            json!({"authority": "{{.XHost}}"}),
            json!({"authority": "*.example.com"})
        ));
    }

    #[test]
    fn malformed_template_fails_compilation() {
        let tree: BTreeMap<String, Requirement> =
            serde_json::from_value(json!({"authority": "{{.Host"})).unwrap();
        assert!(ClaimsPolicy::compile(&tree).is_err());
    }

    #[test]
    fn null_claim_never_matches() {
        assert!(!check(json!({"aud": "test"}), json!({"aud": null})));
    }

    #[test]
    fn empty_policy_accepts_anything() {
        assert!(check(json!({}), json!({"whatever": 1})));
    }
}
