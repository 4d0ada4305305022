//! The per-request filter pipeline and its tower integration
//!
//! [`JwtGate`] composes the extractor, verifier, resolver, claim policy,
//! header mapper, and response renderer into a single authorizer that
//! either hands the (possibly rewritten) request to the downstream
//! service or produces a response itself. It never does both, and it
//! never lets an error escape.

use std::{fmt, marker::PhantomData, sync::Arc};

use aliri_clock::{Clock, DurationSecs, System};
use futures::future::BoxFuture;
use http::{
    header::{HeaderName, AUTHORIZATION, LOCATION},
    HeaderValue, Request, Response, StatusCode,
};
use tower_http::auth::{AsyncAuthorizeRequest, AsyncRequireAuthorizationLayer};

use crate::{
    claims::ClaimsPolicy,
    config::Config,
    error::{AuthError, ConfigError},
    extract::TokenExtractor,
    headers::ClaimHeaderMapper,
    issuer::{self, IssuerRegistry},
    jwk::Jwk,
    jwt::TimingValidator,
    resolver::JwksResolver,
    template::{RequestContext, Template},
};

#[derive(Debug)]
struct GateInner {
    extractor: TokenExtractor,
    issuers: IssuerRegistry,
    resolver: JwksResolver,
    static_key: Option<Jwk>,
    policy: ClaimsPolicy,
    timing: TimingValidator,
    optional: bool,
    forward_token: bool,
    header_map: ClaimHeaderMapper,
    redirect_unauthorized: Option<Template>,
    redirect_forbidden: Option<Template>,
}

/// The JWT authentication filter
///
/// Cheap to clone; all request-independent state is shared. The JWKS
/// cache lives inside the instance rather than in any global, so filters
/// with different issuer sets coexist in one process.
#[derive(Clone, Debug)]
pub struct JwtGate {
    inner: Arc<GateInner>,
}

impl JwtGate {
    /// Constructs the filter from its configuration, using the system
    /// clock for temporal claims
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is unusable: a static
    /// secret that looks like PEM but does not parse, more than one
    /// token source, a malformed template, or an illegal header name.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        Self::with_clock(config, System)
    }

    /// Constructs the filter against a caller-supplied clock
    ///
    /// # Errors
    ///
    /// See [`new`][Self::new].
    pub fn with_clock(
        config: Config,
        clock: impl Clock + Send + Sync + 'static,
    ) -> Result<Self, ConfigError> {
        let extractor = extractor_from(&config)?;

        let static_key = if config.secret.is_empty() {
            None
        } else {
            Some(Jwk::from_secret(&config.secret)?)
        };

        let policy = ClaimsPolicy::compile(&config.require)?;

        let redirect_unauthorized = config
            .redirect_unauthorized
            .as_deref()
            .map(Template::parse)
            .transpose()?;
        let redirect_forbidden = config
            .redirect_forbidden
            .as_deref()
            .map(Template::parse)
            .transpose()?;

        let header_map = ClaimHeaderMapper::new(
            config
                .header_map
                .iter()
                .map(|(header, claim)| (header.as_str(), claim.as_str())),
        )?;

        Ok(Self {
            inner: Arc::new(GateInner {
                extractor,
                issuers: IssuerRegistry::new(&config.issuers.0),
                resolver: JwksResolver::new()?,
                static_key,
                policy,
                timing: TimingValidator::with_clock(DurationSecs(config.freshness), clock),
                optional: config.optional,
                forward_token: config.forward_token,
                header_map,
                redirect_unauthorized,
                redirect_forbidden,
            }),
        })
    }

    /// Wraps the filter as a tower layer
    ///
    /// The response body type is whatever the downstream service
    /// produces; denial responses are built from its `Default` value.
    pub fn layer<ResBody>(&self) -> AsyncRequireAuthorizationLayer<GateAuthorizer<ResBody>>
    where
        ResBody: Default + Send + 'static,
    {
        AsyncRequireAuthorizationLayer::new(GateAuthorizer {
            gate: self.clone(),
            _body: PhantomData,
        })
    }

    /// Runs the pipeline on one request
    ///
    /// Returns the request, rewritten per the configuration, when it may
    /// proceed downstream; otherwise returns the response to send.
    ///
    /// # Errors
    ///
    /// The error side is the denial response; no failure propagates
    /// beyond it.
    pub async fn handle<B, ResBody>(
        &self,
        mut req: Request<B>,
    ) -> Result<Request<B>, Response<ResBody>>
    where
        ResBody: Default,
    {
        let ctx = RequestContext::from_request(&req);

        match self.authorize(&mut req, &ctx).await {
            Ok(()) => Ok(req),
            Err(error) => {
                tracing::debug!(error = %error, "request denied");
                Err(self.denial_response(&error, &ctx))
            }
        }
    }

    async fn authorize<B>(
        &self,
        req: &mut Request<B>,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        let inner = &*self.inner;

        let Some(token) = inner.extractor.extract(req) else {
            if inner.optional {
                return Ok(());
            }
            return Err(AuthError::TokenMissing);
        };

        let decomposed = token.decompose()?;

        let issuer = decomposed.issuer().map(issuer::canonicalize);

        if !inner.issuers.is_empty() {
            match &issuer {
                Some(iss) if inner.issuers.accepts(iss) => {}
                _ => return Err(AuthError::IssuerUnknown),
            }
        }

        let key = match &inner.static_key {
            Some(key) if key.is_compatible(decomposed.alg()) => key.clone(),
            _ => {
                let iss = issuer.ok_or(AuthError::IssuerUnknown)?;
                inner
                    .resolver
                    .resolve(&iss, decomposed.kid(), decomposed.alg())
                    .await?
            }
        };

        decomposed.verify_signature(&key)?;
        inner.timing.validate(decomposed.claims())?;

        if !inner.policy.evaluate(decomposed.claims(), ctx) {
            return Err(AuthError::ClaimsRejected);
        }

        inner.header_map.apply(decomposed.claims(), req.headers_mut());

        if !inner.forward_token {
            inner.extractor.strip(req);
        }

        Ok(())
    }

    fn denial_response<ResBody>(
        &self,
        error: &AuthError,
        ctx: &RequestContext,
    ) -> Response<ResBody>
    where
        ResBody: Default,
    {
        let status = error.status();
        let template = if status == StatusCode::FORBIDDEN {
            self.inner.redirect_forbidden.as_ref()
        } else {
            self.inner.redirect_unauthorized.as_ref()
        };

        let Some(template) = template else {
            return status_response(status);
        };

        let location = template
            .render(ctx)
            .map_err(|err| err.to_string())
            .and_then(|location| {
                HeaderValue::try_from(location).map_err(|err| err.to_string())
            });

        match location {
            Ok(location) => {
                let mut response = status_response(StatusCode::FOUND);
                response.headers_mut().insert(LOCATION, location);
                response
            }
            Err(error) => {
                tracing::debug!(%error, template = %template, "redirect template failed to render");
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

fn status_response<ResBody: Default>(status: StatusCode) -> Response<ResBody> {
    let mut response = Response::new(ResBody::default());
    *response.status_mut() = status;
    response
}

fn extractor_from(config: &Config) -> Result<TokenExtractor, ConfigError> {
    let configured = [
        config.cookie_name.is_some(),
        config.header_name.is_some(),
        config.parameter_name.is_some(),
    ]
    .iter()
    .filter(|&&set| set)
    .count();

    if configured > 1 {
        return Err(ConfigError::MultipleTokenSources);
    }

    let extractor = if let Some(name) = &config.cookie_name {
        TokenExtractor::cookie(name)
    } else if let Some(name) = &config.parameter_name {
        TokenExtractor::query(name)
    } else if let Some(name) = &config.header_name {
        let name = HeaderName::try_from(name.as_str())
            .map_err(|_| ConfigError::InvalidHeaderName(name.clone()))?;
        TokenExtractor::header(name)
    } else {
        TokenExtractor::header(AUTHORIZATION)
    };

    Ok(extractor.with_bearer_prefix(config.bearer_prefix))
}

/// The filter as a `tower_http` request authorizer
///
/// Parameterized over the response body so denials can be rendered in
/// whatever body type the wrapped service produces.
pub struct GateAuthorizer<ResBody> {
    gate: JwtGate,
    _body: PhantomData<fn() -> ResBody>,
}

impl<ResBody> Clone for GateAuthorizer<ResBody> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            gate: self.gate.clone(),
            _body: PhantomData,
        }
    }
}

impl<ResBody> fmt::Debug for GateAuthorizer<ResBody> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("GateAuthorizer")
            .field("gate", &self.gate)
            .finish()
    }
}

impl<B, ResBody> AsyncAuthorizeRequest<B> for GateAuthorizer<ResBody>
where
    B: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type RequestBody = B;
    type ResponseBody = ResBody;
    type Future = BoxFuture<'static, Result<Request<B>, Response<ResBody>>>;

    fn authorize(&mut self, request: Request<B>) -> Self::Future {
        let gate = self.gate.clone();
        Box::pin(async move { gate.handle(request).await })
    }
}
