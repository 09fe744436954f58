//! Access-control decision engine.
//!
//! # States
//! - CheckPublic: ask the authority whether the origin is public
//! - NeedCredential: look for a query token or session cookie
//! - ValidateToken: validate the query token, promote it to a cookie
//! - ValidateSession: validate the session cookie
//!
//! # State Transitions
//! ```text
//! CheckPublic → Allow: origin is public
//! CheckPublic → NeedCredential: not public, or the check failed
//! NeedCredential → RedirectLogin: no credential (cookie-unsafe tokens count as none)
//! NeedCredential → ValidateToken: query token present
//! NeedCredential → ValidateSession: only a session cookie present
//! ValidateToken → Forbidden: token rejected
//! ValidateToken → RedirectCanonical: token accepted, URL changes once stripped
//! ValidateToken → Allow: token accepted, URL already canonical
//! ValidateToken → ValidateSession: transport error, session cookie present
//! ValidateToken → RedirectLogin: transport error, no session cookie
//! ValidateSession → Forbidden | Allow | RedirectLogin (transport error)
//! ```
//!
//! Calls are strictly sequential; public status always wins over credentials.

use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::access::authority::Authority;
use crate::access::credential::{strip_query_param, Credential, Credentials};
use crate::config::GateConfig;
use crate::http::request::RequestContext;
use crate::observability::metrics;
use crate::observability::{EventKind, RequestTelemetry};

/// Characters left unescaped by `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Why access control did not run for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradeReason {
    /// Non-production deployment; no authority is consulted.
    AuthorityDisabled,
    /// Static asset path.
    AssetPath,
}

/// Outcome of the gate for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    RedirectTo {
        location: String,
        set_cookie: Option<String>,
    },
    Forbidden,
    ProceedDegraded(DegradeReason),
}

impl AccessDecision {
    /// Whether the render supervisor runs for this decision.
    pub fn permits_render(&self) -> bool {
        matches!(self, Self::Allow | Self::ProceedDegraded(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::RedirectTo { set_cookie: Some(_), .. } => "redirect_canonical",
            Self::RedirectTo { .. } => "redirect_login",
            Self::Forbidden => "forbidden",
            Self::ProceedDegraded(DegradeReason::AssetPath) => "bypass_asset",
            Self::ProceedDegraded(DegradeReason::AuthorityDisabled) => "bypass_non_production",
        }
    }
}

#[derive(Debug)]
enum State {
    CheckPublic,
    NeedCredential,
    ValidateToken { token: String },
    ValidateSession { session: String },
}

/// Settings the engine reads on every request.
#[derive(Debug, Clone)]
pub struct AccessSettings {
    pub production: bool,
    pub asset_prefixes: Vec<String>,
    pub login_base: String,
    pub session_cookie: String,
    pub token_param: String,
    pub session_max_age_secs: u64,
}

impl From<&GateConfig> for AccessSettings {
    fn from(config: &GateConfig) -> Self {
        Self {
            production: config.deployment.production,
            asset_prefixes: config.deployment.asset_prefixes.clone(),
            login_base: config.authority.base_url().to_string(),
            session_cookie: config.authority.session_cookie.clone(),
            token_param: config.authority.token_param.clone(),
            session_max_age_secs: config.authority.session_max_age_secs,
        }
    }
}

/// The per-origin access gate.
#[derive(Clone)]
pub struct AccessGate {
    authority: Arc<dyn Authority>,
    settings: AccessSettings,
}

impl AccessGate {
    pub fn new(settings: AccessSettings, authority: Arc<dyn Authority>) -> Self {
        Self { authority, settings }
    }

    /// Reason the engine is skipped for `path`, if any.
    pub fn bypass_reason(&self, path: &str) -> Option<DegradeReason> {
        if !self.settings.production {
            return Some(DegradeReason::AuthorityDisabled);
        }
        self.settings
            .asset_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
            .then_some(DegradeReason::AssetPath)
    }

    /// Run the state machine to a single decision.
    pub async fn decide(&self, ctx: &RequestContext, telemetry: &RequestTelemetry) -> AccessDecision {
        if let Some(reason) = self.bypass_reason(ctx.path()) {
            tracing::debug!(request_id = %ctx.request_id, ?reason, "Access control bypassed");
            return AccessDecision::ProceedDegraded(reason);
        }

        let origin = ctx.origin();
        let credentials = Credentials::extract(
            &ctx.url,
            ctx.cookie_header.as_deref(),
            &self.settings.token_param,
            &self.settings.session_cookie,
        );

        let mut state = State::CheckPublic;
        loop {
            tracing::debug!(request_id = %ctx.request_id, state = ?StateName::from(&state), "Access state");
            state = match state {
                State::CheckPublic => {
                    telemetry.emit(
                        telemetry
                            .event(EventKind::CheckingPublicStatus)
                            .with("origin", origin.as_str()),
                    );
                    match self.authority.is_public(&origin).await {
                        Ok(true) => {
                            metrics::record_authority_call("is_public", "public");
                            telemetry.emit(
                                telemetry
                                    .event(EventKind::PublicSiteAllowed)
                                    .with("origin", origin.as_str()),
                            );
                            return AccessDecision::Allow;
                        }
                        Ok(false) => {
                            metrics::record_authority_call("is_public", "private");
                            State::NeedCredential
                        }
                        Err(e) => {
                            metrics::record_authority_call("is_public", "error");
                            tracing::warn!(request_id = %ctx.request_id, error = %e, "Public status check failed");
                            telemetry.emit(
                                telemetry
                                    .event(EventKind::PublicCheckError)
                                    .with("error", e.to_string()),
                            );
                            State::NeedCredential
                        }
                    }
                }

                State::NeedCredential => match credentials.primary() {
                    Credential::QueryToken(token) => State::ValidateToken { token },
                    Credential::SessionCookie(session) => State::ValidateSession { session },
                    Credential::None => {
                        telemetry.mark(EventKind::NoAuthRedirect);
                        return self.login_redirect(ctx);
                    }
                },

                State::ValidateToken { token } => {
                    telemetry.emit(
                        telemetry
                            .event(EventKind::ValidatingAuthToken)
                            .with("origin", origin.as_str()),
                    );
                    match self.authority.validate(&token, &origin).await {
                        Ok(v) if !v.allowed => {
                            metrics::record_authority_call("validate_token", "denied");
                            tracing::info!(request_id = %ctx.request_id, origin = %origin, "Query token rejected");
                            telemetry.emit(
                                telemetry
                                    .event(EventKind::InvalidToken)
                                    .with("origin", origin.as_str()),
                            );
                            return AccessDecision::Forbidden;
                        }
                        Ok(_) => {
                            metrics::record_authority_call("validate_token", "allowed");
                            let canonical = strip_query_param(&ctx.url, &self.settings.token_param);
                            if canonical == ctx.url {
                                return AccessDecision::Allow;
                            }
                            telemetry.emit(
                                telemetry
                                    .event(EventKind::TokenValidatedRedirect)
                                    .with("newUrl", canonical.as_str()),
                            );
                            return AccessDecision::RedirectTo {
                                location: canonical.to_string(),
                                set_cookie: Some(self.session_cookie_header(&token)),
                            };
                        }
                        Err(e) => {
                            metrics::record_authority_call("validate_token", "error");
                            tracing::warn!(request_id = %ctx.request_id, error = %e, "Query token validation failed");
                            telemetry.emit(
                                telemetry
                                    .event(EventKind::TokenValidationError)
                                    .with("error", e.to_string()),
                            );
                            match &credentials.session_cookie {
                                Some(session) => State::ValidateSession {
                                    session: session.clone(),
                                },
                                None => return self.login_redirect(ctx),
                            }
                        }
                    }
                }

                State::ValidateSession { session } => {
                    telemetry.emit(
                        telemetry
                            .event(EventKind::ValidatingSession)
                            .with("origin", origin.as_str()),
                    );
                    match self.authority.validate(&session, &origin).await {
                        Ok(v) if v.allowed => {
                            metrics::record_authority_call("validate_session", "allowed");
                            return AccessDecision::Allow;
                        }
                        Ok(_) => {
                            metrics::record_authority_call("validate_session", "denied");
                            tracing::info!(request_id = %ctx.request_id, origin = %origin, "Session rejected");
                            telemetry.emit(
                                telemetry
                                    .event(EventKind::InvalidSession)
                                    .with("origin", origin.as_str()),
                            );
                            return AccessDecision::Forbidden;
                        }
                        Err(e) => {
                            metrics::record_authority_call("validate_session", "error");
                            tracing::warn!(request_id = %ctx.request_id, error = %e, "Session validation failed");
                            telemetry.emit(
                                telemetry
                                    .event(EventKind::SessionValidationError)
                                    .with("error", e.to_string()),
                            );
                            return self.login_redirect(ctx);
                        }
                    }
                }
            };
        }
    }

    fn login_redirect(&self, ctx: &RequestContext) -> AccessDecision {
        AccessDecision::RedirectTo {
            location: login_location(&self.settings.login_base, ctx.url.as_str()),
            set_cookie: None,
        }
    }

    /// `token` only ever holds cookie octets; extraction drops anything else.
    fn session_cookie_header(&self, token: &str) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.settings.session_cookie, token, self.settings.session_max_age_secs
        )
    }
}

/// `{base}/app-access?redirect={original url, component-encoded}`.
pub fn login_location(login_base: &str, original_url: &str) -> String {
    format!(
        "{}/app-access?redirect={}",
        login_base,
        utf8_percent_encode(original_url, URI_COMPONENT)
    )
}

/// State tag for logging, without credential values.
#[derive(Debug)]
enum StateName {
    CheckPublic,
    NeedCredential,
    ValidateToken,
    ValidateSession,
}

impl From<&State> for StateName {
    fn from(state: &State) -> Self {
        match state {
            State::CheckPublic => Self::CheckPublic,
            State::NeedCredential => Self::NeedCredential,
            State::ValidateToken { .. } => Self::ValidateToken,
            State::ValidateSession { .. } => Self::ValidateSession,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::authority::{AuthError, Validation};
    use crate::observability::Telemetry;
    use async_trait::async_trait;
    use axum::http::Request;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted authority that records every call.
    #[derive(Default)]
    struct ScriptedAuthority {
        public: Option<bool>,
        tokens: HashMap<String, Option<bool>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedAuthority {
        fn public(public: Option<bool>) -> Self {
            Self {
                public,
                ..Default::default()
            }
        }

        fn token(mut self, token: &str, allowed: Option<bool>) -> Self {
            self.tokens.insert(token.to_string(), allowed);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Authority for ScriptedAuthority {
        async fn is_public(&self, origin: &str) -> Result<bool, AuthError> {
            self.calls.lock().unwrap().push(format!("public:{origin}"));
            self.public
                .ok_or_else(|| AuthError::Transport("connection refused".into()))
        }

        async fn validate(&self, token: &str, origin: &str) -> Result<Validation, AuthError> {
            self.calls.lock().unwrap().push(format!("validate:{token}:{origin}"));
            match self.tokens.get(token).copied().flatten() {
                Some(allowed) => Ok(Validation { allowed }),
                None => Err(AuthError::Transport("connection reset".into())),
            }
        }
    }

    fn settings(production: bool) -> AccessSettings {
        let mut config = GateConfig::default();
        config.deployment.production = production;
        config.authority.host = "https://builder.example".into();
        AccessSettings::from(&config)
    }

    fn ctx(url: &str, cookie: Option<&str>) -> RequestContext {
        let url = url::Url::parse(url).unwrap();
        let mut builder = Request::get(&url[url::Position::BeforePath..])
            .header("host", url.host_str().unwrap())
            .header("x-forwarded-proto", url.scheme());
        if let Some(cookie) = cookie {
            builder = builder.header("cookie", cookie);
        }
        let parts = builder.body(()).unwrap().into_parts().0;
        RequestContext::from_parts(&parts, "http", "localhost").unwrap()
    }

    async fn decide(
        authority: Arc<ScriptedAuthority>,
        url: &str,
        cookie: Option<&str>,
    ) -> (AccessDecision, Vec<EventKind>) {
        let gate = AccessGate::new(settings(true), authority);
        let (telemetry, mut rx) = Telemetry::channel(64);
        let decision = gate.decide(&ctx(url, cookie), &telemetry.for_request("t")).await;
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        (decision, kinds)
    }

    #[test]
    fn test_login_location_encoding() {
        assert_eq!(
            login_location("https://builder.example", "https://shop.example/"),
            "https://builder.example/app-access?redirect=https%3A%2F%2Fshop.example%2F"
        );
        assert_eq!(
            login_location("https://b", "https://s/a?x=1&y=(2)"),
            "https://b/app-access?redirect=https%3A%2F%2Fs%2Fa%3Fx%3D1%26y%3D(2)"
        );
    }

    #[tokio::test]
    async fn test_asset_paths_skip_authority() {
        let authority = Arc::new(ScriptedAuthority::public(Some(false)));
        for url in ["https://shop.example/build/app.js", "https://shop.example/assets/logo.png?authToken=x"] {
            let (decision, _) = decide(authority.clone(), url, None).await;
            assert_eq!(decision, AccessDecision::ProceedDegraded(DegradeReason::AssetPath));
        }
        assert!(authority.calls().is_empty());
    }

    #[tokio::test]
    async fn test_non_production_skips_authority() {
        let authority = Arc::new(ScriptedAuthority::public(Some(false)));
        let gate = AccessGate::new(settings(false), authority.clone());
        let decision = gate
            .decide(&ctx("https://shop.example/", None), &Telemetry::disabled().for_request("t"))
            .await;

        assert_eq!(decision, AccessDecision::ProceedDegraded(DegradeReason::AuthorityDisabled));
        assert!(authority.calls().is_empty());
    }

    #[tokio::test]
    async fn test_public_origin_wins_over_stale_token() {
        let authority = Arc::new(ScriptedAuthority::public(Some(true)).token("stale", Some(false)));
        let (decision, kinds) =
            decide(authority.clone(), "https://shop.example/?authToken=stale", Some("userSession=old")).await;

        assert_eq!(decision, AccessDecision::Allow);
        assert_eq!(authority.calls(), vec!["public:https://shop.example"]);
        assert_eq!(kinds, vec![EventKind::CheckingPublicStatus, EventKind::PublicSiteAllowed]);
    }

    #[tokio::test]
    async fn test_no_credential_redirects_to_login() {
        let authority = Arc::new(ScriptedAuthority::public(Some(false)));
        let (decision, kinds) = decide(authority, "https://shop.example", None).await;

        assert_eq!(
            decision,
            AccessDecision::RedirectTo {
                location: "https://builder.example/app-access?redirect=https%3A%2F%2Fshop.example%2F".into(),
                set_cookie: None,
            }
        );
        assert_eq!(kinds.last(), Some(&EventKind::NoAuthRedirect));
    }

    #[tokio::test]
    async fn test_public_check_error_falls_to_credentials() {
        let authority = Arc::new(ScriptedAuthority::public(None).token("tok123", Some(true)));
        let (decision, kinds) = decide(authority, "https://shop.example/", Some("userSession=tok123")).await;

        assert_eq!(decision, AccessDecision::Allow);
        assert!(kinds.contains(&EventKind::PublicCheckError));
    }

    #[tokio::test]
    async fn test_valid_session_allows() {
        let authority = Arc::new(ScriptedAuthority::public(Some(false)).token("tok123", Some(true)));
        let (decision, _) = decide(authority.clone(), "https://shop.example/", Some("userSession=tok123")).await;

        assert_eq!(decision, AccessDecision::Allow);
        assert_eq!(
            authority.calls(),
            vec!["public:https://shop.example", "validate:tok123:https://shop.example"]
        );
    }

    #[tokio::test]
    async fn test_rejected_session_is_forbidden() {
        let authority = Arc::new(ScriptedAuthority::public(Some(false)).token("bad", Some(false)));
        let (decision, kinds) = decide(authority, "https://shop.example/", Some("userSession=bad")).await;

        assert_eq!(decision, AccessDecision::Forbidden);
        assert_eq!(kinds.last(), Some(&EventKind::InvalidSession));
    }

    #[tokio::test]
    async fn test_session_transport_error_redirects_to_login() {
        let authority = Arc::new(ScriptedAuthority::public(Some(false)));
        let (decision, _) = decide(authority, "https://shop.example/p", Some("userSession=tok")).await;

        assert!(matches!(
            decision,
            AccessDecision::RedirectTo { set_cookie: None, ref location } if location.contains("app-access")
        ));
    }

    #[tokio::test]
    async fn test_valid_token_promoted_to_cookie() {
        let authority = Arc::new(ScriptedAuthority::public(Some(false)).token("abc", Some(true)));
        let (decision, kinds) = decide(authority, "https://shop.example/cart?authToken=abc&x=1", None).await;

        assert_eq!(
            decision,
            AccessDecision::RedirectTo {
                location: "https://shop.example/cart?x=1".into(),
                set_cookie: Some("userSession=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=86400".into()),
            }
        );
        assert_eq!(kinds.last(), Some(&EventKind::TokenValidatedRedirect));
    }

    #[tokio::test]
    async fn test_rejected_token_is_forbidden_even_with_session() {
        let authority = Arc::new(
            ScriptedAuthority::public(Some(false))
                .token("abc", Some(false))
                .token("good", Some(true)),
        );
        let (decision, _) = decide(authority.clone(), "https://shop.example/?authToken=abc", Some("userSession=good")).await;

        assert_eq!(decision, AccessDecision::Forbidden);
        assert_eq!(authority.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_token_error_falls_back_to_session() {
        let authority = Arc::new(ScriptedAuthority::public(Some(false)).token("good", Some(true)));
        let (decision, kinds) =
            decide(authority.clone(), "https://shop.example/?authToken=flaky", Some("userSession=good")).await;

        assert_eq!(decision, AccessDecision::Allow);
        assert!(kinds.contains(&EventKind::TokenValidationError));
        assert_eq!(authority.calls().last().unwrap(), "validate:good:https://shop.example");
    }

    #[tokio::test]
    async fn test_token_error_without_session_redirects_to_login() {
        let authority = Arc::new(ScriptedAuthority::public(Some(false)));
        let (decision, _) = decide(authority, "https://shop.example/?authToken=flaky", None).await;

        assert_eq!(
            decision,
            AccessDecision::RedirectTo {
                location: login_location(
                    "https://builder.example",
                    "https://shop.example/?authToken=flaky"
                ),
                set_cookie: None,
            }
        );
    }

    #[tokio::test]
    async fn test_cookie_unsafe_token_is_never_promoted() {
        let authority = Arc::new(
            ScriptedAuthority::public(Some(false)).token("a; Domain=evil.example", Some(true)),
        );
        let url = "https://shop.example/?authToken=a%3B%20Domain%3Devil.example";
        let (decision, kinds) = decide(authority.clone(), url, None).await;

        assert_eq!(
            decision,
            AccessDecision::RedirectTo {
                location: login_location("https://builder.example", url),
                set_cookie: None,
            }
        );
        assert_eq!(authority.calls(), vec!["public:https://shop.example"]);
        assert_eq!(kinds.last(), Some(&EventKind::NoAuthRedirect));
    }
}
