//! Session-cached REST client.
//!
//! This module provides the `RestClient` struct for making authenticated
//! API requests. Clients constructed for the same (execution context,
//! base URL) pair share one cached session, so a reconnect within a
//! context transparently reuses the prior auth token.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::auth::{ContextId, SessionEntry, SessionRegistry};

use super::transport::{HttpExecute, RawResponse};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Login path appended to the base URL for both credential and token logins.
const LOGIN_PATH: &str = "login";

/// Header carrying the session auth token on every request.
const X_AUTH_TOKEN: &str = "X-Auth-Token";

/// Header selecting the authentication domain.
const X_DOMAIN: &str = "X-Domain";

/// Header selecting the tenant.
const X_TENANT: &str = "X-Tenant";

/// Stale header key cleared before re-authenticating.
const STALE_TOKEN_HEADER: &str = "token";

/// `expire` flag sent with credential logins: asks the backend for an
/// expiring token.
const LOGIN_EXPIRE: u32 = 1;

/// Inputs for [`RestClient::connect`]. Only the base URL is required.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    /// Re-authenticate with the supplied credentials even when a session
    /// already exists for this (context, base URL) pair. Without this
    /// flag an existing session wins and new credentials are ignored.
    pub force_reauthenticate: bool,
}

impl ConnectOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

/// REST client bound to one session entry.
///
/// The session (credentials, headers, token) is shared with every other
/// client for the same (context, base URL) pair; mutations through one
/// handle are visible to all of them.
pub struct RestClient {
    transport: Arc<dyn HttpExecute>,
    context: ContextId,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    domain: Option<String>,
    entry: Arc<SessionEntry>,
    token: Option<String>,
}

impl RestClient {
    /// Connect to a backend, creating or joining the cached session for
    /// `(context, options.base_url)`.
    ///
    /// If the session already exists, its stored credentials and headers
    /// are adopted and any newly supplied credentials are ignored, unless
    /// `options.force_reauthenticate` is set.
    ///
    /// For a fresh (or forced) session with a username supplied, this
    /// performs a login network call: construction can fail with
    /// [`ApiError::Authentication`] or a transport error.
    pub async fn connect(
        registry: &SessionRegistry,
        transport: Arc<dyn HttpExecute>,
        context: ContextId,
        options: ConnectOptions,
    ) -> Result<Self, ApiError> {
        let (entry, created) = registry.entry(&context, &options.base_url);

        if !created && !options.force_reauthenticate {
            debug!(base_url = %options.base_url, context = %context, "reusing cached session");
            let (username, password, domain) = entry.credentials();
            let token = entry.headers().get(X_AUTH_TOKEN).cloned();
            return Ok(Self {
                transport,
                context,
                base_url: options.base_url,
                username,
                password,
                domain,
                entry,
                token,
            });
        }

        entry.with_state(|s| {
            s.username = options.username.clone();
            s.password = options.password.clone();
            s.domain = options.domain.clone();
            if options.force_reauthenticate {
                s.headers.clear();
                s.last_authenticated = None;
            }
        });

        let mut client = Self {
            transport,
            context,
            base_url: options.base_url,
            username: options.username,
            password: options.password,
            domain: options.domain,
            entry,
            token: None,
        };

        if let Some(username) = client.username.clone() {
            let password = client.password.clone().unwrap_or_default();
            let domain = client.domain.clone();
            client
                .authenticate(&username, &password, domain.as_deref())
                .await?;
        }

        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn context(&self) -> &ContextId {
        &self.context
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Current auth token, if a login has succeeded.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Shared session entry backing this client.
    pub fn session(&self) -> &Arc<SessionEntry> {
        &self.entry
    }

    /// Log in with credentials.
    ///
    /// Sends `POST <base>/login` with `{"username", "password", "expire": 1}`.
    /// On a response carrying a `token` field the token is stored, the
    /// `X-Auth-Token` header is set, and the updated headers are persisted
    /// into the session. On a response without one the session headers are
    /// left untouched and [`ApiError::Authentication`] is returned.
    pub async fn authenticate(
        &mut self,
        username: &str,
        password: &str,
        domain: Option<&str>,
    ) -> Result<Value, ApiError> {
        let auth_url = format!("{}/{}", self.base_url, LOGIN_PATH);

        // Mutate a scratch copy; the session only sees headers from a
        // successful login.
        let mut headers = self.entry.headers();
        headers.remove(STALE_TOKEN_HEADER);
        if let Some(domain) = domain {
            headers.insert(X_DOMAIN.to_string(), domain.to_string());
        }

        let body = json!({
            "username": username,
            "password": password,
            "expire": LOGIN_EXPIRE,
        });
        let payload = serde_json::to_string(&body)?;

        let response = self
            .transport
            .execute(Method::POST, &auth_url, Some(payload), &headers)
            .await?;
        let decoded = decode_body(response.body)?;

        // Success keys on the field's presence; non-string values are
        // stringified for the header.
        let token = decoded
            .as_ref()
            .and_then(|body| body.get("token"))
            .map(|token| match token {
                Value::String(token) => token.clone(),
                other => other.to_string(),
            });

        match token {
            Some(token) => {
                headers.insert(X_AUTH_TOKEN.to_string(), token.clone());
                self.entry.with_state(|s| s.headers = headers);
                self.entry.mark_authenticated();
                self.token = Some(token);
                debug!(base_url = %self.base_url, username, "authenticated");
                Ok(decoded.unwrap_or(Value::Null))
            }
            None => {
                warn!(base_url = %self.base_url, username, "login response carried no token");
                Err(ApiError::Authentication)
            }
        }
    }

    /// Log in with a pre-obtained token instead of credentials.
    ///
    /// Sends `GET <base>/login` with `X-Tenant`, `X-Domain`, and
    /// `X-Auth-Token` set. Any response carrying a `token` field is
    /// accepted and the supplied token is kept as-is; the returned value
    /// is not compared against it.
    pub async fn authenticate_with_token(
        &mut self,
        token: &str,
        domain: Option<&str>,
        tenant: Option<&str>,
    ) -> Result<Value, ApiError> {
        debug!(base_url = %self.base_url, "token login");
        let auth_url = format!("{}/{}", self.base_url, LOGIN_PATH);

        let mut headers = self.entry.headers();
        if let Some(tenant) = tenant {
            headers.insert(X_TENANT.to_string(), tenant.to_string());
        }
        if let Some(domain) = domain {
            headers.insert(X_DOMAIN.to_string(), domain.to_string());
        }
        headers.insert(X_AUTH_TOKEN.to_string(), token.to_string());

        let response = self
            .transport
            .execute(Method::GET, &auth_url, None, &headers)
            .await?;
        let decoded = decode_body(response.body)?;

        let accepted = decoded
            .as_ref()
            .map(|body| body.get("token").is_some())
            .unwrap_or(false);

        if accepted {
            self.entry.with_state(|s| s.headers = headers);
            self.entry.mark_authenticated();
            self.token = Some(token.to_string());
            Ok(decoded.unwrap_or(Value::Null))
        } else {
            warn!(base_url = %self.base_url, "token login response carried no token");
            Err(ApiError::Authentication)
        }
    }

    /// Set the `X-Domain` header for this session.
    pub fn set_domain(&mut self, domain: &str) {
        self.domain = Some(domain.to_string());
        self.entry.set_header(X_DOMAIN, domain);
    }

    /// Set the `X-Tenant` header for this session.
    pub fn set_tenant(&mut self, tenant: &str) {
        self.entry.set_header(X_TENANT, tenant);
    }

    /// Issue a request and decode the JSON response, if any.
    ///
    /// `path` is resolved against the base URL unless it already contains
    /// it. Caller-supplied headers act as a base layer; session headers of
    /// the same name overwrite them. A single attempt with no retry;
    /// transport failures propagate unchanged.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        headers: Option<&HashMap<String, String>>,
    ) -> Result<(HashMap<String, String>, Option<Value>), ApiError> {
        let payload = body.map(serde_json::to_string).transpose()?;

        let url = if path.contains(&self.base_url) {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path)
        };

        let merged = match headers {
            None => self.entry.headers(),
            Some(base) => {
                let mut merged = base.clone();
                merged.extend(self.entry.headers());
                merged
            }
        };

        debug!(%method, %url, "executing request");
        let RawResponse { headers, body } = self
            .transport
            .execute(method, &url, payload, &merged)
            .await?;

        Ok((headers, decode_body(body)?))
    }
}

/// Decode an optional response body. Absent or empty bodies decode to
/// `None` rather than a decode error.
fn decode_body(body: Option<String>) -> Result<Option<Value>, ApiError> {
    match body {
        None => Ok(None),
        Some(text) if text.trim().is_empty() => Ok(None),
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::api::transport::TransportError;

    use super::*;

    #[derive(Debug, Clone)]
    struct Recorded {
        method: Method,
        url: String,
        body: Option<String>,
        headers: HashMap<String, String>,
    }

    /// In-memory transport double: replays queued responses and records
    /// every request it sees.
    #[derive(Default)]
    struct MockTransport {
        responses: Mutex<VecDeque<RawResponse>>,
        requests: Mutex<Vec<Recorded>>,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn respond_json(&self, value: Value) {
            self.responses.lock().unwrap().push_back(RawResponse {
                headers: HashMap::new(),
                body: Some(value.to_string()),
            });
        }

        fn respond_empty(&self) {
            self.responses.lock().unwrap().push_back(RawResponse::default());
        }

        fn requests(&self) -> Vec<Recorded> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpExecute for MockTransport {
        async fn execute(
            &self,
            method: Method,
            url: &str,
            body: Option<String>,
            headers: &HashMap<String, String>,
        ) -> Result<RawResponse, TransportError> {
            self.requests.lock().unwrap().push(Recorded {
                method,
                url: url.to_string(),
                body,
                headers: headers.clone(),
            });
            Ok(self.responses.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    fn credential_options(base_url: &str) -> ConnectOptions {
        ConnectOptions {
            base_url: base_url.to_string(),
            username: Some("alice".to_string()),
            password: Some("secret".to_string()),
            domain: Some("alpha".to_string()),
            force_reauthenticate: false,
        }
    }

    #[tokio::test]
    async fn connect_without_username_skips_login() {
        let registry = SessionRegistry::new();
        let transport = MockTransport::new();

        let client = RestClient::connect(
            &registry,
            transport.clone(),
            ContextId::new("c1"),
            ConnectOptions::new("http://h/api"),
        )
        .await
        .unwrap();

        assert!(transport.requests().is_empty());
        assert!(client.token().is_none());
    }

    #[tokio::test]
    async fn connect_with_credentials_logs_in() {
        let registry = SessionRegistry::new();
        let transport = MockTransport::new();
        transport.respond_json(json!({"token": "abc"}));

        let client = RestClient::connect(
            &registry,
            transport.clone(),
            ContextId::new("c1"),
            credential_options("http://h/api"),
        )
        .await
        .unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[0].url, "http://h/api/login");

        let body: Value = serde_json::from_str(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"username": "alice", "password": "secret", "expire": 1}));

        assert_eq!(client.token(), Some("abc"));
        let headers = client.session().headers();
        assert_eq!(headers.get("X-Auth-Token").map(String::as_str), Some("abc"));
        assert_eq!(headers.get("X-Domain").map(String::as_str), Some("alpha"));
        assert!(!headers.contains_key("token"));
    }

    #[tokio::test]
    async fn login_accepts_non_string_tokens() {
        let registry = SessionRegistry::new();
        let transport = MockTransport::new();
        transport.respond_json(json!({"token": 12345}));

        let client = RestClient::connect(
            &registry,
            transport.clone(),
            ContextId::new("c1"),
            credential_options("http://h/api"),
        )
        .await
        .unwrap();

        assert_eq!(client.token(), Some("12345"));
        assert_eq!(
            client.session().headers().get("X-Auth-Token").map(String::as_str),
            Some("12345")
        );
    }

    #[tokio::test]
    async fn failed_login_leaves_session_headers_unchanged() {
        let registry = SessionRegistry::new();
        let transport = MockTransport::new();

        let mut client = RestClient::connect(
            &registry,
            transport.clone(),
            ContextId::new("c1"),
            ConnectOptions::new("http://h/api"),
        )
        .await
        .unwrap();
        client.set_domain("alpha");

        transport.respond_json(json!({}));
        let err = client.authenticate("alice", "secret", Some("beta")).await;
        assert!(matches!(err, Err(ApiError::Authentication)));

        let headers = client.session().headers();
        assert_eq!(headers.get("X-Domain").map(String::as_str), Some("alpha"));
        assert!(!headers.contains_key("X-Auth-Token"));
    }

    #[tokio::test]
    async fn reconnect_reuses_stored_session() {
        let registry = SessionRegistry::new();
        let transport = MockTransport::new();
        transport.respond_json(json!({"token": "abc"}));

        let ctx = ContextId::new("c1");
        let first = RestClient::connect(
            &registry,
            transport.clone(),
            ctx.clone(),
            credential_options("http://h/api"),
        )
        .await
        .unwrap();

        // Different credentials, same pair: the existing session wins and
        // no second login request goes out.
        let second = RestClient::connect(
            &registry,
            transport.clone(),
            ctx,
            ConnectOptions {
                base_url: "http://h/api".to_string(),
                username: Some("mallory".to_string()),
                password: Some("other".to_string()),
                domain: None,
                force_reauthenticate: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(transport.requests().len(), 1);
        assert_eq!(second.username(), Some("alice"));
        assert_eq!(second.token(), first.token());
        assert!(Arc::ptr_eq(first.session(), second.session()));
    }

    #[tokio::test]
    async fn force_reauthenticate_honors_new_credentials() {
        let registry = SessionRegistry::new();
        let transport = MockTransport::new();
        transport.respond_json(json!({"token": "abc"}));

        let ctx = ContextId::new("c1");
        RestClient::connect(
            &registry,
            transport.clone(),
            ctx.clone(),
            credential_options("http://h/api"),
        )
        .await
        .unwrap();

        transport.respond_json(json!({"token": "xyz"}));
        let second = RestClient::connect(
            &registry,
            transport.clone(),
            ctx,
            ConnectOptions {
                base_url: "http://h/api".to_string(),
                username: Some("mallory".to_string()),
                password: Some("other".to_string()),
                domain: None,
                force_reauthenticate: true,
            },
        )
        .await
        .unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        let body: Value = serde_json::from_str(requests[1].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["username"], "mallory");

        assert_eq!(second.username(), Some("mallory"));
        assert_eq!(second.token(), Some("xyz"));
    }

    #[tokio::test]
    async fn distinct_contexts_get_independent_sessions() {
        let registry = SessionRegistry::new();
        let transport = MockTransport::new();
        transport.respond_json(json!({"token": "one"}));
        transport.respond_json(json!({"token": "two"}));

        let a = RestClient::connect(
            &registry,
            transport.clone(),
            ContextId::new("c1"),
            credential_options("http://h/api"),
        )
        .await
        .unwrap();
        let b = RestClient::connect(
            &registry,
            transport.clone(),
            ContextId::new("c2"),
            credential_options("http://h/api"),
        )
        .await
        .unwrap();

        assert_eq!(a.token(), Some("one"));
        assert_eq!(b.token(), Some("two"));

        a.session().set_header("X-Domain", "changed");
        assert_eq!(
            b.session().headers().get("X-Domain").map(String::as_str),
            Some("alpha")
        );
    }

    #[tokio::test]
    async fn token_login_keeps_supplied_token() {
        let registry = SessionRegistry::new();
        let transport = MockTransport::new();

        let mut client = RestClient::connect(
            &registry,
            transport.clone(),
            ContextId::new("c1"),
            ConnectOptions::new("http://h/api"),
        )
        .await
        .unwrap();

        // Returned token differs from the supplied one; presence is all
        // that is checked.
        transport.respond_json(json!({"token": "server-side"}));
        client
            .authenticate_with_token("mine", Some("alpha"), Some("acme"))
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].url, "http://h/api/login");
        assert_eq!(requests[0].headers.get("X-Auth-Token").map(String::as_str), Some("mine"));
        assert_eq!(requests[0].headers.get("X-Domain").map(String::as_str), Some("alpha"));
        assert_eq!(requests[0].headers.get("X-Tenant").map(String::as_str), Some("acme"));

        assert_eq!(client.token(), Some("mine"));
    }

    #[tokio::test]
    async fn execute_resolves_relative_and_absolute_paths() {
        let registry = SessionRegistry::new();
        let transport = MockTransport::new();

        let client = RestClient::connect(
            &registry,
            transport.clone(),
            ContextId::new("c1"),
            ConnectOptions::new("http://h/api"),
        )
        .await
        .unwrap();

        transport.respond_empty();
        client.execute(Method::GET, "items", None, None).await.unwrap();
        transport.respond_empty();
        client
            .execute(Method::GET, "http://h/api/items", None, None)
            .await
            .unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].url, "http://h/api/items");
        assert_eq!(requests[1].url, "http://h/api/items");
    }

    #[tokio::test]
    async fn execute_layers_session_headers_over_caller_headers() {
        let registry = SessionRegistry::new();
        let transport = MockTransport::new();

        let mut client = RestClient::connect(
            &registry,
            transport.clone(),
            ContextId::new("c1"),
            ConnectOptions::new("http://h/api"),
        )
        .await
        .unwrap();
        client.set_domain("session");

        let mut caller = HashMap::new();
        caller.insert("X-Domain".to_string(), "caller".to_string());
        caller.insert("X-Request-Id".to_string(), "42".to_string());

        transport.respond_empty();
        client
            .execute(Method::GET, "items", None, Some(&caller))
            .await
            .unwrap();

        let sent = &transport.requests()[0].headers;
        assert_eq!(sent.get("X-Domain").map(String::as_str), Some("session"));
        assert_eq!(sent.get("X-Request-Id").map(String::as_str), Some("42"));
    }

    #[tokio::test]
    async fn execute_decodes_json_and_passes_empty_bodies_through() {
        let registry = SessionRegistry::new();
        let transport = MockTransport::new();

        let client = RestClient::connect(
            &registry,
            transport.clone(),
            ContextId::new("c1"),
            ConnectOptions::new("http://h/api"),
        )
        .await
        .unwrap();

        transport.respond_json(json!({"ok": true}));
        let (_, body) = client.execute(Method::GET, "items", None, None).await.unwrap();
        assert_eq!(body, Some(json!({"ok": true})));

        transport.respond_empty();
        let (_, body) = client.execute(Method::GET, "items", None, None).await.unwrap();
        assert_eq!(body, None);
    }

    #[tokio::test]
    async fn execute_serializes_request_bodies() {
        let registry = SessionRegistry::new();
        let transport = MockTransport::new();

        let client = RestClient::connect(
            &registry,
            transport.clone(),
            ContextId::new("c1"),
            ConnectOptions::new("http://h/api"),
        )
        .await
        .unwrap();

        transport.respond_empty();
        let body = json!({"name": "widget"});
        client
            .execute(Method::POST, "items", Some(&body), None)
            .await
            .unwrap();

        let sent: Value =
            serde_json::from_str(transport.requests()[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, body);
    }
}
