//! authcache - a session-caching authenticated REST client.
//!
//! Clients are constructed against an explicit [`SessionRegistry`],
//! partitioned by an execution-context identifier and base URL. All
//! clients built for the same (context, URL) pair share one cached
//! session: credentials, `X-Auth-Token` / `X-Domain` / `X-Tenant`
//! headers, and the auth token obtained from the backend's `/login`
//! endpoint.
//!
//! Note that [`RestClient::connect`] performs a login network call when
//! a username is supplied for a fresh session, so construction itself
//! can fail with an authentication or transport error.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use authcache::{ConnectOptions, ContextId, ReqwestTransport, RestClient, SessionRegistry};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SessionRegistry::new();
//! let transport = Arc::new(ReqwestTransport::new()?);
//!
//! let options = ConnectOptions {
//!     base_url: "https://backend.example/api".to_string(),
//!     username: Some("alice".to_string()),
//!     password: Some("secret".to_string()),
//!     domain: Some("default".to_string()),
//!     force_reauthenticate: false,
//! };
//! let client =
//!     RestClient::connect(&registry, transport, ContextId::current_thread(), options).await?;
//!
//! let (_headers, body) = client.execute(reqwest::Method::GET, "users", None, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;

pub use api::{
    ApiError, ConnectOptions, HttpExecute, RawResponse, ReqwestTransport, RestClient,
    TransportError,
};
pub use auth::{ContextId, CredentialStore, SessionEntry, SessionRegistry};
pub use config::Config;
