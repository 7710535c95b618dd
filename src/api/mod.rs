//! REST API client module.
//!
//! This module provides the `RestClient` for making authenticated JSON
//! requests against a backend, with session state cached per execution
//! context and base URL.
//!
//! Authentication uses the backend's `/login` endpoint: a credential
//! `POST` or a token `GET`, each expected to answer with a JSON body
//! carrying a `token` field. Subsequent requests send the token in the
//! `X-Auth-Token` header alongside `X-Domain` and optionally `X-Tenant`.

pub mod client;
pub mod error;
pub mod transport;

pub use client::{ConnectOptions, RestClient};
pub use error::ApiError;
pub use transport::{HttpExecute, RawResponse, ReqwestTransport, TransportError};
