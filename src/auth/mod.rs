//! Authentication module for managing sessions and credentials.
//!
//! This module provides:
//! - `SessionRegistry` / `SessionEntry`: cached credential and header
//!   state, partitioned by execution context and base URL
//! - `CredentialStore`: secure OS-level credential storage via keyring

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{ContextId, SessionEntry, SessionRegistry, SessionState};
