use thiserror::Error;

use super::transport::TransportError;

#[derive(Error, Debug)]
pub enum ApiError {
    /// A login response carried no `token` field. Fatal to the call;
    /// never retried internally.
    #[error("could not connect/authenticate")]
    Authentication,

    #[error("network error: {0}")]
    Transport(#[from] TransportError),

    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),
}
