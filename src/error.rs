//! Error types for regionkv.

use std::time::Duration;
use thiserror::Error;

/// Error code prefix the remote store uses for access-control rejections
pub const ACCESS_DENIED_PREFIX: &str = "AccessDenied";

/// Result type alias for regionkv operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What a remote call says about a region's authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    /// The call went through
    Authorized,
    /// The store rejected the call on access-control grounds
    Denied,
    /// Anything else: network, timeout, missing table, ...
    OtherFailure,
}

impl AuthorizationOutcome {
    /// Classify a store error code
    pub fn from_code(code: &str) -> Self {
        if code.starts_with(ACCESS_DENIED_PREFIX) {
            AuthorizationOutcome::Denied
        } else {
            AuthorizationOutcome::OtherFailure
        }
    }
}

/// Errors raised by a `DataClient` implementation.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The store answered with an error code
    #[error("{code}: {message}")]
    Store { code: String, message: String },

    /// The request never got a store answer
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn store(code: impl Into<String>, message: impl Into<String>) -> Self {
        ClientError::Store {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn outcome(&self) -> AuthorizationOutcome {
        match self {
            ClientError::Store { code, .. } => AuthorizationOutcome::from_code(code),
            _ => AuthorizationOutcome::OtherFailure,
        }
    }
}

/// Errors surfaced to callers of a regional connection.
///
/// Every remote failure is converted into one of these at the
/// connection boundary.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Region {region} denied access ({code}): {message}")]
    AccessDenied {
        region: String,
        code: String,
        message: String,
    },

    #[error("Region {region} returned {code}: {message}")]
    Store {
        region: String,
        code: String,
        message: String,
    },

    #[error("Region {region} transport error: {message}")]
    Transport { region: String, message: String },

    #[error("Region {region} timed out after {timeout:?}")]
    Timeout { region: String, timeout: Duration },

    #[error("Region {region} has no open client")]
    Unavailable { region: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Attach the region to a client error
    pub fn from_client(region: &str, err: ClientError) -> Self {
        let region = region.to_string();
        match err {
            ClientError::Store { code, message } => {
                if AuthorizationOutcome::from_code(&code) == AuthorizationOutcome::Denied {
                    Error::AccessDenied {
                        region,
                        code,
                        message,
                    }
                } else {
                    Error::Store {
                        region,
                        code,
                        message,
                    }
                }
            }
            ClientError::Transport(message) => Error::Transport { region, message },
            ClientError::Io(e) => Error::Transport {
                region,
                message: e.to_string(),
            },
        }
    }

    pub fn outcome(&self) -> AuthorizationOutcome {
        match self {
            Error::AccessDenied { .. } => AuthorizationOutcome::Denied,
            _ => AuthorizationOutcome::OtherFailure,
        }
    }

    pub fn is_access_denied(&self) -> bool {
        self.outcome() == AuthorizationOutcome::Denied
    }
}
