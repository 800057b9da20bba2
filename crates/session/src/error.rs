//! Session-layer error model.

use chrono::{DateTime, Utc};
use thiserror::Error;

use cybertrain_auth::CredentialError;

use crate::slot::SlotError;

/// Errors raised by the session layer.
///
/// Only explicit login attempts (`adopt`/`login`) and interceptor calls hand
/// these back to callers. Everywhere else a failure is converted into its one
/// observable effect: the session is cleared and the user lands on the login
/// view.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The credential could not be decoded.
    #[error("malformed credential: {0}")]
    MalformedCredential(#[from] CredentialError),

    /// The credential decoded but its expiry has already passed.
    #[error("credential expired at {expired_at}")]
    ExpiredCredential { expired_at: DateTime<Utc> },

    /// The server answered 401 for a guarded call.
    #[error("the server rejected the credential")]
    AuthorizationRejected,

    /// The persisted slot could not be read or written.
    ///
    /// Degraded mode: the session keeps working in memory but will not
    /// survive a restart.
    #[error("credential storage unavailable: {0}")]
    StorageUnavailable(#[from] SlotError),

    /// The login endpoint refused the submitted credentials.
    #[error("invalid credentials (status {status})")]
    InvalidCredentials { status: u16 },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

pub type SessionResult<T> = Result<T, SessionError>;
