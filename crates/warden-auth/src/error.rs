//! Handshake error type.
//!
//! Most of these never reach a caller: the session turns them into a
//! transition to [`AuthState::Failed`](crate::AuthState::Failed) and logs a
//! generic line.

use thiserror::Error;
use warden_crypto::CryptoError;
use warden_store::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication is disabled")]
    Disabled,

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("malformed field '{0}'")]
    MalformedField(&'static str),

    #[error("confirmation keys do not match")]
    ConfirmationMismatch,

    #[error("unexpected protocol version {0}")]
    ProtocolVersion(i32),

    #[error("unexpected server command '{0}'")]
    UnexpectedCommand(&'static str),

    #[error("command is {len} bytes, limit is {max}")]
    CommandTooLong { len: usize, max: usize },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("snapshot encoding error: {0}")]
    Snapshot(#[from] bincode::Error),
}
