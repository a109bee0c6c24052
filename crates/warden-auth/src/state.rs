//! Handshake states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a connection is in the handshake.
///
/// `Complete` and `Failed` are terminal; leaving `Failed` takes a fresh
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AuthState {
    /// Authentication does not apply to this client.
    #[default]
    None,
    /// Client supports the protocol, server has not announced yet.
    Pending,
    /// Public key sent, waiting for the first reply.
    ClAnnounce,
    /// Challenge sent, waiting for the second reply.
    ClAuth,
    Complete,
    Failed,
}

impl AuthState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AuthState::Complete | AuthState::Failed)
    }

    /// Somewhere between announce and completion.
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            AuthState::Pending | AuthState::ClAnnounce | AuthState::ClAuth
        )
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthState::None => "NONE",
            AuthState::Pending => "PENDING",
            AuthState::ClAnnounce => "CLANNOUNCE",
            AuthState::ClAuth => "CLAUTH",
            AuthState::Complete => "COMPLETE",
            AuthState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}
