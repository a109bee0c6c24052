//! Per-connection handshake state machine.
//!
//! ```text
//! NONE ──(client supports protocol)──> PENDING ──announce──> CLANNOUNCE
//!   CLANNOUNCE ──first reply ok──> CLAUTH ──second reply ok──> COMPLETE
//!   CLANNOUNCE / CLAUTH ──reply rejected──> FAILED
//! ```
//!
//! A message that arrives in the wrong state is ignored. A message that is
//! accepted and then fails decryption or verification always lands in
//! `FAILED`.

use tracing::{debug, warn};
use warden_crypto::{hash_hex, open, HashHex};

use crate::protocol::{ClientCommand, CommandSink, InfoString, ServerCommand};
use crate::{AuthContext, AuthError, AuthState, AUTH_PROTOCOL_VERSION};

/// What a handler did with its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Wrong state for this message; nothing changed.
    Ignored,
    Advanced(AuthState),
    Failed,
}

/// Handshake progress for one connected client.
#[derive(Debug, Clone)]
pub struct AuthSession {
    slot: usize,
    state: AuthState,
    server_keys: [i32; 2],
    cuid_hash: Option<HashHex>,
}

impl AuthSession {
    /// Fresh session for a newly connected client.
    ///
    /// Starts `PENDING` when authentication is enabled and the client
    /// declared support, `NONE` otherwise.
    pub fn new(ctx: &AuthContext, slot: usize, client_supports_protocol: bool) -> Self {
        let state = if ctx.is_enabled() && client_supports_protocol {
            AuthState::Pending
        } else {
            AuthState::None
        };
        Self::resumed(slot, state, None)
    }

    pub(crate) fn resumed(slot: usize, state: AuthState, cuid_hash: Option<HashHex>) -> Self {
        Self {
            slot,
            state,
            server_keys: [0; 2],
            cuid_hash,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Confirmation keys sent with the challenge, while one is outstanding.
    pub fn server_keys(&self) -> Option<[i32; 2]> {
        (self.state == AuthState::ClAuth).then_some(self.server_keys)
    }

    /// Hash of the client's unique id once the handshake completed.
    pub fn cuid_hash(&self) -> Option<&str> {
        self.cuid_hash.as_ref().map(|h| h.as_str())
    }

    /// Send the public key. Only acts in `PENDING`, so repeated triggers
    /// announce once.
    pub fn announce(&mut self, ctx: &AuthContext, sink: &mut dyn CommandSink) -> Transition {
        if self.state != AuthState::Pending {
            return Transition::Ignored;
        }
        let Some(keypair) = ctx.keypair() else {
            return Transition::Ignored;
        };

        sink.send(
            self.slot,
            &ServerCommand::Announce {
                version: AUTH_PROTOCOL_VERSION,
                public_key: keypair.public().hex().to_string(),
            },
        );
        debug!(slot = self.slot, "sent clannounce");

        self.advance(AuthState::ClAnnounce)
    }

    /// Route an inbound client command to the handler for the current
    /// state.
    pub fn handle_command(
        &mut self,
        ctx: &mut AuthContext,
        sink: &mut dyn CommandSink,
        command: &ClientCommand,
    ) -> Transition {
        let ClientCommand::Svauth(payload) = command;
        match self.state {
            AuthState::ClAnnounce => self.handle_first_reply(ctx, sink, payload),
            AuthState::ClAuth => self.handle_second_reply(ctx, payload),
            _ => Transition::Ignored,
        }
    }

    /// First reply: sealed `ck1`/`ck2`. Answers with the challenge.
    pub fn handle_first_reply(
        &mut self,
        ctx: &mut AuthContext,
        sink: &mut dyn CommandSink,
        cipher_hex: &str,
    ) -> Transition {
        if self.state != AuthState::ClAnnounce {
            return Transition::Ignored;
        }

        let client_keys = match read_first_reply(ctx, cipher_hex) {
            Ok(keys) => keys,
            Err(e) => return self.fail(e),
        };

        self.server_keys = ctx.confirmation_mut().next_pair();
        sink.send(
            self.slot,
            &ServerCommand::Challenge {
                client_xor: client_keys[0] ^ client_keys[1],
                server_keys: self.server_keys,
            },
        );

        self.advance(AuthState::ClAuth)
    }

    /// Second reply: sealed `skx`/`cid`. Completes the handshake.
    pub fn handle_second_reply(&mut self, ctx: &AuthContext, cipher_hex: &str) -> Transition {
        if self.state != AuthState::ClAuth {
            return Transition::Ignored;
        }

        match self.read_second_reply(ctx, cipher_hex) {
            Ok(hash) => {
                self.cuid_hash = Some(hash);
                self.server_keys = [0; 2];
                self.advance(AuthState::Complete)
            }
            Err(e) => self.fail(e),
        }
    }

    fn read_second_reply(&self, ctx: &AuthContext, cipher_hex: &str) -> Result<HashHex, AuthError> {
        let keypair = ctx.keypair().ok_or(AuthError::Disabled)?;
        let text = open(keypair, cipher_hex)?;
        let info = InfoString::parse(&text);

        let skx = info.require_i32("skx")?;
        let cid = info.require("cid")?;

        if skx != self.server_keys[0] ^ self.server_keys[1] {
            return Err(AuthError::ConfirmationMismatch);
        }

        Ok(hash_hex(cid)?)
    }

    fn advance(&mut self, next: AuthState) -> Transition {
        self.state = next;
        Transition::Advanced(next)
    }

    fn fail(&mut self, reason: AuthError) -> Transition {
        warn!(slot = self.slot, "authentication failed for client {}", self.slot);
        debug!(slot = self.slot, %reason, "handshake rejected");

        self.state = AuthState::Failed;
        self.server_keys = [0; 2];
        Transition::Failed
    }
}

fn read_first_reply(ctx: &AuthContext, cipher_hex: &str) -> Result<[i32; 2], AuthError> {
    let keypair = ctx.keypair().ok_or(AuthError::Disabled)?;
    let text = open(keypair, cipher_hex)?;
    let info = InfoString::parse(&text);
    Ok([info.require_i32("ck1")?, info.require_i32("ck2")?])
}
