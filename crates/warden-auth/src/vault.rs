//! Session snapshots in the key/value table.
//!
//! Sessions are written under `session<slot>` and the world state under
//! `session`, so a map change or restart within the same process can pick
//! them up again. Persistence is best effort: store failures are logged and
//! the caller carries on as if nothing had been saved.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use warden_crypto::codec::{bin_to_hex, hex_to_bin};
use warden_crypto::{HASH_BIN_SIZE, HASH_HEX_SIZE};
use warden_store::Store;

use crate::{AuthContext, AuthError, AuthSession, AuthState};

const WORLD_KEY: &str = "session";

fn client_key(slot: usize) -> String {
    format!("session{slot}")
}

/// Persisted part of an [`AuthSession`].
///
/// Confirmation keys are not stored; a restored session never
/// reuses them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub auth_state: AuthState,
    pub cuid_hash: Option<[u8; HASH_BIN_SIZE]>,
}

impl SessionSnapshot {
    pub fn capture(session: &AuthSession) -> Self {
        Self {
            auth_state: session.state(),
            cuid_hash: session
                .cuid_hash()
                .and_then(|hex| hex_to_bin::<HASH_BIN_SIZE>(hex).ok()),
        }
    }

    /// Rebuild a session for `slot`.
    ///
    /// With authentication disabled every snapshot yields a fresh `NONE`
    /// session. Otherwise a handshake that was in flight starts over as if
    /// the client had just connected, completed sessions keep their
    /// identity hash and failed ones stay failed.
    pub fn restore(
        &self,
        ctx: &AuthContext,
        slot: usize,
        client_supports_protocol: bool,
    ) -> AuthSession {
        let fresh = || AuthSession::new(ctx, slot, client_supports_protocol);
        if !ctx.is_enabled() || self.auth_state.is_in_progress() {
            return fresh();
        }

        match self.auth_state {
            AuthState::Complete => match self.cuid_hash.map(|h| bin_to_hex::<HASH_HEX_SIZE>(&h)) {
                Some(Ok(hash)) => AuthSession::resumed(slot, AuthState::Complete, Some(hash)),
                _ => fresh(),
            },
            AuthState::Failed => AuthSession::resumed(slot, AuthState::Failed, None),
            _ => AuthSession::resumed(slot, AuthState::None, None),
        }
    }
}

/// Persisted world state; client snapshots are only valid for the mode
/// they were written under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub mode: i32,
}

/// Snapshot reader/writer over a [`Store`].
#[derive(Debug, Clone, Copy)]
pub struct SessionVault<'s> {
    store: &'s Store,
}

impl<'s> SessionVault<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    pub fn write_world(&self, mode: i32) {
        if let Err(e) = self.put(WORLD_KEY, &WorldSnapshot { mode }) {
            warn!("failed to save world session data: {e}");
        }
    }

    /// Whether the stored world matches `mode`. A mismatch or missing
    /// world means client snapshots must be ignored.
    pub fn world_matches(&self, mode: i32) -> bool {
        let stored = match self.fetch::<WorldSnapshot>(WORLD_KEY) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("failed to read world session data: {e}");
                None
            }
        };

        let matches = stored.is_some_and(|w| w.mode == mode);
        if !matches {
            info!("mode changed, clearing session data");
        }
        matches
    }

    pub fn write_client(&self, session: &AuthSession) {
        let key = client_key(session.slot());
        if let Err(e) = self.put(&key, &SessionSnapshot::capture(session)) {
            warn!(slot = session.slot(), "failed to save client session data: {e}");
        }
    }

    /// Snapshot for `slot`, if one was saved and decodes cleanly.
    pub fn read_client(&self, slot: usize) -> Option<SessionSnapshot> {
        match self.fetch(&client_key(slot)) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(slot, "failed to read client session data: {e}");
                None
            }
        }
    }

    /// Session for a client reconnecting into `slot`: restored when the
    /// world matches and a snapshot exists, fresh otherwise.
    pub fn resume_client(
        &self,
        ctx: &AuthContext,
        slot: usize,
        world_matches: bool,
        client_supports_protocol: bool,
    ) -> AuthSession {
        let snapshot = if world_matches {
            self.read_client(slot)
        } else {
            None
        };

        match snapshot {
            Some(snapshot) => snapshot.restore(ctx, slot, client_supports_protocol),
            None => AuthSession::new(ctx, slot, client_supports_protocol),
        }
    }

    fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AuthError> {
        let bytes = bincode::serialize(value)?;
        self.store.kv()?.set(key, &bytes)?;
        Ok(())
    }

    fn fetch<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<Option<T>, AuthError> {
        match self.store.kv()?.get(key, false)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfirmationKeys;
    use warden_crypto::{hash_hex, seal, CipherHex, KeyPair};

    fn open_store() -> Store {
        let mut store = Store::new();
        store.open_in_memory().unwrap();
        store
    }

    fn enabled_ctx() -> AuthContext {
        AuthContext::with_confirmation(
            Some(KeyPair::generate().unwrap()),
            ConfirmationKeys::with_seed(1),
        )
    }

    fn completed(ctx: &mut AuthContext, slot: usize) -> AuthSession {
        let mut session = AuthSession::new(ctx, slot, true);
        let mut sink: Vec<(usize, crate::ServerCommand)> = Vec::new();
        session.announce(ctx, &mut sink);

        let public = ctx.keypair().unwrap().public().clone();
        let first: CipherHex = seal(&public, "ck1=1\nck2=2").unwrap();
        session.handle_first_reply(ctx, &mut sink, first.as_str());

        let [s1, s2] = session.server_keys().unwrap();
        let second: CipherHex = seal(&public, &format!("skx={}\ncid=abc123", s1 ^ s2)).unwrap();
        session.handle_second_reply(ctx, second.as_str());
        assert_eq!(session.state(), AuthState::Complete);
        session
    }

    #[test]
    fn test_world_roundtrip() {
        let store = open_store();
        let vault = SessionVault::new(&store);

        assert!(!vault.world_matches(7));
        vault.write_world(7);
        assert!(vault.world_matches(7));
        assert!(!vault.world_matches(8));
    }

    #[test]
    fn test_complete_session_keeps_hash() {
        let store = open_store();
        let vault = SessionVault::new(&store);
        let mut ctx = enabled_ctx();

        vault.write_client(&completed(&mut ctx, 4));
        let restored = vault.resume_client(&ctx, 4, true, true);

        assert_eq!(restored.state(), AuthState::Complete);
        assert_eq!(restored.cuid_hash(), Some(hash_hex("abc123").unwrap().as_str()));
    }

    #[test]
    fn test_in_flight_session_restarts() {
        let store = open_store();
        let vault = SessionVault::new(&store);
        let ctx = enabled_ctx();

        let mut session = AuthSession::new(&ctx, 2, true);
        let mut sink: Vec<(usize, crate::ServerCommand)> = Vec::new();
        session.announce(&ctx, &mut sink);
        vault.write_client(&session);

        let restored = vault.resume_client(&ctx, 2, true, true);
        assert_eq!(restored.state(), AuthState::Pending);
        assert!(restored.server_keys().is_none());

        let restored = vault.resume_client(&AuthContext::disabled(), 2, true, true);
        assert_eq!(restored.state(), AuthState::None);
    }

    #[test]
    fn test_in_flight_session_follows_client_support() {
        let store = open_store();
        let vault = SessionVault::new(&store);
        let ctx = enabled_ctx();

        let mut session = AuthSession::new(&ctx, 6, true);
        let mut sink: Vec<(usize, crate::ServerCommand)> = Vec::new();
        session.announce(&ctx, &mut sink);
        vault.write_client(&session);

        let restored = vault.resume_client(&ctx, 6, true, false);
        assert_eq!(restored.state(), AuthState::None);
    }

    #[test]
    fn test_disabled_auth_drops_completed_identity() {
        let store = open_store();
        let vault = SessionVault::new(&store);
        let mut ctx = enabled_ctx();
        vault.write_client(&completed(&mut ctx, 0));

        let disabled = AuthContext::disabled();
        for supports in [true, false] {
            let restored = vault.resume_client(&disabled, 0, true, supports);
            assert_eq!(restored.state(), AuthState::None);
            assert!(restored.cuid_hash().is_none());
        }
    }

    #[test]
    fn test_failed_session_stays_failed() {
        let store = open_store();
        let vault = SessionVault::new(&store);
        let mut ctx = enabled_ctx();

        let mut session = AuthSession::new(&ctx, 0, true);
        let mut sink: Vec<(usize, crate::ServerCommand)> = Vec::new();
        session.announce(&ctx, &mut sink);
        session.handle_first_reply(&mut ctx, &mut sink, "bogus");
        vault.write_client(&session);

        assert_eq!(
            vault.resume_client(&ctx, 0, true, true).state(),
            AuthState::Failed
        );
    }

    #[test]
    fn test_world_mismatch_ignores_snapshot() {
        let store = open_store();
        let vault = SessionVault::new(&store);
        let mut ctx = enabled_ctx();
        vault.write_client(&completed(&mut ctx, 1));

        let fresh = vault.resume_client(&ctx, 1, false, true);
        assert_eq!(fresh.state(), AuthState::Pending);
        assert!(fresh.cuid_hash().is_none());
    }

    #[test]
    fn test_closed_store_degrades_silently() {
        let store = Store::new();
        let vault = SessionVault::new(&store);
        let ctx = enabled_ctx();

        vault.write_world(1);
        vault.write_client(&AuthSession::new(&ctx, 0, true));
        assert!(!vault.world_matches(1));
        assert!(vault.read_client(0).is_none());
    }

    #[test]
    fn test_corrupt_snapshot_is_ignored() {
        let store = open_store();
        store.kv().unwrap().set("session5", &[0xff; 3]).unwrap();

        let vault = SessionVault::new(&store);
        assert!(vault.read_client(5).is_none());
    }
}
