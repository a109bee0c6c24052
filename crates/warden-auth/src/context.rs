//! Process-wide handshake state, owned explicitly by the caller.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::error;
use warden_crypto::{KeyMaterial, KeyPair};

/// Source of server confirmation keys.
///
/// Each key mixes a seeded PRNG with the milliseconds elapsed since the
/// generator was created. The keys only prove receipt of a message that
/// already travelled over the sealed channel; nothing relies on them being
/// unguessable beyond avoiding reuse across sessions.
#[derive(Debug)]
pub struct ConfirmationKeys {
    rng: StdRng,
    epoch: Instant,
}

impl ConfirmationKeys {
    /// Seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            epoch: Instant::now(),
        }
    }

    /// Deterministic PRNG seed, for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            epoch: Instant::now(),
        }
    }

    pub fn next_key(&mut self) -> i32 {
        let millis = self.epoch.elapsed().as_millis() as u32;
        (self.rng.next_u32() ^ millis) as i32
    }

    pub fn next_pair(&mut self) -> [i32; 2] {
        [self.next_key(), self.next_key()]
    }
}

impl Default for ConfirmationKeys {
    fn default() -> Self {
        Self::new()
    }
}

/// Server key pair and confirmation key source shared by every session.
///
/// Without a key pair authentication is disabled: new sessions start in
/// [`AuthState::None`](crate::AuthState::None) and stay there.
#[derive(Debug)]
pub struct AuthContext {
    keypair: Option<KeyPair>,
    confirmation: ConfirmationKeys,
}

impl AuthContext {
    pub fn new(keypair: Option<KeyPair>) -> Self {
        Self::with_confirmation(keypair, ConfirmationKeys::new())
    }

    pub fn with_confirmation(keypair: Option<KeyPair>, confirmation: ConfirmationKeys) -> Self {
        Self {
            keypair,
            confirmation,
        }
    }

    /// Context for the key material found at startup. `enabled` is the
    /// operator switch; with it off the keys are dropped.
    pub fn from_material(material: KeyMaterial, enabled: bool) -> Self {
        let keypair = if enabled { material.into_keypair() } else { None };

        if keypair.is_none() {
            error!(
                "client authentication support was disabled; \
                 clients will not be able to prove their identity"
            );
        }

        Self::new(keypair)
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.keypair.is_some()
    }

    pub fn keypair(&self) -> Option<&KeyPair> {
        self.keypair.as_ref()
    }

    pub(crate) fn confirmation_mut(&mut self) -> &mut ConfirmationKeys {
        &mut self.confirmation
    }
}
