//! Client authentication for Warden.
//!
//! A connecting client proves it received the server's sealed messages in a
//! three-message handshake:
//!
//! ```text
//! server -> client   clannounce <version> <server public key>
//! client -> server   svauth seal(ck1, ck2)
//! server -> client   clauth <ck1 ^ ck2> <s1> <s2>
//! client -> server   svauth seal(skx = s1 ^ s2, cid)
//! ```
//!
//! On success the session holds the hash of the client's claimed unique id.
//! The [`schema`] module defines the identity tables that id feeds into and
//! [`vault`] keeps session snapshots across map changes.

#![forbid(unsafe_code)]

pub mod client;
pub mod context;
pub mod error;
pub mod protocol;
pub mod schema;
pub mod session;
pub mod state;
pub mod vault;

pub use client::ClientHandshake;
pub use context::{AuthContext, ConfirmationKeys};
pub use error::AuthError;
pub use protocol::{
    ClientCommand, CommandSink, InfoString, ServerCommand, AUTH_PROTOCOL_VERSION,
    MAX_COMMAND_LEN,
};
pub use session::{AuthSession, Transition};
pub use state::AuthState;
pub use vault::{SessionSnapshot, SessionVault, WorldSnapshot};
