//! Client side of the handshake.
//!
//! Real clients live elsewhere; this is the reference implementation the
//! server is tested against and the one `warden-server self-check` drives.

use warden_crypto::{seal, CipherHex, PublicKey};

use crate::{AuthError, ClientCommand, ServerCommand, AUTH_PROTOCOL_VERSION};

#[derive(Debug)]
pub struct ClientHandshake {
    cid: String,
    client_keys: [i32; 2],
    server_key: Option<PublicKey>,
}

impl ClientHandshake {
    pub fn new(cid: impl Into<String>, client_keys: [i32; 2]) -> Self {
        Self {
            cid: cid.into(),
            client_keys,
            server_key: None,
        }
    }

    /// Answer `clannounce` with the sealed client keys.
    pub fn on_announce(&mut self, command: &ServerCommand) -> Result<ClientCommand, AuthError> {
        let ServerCommand::Announce {
            version,
            public_key,
        } = command
        else {
            return Err(AuthError::UnexpectedCommand(command.name()));
        };
        if *version != AUTH_PROTOCOL_VERSION {
            return Err(AuthError::ProtocolVersion(*version));
        }

        let key = PublicKey::from_hex(public_key)?;
        let [ck1, ck2] = self.client_keys;
        let payload: CipherHex = seal(&key, &format!("ck1={ck1}\nck2={ck2}"))?;
        self.server_key = Some(key);

        Ok(ClientCommand::Svauth(payload.to_string()))
    }

    /// Answer `clauth` with the sealed confirmation and client id.
    ///
    /// Refuses to go on when the server's XOR of the client keys is wrong,
    /// since then the server never opened the first reply.
    pub fn on_challenge(&mut self, command: &ServerCommand) -> Result<ClientCommand, AuthError> {
        let ServerCommand::Challenge {
            client_xor,
            server_keys: [s1, s2],
        } = command
        else {
            return Err(AuthError::UnexpectedCommand(command.name()));
        };
        let key = self
            .server_key
            .as_ref()
            .ok_or(AuthError::UnexpectedCommand("clauth"))?;

        if *client_xor != self.client_keys[0] ^ self.client_keys[1] {
            return Err(AuthError::ConfirmationMismatch);
        }

        let payload: CipherHex = seal(key, &format!("skx={}\ncid={}", s1 ^ s2, self.cid))?;
        Ok(ClientCommand::Svauth(payload.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_crypto::{open, KeyPair};

    fn announce(keypair: &KeyPair) -> ServerCommand {
        ServerCommand::Announce {
            version: AUTH_PROTOCOL_VERSION,
            public_key: keypair.public().hex().to_string(),
        }
    }

    #[test]
    fn test_first_reply_opens_to_client_keys() {
        let keypair = KeyPair::generate().unwrap();
        let mut client = ClientHandshake::new("abc123", [111, 222]);

        let ClientCommand::Svauth(payload) = client.on_announce(&announce(&keypair)).unwrap();
        assert_eq!(open(&keypair, &payload).unwrap(), "ck1=111\nck2=222");
    }

    #[test]
    fn test_rejects_wrong_version() {
        let keypair = KeyPair::generate().unwrap();
        let mut client = ClientHandshake::new("abc123", [1, 2]);
        let command = ServerCommand::Announce {
            version: AUTH_PROTOCOL_VERSION + 1,
            public_key: keypair.public().hex().to_string(),
        };
        assert!(matches!(
            client.on_announce(&command),
            Err(AuthError::ProtocolVersion(6))
        ));
    }

    #[test]
    fn test_rejects_challenge_before_announce() {
        let mut client = ClientHandshake::new("abc123", [1, 2]);
        let command = ServerCommand::Challenge {
            client_xor: 3,
            server_keys: [4, 5],
        };
        assert!(client.on_challenge(&command).is_err());
    }

    #[test]
    fn test_rejects_bad_server_proof() {
        let keypair = KeyPair::generate().unwrap();
        let mut client = ClientHandshake::new("abc123", [1, 2]);
        client.on_announce(&announce(&keypair)).unwrap();

        let command = ServerCommand::Challenge {
            client_xor: 1 ^ 2 ^ 1,
            server_keys: [4, 5],
        };
        assert!(matches!(
            client.on_challenge(&command),
            Err(AuthError::ConfirmationMismatch)
        ));
    }

    #[test]
    fn test_second_reply_content() {
        let keypair = KeyPair::generate().unwrap();
        let mut client = ClientHandshake::new("abc123", [1, 2]);
        client.on_announce(&announce(&keypair)).unwrap();

        let command = ServerCommand::Challenge {
            client_xor: 1 ^ 2,
            server_keys: [12, 10],
        };
        let ClientCommand::Svauth(payload) = client.on_challenge(&command).unwrap();
        assert_eq!(open(&keypair, &payload).unwrap(), "skx=6\ncid=abc123");
    }
}
