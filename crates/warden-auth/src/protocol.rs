//! Handshake messages on the wire.
//!
//! Server messages are text commands sent over the game's reliable command
//! channel. Client messages arrive as `svauth <hex>` commands whose
//! argument is a sealed info string.

use crate::AuthError;

/// Protocol version announced to clients.
pub const AUTH_PROTOCOL_VERSION: i32 = 5;

/// Largest server command the transport accepts, terminator included.
pub const MAX_COMMAND_LEN: usize = 1024;

/// Userinfo key a client sets to declare protocol support.
pub const PROTOCOL_USERINFO_KEY: &str = "nm_ver";

/// Parsed `key=value` text.
///
/// Two encodings are accepted: one `key=value` pair per line, and the
/// backslash-delimited `\key\value\key\value` form used by userinfo
/// strings. Keys compare case-insensitively; the first match wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoString<'a> {
    pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> InfoString<'a> {
    pub fn parse(text: &'a str) -> Self {
        let pairs = if let Some(rest) = text.strip_prefix('\\') {
            let mut parts = rest.split('\\');
            let mut pairs = Vec::new();
            while let Some(key) = parts.next() {
                let value = parts.next().unwrap_or("");
                pairs.push((key, value));
            }
            pairs
        } else {
            text.lines()
                .filter_map(|line| line.split_once('='))
                .map(|(k, v)| (k.trim(), v.trim()))
                .collect()
        };

        Self { pairs }
    }

    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| *v)
    }

    /// Non-empty value of `key`.
    pub fn require(&self, key: &'static str) -> Result<&'a str, AuthError> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(AuthError::MissingField(key)),
        }
    }

    /// Value of `key` as a signed 32-bit integer.
    pub fn require_i32(&self, key: &'static str) -> Result<i32, AuthError> {
        self.require(key)?
            .parse()
            .map_err(|_| AuthError::MalformedField(key))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Whether a client's userinfo declares handshake support.
pub fn supports_protocol(userinfo: &str) -> bool {
    InfoString::parse(userinfo)
        .get(PROTOCOL_USERINFO_KEY)
        .is_some_and(|v| !v.is_empty())
}

/// Server to client handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    /// Protocol version and the server public key in hex.
    Announce { version: i32, public_key: String },
    /// XOR of the client's keys and the two server confirmation keys.
    Challenge { client_xor: i32, server_keys: [i32; 2] },
}

impl ServerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ServerCommand::Announce { .. } => "clannounce",
            ServerCommand::Challenge { .. } => "clauth",
        }
    }

    /// Render as the command string the transport carries.
    pub fn render(&self) -> Result<String, AuthError> {
        let args = match self {
            ServerCommand::Announce {
                version,
                public_key,
            } => format!("{version} \"{public_key}\""),
            ServerCommand::Challenge {
                client_xor,
                server_keys: [s1, s2],
            } => format!("{client_xor} {s1} {s2}"),
        };
        let out = format!("kls -1 -1 \"{}\" {args}", self.name());

        if out.len() >= MAX_COMMAND_LEN {
            return Err(AuthError::CommandTooLong {
                len: out.len(),
                max: MAX_COMMAND_LEN - 1,
            });
        }
        Ok(out)
    }

    /// Parse a rendered command back. Used by clients.
    pub fn parse(text: &str) -> Option<Self> {
        let args = split_args(text);
        match args.as_slice() {
            ["kls", "-1", "-1", "clannounce", version, key] => Some(ServerCommand::Announce {
                version: version.parse().ok()?,
                public_key: key.to_string(),
            }),
            ["kls", "-1", "-1", "clauth", x, s1, s2] => Some(ServerCommand::Challenge {
                client_xor: x.parse().ok()?,
                server_keys: [s1.parse().ok()?, s2.parse().ok()?],
            }),
            _ => None,
        }
    }
}

/// Split on whitespace, treating double-quoted runs as one argument.
fn split_args(text: &str) -> Vec<&str> {
    let mut args = Vec::new();
    let mut rest = text.trim_start();

    while !rest.is_empty() {
        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').unwrap_or(quoted.len());
            args.push(&quoted[..end]);
            rest = quoted.get(end + 1..).unwrap_or("");
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            args.push(&rest[..end]);
            rest = &rest[end..];
        }
        rest = rest.trim_start();
    }

    args
}

/// Outbound command channel to connected clients.
///
/// Delivery is assumed reliable and ordered per client.
pub trait CommandSink {
    fn send(&mut self, slot: usize, command: &ServerCommand);
}

impl CommandSink for Vec<(usize, ServerCommand)> {
    fn send(&mut self, slot: usize, command: &ServerCommand) {
        self.push((slot, command.clone()));
    }
}

/// Client to server handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// `svauth <hex>`: sealed payload of either reply.
    Svauth(String),
}

impl ClientCommand {
    /// Parse a client command line. Anything that is not a handshake
    /// command yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let args = split_args(line);
        let (name, rest) = args.split_first()?;
        if !name.eq_ignore_ascii_case("svauth") {
            return None;
        }
        Some(ClientCommand::Svauth(
            rest.first().map(|s| s.to_string()).unwrap_or_default(),
        ))
    }

    pub fn render(&self) -> String {
        match self {
            ClientCommand::Svauth(payload) => format!("svauth {payload}"),
        }
    }
}
