//! Environment-driven configuration.
//!
//! Every value has a default so a bare start works. The binary layers its
//! command-line flags on top of this.

use std::path::PathBuf;

use crate::{Error, Result};

pub const DEFAULT_PUBLIC_KEY_FILE: &str = "public_key.bin";
pub const DEFAULT_SECRET_KEY_FILE: &str = "secret_key.bin";
pub const DEFAULT_DB_FILE: &str = "enhanced_data.db";

/// Maximum length of a single text argument the command transport accepts.
pub const DEFAULT_MAX_COMMAND_ARG: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WardenConfig {
    pub data_dir: PathBuf,
    pub public_key_file: String,
    pub secret_key_file: String,
    pub db_file: String,
    pub auth_enabled: bool,
    pub max_command_arg: usize,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            public_key_file: DEFAULT_PUBLIC_KEY_FILE.to_string(),
            secret_key_file: DEFAULT_SECRET_KEY_FILE.to_string(),
            db_file: DEFAULT_DB_FILE.to_string(),
            auth_enabled: true,
            max_command_arg: DEFAULT_MAX_COMMAND_ARG,
        }
    }
}

impl WardenConfig {
    /// Build a config from `WARDEN_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("WARDEN_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(name) = lookup("WARDEN_PUBLIC_KEY_FILE") {
            config.public_key_file = name;
        }
        if let Some(name) = lookup("WARDEN_SECRET_KEY_FILE") {
            config.secret_key_file = name;
        }
        if let Some(name) = lookup("WARDEN_DB_FILE") {
            config.db_file = name;
        }
        if let Some(value) = lookup("WARDEN_AUTH_ENABLED") {
            config.auth_enabled = parse_bool(&value);
        }
        if let Some(value) = lookup("WARDEN_MAX_COMMAND_ARG") {
            config.max_command_arg = value.trim().parse().map_err(|_| {
                Error::config(format!("WARDEN_MAX_COMMAND_ARG is not a number: {value}"))
            })?;
        }

        Ok(config)
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.data_dir.join(&self.public_key_file)
    }

    pub fn secret_key_path(&self) -> PathBuf {
        self.data_dir.join(&self.secret_key_file)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    /// Reject transports that cannot carry a payload of `required` bytes
    /// (including its terminator) in one text argument.
    pub fn ensure_arg_capacity(&self, required: usize) -> Result<()> {
        if required > self.max_command_arg {
            return Err(Error::config(format!(
                "command arguments are limited to {} bytes but {} are required",
                self.max_command_arg, required
            )));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
