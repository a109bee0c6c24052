#![forbid(unsafe_code)]

//! Warden server CLI.
//!
//! Boots the authentication subsystem the same way the game server does:
//! 1. Loads configuration from `WARDEN_*` variables and flags
//! 2. Loads or generates the server key pair
//! 3. Opens the identity database
//!
//! and exposes each step as a subcommand for operators.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::Rng;
use tracing::{debug, info, warn};
use warden_auth::schema::{self, NoAutoLink};
use warden_auth::{
    AuthContext, AuthSession, AuthState, ClientHandshake, ServerCommand, SessionVault,
};
use warden_common::WardenConfig;
use warden_crypto::{load_or_generate, KeyMaterial, CIPHER_HEX_SIZE};
use warden_store::Store;

/// Client slot used by the loopback check.
const SELF_CHECK_SLOT: usize = 0;
/// 127.0.0.1
const LOOPBACK_IP: i64 = 0x7f00_0001;

#[derive(Parser, Debug)]
#[command(name = "warden-server")]
#[command(about = "Warden client authentication: keys, identity database, self-check")]
struct Args {
    /// Directory holding key files and the database
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Database file name inside the data directory
    #[arg(long)]
    db_file: Option<String>,

    /// Disable client authentication
    #[arg(long, default_value_t = false)]
    no_auth: bool,

    /// Longest text argument the command transport carries
    #[arg(long)]
    max_command_arg: Option<usize>,

    /// Log level
    #[arg(long, env = "WARDEN_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load or generate the key pair and print the public key
    Keys,
    /// Create the identity schema
    InitDb,
    /// Run a full handshake against the reference client
    SelfCheck {
        /// Client id the reference client claims
        #[arg(long, default_value = "warden-self-check")]
        cid: String,

        /// Mode recorded with the session snapshot
        #[arg(long, default_value_t = 0)]
        mode: i32,
    },
    /// Delete temporary connections not seen for 30 days
    Purge,
}

fn load_config(args: &Args) -> Result<WardenConfig> {
    let mut config = WardenConfig::from_env().context("invalid WARDEN_* environment")?;

    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(name) = &args.db_file {
        config.db_file = name.clone();
    }
    if args.no_auth {
        config.auth_enabled = false;
    }
    if let Some(max) = args.max_command_arg {
        config.max_command_arg = max;
    }

    config
        .ensure_arg_capacity(CIPHER_HEX_SIZE)
        .context("sealed messages do not fit the command transport")?;
    Ok(config)
}

fn load_keys(config: &WardenConfig) -> KeyMaterial {
    load_or_generate(&config.public_key_path(), &config.secret_key_path())
}

fn open_store(config: &WardenConfig) -> Result<Store> {
    let mut store = Store::new();
    let path = config.db_path();
    store
        .open(&path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    schema::init_schema(&store).context("failed to create identity schema")?;
    Ok(store)
}

fn unix_now() -> Result<i64> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before 1970")?;
    Ok(elapsed.as_secs() as i64)
}

fn run_keys(config: &WardenConfig) -> Result<()> {
    match load_keys(config) {
        KeyMaterial::Loaded(keypair) => {
            println!("loaded {}", keypair.public().hex());
        }
        KeyMaterial::Generated(keypair) => {
            println!("generated {}", keypair.public().hex());
        }
        KeyMaterial::Unavailable => bail!("no key pair available"),
    }
    Ok(())
}

fn run_init_db(config: &WardenConfig) -> Result<()> {
    let _store = open_store(config)?;
    println!("identity schema ready in {}", config.db_path().display());
    Ok(())
}

fn run_purge(config: &WardenConfig) -> Result<()> {
    let store = open_store(config)?;
    let purged = schema::purge_stale_temporary(&store, unix_now()?)
        .context("failed to purge temporary connections")?;
    println!("purged {purged} temporary connection(s)");
    Ok(())
}

fn run_self_check(config: &WardenConfig, cid: &str, mode: i32) -> Result<()> {
    let mut ctx = AuthContext::from_material(load_keys(config), config.auth_enabled);
    if !ctx.is_enabled() {
        bail!("authentication is disabled, nothing to check");
    }

    // best effort, like the game server
    let store = match open_store(config) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!("continuing without database: {e:#}");
            None
        }
    };

    let mut rng = rand::thread_rng();
    let mut client = ClientHandshake::new(cid, [rng.gen(), rng.gen()]);
    let mut session = AuthSession::new(&ctx, SELF_CHECK_SLOT, true);
    let mut sent: Vec<(usize, ServerCommand)> = Vec::new();

    session.announce(&ctx, &mut sent);
    let announce = take_command(&mut sent)?;
    let reply = client
        .on_announce(&announce)
        .context("client rejected clannounce")?;
    session.handle_command(&mut ctx, &mut sent, &reply);

    if session.state() != AuthState::ClAuth {
        bail!("first reply rejected, session is {}", session.state());
    }
    let challenge = take_command(&mut sent)?;
    let reply = client
        .on_challenge(&challenge)
        .context("client rejected clauth")?;
    session.handle_command(&mut ctx, &mut sent, &reply);

    let Some(cuid_hash) = session.cuid_hash() else {
        bail!("second reply rejected, session is {}", session.state());
    };
    println!("state: {}", session.state());
    println!("cuid hash: {cuid_hash}");

    if let Some(store) = &store {
        let id = schema::touch_connection(
            store,
            &NoAutoLink,
            LOOPBACK_IP,
            Some(cuid_hash),
            unix_now()?,
        )
        .context("failed to record connection")?;
        println!("connection id: {id}");

        let vault = SessionVault::new(store);
        vault.write_world(mode);
        vault.write_client(&session);
    }

    info!("self-check passed");
    Ok(())
}

fn take_command(sent: &mut Vec<(usize, ServerCommand)>) -> Result<ServerCommand> {
    let (slot, command) = sent.pop().context("server sent nothing")?;
    debug!(slot, "server command: {}", command.render()?);
    Ok(command)
}

fn main() -> Result<()> {
    let args = Args::parse();
    warden_common::init_tracing_with_default(&args.log_level);

    let config = load_config(&args)?;
    debug!(?config, "configuration loaded");

    match &args.command {
        Command::Keys => run_keys(&config),
        Command::InitDb => run_init_db(&config),
        Command::SelfCheck { cid, mode } => run_self_check(&config, cid, *mode),
        Command::Purge => run_purge(&config),
    }
}
