//! deskshare: share-token and relay broker command line.
//!
//! Mints share tokens for this machine's desktop and redeems them by starting
//! a websockify-compatible relay that bridges a browser viewer to the target's
//! framebuffer service.
//!
//! # Usage
//!
//! ```text
//! deskshare [--config <PATH>] [--key-file <PATH>] <COMMAND>
//!
//! Commands:
//!   encode       Encode a descriptor into a token
//!   decode       Decode a token and print the descriptor as JSON
//!   share        Mint a token for this machine with a fresh password
//!   start        Redeem a token, print the viewer URL, run until Ctrl+C
//!   rotate-key   Add a new active key to the keyring file
//!   init-config  Write a config file with every default filled in
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable               | Description                                |
//! |------------------------|--------------------------------------------|
//! | `DESKSHARE_CONFIG`     | Config file path                           |
//! | `DESKSHARE_KEY_FILE`   | Keyring file for version 3 tokens          |
//! | `DESKSHARE_PUBLIC_HOST`| Host advertised in viewer URLs             |
//! | `RUST_LOG`             | Log filter (default `info`)                |
//!
//! Logs go to stderr so stdout carries only command output.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use deskshare_broker::infrastructure::local_ip::primary_ipv4;
use deskshare_broker::infrastructure::relay::process::ProcessRelayLauncher;
use deskshare_broker::infrastructure::storage::config::{
    config_dir, default_config_path, load_config, save_config,
};
use deskshare_broker::infrastructure::storage::keyfile::{
    load_or_create_keyring, rotate_keyring,
};
use deskshare_broker::{BrokerConfig, SessionBroker};
use deskshare_core::token::{Token, TokenVersion};
use deskshare_core::{
    generate_credential, AccessMode, EndpointDescriptor, Scheme, TokenCodec,
    DEFAULT_CREDENTIAL_LENGTH,
};

/// File name of the keyring inside the config directory.
const DEFAULT_KEY_FILE_NAME: &str = "keys";

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Share a remote desktop through a browser relay using opaque tokens.
#[derive(Debug, Parser)]
#[command(name = "deskshare", version)]
struct Cli {
    /// Config file (TOML).  Defaults to the platform config directory.
    #[arg(long, global = true, env = "DESKSHARE_CONFIG")]
    config: Option<PathBuf>,

    /// Keyring file for version 3 tokens.  Created on first use.
    #[arg(long, global = true, env = "DESKSHARE_KEY_FILE")]
    key_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Encode a descriptor into a token.
    Encode {
        /// Target host (dotted IPv4 or hostname).
        #[arg(long)]
        host: String,

        /// Access mode: `view` or `full`.
        #[arg(long)]
        mode: AccessMode,

        /// Password the viewer needs for the framebuffer service.
        #[arg(long)]
        credential: Option<String>,

        /// Token scheme; defaults to the configured one.
        #[arg(long)]
        scheme: Option<Scheme>,
    },

    /// Decode a token and print the descriptor as JSON.
    Decode {
        token: String,
    },

    /// Mint a token for this machine with a freshly generated password.
    Share {
        /// Access mode: `view` or `full`.
        #[arg(long, default_value = "view")]
        mode: AccessMode,

        /// Length of the generated password.
        #[arg(long, default_value_t = DEFAULT_CREDENTIAL_LENGTH)]
        length: usize,

        /// Token scheme; defaults to the configured one.
        #[arg(long)]
        scheme: Option<Scheme>,

        /// Host to put in the token instead of the detected LAN address.
        #[arg(long)]
        host: Option<String>,
    },

    /// Redeem a token, print the viewer URL, and keep the relay up until Ctrl+C.
    Start {
        token: String,

        /// Wait up to SECS for the relay to accept connections before printing.
        #[arg(long, value_name = "SECS")]
        wait_ready: Option<u64>,

        /// Host advertised in the viewer URL.
        #[arg(long, env = "DESKSHARE_PUBLIC_HOST")]
        public_host: Option<String>,
    },

    /// Add a new active key to the keyring file, dropping the oldest ones.
    RotateKey {
        /// Number of keys to keep, the new one included.
        #[arg(long, default_value_t = 2)]
        retain: usize,
    },

    /// Write a config file with every default filled in.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Output of `share`.
#[derive(Debug, Serialize)]
struct ShareOutput {
    ip: String,
    password: String,
    token: String,
}

// ── Runtime context ───────────────────────────────────────────────────────────

/// Resolved config and file locations for one invocation.
struct Invocation {
    config: BrokerConfig,
    config_path: PathBuf,
    key_path: PathBuf,
}

impl Invocation {
    /// Resolves paths (flag > env > config > platform default) and loads the config.
    fn load(cli: &Cli) -> anyhow::Result<Self> {
        let config_path = match &cli.config {
            Some(path) => path.clone(),
            None => default_config_path().context("no --config given")?,
        };
        let config = load_config(&config_path)
            .with_context(|| format!("failed to load config {}", config_path.display()))?;

        let key_path = match cli.key_file.clone().or_else(|| config.token.key_file.clone()) {
            Some(path) => path,
            None => config_dir()
                .context("no --key-file given")?
                .join(DEFAULT_KEY_FILE_NAME),
        };

        Ok(Self {
            config,
            config_path,
            key_path,
        })
    }

    /// Builds the token codec; the keyring is only loaded when `with_keys`.
    fn codec(&self, with_keys: bool) -> anyhow::Result<TokenCodec> {
        let codec = TokenCodec::new().with_substitution_shift(self.config.token.substitution_shift);
        if !with_keys {
            return Ok(codec);
        }
        let ring = load_or_create_keyring(&self.key_path)
            .with_context(|| format!("failed to load keyring {}", self.key_path.display()))?;
        Ok(codec.with_key_provider(Arc::new(ring)))
    }

    fn codec_for_scheme(&self, scheme: Scheme) -> anyhow::Result<TokenCodec> {
        self.codec(scheme == Scheme::SealedKeyring)
    }

    fn codec_for_token(&self, token: &str) -> anyhow::Result<TokenCodec> {
        let version = Token::parse(token).context("invalid token")?.version();
        self.codec(version == TokenVersion::SealedKeyring)
    }

    fn public_host(&self, explicit: Option<String>) -> String {
        explicit
            .or_else(|| self.config.viewer.public_host.clone())
            .unwrap_or_else(|| primary_ipv4().to_string())
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `RUST_LOG` controls the level; `info` when unset or invalid.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Invocation::load(&cli)?;

    match cli.command {
        Command::Encode {
            host,
            mode,
            credential,
            scheme,
        } => {
            let mut descriptor = EndpointDescriptor::new(host, mode)?;
            if let Some(credential) = credential {
                descriptor = descriptor.with_credential(credential)?;
            }
            let scheme = scheme.unwrap_or(ctx.config.token.default_scheme);
            let token = ctx.codec_for_scheme(scheme)?.encode(&descriptor, scheme)?;
            println!("{token}");
        }

        Command::Decode { token } => {
            let descriptor = ctx.codec_for_token(&token)?.decode(&token)?;
            println!("{}", serde_json::to_string_pretty(&descriptor)?);
        }

        Command::Share {
            mode,
            length,
            scheme,
            host,
        } => {
            let ip = host.unwrap_or_else(|| primary_ipv4().to_string());
            let password = generate_credential(length)?;
            let descriptor = EndpointDescriptor::new(ip.as_str(), mode)?
                .with_credential(password.as_str())?;
            let scheme = scheme.unwrap_or(ctx.config.token.default_scheme);
            let token = ctx.codec_for_scheme(scheme)?.encode(&descriptor, scheme)?;
            info!(%ip, %mode, %scheme, "minted share token");
            let output = ShareOutput {
                ip,
                password,
                token,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Start {
            token,
            wait_ready,
            public_host,
        } => {
            run_start(&ctx, &token, wait_ready, public_host).await?;
        }

        Command::RotateKey { retain } => {
            load_or_create_keyring(&ctx.key_path)?;
            let ring = rotate_keyring(&ctx.key_path, retain)?;
            if let Some(id) = ring.active_id() {
                println!("active key id {id} ({} keys kept)", ring.len());
            }
        }

        Command::InitConfig { force } => {
            if ctx.config_path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    ctx.config_path.display()
                );
            }
            save_config(&ctx.config_path, &BrokerConfig::default())?;
            println!("{}", ctx.config_path.display());
        }
    }

    Ok(())
}

/// Redeems `token`, prints the viewer URL, and stops every relay on Ctrl+C.
async fn run_start(
    ctx: &Invocation,
    token: &str,
    wait_ready: Option<u64>,
    public_host: Option<String>,
) -> anyhow::Result<()> {
    let codec = ctx.codec_for_token(token)?;
    let descriptor = codec.decode(token).context("invalid token")?;

    let public_host = ctx.public_host(public_host);
    let broker = SessionBroker::new(
        &ctx.config,
        &public_host,
        Arc::new(ProcessRelayLauncher::new().with_exit_check(ctx.config.relay.exit_check())),
    )
    .context("invalid viewer configuration")?;

    let url = broker.start(&descriptor).await?;

    if let Some(secs) = wait_ready {
        let endpoint = broker.target_for(&descriptor);
        if let Err(e) = broker.wait_ready(&endpoint, Duration::from_secs(secs)).await {
            broker.shutdown().await;
            return Err(e.into());
        }
    }

    println!("{url}");
    info!(%public_host, "relay running; press Ctrl+C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C; stopping now");
    }
    broker.shutdown().await;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
