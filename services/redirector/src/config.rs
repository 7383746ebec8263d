//! Redirector configuration.
//!
//! Command-line flags (each with an environment fallback) are parsed by
//! [`Args`] and turned once into an immutable [`Config`] by resolving the
//! listen address and every target.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rrredir_targets::{resolve, TargetError, TargetSpec, TargetTable};
use thiserror::Error;

use crate::proxy::{ListenerConfig, IDLE_TIMEOUT};

const AFTER_HELP: &str = "\
Every incoming connection is redirected to the first TARGET; if that host is
unreachable the next one is tried, and so on. Each new connection starts over
at the first TARGET.

A TARGET is host:port, optionally followed by @bindip to bind the outgoing
connection to a local address (overriding --bind). IPv6 literals are written
in brackets, e.g. [2001:db8::1]:443@[2001:db8::100].";

/// Command-line arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rrredir",
    version,
    about = "RR Redir - a round-robin port redirector",
    after_help = AFTER_HELP
)]
pub struct Args {
    /// IP or host to listen on.
    #[arg(short = 'i', long, env = "RRREDIR_LISTEN_IP", default_value = "0.0.0.0")]
    pub listen_ip: String,

    /// Port to listen on.
    #[arg(short, long, env = "RRREDIR_PORT", default_value_t = 1080)]
    pub port: u16,

    /// Connect timeout per target in seconds; 0 waits until the OS cancels
    /// the attempt.
    #[arg(short, long, env = "RRREDIR_CONNECT_TIMEOUT", default_value_t = 0)]
    pub timeout: u64,

    /// Default local address outgoing connections are bound to.
    #[arg(short, long, env = "RRREDIR_BIND")]
    pub bind: Option<String>,

    /// Maximum concurrent connections; 0 means unlimited.
    #[arg(short, long, env = "RRREDIR_MAX_CONNECTIONS", default_value_t = 0)]
    pub max_connections: usize,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, env = "RRREDIR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "RRREDIR_LOG_JSON")]
    pub log_json: bool,

    /// Redirect targets in order of preference: host:port[@bindip].
    #[arg(required = true, value_name = "TARGET")]
    pub targets: Vec<TargetSpec>,
}

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A target or bind address is invalid.
    #[error(transparent)]
    Target(#[from] TargetError),

    /// The listen address did not resolve.
    #[error("cannot resolve listen address {host}")]
    ListenAddress { host: String },
}

/// Resolved, immutable redirector configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the listener binds to.
    pub listen_addr: SocketAddr,
    /// Targets in order of preference.
    pub targets: Arc<TargetTable>,
    /// Per-target connect timeout; `None` defers to the OS.
    pub connect_timeout: Option<Duration>,
    /// Live connection cap; `None` is unbounded.
    pub max_connections: Option<usize>,
    /// Relay idle timeout.
    pub idle_timeout: Duration,
}

impl Config {
    /// Resolve `args` into a configuration.
    pub async fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let listen_addr = resolve(&args.listen_ip, args.port).await.map_err(|_| {
            ConfigError::ListenAddress {
                host: args.listen_ip.clone(),
            }
        })?;

        let targets = TargetTable::resolve(&args.targets, args.bind.as_deref()).await?;

        Ok(Self {
            listen_addr,
            targets: Arc::new(targets),
            connect_timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
            max_connections: (args.max_connections > 0).then_some(args.max_connections),
            idle_timeout: IDLE_TIMEOUT,
        })
    }

    /// Listener settings derived from this configuration.
    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            bind_addr: self.listen_addr,
            max_connections: self.max_connections,
            connect_timeout: self.connect_timeout,
            idle_timeout: self.idle_timeout,
        }
    }
}
