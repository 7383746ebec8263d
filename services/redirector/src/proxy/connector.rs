//! Ordered failover connection establishment.
//!
//! For every client the target table is walked from the first entry. Each
//! target gets a fresh socket, an optional bind, and a connect bounded by the
//! configured timeout. The first socket that connects wins; reachability
//! failures move on to the next target, anything else aborts the attempt.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rrredir_targets::{AddressFamily, Target, TargetTable};
use thiserror::Error;
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info};

use super::worker::ClientInfo;

/// The step of a dial that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialStage {
    /// Creating the socket.
    Open,
    /// Binding the socket to the target's local address.
    Bind,
    /// Connecting, including waiting for the connection to complete.
    Connect,
}

impl fmt::Display for DialStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialStage::Open => f.write_str("socket"),
            DialStage::Bind => f.write_str("bind"),
            DialStage::Connect => f.write_str("connect"),
        }
    }
}

/// A failed dial of a single target.
#[derive(Debug, Error)]
#[error("{stage}: {source}")]
pub struct DialError {
    pub stage: DialStage,
    #[source]
    pub source: io::Error,
}

impl DialError {
    pub fn open(source: io::Error) -> Self {
        Self {
            stage: DialStage::Open,
            source,
        }
    }

    pub fn bind(source: io::Error) -> Self {
        Self {
            stage: DialStage::Bind,
            source,
        }
    }

    pub fn connect(source: io::Error) -> Self {
        Self {
            stage: DialStage::Connect,
            source,
        }
    }
}

/// What to do after a dial failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The target is unreachable; try the next one.
    Retry,
    /// Not a reachability problem; abort the whole attempt.
    Fatal,
}

/// Classify a dial failure.
///
/// Bind failures never abort the attempt. For socket creation and connect,
/// only the reachability errnos are retryable.
pub fn verdict(stage: DialStage, err: &io::Error) -> Verdict {
    if stage == DialStage::Bind {
        return Verdict::Retry;
    }

    match err.raw_os_error() {
        Some(
            libc::EPROTOTYPE
            | libc::EPROTONOSUPPORT
            | libc::EAFNOSUPPORT
            | libc::ECONNREFUSED
            | libc::ENETDOWN
            | libc::ENETUNREACH
            | libc::EHOSTUNREACH
            | libc::ETIMEDOUT,
        ) => Verdict::Retry,
        Some(_) => Verdict::Fatal,
        None => match err.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::TimedOut
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::NetworkDown => Verdict::Retry,
            _ => Verdict::Fatal,
        },
    }
}

/// Opens a connection to one target.
#[async_trait]
pub trait Dial: Send + Sync + 'static {
    type Stream: Send + 'static;

    /// Connect to `target`, waiting at most `connect_timeout` (forever if
    /// `None`) for the connection to complete.
    async fn dial(
        &self,
        target: &Target,
        connect_timeout: Option<Duration>,
    ) -> Result<Self::Stream, DialError>;
}

/// Dials targets with real TCP sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dial for TcpDialer {
    type Stream = TcpStream;

    async fn dial(
        &self,
        target: &Target,
        connect_timeout: Option<Duration>,
    ) -> Result<TcpStream, DialError> {
        let socket = match target.family() {
            AddressFamily::V4 => TcpSocket::new_v4(),
            AddressFamily::V6 => TcpSocket::new_v6(),
        }
        .map_err(DialError::open)?;

        if let Some(bind_address) = target.bind_address {
            if !target.bind_family_matches() {
                return Err(DialError::bind(io::Error::from_raw_os_error(
                    libc::EAFNOSUPPORT,
                )));
            }
            socket.bind(bind_address).map_err(DialError::bind)?;
        }

        let connect = socket.connect(target.address);
        let result = match connect_timeout {
            Some(limit) => match timeout(limit, connect).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::from_raw_os_error(libc::ETIMEDOUT)),
            },
            None => connect.await,
        };

        result.map_err(DialError::connect)
    }
}

/// Why no outbound connection was produced.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Every target failed with a retryable error.
    #[error("all {attempts} targets unreachable")]
    Exhausted { attempts: usize },

    /// A target failed with a non-reachability error; remaining targets
    /// were not tried.
    #[error("connecting to {target} failed: {source}")]
    Fatal {
        target: SocketAddr,
        #[source]
        source: DialError,
    },
}

/// A successfully connected upstream.
#[derive(Debug)]
pub struct Connected<S> {
    pub stream: S,
    pub target: Target,
    /// Position of the target in the table.
    pub index: usize,
}

/// Walks the target table for each client.
pub struct Connector<D = TcpDialer> {
    table: Arc<TargetTable>,
    dialer: D,
    connect_timeout: Option<Duration>,
}

impl Connector<TcpDialer> {
    /// Create a connector dialing real TCP sockets.
    pub fn new(table: Arc<TargetTable>, connect_timeout: Option<Duration>) -> Self {
        Self::with_dialer(table, TcpDialer, connect_timeout)
    }
}

impl<D: Dial> Connector<D> {
    pub fn with_dialer(
        table: Arc<TargetTable>,
        dialer: D,
        connect_timeout: Option<Duration>,
    ) -> Self {
        Self {
            table,
            dialer,
            connect_timeout,
        }
    }

    /// Connect `client` to the first reachable target.
    pub async fn connect(
        &self,
        client: &ClientInfo,
    ) -> Result<Connected<D::Stream>, ConnectError> {
        for (index, target) in self.table.iter().enumerate() {
            match self.dialer.dial(target, self.connect_timeout).await {
                Ok(stream) => {
                    info!(
                        client = client.fd,
                        client_addr = %client.peer_addr.ip(),
                        target = %target.ip(),
                        port = target.port(),
                        "connected to target"
                    );
                    return Ok(Connected {
                        stream,
                        target: *target,
                        index,
                    });
                }
                Err(e) => match verdict(e.stage, &e.source) {
                    Verdict::Retry => {
                        debug!(
                            client = client.fd,
                            target = %target,
                            error = %e,
                            "target unreachable, trying next"
                        );
                    }
                    Verdict::Fatal => {
                        error!(
                            client = client.fd,
                            target = %target,
                            error = %e,
                            "connect attempt aborted"
                        );
                        return Err(ConnectError::Fatal {
                            target: target.address,
                            source: e,
                        });
                    }
                },
            }
        }

        Err(ConnectError::Exhausted {
            attempts: self.table.len(),
        })
    }
}
