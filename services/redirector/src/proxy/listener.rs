//! TCP listener and the accept loop.
//!
//! The accept loop is the only owner of the worker registry: it accepts
//! clients, admits or rejects them, spawns one worker per admitted client
//! and reaps workers as they report completion.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rrredir_targets::TargetTable;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn, Instrument};

use super::connector::{Connector, Dial, TcpDialer};
use super::registry::{WorkerId, WorkerRegistry};
use super::relay::IDLE_TIMEOUT;
use super::worker::{run_worker, Client, WorkerContext};

/// Pause after rejecting a client, so sustained exhaustion does not spin.
pub const ADMISSION_THROTTLE: Duration = Duration::from_millis(16);

/// Pause after a failed accept.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Configuration for a listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum live workers; `None` is unbounded.
    pub max_connections: Option<usize>,
    /// Per-target connect timeout; `None` waits for the OS to give up.
    pub connect_timeout: Option<Duration>,
    /// Idle timeout for relayed connections.
    pub idle_timeout: Duration,
}

impl ListenerConfig {
    /// Create a new listener configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_connections: None,
            connect_timeout: None,
            idle_timeout: IDLE_TIMEOUT,
        }
    }
}

/// Statistics for a listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    /// Total connections accepted.
    pub connections_accepted: AtomicU64,
    /// Workers spawned and not yet reaped.
    pub connections_active: AtomicU64,
    /// Workers reaped.
    pub connections_closed: AtomicU64,
    /// Connections rejected by admission control.
    pub connections_rejected: AtomicU64,
    /// Clients connected to some target.
    pub upstream_connected: AtomicU64,
    /// Clients for which no target was reachable.
    pub upstream_failed: AtomicU64,
    /// Bytes relayed client to target.
    pub bytes_to_upstream: AtomicU64,
    /// Bytes relayed target to client.
    pub bytes_from_upstream: AtomicU64,
}

enum Event {
    Accepted(io::Result<(TcpStream, SocketAddr)>),
    Finished(WorkerId),
}

/// A redirecting TCP listener.
pub struct Listener<D = TcpDialer> {
    config: ListenerConfig,
    listener: TcpListener,
    context: Arc<WorkerContext<D>>,
    stats: Arc<ListenerStats>,
}

impl Listener<TcpDialer> {
    /// Bind a listener forwarding to `table` over real TCP.
    pub async fn bind(config: ListenerConfig, table: Arc<TargetTable>) -> io::Result<Self> {
        Self::bind_with_dialer(config, table, TcpDialer).await
    }
}

impl<D> Listener<D>
where
    D: Dial,
    D::Stream: AsyncRead + AsyncWrite + Unpin,
{
    /// Bind a listener that reaches targets through `dialer`.
    pub async fn bind_with_dialer(
        config: ListenerConfig,
        table: Arc<TargetTable>,
        dialer: D,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        info!(
            bind_addr = %local_addr,
            targets = table.len(),
            max_connections = ?config.max_connections,
            connect_timeout = ?config.connect_timeout,
            "Listener bound"
        );

        let stats = Arc::new(ListenerStats::default());
        let context = Arc::new(WorkerContext {
            connector: Connector::with_dialer(table, dialer, config.connect_timeout),
            idle_timeout: config.idle_timeout,
            stats: Arc::clone(&stats),
        });

        Ok(Self {
            config,
            listener,
            context,
            stats,
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get listener statistics.
    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    /// Run the accept loop. Only returns if the local address is gone.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        let local_addr = self.listener.local_addr()?;
        info!(bind_addr = %local_addr, "Listener started");

        let mut registry = WorkerRegistry::new(self.config.max_connections);

        loop {
            let event = tokio::select! {
                accepted = self.listener.accept() => Event::Accepted(accepted),
                Some(id) = registry.next_finished() => Event::Finished(id),
            };

            match event {
                Event::Accepted(Ok((stream, peer_addr))) => {
                    self.stats
                        .connections_accepted
                        .fetch_add(1, Ordering::Relaxed);
                    self.admit(&mut registry, Client::new(stream, peer_addr))
                        .await;
                }
                Event::Accepted(Err(e)) => {
                    error!(error = %e, "Accept error");
                    // Brief sleep to avoid tight loop on persistent errors
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
                Event::Finished(id) => {
                    if registry.reap_worker(id).await {
                        self.record_reaped(1);
                    }
                }
            }
        }
    }

    /// Admit `client` and spawn its worker, or close it.
    async fn admit(&self, registry: &mut WorkerRegistry, client: Client) {
        let reaped = registry.reap().await;
        self.record_reaped(reaped);

        let slot = match registry.admit() {
            Ok(slot) => slot,
            Err(e) => {
                self.stats
                    .connections_rejected
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    client = client.info.fd,
                    peer_addr = %client.info.peer_addr,
                    reason = %e,
                    "rejecting connection"
                );
                drop(client);
                tokio::time::sleep(ADMISSION_THROTTLE).await;
                return;
            }
        };

        let peer_addr = client.info.peer_addr;
        let ctx = Arc::clone(&self.context);
        registry.spawn(slot, move |done| {
            run_worker(client, ctx, done)
                .instrument(tracing::info_span!("connection", peer = %peer_addr))
        });
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    fn record_reaped(&self, count: usize) {
        if count == 0 {
            return;
        }
        let count = count as u64;
        self.stats
            .connections_active
            .fetch_sub(count, Ordering::Relaxed);
        self.stats
            .connections_closed
            .fetch_add(count, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_config_default() {
        let config = ListenerConfig::new("[::]:1080".parse().unwrap());
        assert!(config.max_connections.is_none());
        assert!(config.connect_timeout.is_none());
        assert_eq!(config.idle_timeout, IDLE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_listener_stats() {
        let stats = ListenerStats::default();
        stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
    }
}
