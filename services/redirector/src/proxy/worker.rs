//! Connection workers: one task per accepted client.

use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use super::connector::{Connector, Dial, TcpDialer};
use super::listener::ListenerStats;
use super::registry::Completion;
use super::relay::relay;

/// Identity of an accepted client, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInfo {
    /// Raw descriptor of the client socket.
    pub fd: RawFd,
    pub peer_addr: SocketAddr,
}

/// An accepted client connection, owned by exactly one worker.
#[derive(Debug)]
pub struct Client {
    pub stream: TcpStream,
    pub info: ClientInfo,
}

impl Client {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        let fd = stream.as_raw_fd();
        Self {
            stream,
            info: ClientInfo { fd, peer_addr },
        }
    }
}

/// State shared read-only by all workers of a listener.
pub struct WorkerContext<D = TcpDialer> {
    pub connector: Connector<D>,
    pub idle_timeout: Duration,
    pub stats: Arc<ListenerStats>,
}

/// Serve one client to completion.
///
/// Connects upstream, relays until the stream ends, then closes the
/// upstream socket and the client socket in that order. Completion is
/// signalled last, when `done` is dropped. Nothing here fails outward.
pub async fn run_worker<D>(mut client: Client, ctx: Arc<WorkerContext<D>>, done: Completion)
where
    D: Dial,
    D::Stream: AsyncRead + AsyncWrite + Unpin,
{
    match ctx.connector.connect(&client.info).await {
        Ok(mut upstream) => {
            ctx.stats.upstream_connected.fetch_add(1, Ordering::Relaxed);

            let outcome = relay(&mut client.stream, &mut upstream.stream, ctx.idle_timeout).await;

            ctx.stats
                .bytes_to_upstream
                .fetch_add(outcome.a_to_b, Ordering::Relaxed);
            ctx.stats
                .bytes_from_upstream
                .fetch_add(outcome.b_to_a, Ordering::Relaxed);

            debug!(
                client = client.info.fd,
                target = %upstream.target,
                bytes_to_upstream = outcome.a_to_b,
                bytes_from_upstream = outcome.b_to_a,
                end = %outcome.end,
                "relay finished"
            );
            drop(upstream);
        }
        Err(e) => {
            ctx.stats.upstream_failed.fetch_add(1, Ordering::Relaxed);
            debug!(
                client = client.info.fd,
                client_addr = %client.info.peer_addr,
                error = %e,
                "no outbound connection"
            );
        }
    }

    drop(client);
    drop(done);
}
