//! Bidirectional byte relay with idle reaping.
//!
//! One loop serves both directions: it waits until either side has data,
//! forwards that chunk in full to the other side, and waits again. With
//! traffic in both directions the two sides naturally take turns.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Connections with no traffic in either direction for this long are closed.
///
/// Well-behaved protocols send keep-alives well within this window.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Size of a single read.
pub const RELAY_BUFFER_SIZE: usize = 1024;

/// Why a relay stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// One side closed its write half.
    Closed,
    /// Neither side sent anything within the idle timeout.
    Idle,
    /// Reading from one side failed.
    ReadError,
    /// Writing to one side failed.
    WriteError,
}

impl fmt::Display for RelayEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelayEnd::Closed => "closed",
            RelayEnd::Idle => "idle",
            RelayEnd::ReadError => "read_error",
            RelayEnd::WriteError => "write_error",
        };
        f.write_str(s)
    }
}

/// Bytes moved by a finished relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    pub a_to_b: u64,
    pub b_to_a: u64,
    pub end: RelayEnd,
}

enum Ready {
    A(io::Result<usize>),
    B(io::Result<usize>),
}

/// Forward bytes between `a` and `b` until either side closes or errors, or
/// both stay silent for `idle_timeout`.
///
/// Never fails: every way a relay can stop is reported in the outcome.
pub async fn relay<A, B>(a: &mut A, b: &mut B, idle_timeout: Duration) -> RelayOutcome
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf_a = [0u8; RELAY_BUFFER_SIZE];
    let mut buf_b = [0u8; RELAY_BUFFER_SIZE];
    let mut a_to_b = 0u64;
    let mut b_to_a = 0u64;

    let end = loop {
        let wait = async {
            tokio::select! {
                r = a.read(&mut buf_a) => Ready::A(r),
                r = b.read(&mut buf_b) => Ready::B(r),
            }
        };

        let ready = match timeout(idle_timeout, wait).await {
            Ok(ready) => ready,
            Err(_) => break RelayEnd::Idle,
        };

        let stop = match ready {
            Ready::A(read) => forward(read, &buf_a, &mut *b, &mut a_to_b).await,
            Ready::B(read) => forward(read, &buf_b, &mut *a, &mut b_to_a).await,
        };
        if let Some(end) = stop {
            break end;
        }
    };

    RelayOutcome {
        a_to_b,
        b_to_a,
        end,
    }
}

/// Write one read's worth of data to `dst` in full.
///
/// Returns the reason to stop, or `None` to keep relaying.
async fn forward<W>(
    read: io::Result<usize>,
    buf: &[u8],
    dst: &mut W,
    total: &mut u64,
) -> Option<RelayEnd>
where
    W: AsyncWrite + Unpin,
{
    let n = match read {
        Ok(0) => return Some(RelayEnd::Closed),
        Ok(n) => n,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => return None,
        Err(_) => return Some(RelayEnd::ReadError),
    };

    if dst.write_all(&buf[..n]).await.is_err() {
        return Some(RelayEnd::WriteError);
    }
    *total += n as u64;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_relay_forwards_both_ways() {
        let (mut client, mut a) = duplex(4096);
        let (mut b, mut upstream) = duplex(4096);

        let handle = tokio::spawn(async move { relay(&mut a, &mut b, IDLE_TIMEOUT).await });

        client.write_all(b"PING").await.unwrap();
        let mut buf = [0u8; 4];
        upstream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PING");

        upstream.write_all(b"PONG!").await.unwrap();
        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PONG!");

        drop(client);
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.end, RelayEnd::Closed);
        assert_eq!(outcome.a_to_b, 4);
        assert_eq!(outcome.b_to_a, 5);
    }

    #[tokio::test]
    async fn test_relay_forwards_more_than_one_buffer_in_order() {
        let (mut client, mut a) = duplex(64 * 1024);
        let (mut b, mut upstream) = duplex(64 * 1024);

        let handle = tokio::spawn(async move { relay(&mut a, &mut b, IDLE_TIMEOUT).await });

        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        client.write_all(&payload).await.unwrap();
        drop(client);

        let mut received = Vec::new();
        upstream.read_to_end(&mut received).await.unwrap_or_default();
        assert_eq!(received, payload);

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.a_to_b, payload.len() as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_reaps_idle_pair() {
        let (_client, mut a) = duplex(1024);
        let (mut b, _upstream) = duplex(1024);

        let outcome = relay(&mut a, &mut b, IDLE_TIMEOUT).await;
        assert_eq!(outcome.end, RelayEnd::Idle);
        assert_eq!(outcome.a_to_b + outcome.b_to_a, 0);
    }

    #[tokio::test]
    async fn test_relay_stops_on_write_error() {
        let (mut client, mut a) = duplex(1024);
        let (mut b, upstream) = duplex(1024);
        drop(upstream);

        let handle = tokio::spawn(async move { relay(&mut a, &mut b, IDLE_TIMEOUT).await });
        let _ = client.write_all(b"data").await;

        let outcome = handle.await.unwrap();
        // The dropped upstream is seen either as EOF on read or a broken pipe on write.
        assert!(matches!(outcome.end, RelayEnd::Closed | RelayEnd::WriteError));
        assert_eq!(outcome.a_to_b, 0);
    }
}
