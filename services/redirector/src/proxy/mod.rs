//! Round-robin failover TCP redirection.
//!
//! This module provides:
//! - The accept loop and admission control
//! - Ordered failover connection to upstream targets
//! - A bidirectional relay with idle reaping
//! - Per-connection workers and their registry
//!
//! ## Architecture
//!
//! ```text
//! Client -> Listener -> WorkerRegistry -> worker task
//!                                            |
//!                              Connector (target 0, 1, ... n)
//!                                            |
//!                                    relay(client, target)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use proxy::{Listener, ListenerConfig};
//!
//! let table = Arc::new(TargetTable::resolve(&specs, None).await?);
//! let config = ListenerConfig::new("0.0.0.0:1080".parse()?);
//! let listener = Arc::new(Listener::bind(config, table).await?);
//! listener.run().await?;
//! ```

mod connector;
mod listener;
mod registry;
mod relay;
mod worker;

pub use connector::{
    verdict, ConnectError, Connected, Connector, Dial, DialError, DialStage, TcpDialer, Verdict,
};
pub use listener::{
    Listener, ListenerConfig, ListenerStats, ACCEPT_ERROR_BACKOFF, ADMISSION_THROTTLE,
};
pub use registry::{AdmissionError, Completion, Slot, WorkerId, WorkerRegistry};
pub use relay::{relay, RelayEnd, RelayOutcome, IDLE_TIMEOUT, RELAY_BUFFER_SIZE};
pub use worker::{run_worker, Client, ClientInfo, WorkerContext};
