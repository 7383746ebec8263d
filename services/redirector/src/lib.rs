pub mod config;
pub mod logging;
pub mod proxy;

pub use proxy::{
    ConnectError, Connector, Dial, DialError, Listener, ListenerConfig, ListenerStats, RelayEnd,
    RelayOutcome, TcpDialer, Verdict, WorkerRegistry,
};
pub use rrredir_targets::{Target, TargetError, TargetSpec, TargetTable};
