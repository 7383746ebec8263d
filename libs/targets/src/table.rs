//! The ordered, immutable target table.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::error::TargetError;
use crate::resolve::{resolve, resolve_bind_address};
use crate::spec::TargetSpec;

/// Address family of a resolved endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Family of a socket address.
    pub fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => AddressFamily::V4,
            SocketAddr::V6(_) => AddressFamily::V6,
        }
    }
}

/// A resolved upstream destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    /// Destination address.
    pub address: SocketAddr,
    /// Local address the outbound socket is bound to before connecting.
    pub bind_address: Option<SocketAddr>,
}

impl Target {
    /// Create a target without a bind address.
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            bind_address: None,
        }
    }

    /// Create a target whose outbound socket is bound to `bind_address`.
    pub fn with_bind(address: SocketAddr, bind_address: SocketAddr) -> Self {
        Self {
            address,
            bind_address: Some(bind_address),
        }
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.address)
    }

    pub fn ip(&self) -> IpAddr {
        self.address.ip()
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    /// Whether the bind address (if any) can be bound on a socket of this
    /// target's family.
    pub fn bind_family_matches(&self) -> bool {
        self.bind_address
            .map(|bind| AddressFamily::of(&bind) == self.family())
            .unwrap_or(true)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bind_address {
            Some(bind) => write!(f, "{}@{}", self.address, bind.ip()),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Ordered targets, tried first to last for every new client.
///
/// Never empty. Built once at startup and read-only afterwards, so it can
/// be shared behind an `Arc` without locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTable {
    targets: Vec<Target>,
}

impl TargetTable {
    /// Build a table from already resolved targets.
    pub fn new(targets: Vec<Target>) -> Result<Self, TargetError> {
        if targets.is_empty() {
            return Err(TargetError::Empty);
        }
        Ok(Self { targets })
    }

    /// Resolve every spec in order.
    ///
    /// `default_bind` applies to specs without their own `@bindhost`. Any
    /// resolution failure aborts the whole build; no partial table is
    /// returned.
    pub async fn resolve(
        specs: &[TargetSpec],
        default_bind: Option<&str>,
    ) -> Result<Self, TargetError> {
        if specs.is_empty() {
            return Err(TargetError::Empty);
        }

        let default_bind = match default_bind {
            Some(host) => Some(resolve_bind_address(host).await?),
            None => None,
        };

        let mut targets = Vec::with_capacity(specs.len());
        for spec in specs {
            let address = resolve(&spec.host, spec.port).await?;
            let bind_address = match &spec.bind_host {
                Some(host) => Some(resolve_bind_address(host).await?),
                None => default_bind,
            };
            targets.push(Target {
                address,
                bind_address,
            });
        }

        Self::new(targets)
    }

    /// Targets in preference order.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Target> {
        self.targets.iter()
    }
}

impl<'a> IntoIterator for &'a TargetTable {
    type Item = &'a Target;
    type IntoIter = std::slice::Iter<'a, Target>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.iter()
    }
}
