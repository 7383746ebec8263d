//! Parsing of `host:port[@bindhost]` target specifications.

use std::fmt;
use std::str::FromStr;

use crate::error::TargetError;

/// An unresolved target as written on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    /// Destination host name or IP literal (brackets stripped).
    pub host: String,
    /// Destination port.
    pub port: u16,
    /// Per-target bind host, overriding any global default.
    pub bind_host: Option<String>,
}

impl TargetSpec {
    /// Create a spec without a per-target bind host.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            bind_host: None,
        }
    }

    /// Attach a per-target bind host.
    pub fn with_bind_host(mut self, bind_host: impl Into<String>) -> Self {
        self.bind_host = Some(bind_host.into());
        self
    }
}

/// Strip the brackets of an IPv6 literal such as `[::1]`.
fn unbracket(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

impl FromStr for TargetSpec {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (endpoint, bind_host) = match s.rsplit_once('@') {
            Some((endpoint, bind)) => {
                let bind = unbracket(bind);
                if bind.is_empty() {
                    return Err(TargetError::malformed(s, "empty bind host after '@'"));
                }
                (endpoint, Some(bind.to_string()))
            }
            None => (s, None),
        };

        let Some((host, port)) = endpoint.rsplit_once(':') else {
            return Err(TargetError::malformed(s, "expected host:port tuple"));
        };

        // A bare IPv6 literal without brackets has its last ':' inside the address.
        if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
            return Err(TargetError::malformed(
                s,
                "IPv6 literals must be written as [addr]:port",
            ));
        }

        let host = unbracket(host);
        if host.is_empty() {
            return Err(TargetError::malformed(s, "empty host"));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| TargetError::malformed(s, "port must be an integer in 0-65535"))?;

        Ok(Self {
            host: host.to_string(),
            port,
            bind_host,
        })
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)?;
        } else {
            write!(f, "{}:{}", self.host, self.port)?;
        }
        if let Some(bind) = &self.bind_host {
            if bind.contains(':') {
                write!(f, "@[{}]", bind)?;
            } else {
                write!(f, "@{}", bind)?;
            }
        }
        Ok(())
    }
}
