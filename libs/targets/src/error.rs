//! Error types for target parsing and resolution.

use thiserror::Error;

/// Errors raised while building the target table.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TargetError {
    /// The target string is not `host:port[@bindhost]`.
    #[error("malformed target '{spec}': {reason}")]
    MalformedSpec { spec: String, reason: &'static str },

    /// The target host did not resolve to any address.
    #[error("cannot resolve {host}")]
    Unresolvable { host: String },

    /// The bind host did not resolve to any address.
    #[error("the supplied bind address {host} could not be resolved")]
    UnresolvableBind { host: String },

    /// No targets were given.
    #[error("need at least one redirect target")]
    Empty,
}

impl TargetError {
    pub(crate) fn malformed(spec: &str, reason: &'static str) -> Self {
        TargetError::MalformedSpec {
            spec: spec.to_string(),
            reason,
        }
    }
}
