//! Host name resolution for targets and bind addresses.

use std::net::SocketAddr;

use tokio::net::lookup_host;

use crate::error::TargetError;

/// Resolve a destination host and port, taking the first address returned.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr, TargetError> {
    first_address(host, port)
        .await
        .ok_or_else(|| TargetError::Unresolvable {
            host: host.to_string(),
        })
}

/// Resolve a local bind host (port 0, the kernel picks the source port).
pub async fn resolve_bind_address(host: &str) -> Result<SocketAddr, TargetError> {
    first_address(host, 0)
        .await
        .ok_or_else(|| TargetError::UnresolvableBind {
            host: host.to_string(),
        })
}

async fn first_address(host: &str, port: u16) -> Option<SocketAddr> {
    lookup_host((host, port)).await.ok()?.next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_ip_literals() {
        let v4 = resolve("127.0.0.1", 8080).await.unwrap();
        assert_eq!(v4.to_string(), "127.0.0.1:8080");

        let v6 = resolve("::1", 443).await.unwrap();
        assert_eq!(v6.to_string(), "[::1]:443");
    }

    #[tokio::test]
    async fn test_resolve_bind_address_has_port_zero() {
        let bind = resolve_bind_address("127.0.0.1").await.unwrap();
        assert_eq!(bind.port(), 0);
    }

    #[tokio::test]
    async fn test_resolve_failure() {
        let err = resolve("no such host.invalid", 80).await.unwrap_err();
        assert!(matches!(err, TargetError::Unresolvable { .. }));

        let err = resolve_bind_address("no such host.invalid").await.unwrap_err();
        assert!(matches!(err, TargetError::UnresolvableBind { .. }));
    }
}
