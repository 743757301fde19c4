//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use loghub_core::DEFAULT_BACKEND_TIMEOUT;

/// Configuration for the gateway HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to.
    pub bind_addr: SocketAddr,
    /// Deadline for backends that do not set their own timeout.
    pub default_backend_timeout: Duration,
    /// CORS allowed origins (empty means all).
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            default_backend_timeout: DEFAULT_BACKEND_TIMEOUT,
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Create a configuration bound to `bind_addr`.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    /// Set the default backend deadline.
    #[must_use]
    pub const fn with_default_backend_timeout(mut self, timeout: Duration) -> Self {
        self.default_backend_timeout = timeout;
        self
    }

    /// Add a CORS allowed origin.
    #[must_use]
    pub fn with_cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_origins.push(origin.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.default_backend_timeout, Duration::from_secs(30));
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_builder() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000);
        let config = ServerConfig::new(addr)
            .with_default_backend_timeout(Duration::from_secs(5))
            .with_cors_origin("https://ui.example.com");

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.default_backend_timeout, Duration::from_secs(5));
        assert_eq!(config.cors_origins, vec!["https://ui.example.com".to_string()]);
    }
}
