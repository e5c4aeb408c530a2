//! Configuration types for the HTTP listener.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Address to bind to.
    pub bind_address: IpAddr,

    /// Port to listen on.
    pub listen_port: u16,

    /// Maximum time to receive request headers.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Maximum time to wait for an upstream response.
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: 8080,
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl HttpConfig {
    /// Get the socket address to bind.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.listen_port)
    }

    /// Validate the listener configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.read_timeout.is_zero() {
            return Err("read_timeout must be greater than 0".to_string());
        }
        if self.write_timeout.is_zero() {
            return Err("write_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HttpConfig::default();
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8080");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize() {
        let config: HttpConfig = toml::from_str(
            r#"
            listen_port = 9090
            read_timeout = "2s"
            write_timeout = "15s"
        "#,
        )
        .unwrap();
        assert_eq!(config.listen_port, 9090);
        assert_eq!(config.read_timeout, Duration::from_secs(2));
        assert_eq!(config.write_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let config = HttpConfig {
            read_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
