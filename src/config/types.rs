//! Configuration data types.

use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Fallback for every per-connection timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Fallback graceful drain deadline.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Fallback cap on request line plus header bytes.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 1024;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// Where the public FizzBuzz API listens
    pub api_address: BindAddress,

    /// Where the admin (health + metrics) server listens
    pub admin_address: BindAddress,

    /// Per-connection limits applied to both servers
    pub timeouts: ServerTimeouts,

    /// Graceful drain deadline applied to every server on shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Shared secret expected in the `Authorization` header; empty disables auth
    #[serde(serialize_with = "redact")]
    pub api_key: String,
}

impl Settings {
    /// Whether the API key check is active.
    pub fn auth_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Per-connection limits for a server handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerTimeouts {
    /// Maximum time to read a full request, body included
    #[serde(with = "humantime_serde")]
    pub read: Duration,

    /// Maximum time to read the request line and headers
    #[serde(with = "humantime_serde")]
    pub read_header: Duration,

    /// Maximum time to produce a response once the request is read
    #[serde(with = "humantime_serde")]
    pub write: Duration,

    /// How long a keep-alive connection may sit without traffic
    #[serde(with = "humantime_serde")]
    pub idle: Duration,

    /// Cap on request line plus header bytes
    pub max_header_bytes: usize,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            read: DEFAULT_TIMEOUT,
            read_header: DEFAULT_TIMEOUT,
            write: DEFAULT_TIMEOUT,
            idle: DEFAULT_TIMEOUT,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        }
    }
}

/// A host/port pair to bind a listener on.
///
/// An empty host binds every IPv4 interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindAddress {
    pub host: String,
    pub port: u16,
}

impl BindAddress {
    /// Create a bind address from a host and a port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host to hand to the resolver.
    pub fn resolvable_host(&self) -> &str {
        if self.host.is_empty() {
            "0.0.0.0"
        } else {
            &self.host
        }
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl Serialize for BindAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

fn redact<S: Serializer>(key: &str, serializer: S) -> Result<S::Ok, S::Error> {
    if key.is_empty() {
        serializer.serialize_str("")
    } else {
        serializer.serialize_str("<redacted>")
    }
}

/// Serde helper that renders durations with humantime.
mod humantime_serde {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address_display() {
        assert_eq!(BindAddress::new("", 8080).to_string(), ":8080");
        assert_eq!(BindAddress::new("127.0.0.1", 8080).to_string(), "127.0.0.1:8080");
        assert_eq!(BindAddress::new("::1", 9090).to_string(), "[::1]:9090");
    }

    #[test]
    fn test_empty_host_binds_all_interfaces() {
        assert_eq!(BindAddress::new("", 80).resolvable_host(), "0.0.0.0");
        assert_eq!(BindAddress::new("localhost", 80).resolvable_host(), "localhost");
    }

    #[test]
    fn test_settings_yaml_redacts_api_key() {
        let settings = Settings {
            api_address: BindAddress::new("", 8080),
            admin_address: BindAddress::new("", 8081),
            timeouts: ServerTimeouts::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            api_key: "secret".to_string(),
        };

        let yaml = serde_yaml::to_string(&settings).unwrap();
        assert!(yaml.contains("<redacted>"));
        assert!(!yaml.contains("secret"));
        assert!(yaml.contains("shutdown_timeout: 3s"));
        assert!(settings.auth_enabled());
    }
}
