//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.
//! Defaults reproduce the behaviour of the proxy when run without a file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the signature proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Inbound connection timeouts.
    pub timeouts: TimeoutConfig,

    /// The single upstream origin and its client pool.
    pub upstream: UpstreamConfig,

    /// Verification key source.
    pub key: KeyConfig,

    /// Request hardening.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeouts applied to inbound connections.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to read request headers and body, in seconds.
    pub read_secs: u64,

    /// Time allowed to produce and write the response, in seconds.
    pub write_secs: u64,

    /// Keep-alive connections with no traffic are closed after this many seconds.
    pub idle_secs: u64,
}

impl TimeoutConfig {
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_secs: 10,
            write_secs: 15,
            idle_secs: 30,
        }
    }
}

/// Upstream origin and outbound connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Scheme and authority every verified request is forwarded to.
    pub origin: String,

    /// Total time for the outbound call, including the response body.
    pub timeout_secs: u64,

    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// TCP keepalive interval in seconds.
    pub keepalive_secs: u64,

    /// Idle pooled connections are dropped after this many seconds.
    pub pool_idle_timeout_secs: u64,

    /// Maximum idle connections kept per host.
    pub pool_max_idle_per_host: usize,

    /// Maximum concurrent in-flight upstream requests.
    pub max_connections: usize,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            origin: "https://sep.shaparak.ir".to_string(),
            timeout_secs: 10,
            connect_timeout_secs: 30,
            keepalive_secs: 30,
            pool_idle_timeout_secs: 30,
            pool_max_idle_per_host: 5,
            max_connections: 10,
        }
    }
}

/// When the verification key is re-read from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyReloadPolicy {
    /// Read and parse the key file for every request.
    #[default]
    Always,
    /// Keep the parsed key until the file changes on disk.
    OnChange,
}

/// Verification key configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Path to the PEM-encoded RSA public key.
    pub path: PathBuf,

    pub reload: KeyReloadPolicy,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("public_key.pem"),
            reload: KeyReloadPolicy::Always,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Print the startup banner with host information.
    pub banner: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            banner: true,
        }
    }
}
