//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the process.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::lifecycle::Signal;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Coordinator settings (identity, grace period, signals).
    pub app: AppSettings,

    /// Logging settings.
    pub observability: ObservabilityConfig,

    /// HTTP server component.
    pub http: HttpConfig,

    /// JSON-RPC server component.
    pub rpc: RpcConfig,

    /// Background worker component.
    pub worker: WorkerConfig,
}

/// Coordinator settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppSettings {
    /// Fixed application id. A random UUID is used when absent.
    pub id: Option<String>,

    /// Application name reported to components.
    pub name: String,

    /// Application version reported to components.
    pub version: String,

    /// Grace period for each component's stop, in seconds.
    pub stop_timeout_secs: u64,

    /// Process signals that trigger shutdown.
    pub signals: Vec<Signal>,

    /// Free-form metadata exposed through the app info.
    pub metadata: HashMap<String, String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            id: None,
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            stop_timeout_secs: 60,
            signals: Signal::DEFAULT.to_vec(),
            metadata: HashMap::new(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,

    /// Component identifier.
    pub name: String,

    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "http".to_string(),
            bind_address: "0.0.0.0:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// JSON-RPC server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    pub enabled: bool,

    /// Component identifier.
    pub name: String,

    /// Bind address (e.g., "0.0.0.0:9000").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "rpc".to_string(),
            bind_address: "0.0.0.0:9000".to_string(),
            max_connections: 1024,
        }
    }
}

/// Background worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,

    /// Component identifier.
    pub name: String,

    /// Delay between job runs in milliseconds.
    pub interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "worker".to_string(),
            interval_ms: 5000,
        }
    }
}
