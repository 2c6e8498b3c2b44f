//! Configuration schema definitions.
//!
//! Every section is optional in the file; unset values leave the
//! collaborator defaults untouched. Command line flags are overlaid on top.

use serde::{Deserialize, Serialize};

/// Root configuration for a service process.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Server identity and listener.
    pub server: ServerConfig,

    pub auth: AuthConfig,

    /// Outbound client.
    pub client: ClientConfig,

    pub store: StoreConfig,

    pub broker: BrokerConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Honor OS termination signals in `run`.
    pub signal: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub name: Option<String>,

    /// Instance id; random when unset.
    pub id: Option<String>,

    pub version: Option<String>,

    /// Bind address (e.g., "0.0.0.0:8080").
    pub address: Option<String>,

    /// Registration lifetime in seconds; 0 never expires.
    pub register_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AuthConfig {
    /// Provider: "noop" admits every caller, "memory" checks issued tokens.
    /// Unset keeps the provider the service was built with.
    pub provider: Option<String>,

    pub namespace: Option<String>,

    /// Endpoints reachable without a token (e.g., "Debug.Health").
    pub public_endpoints: Option<Vec<String>>,

    pub token_expiry_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Deadline of outbound calls in seconds. Setting it replaces the base
    /// client with an `HttpClient` using this deadline.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub database: Option<String>,

    /// Table; `init` rebinds it to the service name.
    pub table: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerConfig {
    pub address: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
