//! Configuration for dealflowd

use dealflow_adapters::ResendConfig;
use dealflow_core::{AuditStorageConfig, DispatchConfig, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DealflowConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Audit log backend
    #[serde(default)]
    pub storage: AuditStorageConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Outbound message transport
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Accept every message locally without delivering it
    #[default]
    Mock,

    /// Deliver through the Resend HTTP API
    Resend(ResendConfig),
}

impl TransportConfig {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Resend(_) => "resend",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8095))
}

fn default_log_level() -> String {
    "dealflow_service=info,dealflow_core=info,info".to_string()
}

impl DealflowConfig {
    /// Layer defaults, then the optional file, then `DEALFLOW_*` variables.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `DEALFLOW_DISPATCH__MAX_CONCURRENCY=8`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DealflowConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DEALFLOW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealflow_core::OwnershipPolicy;

    #[test]
    fn defaults_are_local_and_in_memory() {
        let config = DealflowConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8095);
        assert_eq!(config.storage, AuditStorageConfig::Memory);
        assert!(matches!(config.transport, TransportConfig::Mock));
        assert_eq!(config.pipeline.ownership_policy, OwnershipPolicy::Conceal);
        assert_eq!(config.dispatch.max_concurrency, 4);
        assert!(!config.logging.json);
    }

    #[test]
    fn load_without_file_yields_defaults() {
        let config = DealflowConfig::load(None).unwrap();
        assert_eq!(config.dispatch.default_history_limit, 20);
        assert_eq!(config.dispatch.max_history_limit, 100);
        assert_eq!(config.transport.label(), "mock");
    }

    #[test]
    fn sections_deserialize_from_json() {
        let config: DealflowConfig = serde_json::from_value(serde_json::json!({
            "pipeline": { "ownership_policy": "distinguish" },
            "dispatch": { "max_concurrency": 1, "send_timeout_ms": 2500 },
            "transport": {
                "type": "resend",
                "api_key": "re_123",
                "default_from": "crm@verified.dev"
            }
        }))
        .unwrap();

        assert_eq!(config.pipeline.ownership_policy, OwnershipPolicy::Distinguish);
        assert_eq!(config.dispatch.concurrency(), 1);
        assert_eq!(config.dispatch.default_history_limit, 20);
        match config.transport {
            TransportConfig::Resend(resend) => {
                assert_eq!(resend.api_key, "re_123");
                assert_eq!(resend.base_url, "https://api.resend.com");
            }
            other => panic!("unexpected transport: {other:?}"),
        }
    }
}
