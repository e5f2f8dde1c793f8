use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How access to another account's deal is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipPolicy {
    /// Foreign records look exactly like missing ones (`NotFound`).
    #[default]
    Conceal,
    /// Foreign records are reported as `Forbidden`.
    Distinguish,
}

/// Pipeline engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub ownership_policy: OwnershipPolicy,
}

/// Dispatch engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum sends in flight during a bulk dispatch. 1 means sequential.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Upper bound for a single transport call.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Page size used when a history query does not specify one.
    #[serde(default = "default_history_limit")]
    pub default_history_limit: usize,

    /// Largest page a history query may request.
    #[serde(default = "default_max_history_limit")]
    pub max_history_limit: usize,
}

impl DispatchConfig {
    pub fn sequential() -> Self {
        Self {
            max_concurrency: 1,
            ..Self::default()
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms.max(1))
    }

    pub fn concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            send_timeout_ms: default_send_timeout_ms(),
            default_history_limit: default_history_limit(),
            max_history_limit: default_max_history_limit(),
        }
    }
}

fn default_max_concurrency() -> usize {
    4
}

fn default_send_timeout_ms() -> u64 {
    10_000
}

fn default_history_limit() -> usize {
    20
}

fn default_max_history_limit() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.send_timeout(), Duration::from_secs(10));
        assert_eq!(config.default_history_limit, 20);
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let config = DispatchConfig {
            max_concurrency: 0,
            ..DispatchConfig::default()
        };
        assert_eq!(config.concurrency(), 1);
    }

    #[test]
    fn ownership_policy_defaults_to_conceal() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.ownership_policy, OwnershipPolicy::Conceal);
    }
}
