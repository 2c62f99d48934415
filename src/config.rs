//! Engine configuration.

use serde::Deserialize;

/// Policy applied when unregistering a Kind that still has live entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnregisterPolicy {
    /// Reject the unregistration with a conflict
    Reject,
    /// Allow it and leave the entities orphaned for deferred cleanup
    Orphan,
}

/// Configuration for the dispatch engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Media type used when no codec matches the requested one
    pub default_media_type: String,
    /// What happens when a Kind with live entities is unregistered
    pub unregister_policy: UnregisterPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_media_type: "text/occi".to_string(),
            unregister_policy: UnregisterPolicy::Reject,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_media_type, "text/occi");
        assert_eq!(config.unregister_policy, UnregisterPolicy::Reject);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"unregister_policy": "orphan"}"#).unwrap();
        assert_eq!(config.unregister_policy, UnregisterPolicy::Orphan);
        assert_eq!(config.default_media_type, "text/occi");
    }
}
