//! Pipeline configuration
//!
//! Identifiers pass through opaquely for surrounding code (persistence
//! layers, monitoring); the core never dereferences them.

use serde::{Deserialize, Serialize};

/// Configuration supplied at pipeline construction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Opaque pipeline identifier
    pub name: Option<String>,
    /// Opaque key used by external stores to persist state blobs
    pub state_key: Option<String>,
    /// Default sample rate used to synthesize timestamps when a chunk
    /// arrives without explicit ones
    pub sample_rate: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_wire_names() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"stateKey":"emg:1","sampleRate":1000.0}"#).unwrap();
        assert_eq!(config.state_key.as_deref(), Some("emg:1"));
        assert_eq!(config.sample_rate, Some(1000.0));
        assert!(config.name.is_none());
    }
}
