//! State blob codec
//!
//! The blob is a versioned JSON document carrying, per stage, the
//! parameters and the per-channel substate (buffer contents oldest to
//! newest plus the policy accumulators). Accumulators travel verbatim so
//! precision errors do not accumulate over save/load cycles.
//!
//! Forward compatibility: unknown fields in newer blobs are ignored;
//! structural problems (missing channels, count mismatches) fail decode
//! before the caller can touch any pipeline state.

use std::time::{SystemTime, UNIX_EPOCH};

use pf_core::{PfError, PfResult};
use serde::{Deserialize, Serialize};

/// Current blob format version
pub const FORMAT_VERSION: u32 = 1;

/// Complete pipeline state document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateBlob {
    /// Format version; blobs predating the field decode as version 1
    #[serde(default = "default_version")]
    pub version: u32,
    /// Wall-clock save time in Unix seconds (informational only)
    pub timestamp: u64,
    pub stage_count: u32,
    pub stages: Vec<StageRecord>,
}

fn default_version() -> u32 {
    1
}

/// One stage's serialized form
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    /// 0-based position in the pipeline
    pub index: u32,
    /// Stable kind tag (`movingAverage`, `rms`, ...)
    #[serde(rename = "type")]
    pub type_tag: String,
    pub state: StageStateDoc,
}

/// Stage parameters plus per-channel substate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StageStateDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epsilon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_forward: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_back: Option<Vec<f64>>,
    pub num_channels: u32,
    pub channels: Vec<ChannelStateDoc>,
}

/// One channel's buffer contents and accumulators
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelStateDoc {
    /// Buffer contents, oldest to newest
    pub buffer: Vec<f64>,
    /// Parallel timestamps (duration-window stages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_sum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_sum_of_squares: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running_sum_of_abs: Option<f64>,
}

impl StateBlob {
    /// Fresh document stamped with the current version and wall clock
    pub fn new(stages: Vec<StageRecord>) -> Self {
        Self {
            version: FORMAT_VERSION,
            timestamp: current_timestamp(),
            stage_count: stages.len() as u32,
            stages,
        }
    }

    /// Structural validation shared by decode and the pipeline loader
    pub fn validate(&self) -> PfResult<()> {
        if self.version == 0 {
            return Err(PfError::Codec("unsupported format version 0".to_string()));
        }
        if self.stage_count as usize != self.stages.len() {
            return Err(PfError::Codec(format!(
                "stageCount {} does not match {} stage records",
                self.stage_count,
                self.stages.len()
            )));
        }
        for (position, record) in self.stages.iter().enumerate() {
            if record.index as usize != position {
                return Err(PfError::Codec(format!(
                    "stage record at position {position} carries index {}",
                    record.index
                )));
            }
            if record.type_tag.is_empty() {
                return Err(PfError::Codec(format!(
                    "stage record {position} is missing its type tag"
                )));
            }
            let state = &record.state;
            if state.num_channels as usize != state.channels.len() {
                return Err(PfError::Codec(format!(
                    "stage {position} declares {} channels but carries {}",
                    state.num_channels,
                    state.channels.len()
                )));
            }
            for (channel, chan) in state.channels.iter().enumerate() {
                if let Some(ts) = &chan.timestamps {
                    if ts.len() != chan.buffer.len() {
                        return Err(PfError::Codec(format!(
                            "stage {position} channel {channel}: {} timestamps for {} samples",
                            ts.len(),
                            chan.buffer.len()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// The same structure without per-channel buffer contents, for
    /// monitoring surfaces
    pub fn summary(&self) -> StateBlob {
        StateBlob {
            version: self.version,
            timestamp: self.timestamp,
            stage_count: self.stage_count,
            stages: self
                .stages
                .iter()
                .map(|record| StageRecord {
                    index: record.index,
                    type_tag: record.type_tag.clone(),
                    state: StageStateDoc {
                        channels: Vec::new(),
                        ..record.state.clone()
                    },
                })
                .collect(),
        }
    }
}

/// Serialize a state document to its textual blob
pub fn encode(blob: &StateBlob) -> PfResult<String> {
    serde_json::to_string(blob).map_err(|e| PfError::Codec(format!("encode failed: {e}")))
}

/// Parse and validate a textual blob
pub fn decode(text: &str) -> PfResult<StateBlob> {
    let blob: StateBlob =
        serde_json::from_str(text).map_err(|e| PfError::Codec(format!("decode failed: {e}")))?;
    blob.validate()?;
    if blob.version > FORMAT_VERSION {
        log::debug!(
            "decoding blob with newer format version {} (current {}); unknown fields ignored",
            blob.version,
            FORMAT_VERSION
        );
    }
    Ok(blob)
}

/// Unix seconds for blob stamping
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_blob() -> StateBlob {
        StateBlob::new(vec![StageRecord {
            index: 0,
            type_tag: "movingAverage".to_string(),
            state: StageStateDoc {
                window_size: Some(3),
                mode: Some("moving".to_string()),
                num_channels: 2,
                channels: vec![
                    ChannelStateDoc {
                        buffer: vec![1.0, 2.0, 3.0],
                        running_sum: Some(6.0),
                        ..ChannelStateDoc::default()
                    },
                    ChannelStateDoc {
                        buffer: vec![10.0, 20.0, 30.0],
                        running_sum: Some(60.0),
                        ..ChannelStateDoc::default()
                    },
                ],
                ..StageStateDoc::default()
            },
        }])
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let blob = sample_blob();
        let text = encode(&blob).unwrap();
        let decoded = decode(&text).unwrap();

        assert_eq!(decoded.version, FORMAT_VERSION);
        assert_eq!(decoded.stage_count, 1);
        assert_eq!(decoded.stages[0].type_tag, "movingAverage");
        assert_eq!(decoded.stages[0].state.channels[1].buffer, vec![10.0, 20.0, 30.0]);
        assert_eq!(decoded.stages[0].state.channels[0].running_sum, Some(6.0));
    }

    #[test]
    fn test_wire_field_names() {
        let text = encode(&sample_blob()).unwrap();
        assert!(text.contains("\"stageCount\""));
        assert!(text.contains("\"type\":\"movingAverage\""));
        assert!(text.contains("\"windowSize\""));
        assert!(text.contains("\"numChannels\""));
        assert!(text.contains("\"runningSum\""));
        // Absent optionals stay off the wire
        assert!(!text.contains("runningSumOfAbs"));
        assert!(!text.contains("feedForward"));
    }

    #[test]
    fn test_single_precision_round_trip() {
        // An f32 widened to f64 must survive the decimal representation
        let value = 0.1_f32;
        let mut blob = sample_blob();
        blob.stages[0].state.channels[0].buffer = vec![value as f64];
        let decoded = decode(&encode(&blob).unwrap()).unwrap();
        assert_eq!(decoded.stages[0].state.channels[0].buffer[0] as f32, value);
    }

    #[test]
    fn test_malformed_blob() {
        assert!(matches!(decode("not json"), Err(PfError::Codec(_))));
        assert!(matches!(decode("{\"timestamp\":1}"), Err(PfError::Codec(_))));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let text = r#"{
            "version": 2,
            "timestamp": 1700000000,
            "stageCount": 0,
            "stages": [],
            "futureField": {"nested": true}
        }"#;
        let decoded = decode(text).unwrap();
        assert_eq!(decoded.version, 2);
    }

    #[test]
    fn test_missing_version_defaults_to_one() {
        let text = r#"{"timestamp": 0, "stageCount": 0, "stages": []}"#;
        assert_eq!(decode(text).unwrap().version, 1);
    }

    #[test]
    fn test_version_zero_rejected() {
        let text = r#"{"version": 0, "timestamp": 0, "stageCount": 0, "stages": []}"#;
        assert!(matches!(decode(text), Err(PfError::Codec(_))));
    }

    #[test]
    fn test_stage_count_mismatch() {
        let mut blob = sample_blob();
        blob.stage_count = 5;
        let text = serde_json::to_string(&blob).unwrap();
        assert!(matches!(decode(&text), Err(PfError::Codec(_))));
    }

    #[test]
    fn test_channel_count_mismatch() {
        let mut blob = sample_blob();
        blob.stages[0].state.num_channels = 3;
        let text = serde_json::to_string(&blob).unwrap();
        assert!(matches!(decode(&text), Err(PfError::Codec(_))));
    }

    #[test]
    fn test_timestamp_length_mismatch() {
        let mut blob = sample_blob();
        blob.stages[0].state.channels[0].timestamps = Some(vec![0.0]);
        let text = serde_json::to_string(&blob).unwrap();
        assert!(matches!(decode(&text), Err(PfError::Codec(_))));
    }

    #[test]
    fn test_summary_strips_buffers() {
        let summary = sample_blob().summary();
        assert_eq!(summary.stage_count, 1);
        assert_eq!(summary.stages[0].state.num_channels, 2);
        assert!(summary.stages[0].state.channels.is_empty());
        assert_eq!(summary.stages[0].state.window_size, Some(3));
    }
}
