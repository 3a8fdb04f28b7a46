//! Stream wire protocol.
//!
//! Frames are UTF-8 JSON envelopes of the form `{"type": ..., "data": ...}`.
//! The service broadcasts six message types; anything else with a valid
//! envelope shape is accepted and ignored so the client keeps working when
//! the service grows new broadcast types.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Approach, CyclePlan, LiveCount, OptimizationDelta, SystemState};

/// Envelope tags this client knows how to reduce.
pub const KNOWN_MESSAGE_TYPES: [&str; 6] = [
    "system_state",
    "live_counts",
    "phase_update",
    "cycle_plan",
    "optimization_delta",
    "detections_meta",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveCountsPayload {
    pub counts: Vec<LiveCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseUpdatePayload {
    pub phase: Approach,
    pub remaining_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyclePlanPayload {
    pub plan: CyclePlan,
}

/// A typed inbound frame from the optimization service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full snapshot replacement.
    SystemState(SystemState),
    LiveCounts(LiveCountsPayload),
    PhaseUpdate(PhaseUpdatePayload),
    CyclePlan(CyclePlanPayload),
    /// Appended to the delta log in arrival order.
    OptimizationDelta(Vec<OptimizationDelta>),
    /// Per-frame detection metadata. Carried but not reduced into state.
    DetectionsMeta(Value),
}

/// Outbound frame envelope.
///
/// The dashboard rarely sends; the service logs and ignores anything it does
/// not recognize, so this stays a thin type/data pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl ClientFrame {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

/// Decode one inbound text frame.
///
/// Returns `Ok(Some(_))` for a known message, `Ok(None)` for a structurally
/// valid envelope with an unknown type tag, and `Err` for anything malformed
/// (invalid JSON, missing tag, or a bad payload for a known tag).
pub fn decode_frame(text: &str) -> Result<Option<ServerMessage>, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| serde_json::Error::custom("frame is missing a `type` tag"))?;

    if !KNOWN_MESSAGE_TYPES.contains(&tag) {
        return Ok(None);
    }

    serde_json::from_value(value).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_system_state_frame() {
        let text = r#"{"type":"system_state","data":{"running":true,"live_counts":[],"remaining_seconds":12}}"#;
        let msg = decode_frame(text).unwrap().unwrap();
        match msg {
            ServerMessage::SystemState(state) => {
                assert!(state.running);
                assert_eq!(state.remaining_seconds, 12);
                assert!(state.cycle_plan.is_none());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn decodes_phase_update_frame() {
        let text = r#"{"type":"phase_update","data":{"phase":"north","remaining_seconds":7}}"#;
        let msg = decode_frame(text).unwrap().unwrap();
        assert_eq!(
            msg,
            ServerMessage::PhaseUpdate(PhaseUpdatePayload {
                phase: Approach::North,
                remaining_seconds: 7,
            })
        );
    }

    #[test]
    fn decodes_optimization_delta_array() {
        let text = r#"{"type":"optimization_delta","data":[{"approach":"east","prev_green":20,"new_green":25,"delta":5}]}"#;
        let msg = decode_frame(text).unwrap().unwrap();
        match msg {
            ServerMessage::OptimizationDelta(deltas) => {
                assert_eq!(deltas.len(), 1);
                assert_eq!(deltas[0].delta, 5);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_tag_is_accepted_but_empty() {
        let text = r#"{"type":"foo","data":{"whatever":1}}"#;
        assert_eq!(decode_frame(text).unwrap(), None);
    }

    #[test]
    fn connection_established_banner_is_ignored() {
        // The service sends this greeting on accept; it is not a state update.
        let text = r#"{"type":"connection_established","data":{"message":"ok"}}"#;
        assert_eq!(decode_frame(text).unwrap(), None);
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(decode_frame("{nope").is_err());
    }

    #[test]
    fn missing_type_tag_is_an_error() {
        assert!(decode_frame(r#"{"data":{}}"#).is_err());
    }

    #[test]
    fn bad_payload_for_known_tag_is_an_error() {
        let text = r#"{"type":"phase_update","data":{"phase":"diagonal"}}"#;
        assert!(decode_frame(text).is_err());
    }
}
