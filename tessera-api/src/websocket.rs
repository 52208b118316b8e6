// WebSocket protocol for interactive segmentation sessions

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tessera_core::{
    AlgorithmConfig, ParamValue, Parameters, SegmentationRequest, SegmentationResponse,
    SegmentationResult,
};
use tessera_engine::SegmentationEvent;
use thiserror::Error;

/// Inbound messages, keyed by their `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Ping { timestamp: Option<JsonValue> },
    StartSegmentation { request: Box<SegmentationRequest> },
    ParameterUpdate(ParameterUpdate),
}

/// Re-run one algorithm with a single parameter overridden.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterUpdate {
    pub algorithm_name: String,
    pub parameter_name: String,
    pub parameter_value: ParamValue,
    pub image_id: String,
}

impl ParameterUpdate {
    pub fn to_request(&self) -> SegmentationRequest {
        let parameters = Parameters::from([(self.parameter_name.clone(), self.parameter_value.clone())]);
        SegmentationRequest::new(
            self.image_id.clone(),
            vec![AlgorithmConfig::new(self.algorithm_name.clone(), parameters)],
        )
    }
}

/// Why an inbound frame could not be turned into a [`ClientMessage`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid JSON message: {0}")]
    Malformed(String),

    #[error("Missing message type")]
    MissingType,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Missing required parameters")]
    MissingParameters,

    #[error("Missing segmentation request")]
    MissingRequest,

    #[error("Invalid segmentation request: {0}")]
    InvalidRequest(String),
}

impl ProtocolError {
    /// Reply owed to the client for this failure.
    pub fn reply(&self) -> ServerMessage {
        match self {
            ProtocolError::MissingParameters => ServerMessage::ParameterUpdateError {
                error: self.to_string(),
            },
            ProtocolError::MissingRequest | ProtocolError::InvalidRequest(_) => {
                ServerMessage::SegmentationError {
                    algorithm: None,
                    error: self.to_string(),
                    request_id: None,
                }
            }
            _ => ServerMessage::error(self.to_string()),
        }
    }
}

fn present(value: &JsonValue, field: &str) -> Option<JsonValue> {
    value.get(field).filter(|v| !v.is_null()).cloned()
}

fn text_field(value: &JsonValue, field: &str) -> Result<String, ProtocolError> {
    match present(value, field) {
        Some(JsonValue::String(s)) if !s.is_empty() => Ok(s),
        _ => Err(ProtocolError::MissingParameters),
    }
}

impl ClientMessage {
    /// Parse a text frame.
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        let value: JsonValue =
            serde_json::from_str(json).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let kind = match value.get("type") {
            Some(JsonValue::String(kind)) => kind.as_str(),
            Some(JsonValue::Null) | None => return Err(ProtocolError::MissingType),
            Some(other) => return Err(ProtocolError::UnknownType(other.to_string())),
        };

        match kind {
            "ping" => Ok(ClientMessage::Ping {
                timestamp: value.get("timestamp").cloned(),
            }),
            "start_segmentation" => {
                let raw = present(&value, "request").ok_or(ProtocolError::MissingRequest)?;
                let request = serde_json::from_value(raw)
                    .map_err(|e| ProtocolError::InvalidRequest(e.to_string()))?;
                Ok(ClientMessage::StartSegmentation {
                    request: Box::new(request),
                })
            }
            "parameter_update" => {
                let parameter_value = present(&value, "parameter_value")
                    .and_then(|v| serde_json::from_value::<ParamValue>(v).ok())
                    .ok_or(ProtocolError::MissingParameters)?;
                Ok(ClientMessage::ParameterUpdate(ParameterUpdate {
                    algorithm_name: text_field(&value, "algorithm_name")?,
                    parameter_name: text_field(&value, "parameter_name")?,
                    parameter_value,
                    image_id: text_field(&value, "image_id")?,
                }))
            }
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

/// Body of a `segmentation_complete` message: the whole response when a
/// request finishes, one algorithm's result for a progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompletePayload {
    Response(Box<SegmentationResponse>),
    Unit(Box<SegmentationResult>),
}

/// Outbound messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "connection_established")]
    ConnectionEstablished {
        connection_id: String,
        message: String,
    },
    #[serde(rename = "pong")]
    Pong {
        timestamp: Option<JsonValue>,
    },
    #[serde(rename = "segmentation_start")]
    SegmentationStart {
        algorithm: String,
        request_id: String,
    },
    #[serde(rename = "segmentation_complete")]
    SegmentationComplete {
        result: CompletePayload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    #[serde(rename = "segmentation_error")]
    SegmentationError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        algorithm: Option<String>,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    #[serde(rename = "parameter_update_complete")]
    ParameterUpdateComplete {
        algorithm_name: String,
        parameter_name: String,
        parameter_value: ParamValue,
        result: Box<SegmentationResponse>,
    },
    #[serde(rename = "parameter_update_error")]
    ParameterUpdateError {
        error: String,
    },
    #[serde(rename = "error")]
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn connection_established(connection_id: impl Into<String>) -> Self {
        ServerMessage::ConnectionEstablished {
            connection_id: connection_id.into(),
            message: "WebSocket connection established".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Final reply to a `start_segmentation`.
    pub fn segmentation_complete(response: SegmentationResponse) -> Self {
        ServerMessage::SegmentationComplete {
            result: CompletePayload::Response(Box::new(response)),
            request_id: None,
        }
    }
}

impl From<SegmentationEvent> for ServerMessage {
    fn from(event: SegmentationEvent) -> Self {
        match event {
            SegmentationEvent::Start {
                request_id,
                algorithm,
            } => ServerMessage::SegmentationStart {
                algorithm,
                request_id,
            },
            SegmentationEvent::Complete { request_id, result } => {
                ServerMessage::SegmentationComplete {
                    result: CompletePayload::Unit(Box::new(result)),
                    request_id: Some(request_id),
                }
            }
            SegmentationEvent::Error {
                request_id,
                algorithm,
                error,
            } => ServerMessage::SegmentationError {
                algorithm: Some(algorithm),
                error,
                request_id: Some(request_id),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_ping() {
        let msg = ClientMessage::from_json(r#"{"type":"ping","timestamp":1700000000}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Ping {
                timestamp: Some(json!(1700000000))
            }
        );
        let bare = ClientMessage::from_json(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(bare, ClientMessage::Ping { timestamp: None });
    }

    #[test]
    fn test_pong_echoes_null_timestamp() {
        let json = ServerMessage::Pong { timestamp: None }.to_json().unwrap();
        assert_eq!(json, r#"{"type":"pong","timestamp":null}"#);
    }

    #[test]
    fn test_parameter_update_builds_single_config_request() {
        let msg = ClientMessage::from_json(
            r#"{"type":"parameter_update","algorithm_name":"slic","parameter_name":"n_segments",
                "parameter_value":400,"image_id":"img-1"}"#,
        )
        .unwrap();
        let ClientMessage::ParameterUpdate(update) = msg else {
            panic!("expected parameter update");
        };
        let request = update.to_request();
        assert_eq!(request.image_id, "img-1");
        assert_eq!(request.algorithms.len(), 1);
        assert_eq!(request.algorithms[0].name, "slic");
        assert_eq!(request.algorithms[0].parameters["n_segments"], ParamValue::Int(400));
    }

    #[test]
    fn test_parameter_update_accepts_zero_value() {
        let msg = ClientMessage::from_json(
            r#"{"type":"parameter_update","algorithm_name":"watershed","parameter_name":"compactness",
                "parameter_value":0,"image_id":"img-1"}"#,
        );
        assert!(msg.is_ok());
    }

    #[test]
    fn test_parameter_update_missing_field() {
        let err = ClientMessage::from_json(
            r#"{"type":"parameter_update","algorithm_name":"slic","parameter_value":1,"image_id":"i"}"#,
        )
        .unwrap_err();
        assert_eq!(err, ProtocolError::MissingParameters);
        assert_eq!(
            err.reply(),
            ServerMessage::ParameterUpdateError {
                error: "Missing required parameters".to_string()
            }
        );
    }

    #[test]
    fn test_start_segmentation_requires_request() {
        let err = ClientMessage::from_json(r#"{"type":"start_segmentation"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::MissingRequest);
        let reply = serde_json::to_value(err.reply()).unwrap();
        assert_eq!(reply["type"], "segmentation_error");
        assert_eq!(reply["error"], "Missing segmentation request");

        let msg = ClientMessage::from_json(
            r#"{"type":"start_segmentation","request":{"image_id":"a","algorithms":[{"name":"slic"}]}}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMessage::StartSegmentation { .. }));
    }

    #[test]
    fn test_unknown_and_malformed_frames() {
        let err = ClientMessage::from_json(r#"{"type":"subscribe"}"#).unwrap_err();
        assert_eq!(
            err.reply(),
            ServerMessage::error("Unknown message type: subscribe")
        );
        assert!(matches!(
            ClientMessage::from_json("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert_eq!(
            ClientMessage::from_json("{}").unwrap_err(),
            ProtocolError::MissingType
        );
    }

    #[test]
    fn test_events_map_to_wire_messages() {
        let msg: ServerMessage = SegmentationEvent::Error {
            request_id: "r1".into(),
            algorithm: "slic".into(),
            error: "boom".into(),
        }
        .into();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            json!({"type": "segmentation_error", "algorithm": "slic", "error": "boom", "request_id": "r1"})
        );

        let start: ServerMessage = SegmentationEvent::Start {
            request_id: "r1".into(),
            algorithm: "slic".into(),
        }
        .into();
        assert_eq!(
            serde_json::to_value(&start).unwrap(),
            json!({"type": "segmentation_start", "algorithm": "slic", "request_id": "r1"})
        );
    }

    #[test]
    fn test_connection_established_shape() {
        let json = ServerMessage::connection_established("abc").to_json().unwrap();
        let parsed = ServerMessage::from_json(&json).unwrap();
        assert_eq!(parsed, ServerMessage::connection_established("abc"));
        assert!(json.contains("\"type\":\"connection_established\""));
    }
}
