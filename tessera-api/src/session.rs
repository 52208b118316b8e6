//! Turns inbound session frames into orchestrator calls and replies

use crate::websocket::{ClientMessage, ServerMessage};
use tessera_engine::{EventSink, Orchestrator};
use tracing::{debug, warn};

/// Answer one text frame. Progress events for any segmentation it starts
/// go to `sink`; the returned message is the final reply.
pub async fn handle_text(orchestrator: &Orchestrator, text: &str, sink: &dyn EventSink) -> ServerMessage {
    match ClientMessage::from_json(text) {
        Ok(message) => respond(orchestrator, message, sink).await,
        Err(e) => {
            debug!(error = %e, "Rejected session message");
            e.reply()
        }
    }
}

pub async fn respond(
    orchestrator: &Orchestrator,
    message: ClientMessage,
    sink: &dyn EventSink,
) -> ServerMessage {
    match message {
        ClientMessage::Ping { timestamp } => ServerMessage::Pong { timestamp },
        ClientMessage::StartSegmentation { request } => {
            match orchestrator.process(*request, Some(sink)).await {
                Ok(response) => ServerMessage::segmentation_complete(response),
                Err(e) => {
                    warn!(error = %e, "Session segmentation failed");
                    ServerMessage::SegmentationError {
                        algorithm: None,
                        error: e.public_message(),
                        request_id: None,
                    }
                }
            }
        }
        ClientMessage::ParameterUpdate(update) => {
            match orchestrator.process(update.to_request(), Some(sink)).await {
                Ok(response) => ServerMessage::ParameterUpdateComplete {
                    algorithm_name: update.algorithm_name,
                    parameter_name: update.parameter_name,
                    parameter_value: update.parameter_value,
                    result: Box::new(response),
                },
                Err(e) => {
                    warn!(
                        algorithm = %update.algorithm_name,
                        parameter = %update.parameter_name,
                        error = %e,
                        "Parameter update failed"
                    );
                    ServerMessage::ParameterUpdateError {
                        error: e.public_message(),
                    }
                }
            }
        }
    }
}
