//! tessera-api: wire types shared by the HTTP routes and interactive sessions

pub mod fixtures;
pub mod rest;
pub mod session;
pub mod websocket;

pub use rest::*;
pub use tessera_engine::{BatchItemError, BatchResponse};
pub use websocket::{ClientMessage, CompletePayload, ParameterUpdate, ProtocolError, ServerMessage};
