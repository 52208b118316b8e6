pub mod http;
pub mod startup;
pub mod websocket;
pub mod websocket_manager;
