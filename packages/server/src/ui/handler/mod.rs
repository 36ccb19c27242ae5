//! Request handlers.

mod http;
mod websocket;

pub use http::{health_check, store_operation};
pub use websocket::realtime_handler;
