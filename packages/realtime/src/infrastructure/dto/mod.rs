//! Data Transfer Objects (DTOs) for the realtime gateway.
//!
//! DTOs are organized by protocol:
//! - `http`: REST request / response bodies of the record store endpoints
//! - `websocket`: frames of the `/realtime` change feed endpoint

pub mod conversion;
pub mod http;
pub mod websocket;
