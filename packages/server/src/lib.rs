//! Realtime gateway for carrera-live.
//!
//! Hosts an in-memory record store and change feed, and exposes them to remote
//! consumers over JSON REST endpoints (`/rest/{table}/{operation}`) and a
//! WebSocket change feed endpoint (`/realtime`).

// layers
pub mod ui;
pub mod usecase;
