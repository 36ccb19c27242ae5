//! Realtime synchronization core for carrera-live.
//!
//! A reconnect-with-backoff connection manager sits under two record sync
//! controllers (live stream settings and live chat messages). A pure status
//! presenter turns connection state into a user-facing indicator.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;
