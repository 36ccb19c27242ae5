//! Admin console for carrera-live.
//!
//! Mounts the stream settings and chat sync controllers against the realtime
//! gateway (or a local in-memory backend) and renders their state on a
//! line-oriented terminal.

pub mod backend;
pub mod command;
pub mod error;
pub mod formatter;
pub mod render;
pub mod session;
pub mod ui;
