//! Shared utilities for the carrera-live workspace.
//!
//! - `logger`: tracing subscriber setup for binaries
//! - `time`: clock abstraction used by the realtime core

pub mod logger;
pub mod time;
