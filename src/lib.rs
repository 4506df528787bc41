//! Runs short Python snippets in throwaway interpreter processes and streams
//! their output to WebSocket clients while they run.

pub mod api;
pub mod config;
pub mod execution;
pub mod process;
pub mod safety;
pub mod scratch;
pub mod session;
pub mod telemetry;
pub mod tutorials;
