//! rg-probe - host metrics probe
//!
//! Configuration loading, publishers and the poll driver around the
//! `rg-probe-core` engine.

pub mod config;
pub mod poller;
pub mod publish;

// Re-export workspace crates for convenience
pub use rg_probe_core as core;
pub use rg_probe_sources as sources;
pub use rg_probe_types as types;
