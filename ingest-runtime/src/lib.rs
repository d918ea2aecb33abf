//! IOC Ingest Runtime
//!
//! Wires sources and operators into a polling loop:
//! - **config**: TOML description of the pipeline
//! - **state**: per-source checkpoint storage
//! - **pipeline**: the driver

pub mod config;
pub mod pipeline;
pub mod state;

pub use config::*;
pub use pipeline::*;
pub use state::*;
