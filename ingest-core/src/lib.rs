//! IOC Ingest Core - Artifact model and extraction engine
//!
//! This crate provides the foundational primitives:
//! - Typed, immutable artifacts with provenance
//! - Pattern-based IOC recognition (URLs, IPs, hashes, YARA rules)
//! - The extraction engine turning raw content into ordered artifacts
//! - Opaque source checkpoints

pub mod artifacts;
pub mod checkpoint;
pub mod extract;
pub mod recognize;

pub use artifacts::*;
pub use checkpoint::*;
pub use extract::*;
pub use recognize::{PatternRecognizer, Recognizer};

/// Name used in generated task descriptions
pub const SYSTEM_NAME: &str = "IOC Ingest";
