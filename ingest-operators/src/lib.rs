//! IOC Ingest Operators
//!
//! Integrations consuming artifacts:
//! - **ThreatKB**: creates C2 DNS, C2 IP and signature-import records
//! - **JSON lines**: appends artifacts to a file or stdout
//!
//! Every operator applies an [`ArtifactFilter`] before dispatch.

pub mod filter;
pub mod jsonl;
pub mod threatkb;
pub mod traits;

pub use filter::*;
pub use jsonl::*;
pub use threatkb::*;
pub use traits::*;
