//! IOC Ingest Sources
//!
//! Source connectors implementing the checkpoint polling protocol:
//! - **Web**: HEAD probe with conditional headers, then GET
//! - **File**: modification-time probe on a local file
//!
//! HTTP goes through [`transport::HttpTransport`]; [`transport::ReqwestTransport`]
//! is the production client, optionally proxied.

pub mod file;
pub mod traits;
pub mod transport;
pub mod web;

pub use file::*;
pub use traits::*;
pub use transport::*;
pub use web::*;
