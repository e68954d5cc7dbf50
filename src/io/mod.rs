//! Input/output helpers.
//!
//! - response matrix and config ingest (`ingest`)
//! - JSON report, item CSV and response CSV exports (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
