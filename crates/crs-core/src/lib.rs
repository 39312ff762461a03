//! Shared domain types and ambient plumbing for the CRS work-coordination
//! substrate: the data model of §3, crate-wide error glue, and the
//! observability primitives every other crate in the workspace builds on.

pub mod canonical;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod obs;
pub mod telemetry;

pub use domain::*;
pub use error::CrsError;
